//! Supplier cost consolidation.
//!
//! Reads heterogeneous supplier spreadsheets, resolves their headers,
//! normalizes rows into line items, collapses supplier-name spellings onto
//! canonical identities and aggregates totals per supplier.
//!
//! CRITICAL: the engine is DETERMINISTIC.
//! Same table + same alias config = same output.

pub mod aggregate;
pub mod aliases;
pub mod canonical;
pub mod config;
pub mod error;
pub mod headers;
pub mod normalize;
pub mod pipeline;
pub mod report;
pub mod row;
pub mod source;
pub mod table;

pub use aggregate::{aggregate, Aggregator, SupplierAggregate};
pub use aliases::{AliasConfig, AliasTable, UNIDENTIFIED_SUPPLIER};
pub use canonical::{Canonicalizer, MatchRule, Resolution};
pub use error::{ConfigError, SchemaError};
pub use headers::{ColumnMap, Field, HeaderSchema};
pub use pipeline::{ingest, validate, IngestStats, Ingestion, Pipeline};
pub use row::LineItem;
pub use table::{Cell, Table};
