//! Ingestion pipeline: table in, supplier aggregates out.
//!
//! CRITICAL: ingestion is DETERMINISTIC.
//! Same table + same alias config = same aggregates, in the same order.

use serde::Serialize;
use tracing::{debug, info, info_span};

use crate::aggregate::{Aggregator, SupplierAggregate};
use crate::aliases::AliasConfig;
use crate::canonical::Canonicalizer;
use crate::error::SchemaError;
use crate::headers::{Field, HeaderSchema};
use crate::normalize::normalize;
use crate::row::{RowNormalizer, RowOutcome, SkipReason};
use crate::table::Table;

/// Counters collected while ingesting one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub blank_rows: usize,
    pub repeated_headers: usize,
    pub line_items: usize,
    pub numeric_fallbacks: usize,
    pub unidentified_items: usize,
}

/// Aggregates plus the counters of the run that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct Ingestion {
    pub suppliers: Vec<SupplierAggregate>,
    pub stats: IngestStats,
}

/// Header schema and canonicalizer bundled for repeated ingestion.
#[derive(Debug, Clone)]
pub struct Pipeline {
    schema: HeaderSchema,
    canonicalizer: Canonicalizer,
}

impl Pipeline {
    pub fn new(schema: HeaderSchema, canonicalizer: Canonicalizer) -> Self {
        Self { schema, canonicalizer }
    }

    pub fn from_config(config: &AliasConfig) -> Self {
        Self::new(config.header_schema(), Canonicalizer::from_config(config))
    }

    pub fn schema(&self) -> &HeaderSchema {
        &self.schema
    }

    pub fn canonicalizer(&self) -> &Canonicalizer {
        &self.canonicalizer
    }

    pub fn ingest(&self, table: &Table) -> Result<Ingestion, SchemaError> {
        ingest(table, &self.schema, &self.canonicalizer)
    }
}

/// Resolve headers, normalize every row, canonicalize and aggregate.
///
/// Fails only when a required column cannot be resolved. Row-level problems
/// are skipped and counted.
pub fn ingest(
    table: &Table,
    schema: &HeaderSchema,
    canonicalizer: &Canonicalizer,
) -> Result<Ingestion, SchemaError> {
    let span = info_span!("ingest", origin = %table.origin());
    let _guard = span.enter();

    let columns = schema.resolve_strict(table.headers())?;
    for field in Field::ALL {
        if let Some(header) = columns.header(field) {
            debug!(field = %field, header = header, "column resolved");
        }
    }

    let normalizer = RowNormalizer::new(&columns, schema);
    let mut aggregator = Aggregator::new();
    let mut stats = IngestStats::default();

    for (idx, row) in table.rows().iter().enumerate() {
        stats.rows_read += 1;
        let normalized = match normalizer.normalize(row) {
            RowOutcome::Item(normalized) => normalized,
            RowOutcome::Skipped(reason) => {
                stats.rows_skipped += 1;
                match reason {
                    SkipReason::Blank => stats.blank_rows += 1,
                    SkipReason::RepeatedHeader => stats.repeated_headers += 1,
                    SkipReason::BelowMinimumFill { .. } => {}
                }
                debug!(line = table.line_of(idx), reason = ?reason, "row skipped");
                continue;
            }
        };

        if normalized.numeric_fallbacks > 0 {
            debug!(
                line = table.line_of(idx),
                cells = normalized.numeric_fallbacks,
                "unparsable numeric cells read as 0"
            );
        }
        stats.numeric_fallbacks += normalized.numeric_fallbacks;

        let canonical = canonicalizer.canonicalize(normalized.name_source.as_deref());
        if canonical == canonicalizer.unidentified() {
            stats.unidentified_items += 1;
        }

        stats.line_items += 1;
        aggregator.add(canonical, normalized.item);
    }

    let suppliers = aggregator.finish();
    info!(
        rows = stats.rows_read,
        items = stats.line_items,
        skipped = stats.rows_skipped,
        suppliers = suppliers.len(),
        "ingestion complete"
    );

    Ok(Ingestion { suppliers, stats })
}

/// Optional cleanup pass over ingested aggregates.
///
/// Drops line items whose profile normalizes to empty, then drops suppliers
/// left with no items or with no item of positive value. Survivors are
/// rebuilt so their totals match the remaining items.
pub fn validate(suppliers: Vec<SupplierAggregate>) -> Vec<SupplierAggregate> {
    let before = suppliers.len();
    let kept: Vec<SupplierAggregate> = suppliers
        .into_iter()
        .filter_map(|aggregate| {
            let (name, items) = aggregate.into_parts();
            let items: Vec<_> = items
                .into_iter()
                .filter(|item| {
                    item.profile
                        .as_deref()
                        .is_some_and(|profile| !normalize(profile).is_empty())
                })
                .collect();
            if items.iter().all(|item| item.total_value <= 0.0) {
                debug!(supplier = %name, "supplier dropped by validation");
                return None;
            }
            Some(SupplierAggregate::from_items(name, items))
        })
        .collect();

    if kept.len() != before {
        info!(before = before, after = kept.len(), "validation dropped suppliers");
    }
    kept
}
