use std::path::PathBuf;

use thiserror::Error;

use crate::headers::Field;

/// Required columns could not be resolved from the header row.
///
/// Fatal for the table being ingested: no partial ingestion is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing required column(s): {}", describe_missing(.missing))]
pub struct SchemaError {
    pub missing: Vec<Field>,
}

fn describe_missing(fields: &[Field]) -> String {
    fields
        .iter()
        .map(|field| format!("{} (e.g. \"{}\")", field, field.example_header()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Alias/column configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read alias config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse alias config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("fuzzy threshold must be between 0 and 1, got {0}")]
    InvalidThreshold(f64),
}
