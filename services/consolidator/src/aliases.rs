//! Alias configuration: the operator-maintained vocabulary of supplier
//! spellings, loaded once and shared read-only.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::headers::{Field, HeaderSchema};
use crate::normalize::normalize;

/// Name used for rows without a usable supplier name.
pub const UNIDENTIFIED_SUPPLIER: &str = "Fornecedor não identificado";

/// Similarity required for a fuzzy alias hit.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.8;

const BUILTIN_CONFIG: &str = include_str!("../config/aliases.json");

fn default_unidentified() -> String {
    UNIDENTIFIED_SUPPLIER.to_string()
}

/// On-disk alias configuration (JSON).
#[derive(Debug, Clone, Deserialize)]
pub struct AliasConfig {
    #[serde(default)]
    pub version: String,
    #[serde(default = "default_unidentified")]
    pub unidentified: String,
    #[serde(default)]
    pub fuzzy_threshold: Option<f64>,
    #[serde(default)]
    pub suppliers: Vec<SupplierAliases>,
    /// Extra header variants per field, added to the built-in ones.
    #[serde(default)]
    pub columns: HashMap<Field, Vec<String>>,
    #[serde(default)]
    pub required_columns: Option<Vec<Field>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupplierAliases {
    pub canonical: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl AliasConfig {
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: AliasConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load an operator-supplied config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&content)?;
        info!(
            path = %path.display(),
            version = %config.version,
            suppliers = config.suppliers.len(),
            "loaded alias config"
        );
        Ok(config)
    }

    /// The table shipped with the binary (`config/aliases.json`).
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_json(BUILTIN_CONFIG)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self.fuzzy_threshold {
            Some(t) if !(0.0..=1.0).contains(&t) => Err(ConfigError::InvalidThreshold(t)),
            _ => Ok(()),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.fuzzy_threshold.unwrap_or(DEFAULT_FUZZY_THRESHOLD)
    }

    /// Built-in header schema extended with this config's column overrides.
    pub fn header_schema(&self) -> HeaderSchema {
        let mut schema = HeaderSchema::default();
        for field in Field::ALL {
            if let Some(extra) = self.columns.get(&field) {
                schema = schema.with_variants(field, extra);
            }
        }
        if let Some(required) = &self.required_columns {
            schema = schema.with_required(required.iter().copied());
        }
        schema
    }

    pub fn alias_table(&self) -> AliasTable {
        let pairs = self.suppliers.iter().flat_map(|supplier| {
            std::iter::once(&supplier.canonical)
                .chain(supplier.aliases.iter())
                .map(move |alias| (alias.as_str(), supplier.canonical.as_str()))
        });
        AliasTable::from_pairs(pairs)
    }
}

/// One normalized alias key and the canonical name it maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasEntry {
    pub key: String,
    pub canonical: String,
}

/// Ordered alias → canonical mapping.
///
/// Iteration order is definition order; scans that stop at the first hit
/// depend on it.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    entries: Vec<AliasEntry>,
    index: HashMap<String, usize>,
}

impl AliasTable {
    /// Build from `(alias, canonical)` pairs. Aliases are normalized; empty
    /// keys are ignored and the first definition of a key wins.
    pub fn from_pairs<I, A, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, C)>,
        A: AsRef<str>,
        C: AsRef<str>,
    {
        let mut table = Self::default();
        for (alias, canonical) in pairs {
            let key = normalize(alias.as_ref());
            if key.is_empty() {
                warn!(alias = alias.as_ref(), "alias normalizes to empty, ignored");
                continue;
            }
            if let Some(&existing) = table.index.get(&key) {
                let kept = &table.entries[existing].canonical;
                if kept != canonical.as_ref() {
                    warn!(
                        key = %key,
                        kept = %kept,
                        ignored = canonical.as_ref(),
                        "duplicate alias key, first definition wins"
                    );
                }
                continue;
            }
            table.index.insert(key.clone(), table.entries.len());
            table.entries.push(AliasEntry {
                key,
                canonical: canonical.as_ref().trim().to_string(),
            });
        }
        table
    }

    /// Canonical name for an exact normalized key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.index
            .get(key)
            .map(|&idx| self.entries[idx].canonical.as_str())
    }

    pub fn entries(&self) -> impl Iterator<Item = &AliasEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
