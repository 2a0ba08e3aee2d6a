//! Runtime settings from the environment (`.env` is loaded by the binary).

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::aliases::AliasConfig;
use crate::error::ConfigError;

pub const ALIASES_ENV: &str = "CONSOLIDATOR_ALIASES";
pub const FUZZY_THRESHOLD_ENV: &str = "CONSOLIDATOR_FUZZY_THRESHOLD";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    /// Alias config file; the built-in table when unset.
    pub aliases_path: Option<PathBuf>,
    pub fuzzy_threshold: Option<f64>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let present = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let fuzzy_threshold = present(FUZZY_THRESHOLD_ENV)
            .map(|raw| {
                raw.trim()
                    .parse::<f64>()
                    .with_context(|| format!("{} is not a number: '{}'", FUZZY_THRESHOLD_ENV, raw))
            })
            .transpose()?;

        Ok(Self {
            aliases_path: present(ALIASES_ENV).map(PathBuf::from),
            fuzzy_threshold,
        })
    }

    /// Command-line values win over the environment.
    pub fn with_overrides(mut self, aliases_path: Option<PathBuf>, fuzzy_threshold: Option<f64>) -> Self {
        if aliases_path.is_some() {
            self.aliases_path = aliases_path;
        }
        if fuzzy_threshold.is_some() {
            self.fuzzy_threshold = fuzzy_threshold;
        }
        self
    }

    /// Load the alias config these settings point at, threshold applied.
    pub fn alias_config(&self) -> Result<AliasConfig, ConfigError> {
        let mut config = match &self.aliases_path {
            Some(path) => AliasConfig::load(path)?,
            None => AliasConfig::builtin()?,
        };
        if let Some(threshold) = self.fuzzy_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ConfigError::InvalidThreshold(threshold));
            }
            config.fuzzy_threshold = Some(threshold);
        }
        Ok(config)
    }
}
