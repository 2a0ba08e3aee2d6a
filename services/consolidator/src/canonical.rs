//! Supplier-name canonicalization.
//!
//! CRITICAL: rule precedence is load-bearing. Reordering the rules changes
//! which aggregate a row lands in, so totals silently differ.
//!
//! 1. empty name                           -> unidentified sentinel
//! 2. trims to "???" or normalizes to ""   -> unidentified sentinel
//! 3. contains "atos" anywhere             -> "Atos"
//! 4. exact alias key                      -> alias canonical
//! 5. alias key as a whole word            -> alias canonical (table order)
//! 6. starts with an alias key             -> alias canonical (table order)
//! 7. best fuzzy similarity >= limit       -> alias canonical
//! 8. otherwise                            -> trimmed raw name, capitalized

use std::sync::Arc;

use serde::Serialize;
use strsim::normalized_levenshtein;

use crate::aliases::{AliasConfig, AliasTable, DEFAULT_FUZZY_THRESHOLD, UNIDENTIFIED_SUPPLIER};
use crate::error::ConfigError;
use crate::normalize::{capitalize, normalize};

/// Canonical name for every spelling containing "atos".
pub const ATOS_CANONICAL: &str = "Atos";

const ATOS_FRAGMENT: &str = "atos";
const PLACEHOLDER_NAME: &str = "???";

/// Which rule produced a canonical name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum MatchRule {
    Unidentified,
    AtosOverride,
    Exact { key: String },
    WordBoundary { key: String },
    Prefix { key: String },
    Fuzzy { key: String, similarity: f64 },
    Passthrough,
}

/// A canonical name plus the reason it was chosen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub raw: Option<String>,
    pub normalized: String,
    pub canonical: String,
    #[serde(flatten)]
    pub rule: MatchRule,
}

/// Maps raw supplier names to canonical identities. Total and deterministic.
///
/// Cloning is cheap: the alias table is shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Canonicalizer {
    table: Arc<AliasTable>,
    threshold: f64,
    unidentified: String,
}

impl Canonicalizer {
    pub fn new(table: impl Into<Arc<AliasTable>>) -> Self {
        Self {
            table: table.into(),
            threshold: DEFAULT_FUZZY_THRESHOLD,
            unidentified: UNIDENTIFIED_SUPPLIER.to_string(),
        }
    }

    pub fn from_config(config: &AliasConfig) -> Self {
        Self::new(config.alias_table())
            .with_unidentified(config.unidentified.clone())
            .with_threshold_unchecked(config.threshold())
    }

    /// Override the fuzzy similarity threshold; must lie in `[0, 1]`.
    pub fn with_threshold(self, threshold: f64) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        Ok(self.with_threshold_unchecked(threshold))
    }

    fn with_threshold_unchecked(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_unidentified(mut self, name: impl Into<String>) -> Self {
        self.unidentified = name.into();
        self
    }

    pub fn unidentified(&self) -> &str {
        &self.unidentified
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn table(&self) -> &AliasTable {
        &self.table
    }

    pub fn canonicalize(&self, raw: Option<&str>) -> String {
        self.resolve(raw).canonical
    }

    /// Canonicalize and report which rule fired.
    pub fn resolve(&self, raw: Option<&str>) -> Resolution {
        let trimmed = raw.map(str::trim).unwrap_or_default();
        let normalized = normalize(trimmed);

        let (canonical, rule) = if trimmed == PLACEHOLDER_NAME || normalized.is_empty() {
            (self.unidentified.clone(), MatchRule::Unidentified)
        } else {
            self.match_normalized(&normalized)
                .unwrap_or_else(|| (capitalize(trimmed), MatchRule::Passthrough))
        };

        Resolution {
            raw: raw.map(str::to_string),
            normalized,
            canonical,
            rule,
        }
    }

    fn match_normalized(&self, normalized: &str) -> Option<(String, MatchRule)> {
        if normalized.contains(ATOS_FRAGMENT) {
            return Some((ATOS_CANONICAL.to_string(), MatchRule::AtosOverride));
        }

        if let Some(canonical) = self.table.get(normalized) {
            let rule = MatchRule::Exact {
                key: normalized.to_string(),
            };
            return Some((canonical.to_string(), rule));
        }

        if let Some(entry) = self.table.entries().find(|e| contains_word(normalized, &e.key)) {
            let rule = MatchRule::WordBoundary { key: entry.key.clone() };
            return Some((entry.canonical.clone(), rule));
        }

        if let Some(entry) = self.table.entries().find(|e| normalized.starts_with(e.key.as_str())) {
            let rule = MatchRule::Prefix { key: entry.key.clone() };
            return Some((entry.canonical.clone(), rule));
        }

        let mut best: Option<(f64, &str, &str)> = None;
        for entry in self.table.entries() {
            let similarity = normalized_levenshtein(normalized, &entry.key);
            // strict comparison keeps the earliest entry on ties
            if best.map_or(true, |(score, _, _)| similarity > score) {
                best = Some((similarity, entry.key.as_str(), entry.canonical.as_str()));
            }
        }
        match best {
            Some((similarity, key, canonical)) if similarity >= self.threshold => {
                let rule = MatchRule::Fuzzy {
                    key: key.to_string(),
                    similarity,
                };
                Some((canonical.to_string(), rule))
            }
            _ => None,
        }
    }
}

/// Whether `needle` occurs in `haystack` bounded by non-alphanumerics or edges.
fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, matched)| {
        let end = start + matched.len();
        let open = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let close = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        open && close
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin() -> Canonicalizer {
        Canonicalizer::from_config(&AliasConfig::builtin().unwrap())
    }

    // -------------------------------------------------------------------------
    // SENTINEL
    // -------------------------------------------------------------------------

    #[test]
    fn test_sentinel_for_missing_names() {
        let c = builtin();
        for raw in [None, Some(""), Some("   "), Some("???"), Some("  ???  ")] {
            let resolution = c.resolve(raw);
            assert_eq!(resolution.canonical, UNIDENTIFIED_SUPPLIER, "for {:?}", raw);
            assert_eq!(resolution.rule, MatchRule::Unidentified);
        }
    }

    #[test]
    fn test_custom_sentinel() {
        let c = builtin().with_unidentified("Desconhecido");
        assert_eq!(c.canonicalize(None), "Desconhecido");
    }

    // -------------------------------------------------------------------------
    // PRECEDENCE
    // -------------------------------------------------------------------------

    #[test]
    fn test_atos_override() {
        let c = builtin();
        assert_eq!(c.canonicalize(Some("ATOS ajuste da RC 100854987/3")), "Atos");
        assert_eq!(c.canonicalize(Some("ATOSajuste")), "Atos");
        assert_eq!(
            c.resolve(Some("ATOS ajuste da RC 100854987/3 Pedido emitido 5500508154")).rule,
            MatchRule::AtosOverride
        );
    }

    #[test]
    fn test_atos_override_beats_alias_table() {
        let table = AliasTable::from_pairs([("atos origin", "Atos Origin Ltda")]);
        let c = Canonicalizer::new(table);
        assert_eq!(c.canonicalize(Some("Atos Origin")), "Atos");
    }

    #[test]
    fn test_exact_match() {
        let c = builtin();
        let resolution = c.resolve(Some("Hitts"));
        assert_eq!(resolution.canonical, "Hitss");
        assert_eq!(resolution.rule, MatchRule::Exact { key: "hitts".into() });
        assert_eq!(c.canonicalize(Some("NTT.DATA")), "Ntt Data");
        assert_eq!(c.canonicalize(Some("MJV Soluções em Tecnologia LTDA")), "MJV");
    }

    #[test]
    fn test_word_boundary_match() {
        let c = builtin();
        let resolution = c.resolve(Some("Engineering do Brasil S/A - contrato 2024"));
        assert_eq!(resolution.canonical, "Engineering");
        assert!(matches!(resolution.rule, MatchRule::WordBoundary { .. }));
    }

    #[test]
    fn test_word_boundary_first_in_table_order_wins() {
        let table = AliasTable::from_pairs([("beta", "Beta"), ("alfa", "Alfa")]);
        let c = Canonicalizer::new(table);
        assert_eq!(c.canonicalize(Some("alfa beta consultoria")), "Beta");
    }

    #[test]
    fn test_word_boundary_requires_whole_word() {
        assert!(contains_word("ntt data", "ntt"));
        assert!(contains_word("grupo ntt", "ntt"));
        assert!(!contains_word("nttdata", "ntt"));
        assert!(!contains_word("xntt", "ntt"));
        assert!(contains_word("xntt ntt", "ntt"));
        assert!(!contains_word("anything", ""));
    }

    #[test]
    fn test_prefix_match() {
        let c = builtin();
        let resolution = c.resolve(Some("HitssBrasil"));
        assert_eq!(resolution.canonical, "Hitss");
        assert_eq!(resolution.rule, MatchRule::Prefix { key: "hitss".into() });
    }

    #[test]
    fn test_fuzzy_match() {
        let c = builtin();
        let resolution = c.resolve(Some("Enginering"));
        assert_eq!(resolution.canonical, "Engineering");
        match resolution.rule {
            MatchRule::Fuzzy { similarity, .. } => assert!(similarity >= 0.8),
            other => panic!("expected fuzzy match, got {:?}", other),
        }
    }

    #[test]
    fn test_fuzzy_tie_keeps_earliest_entry() {
        let table = AliasTable::from_pairs([("abcdefghij", "First"), ("abcdefghik", "Second")]);
        let c = Canonicalizer::new(table);
        let resolution = c.resolve(Some("abcdefghiz"));
        assert_eq!(resolution.canonical, "First");
        match resolution.rule {
            MatchRule::Fuzzy { key, similarity } => {
                assert_eq!(key, "abcdefghij");
                assert!((similarity - 0.9).abs() < 1e-9);
            }
            other => panic!("expected fuzzy match, got {:?}", other),
        }
    }

    #[test]
    fn test_fuzzy_threshold_is_tunable() {
        let strict = builtin().with_threshold(0.99).unwrap();
        assert_eq!(strict.canonicalize(Some("Enginering")), "Enginering");
        assert!(builtin().with_threshold(-0.1).is_err());
    }

    #[test]
    fn test_unknown_vendor_passthrough() {
        let c = builtin();
        let resolution = c.resolve(Some("Globex Corp"));
        assert_eq!(resolution.canonical, "Globex corp");
        assert_eq!(resolution.rule, MatchRule::Passthrough);
        assert_eq!(c.canonicalize(Some("  Initech  ")), "Initech");
    }

    // -------------------------------------------------------------------------
    // DETERMINISM
    // -------------------------------------------------------------------------

    #[test]
    fn test_canonicalize_determinism() {
        let c = builtin();
        let samples = ["Hitss", "hitts", "Globex Corp", "ATOSajuste", "???", "Engeering Brasil", "m4 po - 1"];
        for s in samples {
            let first = c.canonicalize(Some(s));
            for _ in 0..10 {
                assert_eq!(c.canonicalize(Some(s)), first);
            }
        }
    }

    #[test]
    fn test_clones_share_table() {
        let c = builtin();
        let clone = c.clone();
        assert!(std::ptr::eq(c.table(), clone.table()));
    }

    #[test]
    fn test_resolution_serializes_rule_tag() {
        let resolution = builtin().resolve(Some("Hitts"));
        let json = serde_json::to_value(&resolution).unwrap();
        assert_eq!(json["rule"], "exact");
        assert_eq!(json["canonical"], "Hitss");
        assert_eq!(json["key"], "hitts");
    }
}
