//! Normalization key shared by alias lookups and header matching.
//!
//! `normalize` is IDEMPOTENT: `normalize(normalize(s)) == normalize(s)`.
//! Its output only ever contains `[a-z0-9]` and single inner spaces.

use unicode_normalization::UnicodeNormalization;

/// Fold a free-text value into its comparison key.
///
/// Diacritics are stripped through NFKD decomposition (anything left outside
/// ASCII is dropped), ASCII punctuation is removed, letters are lowercased and
/// whitespace runs collapse to a single space.
pub fn normalize(value: &str) -> String {
    let folded: String = value
        .nfkd()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_ascii_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trimmed value with the first letter uppercased and the rest lowercased.
pub fn capitalize(value: &str) -> String {
    let mut chars = value.trim().chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
