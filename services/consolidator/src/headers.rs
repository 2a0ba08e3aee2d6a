//! Header resolution: maps localized/renamed column headers to the semantic
//! fields the engine reads.
//!
//! Matching is an exact comparison of normalized forms, never a substring
//! guess. The leftmost matching column wins.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::normalize::normalize;
use crate::table::Cell;

/// Semantic fields a billing row can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Supplier,
    Profile,
    Hours,
    HeadHours,
    ResourceCount,
    AllocationMonths,
    TotalValue,
}

impl Field {
    pub const ALL: [Field; 7] = [
        Field::Supplier,
        Field::Profile,
        Field::Hours,
        Field::HeadHours,
        Field::ResourceCount,
        Field::AllocationMonths,
        Field::TotalValue,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Field::Supplier => "supplier",
            Field::Profile => "profile",
            Field::Hours => "hours",
            Field::HeadHours => "head_hours",
            Field::ResourceCount => "resource_count",
            Field::AllocationMonths => "allocation_months",
            Field::TotalValue => "total_value",
        }
    }

    /// Header an operator would typically write for this field.
    pub fn example_header(&self) -> &'static str {
        default_variants(*self)[0]
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Known header spellings seen across supplier exports.
fn default_variants(field: Field) -> &'static [&'static str] {
    match field {
        Field::Supplier => &["Fornecedor", "Fornecedores", "Nome do Fornecedor", "Supplier", "Vendor"],
        Field::Profile => &["Perfil", "Perfil Profissional", "Cargo", "Profile"],
        Field::Hours => &["Hora", "Horas", "Horas Trabalhadas", "Hours"],
        Field::HeadHours => &["H/H", "H H", "HH", "Homem Hora", "Homem/Hora"],
        Field::ResourceCount => &[
            "Qtde de Recursos",
            "Quantidade de Recursos",
            "Qtde",
            "Quantidade",
            "Qtd. de Recursos",
            "Qde de Recursos",
            "Qde Recursos",
        ],
        Field::AllocationMonths => &[
            "Alocação (meses)",
            "Alocação",
            "Alocacao",
            "Alocação meses",
            "Alocacao (meses)",
        ],
        Field::TotalValue => &["Total", "Valor total", "Valor", "Total (R$)", "Valor Total (R$)"],
    }
}

/// Accepted header variants per field, plus the fields a table must carry.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderSchema {
    variants: BTreeMap<Field, Vec<String>>,
    required: Vec<Field>,
}

impl Default for HeaderSchema {
    fn default() -> Self {
        let mut schema = Self {
            variants: BTreeMap::new(),
            required: vec![Field::Supplier, Field::TotalValue],
        };
        for field in Field::ALL {
            schema = schema.with_variants(field, default_variants(field).iter().copied());
        }
        schema
    }
}

impl HeaderSchema {
    /// Add header variants for `field`. Variants are normalized and deduplicated.
    pub fn with_variants<I, S>(mut self, field: Field, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let known = self.variants.entry(field).or_default();
        for variant in variants {
            let key = normalize(variant.as_ref());
            if !key.is_empty() && !known.contains(&key) {
                known.push(key);
            }
        }
        self
    }

    pub fn with_required(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.required = fields.into_iter().collect();
        self
    }

    pub fn required(&self) -> &[Field] {
        &self.required
    }

    /// Normalized variants accepted for `field`.
    pub fn variants(&self, field: Field) -> &[String] {
        self.variants.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `header` is an accepted spelling for `field`.
    pub fn matches(&self, field: Field, header: &str) -> bool {
        let key = normalize(header);
        !key.is_empty() && self.variants(field).contains(&key)
    }

    /// Resolve every field it can. Never fails; unresolved fields are simply absent.
    pub fn resolve(&self, header_row: &[Cell]) -> ColumnMap {
        let names = header_names(header_row);
        let keys: Vec<String> = names.iter().map(|name| normalize(name)).collect();

        let mut columns = BTreeMap::new();
        for field in Field::ALL {
            let accepted = self.variants(field);
            if let Some(idx) = keys.iter().position(|key| accepted.contains(key)) {
                columns.insert(field, idx);
            }
        }

        ColumnMap { columns, names }
    }

    /// Resolve and fail with a `SchemaError` if any required field is missing.
    pub fn resolve_strict(&self, header_row: &[Cell]) -> Result<ColumnMap, SchemaError> {
        let map = self.resolve(header_row);
        let missing = map.missing(&self.required);
        if missing.is_empty() {
            Ok(map)
        } else {
            Err(SchemaError { missing })
        }
    }
}

/// Header display names with positional placeholders (`coluna_<n>`) for blanks.
pub fn header_names(header_row: &[Cell]) -> Vec<String> {
    header_row
        .iter()
        .enumerate()
        .map(|(i, cell)| cell.as_text().unwrap_or_else(|| format!("coluna_{}", i + 1)))
        .collect()
}

/// Result of header resolution: field → column index.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMap {
    columns: BTreeMap<Field, usize>,
    names: Vec<String>,
}

impl ColumnMap {
    pub fn get(&self, field: Field) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    /// Header text of the column resolved for `field`.
    pub fn header(&self, field: Field) -> Option<&str> {
        self.get(field).and_then(|idx| self.names.get(idx)).map(String::as_str)
    }

    /// Subset of `fields` that did not resolve, in the given order.
    pub fn missing(&self, fields: &[Field]) -> Vec<Field> {
        fields
            .iter()
            .copied()
            .filter(|field| !self.columns.contains_key(field))
            .collect()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(cells: &[&str]) -> Vec<Cell> {
        cells.iter().map(|c| Cell::from(*c)).collect()
    }

    // -------------------------------------------------------------------------
    // RESOLUTION
    // -------------------------------------------------------------------------

    #[test]
    fn test_resolve_canonical_headers() {
        let row = header(&["Fornecedor", "Perfil", "Horas", "HH", "Qtde de Recursos", "Alocação (meses)", "Total"]);
        let map = HeaderSchema::default().resolve(&row);
        assert_eq!(map.get(Field::Supplier), Some(0));
        assert_eq!(map.get(Field::Profile), Some(1));
        assert_eq!(map.get(Field::Hours), Some(2));
        assert_eq!(map.get(Field::HeadHours), Some(3));
        assert_eq!(map.get(Field::ResourceCount), Some(4));
        assert_eq!(map.get(Field::AllocationMonths), Some(5));
        assert_eq!(map.get(Field::TotalValue), Some(6));
    }

    #[test]
    fn test_resolve_accents_case_and_punctuation() {
        let row = header(&["FORNECEDOR", "h/h", "ALOCACAO MESES", "valor total", "Qtd de recursos"]);
        let map = HeaderSchema::default().resolve(&row);
        assert_eq!(map.get(Field::Supplier), Some(0));
        assert_eq!(map.get(Field::HeadHours), Some(1));
        assert_eq!(map.get(Field::AllocationMonths), Some(2));
        assert_eq!(map.get(Field::TotalValue), Some(3));
        assert_eq!(map.get(Field::ResourceCount), Some(4));
    }

    #[test]
    fn test_resolve_is_exact_not_substring() {
        let row = header(&["Total Geral", "Fornecedor Principal"]);
        let map = HeaderSchema::default().resolve(&row);
        assert_eq!(map.get(Field::TotalValue), None);
        assert_eq!(map.get(Field::Supplier), None);
    }

    #[test]
    fn test_resolve_leftmost_wins() {
        let row = header(&["Valor", "Total"]);
        let map = HeaderSchema::default().resolve(&row);
        assert_eq!(map.get(Field::TotalValue), Some(0));
        assert_eq!(map.header(Field::TotalValue), Some("Valor"));
    }

    #[test]
    fn test_resolve_blank_headers_get_placeholders() {
        let row = vec![Cell::Empty, Cell::from("Fornecedor"), Cell::from("  "), Cell::from("Total")];
        let map = HeaderSchema::default().resolve(&row);
        assert_eq!(map.names(), &["coluna_1", "Fornecedor", "coluna_3", "Total"]);
        assert_eq!(map.get(Field::Supplier), Some(1));
        assert_eq!(map.get(Field::TotalValue), Some(3));
    }

    #[test]
    fn test_resolve_empty_header_row() {
        let map = HeaderSchema::default().resolve(&[]);
        assert_eq!(map.missing(&Field::ALL).len(), Field::ALL.len());
    }

    // -------------------------------------------------------------------------
    // REQUIRED FIELDS
    // -------------------------------------------------------------------------

    #[test]
    fn test_resolve_strict_reports_missing_fields() {
        let row = header(&["Perfil", "Horas"]);
        let err = HeaderSchema::default().resolve_strict(&row).unwrap_err();
        assert_eq!(err.missing, vec![Field::Supplier, Field::TotalValue]);
    }

    #[test]
    fn test_resolve_strict_tolerates_missing_optional_fields() {
        let row = header(&["Fornecedor", "Total"]);
        let map = HeaderSchema::default().resolve_strict(&row).unwrap();
        assert_eq!(map.get(Field::Hours), None);
    }

    #[test]
    fn test_custom_required_and_variants() {
        let schema = HeaderSchema::default()
            .with_variants(Field::Supplier, ["Prestador de Serviço"])
            .with_required([Field::Supplier, Field::Hours]);
        let row = header(&["Prestador de Servico", "Horas"]);
        let map = schema.resolve_strict(&row).unwrap();
        assert_eq!(map.get(Field::Supplier), Some(0));
        assert!(schema.matches(Field::Supplier, "PRESTADOR DE SERVIÇO"));
    }
}
