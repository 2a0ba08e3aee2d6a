//! Row normalization: one raw row in, zero or one `LineItem` out.
//!
//! Best-effort numeric extraction NEVER aborts ingestion: unparsable cells
//! become zero and are only counted.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::headers::{ColumnMap, Field, HeaderSchema};
use crate::table::{cell_at, Cell};

/// Rows with fewer filled essential fields are decorative, not data.
pub const MIN_FILLED_FIELDS: usize = 2;

/// Fields counted by the minimum-fill rule.
const ESSENTIAL_FIELDS: [Field; 5] = [
    Field::Supplier,
    Field::Profile,
    Field::TotalValue,
    Field::HeadHours,
    Field::Hours,
];

/// One billing/profile row ("detalhe").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(rename = "perfil")]
    pub profile: Option<String>,
    #[serde(rename = "hora")]
    pub hours: f64,
    #[serde(rename = "hh")]
    pub head_hours: f64,
    #[serde(rename = "qtde_recursos")]
    pub resource_count: i64,
    #[serde(rename = "alocacao_meses")]
    pub allocation_months: i64,
    #[serde(rename = "valor_total")]
    pub total_value: f64,
}

/// Outcome of reading one cell as a number.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Numeric {
    Blank,
    Value(f64),
    Unparsable,
}

fn read_numeric(cell: &Cell) -> Numeric {
    match cell {
        Cell::Empty => Numeric::Blank,
        Cell::Number(n) if n.is_nan() => Numeric::Blank,
        Cell::Number(n) if n.is_finite() => Numeric::Value(*n),
        Cell::Number(_) => Numeric::Unparsable,
        Cell::Text(s) => parse_localized(s),
    }
}

/// Parse a pt-BR formatted number: `.` thousands separator, `,` decimal.
fn parse_localized(raw: &str) -> Numeric {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix("R$").unwrap_or(trimmed);
    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();

    if compact.is_empty() || compact == "-" || compact.eq_ignore_ascii_case("nan") {
        return Numeric::Blank;
    }

    let canonical = compact.replace('.', "").replace(',', ".");
    match canonical.parse::<f64>() {
        Ok(value) if value.is_finite() => Numeric::Value(value),
        _ => {
            debug!(value = raw, "numeric coercion fallback to 0");
            Numeric::Unparsable
        }
    }
}

/// Cell as `f64`; blank, NaN and unparsable values read as `0.0`.
pub fn to_float(cell: &Cell) -> f64 {
    match read_numeric(cell) {
        Numeric::Value(value) => value,
        Numeric::Blank | Numeric::Unparsable => 0.0,
    }
}

/// Cell as `i64`, truncating `to_float`.
pub fn to_int(cell: &Cell) -> i64 {
    to_float(cell).trunc() as i64
}

/// Whether a cell counts toward the minimum-fill rule.
///
/// Blank cells and the placeholders `0` and `-` do not count.
pub fn is_filled(cell: &Cell) -> bool {
    match cell {
        Cell::Empty => false,
        Cell::Number(n) => !n.is_nan() && *n != 0.0,
        Cell::Text(s) => {
            let trimmed = s.trim();
            !trimmed.is_empty() && trimmed != "0" && trimmed != "-"
        }
    }
}

/// Why a row produced no line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Every cell blank.
    Blank,
    /// The header row repeated inside the data.
    RepeatedHeader,
    BelowMinimumFill { filled: usize },
}

/// A row that became data.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    /// Text the supplier identity is derived from (supplier cell, else profile).
    pub name_source: Option<String>,
    pub item: LineItem,
    /// Numeric cells that could not be parsed and were read as zero.
    pub numeric_fallbacks: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Item(NormalizedRow),
    Skipped(SkipReason),
}

/// Turns raw rows into line items using a resolved column map.
#[derive(Debug, Clone, Copy)]
pub struct RowNormalizer<'a> {
    columns: &'a ColumnMap,
    schema: &'a HeaderSchema,
}

impl<'a> RowNormalizer<'a> {
    pub fn new(columns: &'a ColumnMap, schema: &'a HeaderSchema) -> Self {
        Self { columns, schema }
    }

    fn cell<'r>(&self, row: &'r [Cell], field: Field) -> Option<&'r Cell> {
        self.columns.get(field).map(|idx| cell_at(row, idx))
    }

    /// A supplier cell spelled like a header is not enough: a vendor may be
    /// called "Vendor". Some other resolved column must read as its header too.
    fn is_repeated_header(&self, row: &[Cell], supplier: Option<&str>) -> bool {
        let Some(name) = supplier else {
            return false;
        };
        if !self.schema.matches(Field::Supplier, name) {
            return false;
        }
        Field::ALL
            .iter()
            .filter(|field| **field != Field::Supplier)
            .any(|field| {
                self.cell(row, *field)
                    .and_then(Cell::as_text)
                    .is_some_and(|text| self.schema.matches(*field, &text))
            })
    }

    pub fn normalize(&self, row: &[Cell]) -> RowOutcome {
        if row.iter().all(Cell::is_blank) {
            return RowOutcome::Skipped(SkipReason::Blank);
        }

        let supplier = self.cell(row, Field::Supplier).and_then(Cell::as_text);
        if self.is_repeated_header(row, supplier.as_deref()) {
            return RowOutcome::Skipped(SkipReason::RepeatedHeader);
        }

        let filled = ESSENTIAL_FIELDS
            .iter()
            .filter(|field| self.cell(row, **field).is_some_and(is_filled))
            .count();
        if filled < MIN_FILLED_FIELDS {
            return RowOutcome::Skipped(SkipReason::BelowMinimumFill { filled });
        }

        let profile = self.cell(row, Field::Profile).and_then(Cell::as_text);
        let name_source = supplier.or_else(|| profile.clone());

        let mut numeric_fallbacks = 0;
        let mut number = |field: Field| -> f64 {
            let Some(cell) = self.cell(row, field) else {
                return 0.0;
            };
            match read_numeric(cell) {
                Numeric::Value(value) => value,
                Numeric::Blank => 0.0,
                Numeric::Unparsable => {
                    numeric_fallbacks += 1;
                    0.0
                }
            }
        };

        let item = LineItem {
            profile,
            hours: number(Field::Hours),
            head_hours: number(Field::HeadHours),
            resource_count: number(Field::ResourceCount).trunc() as i64,
            allocation_months: number(Field::AllocationMonths).trunc() as i64,
            total_value: number(Field::TotalValue),
        };

        RowOutcome::Item(NormalizedRow {
            name_source,
            item,
            numeric_fallbacks,
        })
    }
}
