//! Table sources: spreadsheet, CSV and JSON files into a [`Table`].
//!
//! Sources only shape cells. They never interpret values; numeric coercion
//! and row rules live in `row`.

use std::borrow::Cow;
use std::path::Path;

use anyhow::{bail, Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use encoding_rs::WINDOWS_1252;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::headers::{Field, HeaderSchema};
use crate::normalize::normalize;
use crate::table::{Cell, Table};

/// Rows scanned when looking for the header row.
const HEADER_SEARCH_ROWS: usize = 30;

const CANDIDATE_DELIMITERS: [u8; 3] = [b';', b',', b'\t'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Workbook,
    Csv,
    Json,
}

impl SourceFormat {
    /// Detect by file extension.
    pub fn detect(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Ok(SourceFormat::Workbook),
            "csv" | "txt" => Ok(SourceFormat::Csv),
            "json" => Ok(SourceFormat::Json),
            _ => bail!(
                "unsupported file extension '{}' for {} (expected xlsx, xls, ods, csv or json)",
                ext,
                path.display()
            ),
        }
    }
}

/// Read `path` into a table, locating the header row with `schema`.
///
/// `sheet` only applies to workbooks.
pub fn read_table(path: &Path, sheet: Option<&str>, schema: &HeaderSchema) -> Result<Table> {
    let format = SourceFormat::detect(path)?;
    info!(path = %path.display(), format = ?format, "reading input");

    let table = match format {
        SourceFormat::Workbook => read_workbook(path, sheet, schema)?,
        SourceFormat::Csv => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read file {}", path.display()))?;
            read_csv_bytes(&bytes, schema)?
        }
        SourceFormat::Json => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read file {}", path.display()))?;
            read_json_str(&content)?
        }
    };

    info!(
        origin = table.origin(),
        columns = table.headers().len(),
        rows = table.rows().len(),
        "table loaded"
    );
    Ok(table)
}

// =============================================================================
// CSV
// =============================================================================

/// UTF-8 (BOM stripped) when valid, Windows-1252 otherwise.
pub fn decode_bytes(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            debug!("input is not UTF-8, decoding as Windows-1252");
            let (text, _had_errors) = WINDOWS_1252.decode_without_bom_handling(bytes);
            text
        }
    }
}

/// Most frequent candidate delimiter on the first line that has any.
pub fn sniff_delimiter(text: &str) -> u8 {
    let Some(line) = text
        .lines()
        .find(|line| line.bytes().any(|b| CANDIDATE_DELIMITERS.contains(&b)))
    else {
        return b',';
    };

    let mut best = (b',', 0);
    for delimiter in CANDIDATE_DELIMITERS {
        let count = line.bytes().filter(|&b| b == delimiter).count();
        if count > best.1 {
            best = (delimiter, count);
        }
    }
    best.0
}

pub fn read_csv_bytes(bytes: &[u8], schema: &HeaderSchema) -> Result<Table> {
    let text = decode_bytes(bytes);
    let delimiter = sniff_delimiter(&text);
    debug!(delimiter = %(delimiter as char).escape_default(), "csv delimiter");

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows: Vec<Vec<Cell>> = Vec::new();
    let mut lines: Vec<u64> = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to parse CSV record {}", idx + 1))?;
        lines.push(record.position().map_or(idx as u64 + 1, |p| p.line()));
        rows.push(record.iter().map(Cell::text).collect());
    }

    if rows.is_empty() {
        bail!("CSV file is empty");
    }

    let header = locate_header_row(&rows, schema);
    let first_data_line = lines
        .get(header + 1)
        .map_or(lines[header] as usize + 1, |&line| line as usize);

    Ok(Table::from_rows(rows, header)
        .with_origin("csv")
        .starting_at_line(first_data_line))
}

// =============================================================================
// WORKBOOK
// =============================================================================

/// Pick the sheet to read.
///
/// Explicit request (normalized comparison) > "anexo"+"detal"+"tecn" >
/// "detal"+"tecn" > first sheet.
pub fn pick_sheet(names: &[String], requested: Option<&str>) -> Result<String> {
    if names.is_empty() {
        bail!("Workbook has no sheets");
    }

    if let Some(requested) = requested {
        let wanted = normalize(requested);
        return names
            .iter()
            .find(|name| normalize(name) == wanted)
            .cloned()
            .with_context(|| format!("Sheet '{}' not found. Available sheets: {:?}", requested, names));
    }

    let normalized: Vec<String> = names.iter().map(|name| normalize(name)).collect();
    let is_detail = |n: &str| n.contains("detal") && n.contains("tecn");

    let preferred = normalized
        .iter()
        .position(|n| is_detail(n) && n.contains("anexo"))
        .or_else(|| normalized.iter().position(|n| is_detail(n)));

    match preferred {
        Some(idx) => Ok(names[idx].clone()),
        None => {
            warn!(
                sheet = %names[0],
                available = ?names,
                "no technical detail sheet found, using first sheet"
            );
            Ok(names[0].clone())
        }
    }
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Int(i) => Cell::from(*i),
        Data::Float(f) => Cell::Number(*f),
        Data::String(s) => Cell::text(s.as_str()),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::text(s.as_str()),
        Data::Error(_) | Data::Empty => Cell::Empty,
    }
}

fn read_workbook(path: &Path, sheet: Option<&str>, schema: &HeaderSchema) -> Result<Table> {
    // calamine auto-detects format: xls, xlsx, xlsb, ods
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook {}", path.display()))?;

    let sheet_names = workbook.sheet_names().to_vec();
    let sheet_name = pick_sheet(&sheet_names, sheet)?;
    info!(sheet = %sheet_name, sheets = sheet_names.len(), "reading sheet");

    let range = workbook
        .worksheet_range(&sheet_name)
        .with_context(|| format!("Failed to read sheet '{}'", sheet_name))?;

    let (row_count, col_count) = range.get_size();
    debug!(rows = row_count, columns = col_count, "sheet size");
    if row_count == 0 {
        bail!("Sheet '{}' is empty", sheet_name);
    }

    let first_row = range.start().map_or(0, |(row, _)| row as usize);
    let rows: Vec<Vec<Cell>> = range
        .rows()
        .map(|row| row.iter().map(cell_from_data).collect())
        .collect();

    let header = locate_header_row(&rows, schema);
    Ok(Table::from_rows(rows, header)
        .with_origin(format!("workbook:sheet='{}'", sheet_name))
        .starting_at_line(first_row + header + 2))
}

// =============================================================================
// JSON
// =============================================================================

fn cell_from_json(value: &Value) -> Cell {
    match value {
        Value::Null => Cell::Empty,
        Value::Bool(b) => Cell::Text(b.to_string()),
        Value::Number(n) => n.as_f64().map_or(Cell::Empty, Cell::Number),
        Value::String(s) => Cell::text(s.as_str()),
        other => Cell::Text(other.to_string()),
    }
}

/// Array of records (or a single record). Columns are the union of keys in
/// first-seen order.
pub fn read_json_str(content: &str) -> Result<Table> {
    let value: Value = serde_json::from_str(content).context("Failed to parse JSON input")?;
    let records = match value {
        Value::Array(items) => items,
        record @ Value::Object(_) => vec![record],
        _ => bail!("JSON input must be an array of objects or a single object"),
    };

    let mut keys: Vec<String> = Vec::new();
    let mut objects = Vec::with_capacity(records.len());
    for (idx, record) in records.into_iter().enumerate() {
        let Value::Object(map) = record else {
            warn!(index = idx, "skipping non-object JSON record");
            continue;
        };
        for key in map.keys() {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        objects.push(map);
    }

    let rows: Vec<Vec<Cell>> = objects
        .iter()
        .map(|map| {
            keys.iter()
                .map(|key| map.get(key).map_or(Cell::Empty, cell_from_json))
                .collect()
        })
        .collect();
    let headers: Vec<Cell> = keys.into_iter().map(Cell::Text).collect();

    Ok(Table::new(headers, rows).with_origin("json").starting_at_line(1))
}

// =============================================================================
// HEADER LOCATION
// =============================================================================

/// Index of the header row: first row (within the search window) holding a
/// supplier header, else the densest row.
pub fn locate_header_row(rows: &[Vec<Cell>], schema: &HeaderSchema) -> usize {
    let window = &rows[..rows.len().min(HEADER_SEARCH_ROWS)];

    let by_supplier = window.iter().position(|row| {
        row.iter()
            .filter_map(Cell::as_text)
            .any(|text| schema.matches(Field::Supplier, &text))
    });
    if let Some(idx) = by_supplier {
        return idx;
    }

    let mut best = (0, 0);
    for (idx, row) in window.iter().enumerate() {
        let filled = row.iter().filter(|cell| !cell.is_blank()).count();
        if filled > best.1 {
            best = (idx, filled);
        }
    }
    debug!(row = best.0, "no supplier header found, using densest row");
    best.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(suffix: &str, bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    // -------------------------------------------------------------------------
    // FORMAT DETECTION
    // -------------------------------------------------------------------------

    #[test]
    fn test_detect_format() {
        assert_eq!(SourceFormat::detect(Path::new("a/b.XLSX")).unwrap(), SourceFormat::Workbook);
        assert_eq!(SourceFormat::detect(Path::new("b.ods")).unwrap(), SourceFormat::Workbook);
        assert_eq!(SourceFormat::detect(Path::new("b.csv")).unwrap(), SourceFormat::Csv);
        assert_eq!(SourceFormat::detect(Path::new("b.json")).unwrap(), SourceFormat::Json);
        assert!(SourceFormat::detect(Path::new("b.pdf")).is_err());
        assert!(SourceFormat::detect(Path::new("noext")).is_err());
    }

    // -------------------------------------------------------------------------
    // CSV
    // -------------------------------------------------------------------------

    #[test]
    fn test_decode_utf8_with_bom() {
        assert_eq!(decode_bytes(b"\xEF\xBB\xBFFornecedor"), "Fornecedor");
    }

    #[test]
    fn test_decode_windows_1252_fallback() {
        assert_eq!(decode_bytes(b"Aloca\xE7\xE3o"), "Alocação");
    }

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter("Fornecedor;Perfil;Total\nHitss;Dev;1.234,50"), b';');
        assert_eq!(sniff_delimiter("Fornecedor,Total\n"), b',');
        assert_eq!(sniff_delimiter("Fornecedor\tTotal\n"), b'\t');
        assert_eq!(sniff_delimiter("Relatório\n\nFornecedor;Total"), b';');
        assert_eq!(sniff_delimiter(""), b',');
    }

    #[test]
    fn test_csv_header_below_banner() {
        let csv = "Relatório de custos - 2024;;\n;;\nFornecedor;Perfil;Total\nHitss;Dev;1.234,50\nNtt;QA;10\n";
        let table = read_csv_bytes(csv.as_bytes(), &HeaderSchema::default()).unwrap();
        assert_eq!(table.headers()[0], Cell::from("Fornecedor"));
        assert_eq!(table.rows().len(), 2);
        assert_eq!(table.rows()[0][2], Cell::from("1.234,50"));
        assert_eq!(table.line_of(0), 4);
        assert_eq!(table.origin(), "csv");
    }

    #[test]
    fn test_csv_ragged_rows() {
        let csv = "Fornecedor,Perfil,Total\nHitss,Dev\nNtt,QA,10,extra\n";
        let table = read_csv_bytes(csv.as_bytes(), &HeaderSchema::default()).unwrap();
        assert_eq!(table.rows()[0].len(), 2);
        assert_eq!(table.rows()[1].len(), 4);
    }

    #[test]
    fn test_read_table_windows_1252_csv() {
        let file = temp_file(".csv", b"Fornecedor;Aloca\xE7\xE3o;Total\nS\xE3o Paulo TI;6;100\n");
        let table = read_table(file.path(), None, &HeaderSchema::default()).unwrap();
        assert_eq!(table.headers()[1], Cell::from("Alocação"));
        assert_eq!(table.rows()[0][0], Cell::from("São Paulo TI"));
    }

    #[test]
    fn test_empty_csv_is_error() {
        assert!(read_csv_bytes(b"", &HeaderSchema::default()).is_err());
    }

    // -------------------------------------------------------------------------
    // WORKBOOK
    // -------------------------------------------------------------------------

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pick_sheet_prefers_annex_detail() {
        let sheets = names(&["Resumo", "Detalhamento Técnico", "Anexo I - Detalhamento Técnico"]);
        assert_eq!(pick_sheet(&sheets, None).unwrap(), "Anexo I - Detalhamento Técnico");
    }

    #[test]
    fn test_pick_sheet_detail_then_first() {
        let sheets = names(&["Resumo", "Detalhes Tecnicos"]);
        assert_eq!(pick_sheet(&sheets, None).unwrap(), "Detalhes Tecnicos");
        let sheets = names(&["Plan1", "Plan2"]);
        assert_eq!(pick_sheet(&sheets, None).unwrap(), "Plan1");
    }

    #[test]
    fn test_pick_sheet_explicit_request() {
        let sheets = names(&["Resumo", "Detalhes Técnicos"]);
        assert_eq!(pick_sheet(&sheets, Some("resumo")).unwrap(), "Resumo");
        assert!(pick_sheet(&sheets, Some("Outra")).is_err());
        assert!(pick_sheet(&[], None).is_err());
    }

    #[test]
    fn test_cell_from_data() {
        assert_eq!(cell_from_data(&Data::Int(7)), Cell::Number(7.0));
        assert_eq!(cell_from_data(&Data::Float(1.5)), Cell::Number(1.5));
        assert_eq!(cell_from_data(&Data::String(" ".into())), Cell::Empty);
        assert_eq!(cell_from_data(&Data::String("Hitss".into())), Cell::from("Hitss"));
        assert_eq!(cell_from_data(&Data::Bool(true)), Cell::from("true"));
        assert_eq!(cell_from_data(&Data::Empty), Cell::Empty);
    }

    #[test]
    fn test_missing_workbook_is_error() {
        let err = read_table(Path::new("/nope/planilha.xlsx"), None, &HeaderSchema::default()).unwrap_err();
        assert!(err.to_string().contains("Failed to open workbook"));
    }

    // -------------------------------------------------------------------------
    // JSON
    // -------------------------------------------------------------------------

    #[test]
    fn test_json_key_union_in_first_seen_order() {
        let json = r#"[
            {"Fornecedor": "Hitss", "Total": "1.234,50"},
            {"Fornecedor": "Ntt", "Perfil": "QA", "Total": 10}
        ]"#;
        let table = read_json_str(json).unwrap();
        assert_eq!(
            table.headers(),
            &[Cell::from("Fornecedor"), Cell::from("Total"), Cell::from("Perfil")]
        );
        assert_eq!(table.rows()[0][2], Cell::Empty);
        assert_eq!(table.rows()[1][1], Cell::Number(10.0));
    }

    #[test]
    fn test_json_single_object_and_errors() {
        let table = read_json_str(r#"{"Fornecedor": "Hitss", "Total": null}"#).unwrap();
        assert_eq!(table.rows().len(), 1);
        assert_eq!(table.rows()[0][1], Cell::Empty);
        assert!(read_json_str("42").is_err());
        assert!(read_json_str("{").is_err());
    }

    #[test]
    fn test_read_table_json_file() {
        let file = temp_file(".json", br#"[{"Fornecedor": "Hitss", "Total": 1}]"#);
        let table = read_table(file.path(), None, &HeaderSchema::default()).unwrap();
        assert_eq!(table.origin(), "json");
        assert_eq!(table.rows().len(), 1);
    }

    // -------------------------------------------------------------------------
    // HEADER LOCATION
    // -------------------------------------------------------------------------

    #[test]
    fn test_locate_header_by_supplier_column() {
        let rows = vec![
            vec![Cell::from("Relatório"), Cell::from("Março"), Cell::from("2024")],
            vec![Cell::from("Nome do Fornecedor"), Cell::from("Total")],
        ];
        assert_eq!(locate_header_row(&rows, &HeaderSchema::default()), 1);
    }

    #[test]
    fn test_locate_header_falls_back_to_densest_row() {
        let rows = vec![
            vec![Cell::from("Título")],
            vec![Cell::from("a"), Cell::from("b"), Cell::from("c")],
            vec![Cell::from("x"), Cell::from("y")],
        ];
        assert_eq!(locate_header_row(&rows, &HeaderSchema::default()), 1);
        assert_eq!(locate_header_row(&[], &HeaderSchema::default()), 0);
    }
}
