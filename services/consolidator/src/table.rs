//! In-memory table handed to the engine by a source reader.

use std::fmt;

/// One cell as read from a spreadsheet, CSV field or JSON value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    /// Build a text cell, mapping blank strings to `Empty`.
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim().is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value)
        }
    }

    /// True for `Empty`, whitespace-only text and NaN.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Number(n) => n.is_nan(),
            Cell::Text(s) => s.trim().is_empty(),
        }
    }

    /// Trimmed textual form of the cell, `None` when blank.
    ///
    /// Whole numbers render without a fractional part so that a numeric
    /// profile code such as `3.0` reads back as `"3"`.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Number(n) if n.is_nan() => None,
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", *n as i64)),
            Cell::Number(n) => Some(n.to_string()),
            Cell::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::text(value)
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::text(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Number(value as f64)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Empty)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => f.write_str(&text),
            None => Ok(()),
        }
    }
}

/// Header row plus data rows, positionally aligned.
///
/// Data rows may be ragged; positions past the end of a row read as `Empty`.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    origin: String,
    first_data_line: usize,
    headers: Vec<Cell>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(headers: Vec<Cell>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            origin: "table".to_string(),
            first_data_line: 2,
            headers,
            rows,
        }
    }

    /// Split raw rows at `header_row`; rows above the header are discarded.
    pub fn from_rows(mut rows: Vec<Vec<Cell>>, header_row: usize) -> Self {
        if header_row >= rows.len() {
            return Self::new(Vec::new(), Vec::new()).starting_at_line(header_row + 2);
        }
        let data = rows.split_off(header_row + 1);
        let headers = rows.pop().unwrap_or_default();
        Self::new(headers, data).starting_at_line(header_row + 2)
    }

    /// Label used in log lines, e.g. `csv` or `xlsx:sheet='Plan1'`.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// 1-based source line of the first data row.
    pub fn starting_at_line(mut self, line: usize) -> Self {
        self.first_data_line = line;
        self
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn headers(&self) -> &[Cell] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Source line number of the data row at `index`.
    pub fn line_of(&self, index: usize) -> usize {
        self.first_data_line + index
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Cell at `index`, `Empty` for ragged rows.
pub fn cell_at(row: &[Cell], index: usize) -> &Cell {
    static EMPTY: Cell = Cell::Empty;
    row.get(index).unwrap_or(&EMPTY)
}
