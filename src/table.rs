use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::constants::{DATE_OUTPUT_FORMAT, MISSING_TOKENS};
use crate::error::{CleanseError, Result};

/// A single value of a record table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Cell {
    /// Missing-value marker, distinct from empty text and zero
    Null,
    Number(f64),
    Text(String),
    Date(NaiveDate),
}

/// Hashable identity of a cell, used for full-row duplicate detection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CellKey {
    Null,
    Number(u64),
    Text(String),
    Date(NaiveDate),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Textual rendering of a present value; `None` for the missing marker
    pub fn to_text(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn key(&self) -> CellKey {
        match self {
            Cell::Null => CellKey::Null,
            // -0.0 and 0.0 compare equal, so they must share a key
            Cell::Number(n) if *n == 0.0 => CellKey::Number(0f64.to_bits()),
            Cell::Number(n) => CellKey::Number(n.to_bits()),
            Cell::Text(s) => CellKey::Text(s.clone()),
            Cell::Date(d) => CellKey::Date(*d),
        }
    }

    fn parse_field(raw: &str) -> Option<String> {
        if MISSING_TOKENS.contains(&raw) {
            None
        } else {
            Some(raw.to_string())
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Text(s) => f.write_str(s),
            Cell::Date(d) => write!(f, "{}", d.format(DATE_OUTPUT_FORMAT)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnKind {
    /// Every cell is missing
    Empty,
    Numeric,
    Text,
    Date,
    Mixed,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnKind::Empty => "empty",
            ColumnKind::Numeric => "numeric",
            ColumnKind::Text => "text",
            ColumnKind::Date => "date",
            ColumnKind::Mixed => "mixed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub cells: Vec<Cell>,
}

impl Column {
    pub fn new(name: impl Into<String>, cells: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            cells,
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn kind(&self) -> ColumnKind {
        let mut kind = ColumnKind::Empty;
        for cell in &self.cells {
            let cell_kind = match cell {
                Cell::Null => continue,
                Cell::Number(_) => ColumnKind::Numeric,
                Cell::Text(_) => ColumnKind::Text,
                Cell::Date(_) => ColumnKind::Date,
            };
            if kind == ColumnKind::Empty {
                kind = cell_kind;
            } else if kind != cell_kind {
                return ColumnKind::Mixed;
            }
        }
        kind
    }

    /// Text columns, and numeric columns holding only whole numbers, render to
    /// text without loss. A column with no values at all is not string-like.
    pub fn is_string_like(&self) -> bool {
        match self.kind() {
            ColumnKind::Text => true,
            ColumnKind::Numeric => self
                .cells
                .iter()
                .filter_map(Cell::as_number)
                .all(|n| n.fract() == 0.0),
            _ => false,
        }
    }

    pub fn null_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_null()).count()
    }

    /// Missing fraction; 0 for a column without rows
    pub fn null_fraction(&self) -> f64 {
        if self.cells.is_empty() {
            0.0
        } else {
            self.null_count() as f64 / self.cells.len() as f64
        }
    }
}

/// Ordered, named columns over an ordered set of rows. Column names are unique.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordTable {
    columns: Vec<Column>,
    row_count: usize,
}

impl RecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let row_count = columns.first().map(Column::len).unwrap_or(0);
        let mut table = Self {
            columns: Vec::with_capacity(columns.len()),
            row_count,
        };
        for column in columns {
            table.add_column(column)?;
        }
        Ok(table)
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Load delimited text. A column is numeric when every present field parses
    /// as a finite number; otherwise all of its present fields stay text.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);

        let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
        let mut raw_columns: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];

        for record in csv_reader.records() {
            let record = record?;
            for (idx, field) in record.iter().enumerate() {
                raw_columns[idx].push(Cell::parse_field(field));
            }
        }

        let columns = headers
            .into_iter()
            .zip(raw_columns)
            .map(|(name, raw)| Column::new(name, infer_cells(raw)))
            .collect();

        Self::from_columns(columns)
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        self.to_writer(file)
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(self.columns.iter().map(|c| c.name.as_str()))?;
        for row in 0..self.row_count {
            csv_writer.write_record(self.columns.iter().map(|c| c.cells[row].to_string()))?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Lookup that fails loudly with a schema error naming the stage
    pub fn require_column(&self, stage: &'static str, name: &str) -> Result<&Column> {
        self.column(name).ok_or_else(|| CleanseError::schema(stage, name))
    }

    pub fn require_column_mut(&mut self, stage: &'static str, name: &str) -> Result<&mut Column> {
        self.column_mut(name).ok_or_else(|| CleanseError::schema(stage, name))
    }

    pub fn add_column(&mut self, column: Column) -> Result<()> {
        if self.has_column(&column.name) {
            return Err(CleanseError::DuplicateColumn(column.name));
        }
        if self.columns.is_empty() && self.row_count == 0 {
            self.row_count = column.len();
        } else if column.len() != self.row_count {
            return Err(CleanseError::Shape(format!(
                "column '{}' has {} rows, table has {}",
                column.name,
                column.len(),
                self.row_count
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn drop_column(&mut self, name: &str) -> Option<Column> {
        let idx = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(idx))
    }

    /// Keep rows whose mask entry is true. The mask must cover every row.
    pub fn retain_rows(&mut self, keep: &[bool]) -> usize {
        debug_assert_eq!(keep.len(), self.row_count);
        for column in &mut self.columns {
            let mut mask = keep.iter();
            column.cells.retain(|_| *mask.next().unwrap_or(&true));
        }
        let before = self.row_count;
        self.row_count = keep.iter().filter(|k| **k).count();
        before - self.row_count
    }

    pub fn row_null_count(&self, row: usize) -> usize {
        self.columns.iter().filter(|c| c.cells[row].is_null()).count()
    }

    /// Missing fraction of one row across all columns; 0 for a table without columns
    pub fn row_null_fraction(&self, row: usize) -> f64 {
        if self.columns.is_empty() {
            0.0
        } else {
            self.row_null_count(row) as f64 / self.columns.len() as f64
        }
    }

    pub fn row_key(&self, row: usize) -> Vec<CellKey> {
        self.columns.iter().map(|c| c.cells[row].key()).collect()
    }

    pub fn total_nulls(&self) -> usize {
        self.columns.iter().map(Column::null_count).sum()
    }
}

fn infer_cells(raw: Vec<Option<String>>) -> Vec<Cell> {
    let numeric = raw
        .iter()
        .flatten()
        .all(|s| s.trim().parse::<f64>().map(f64::is_finite).unwrap_or(false));

    raw.into_iter()
        .map(|field| match field {
            None => Cell::Null,
            Some(s) if numeric => s.trim().parse::<f64>().map(Cell::Number).unwrap_or(Cell::Null),
            Some(s) => Cell::Text(s),
        })
        .collect()
}
