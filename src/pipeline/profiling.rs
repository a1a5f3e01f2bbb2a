use askama::Template;
use chrono::Utc;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::table::{Cell, Column, ColumnKind, RecordTable};

/// Descriptive statistics for one column
#[derive(Debug, Clone)]
pub struct ColumnProfile {
    pub name: String,
    pub kind: ColumnKind,
    pub null_count: usize,
    pub null_fraction: f64,
    pub distinct: usize,
    pub min: Option<String>,
    pub max: Option<String>,
    pub mean: Option<f64>,
    pub top_value: Option<(String, usize)>,
}

impl ColumnProfile {
    pub fn of(column: &Column) -> Self {
        let kind = column.kind();
        let mut counts: HashMap<String, usize> = HashMap::new();
        for text in column.cells.iter().filter_map(Cell::to_text) {
            *counts.entry(text).or_insert(0) += 1;
        }

        let (min, max, mean) = match kind {
            ColumnKind::Numeric => {
                let values: Vec<f64> = column.cells.iter().filter_map(Cell::as_number).collect();
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                (Some(min.to_string()), Some(max.to_string()), Some(mean))
            }
            ColumnKind::Date => {
                let dates = column.cells.iter().filter_map(|c| match c {
                    Cell::Date(d) => Some(*d),
                    _ => None,
                });
                let min = dates.clone().min().map(|d| Cell::Date(d).to_string());
                let max = dates.max().map(|d| Cell::Date(d).to_string());
                (min, max, None)
            }
            _ => (None, None, None),
        };

        // Ties resolve to the lexically smallest value so reports are stable
        let top_value = counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(value, count)| (value.clone(), *count));

        Self {
            name: column.name.clone(),
            kind,
            null_count: column.null_count(),
            null_fraction: column.null_fraction(),
            distinct: counts.len(),
            min,
            max,
            mean,
            top_value,
        }
    }

    pub fn null_percent(&self) -> String {
        format!("{:.1}%", self.null_fraction * 100.0)
    }

    pub fn mean_display(&self) -> String {
        self.mean.map(|m| format!("{:.4}", m)).unwrap_or_else(|| "-".to_string())
    }

    pub fn min_display(&self) -> String {
        self.min.clone().unwrap_or_else(|| "-".to_string())
    }

    pub fn max_display(&self) -> String {
        self.max.clone().unwrap_or_else(|| "-".to_string())
    }

    pub fn top_display(&self) -> String {
        match &self.top_value {
            Some((value, count)) => format!("{} ({})", value, count),
            None => "-".to_string(),
        }
    }
}

/// Profile of a cleaned table, rendered to HTML
#[derive(Debug, Clone, Template)]
#[template(path = "profile.html")]
pub struct TableProfile {
    pub title: String,
    pub generated_at: String,
    pub row_count: usize,
    pub column_count: usize,
    pub missing_cells: usize,
    pub columns: Vec<ColumnProfile>,
}

impl TableProfile {
    pub fn of(title: impl Into<String>, table: &RecordTable) -> Self {
        Self {
            title: title.into(),
            generated_at: Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            row_count: table.row_count(),
            column_count: table.column_count(),
            missing_cells: table.total_nulls(),
            columns: table.columns().iter().map(ColumnProfile::of).collect(),
        }
    }

    pub fn write_html(&self, path: &Path) -> Result<()> {
        let html = self.render()?;
        fs::write(path, html)?;
        Ok(())
    }
}
