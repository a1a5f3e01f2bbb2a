use tracing::{debug, info};

use super::CleaningStage;
use crate::constants::IMPUTE_ZERO_COLUMNS;
use crate::error::{CleanseError, Result};
use crate::pipeline::audit::StageReport;
use crate::table::{Cell, ColumnKind, RecordTable};

pub const STAGE: &str = "completeness";

/// Drops sparse columns and rows, then zero-fills a fixed list of numeric fields.
#[derive(Debug, Clone)]
pub struct CompletenessFilter {
    threshold: f64,
    impute_zero: Vec<String>,
}

impl CompletenessFilter {
    /// `threshold` is the tolerated missing fraction; values outside [0, 1] are rejected.
    pub fn new(threshold: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(CleanseError::Config(format!(
                "missingness threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        Ok(Self {
            threshold,
            impute_zero: IMPUTE_ZERO_COLUMNS.iter().map(|c| c.to_string()).collect(),
        })
    }

    pub fn with_impute_columns(mut self, columns: Vec<String>) -> Self {
        self.impute_zero = columns;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Columns whose missing fraction strictly exceeds the threshold
    pub fn sparse_columns(&self, table: &RecordTable) -> Vec<String> {
        table
            .columns()
            .iter()
            .filter(|c| c.null_fraction() > self.threshold)
            .map(|c| c.name.clone())
            .collect()
    }

    fn drop_sparse_rows(&self, table: &mut RecordTable) -> usize {
        let keep: Vec<bool> = (0..table.row_count())
            .map(|row| table.row_null_fraction(row) <= self.threshold)
            .collect();
        table.retain_rows(&keep)
    }

    fn impute(&self, table: &mut RecordTable, report: &mut StageReport) {
        for name in &self.impute_zero {
            let Some(column) = table.column_mut(name) else {
                debug!("Imputation target '{}' not present, skipping", name);
                continue;
            };
            let fill = match column.kind() {
                ColumnKind::Text => Cell::Text("0".to_string()),
                _ => Cell::Number(0.0),
            };
            let mut filled = 0;
            for cell in column.cells.iter_mut().filter(|c| c.is_null()) {
                *cell = fill.clone();
                filled += 1;
            }
            if filled > 0 {
                info!("Imputed {} missing values in '{}' with 0", filled, name);
            }
            report.add_count("imputed_cells", filled);
        }
    }
}

impl CleaningStage for CompletenessFilter {
    fn stage_name(&self) -> &'static str {
        STAGE
    }

    fn apply(&self, mut table: RecordTable) -> Result<(RecordTable, StageReport)> {
        let mut report = StageReport::start(STAGE, &table);
        let percent = (self.threshold * 100.0) as u32;

        // Dropping a row can push a surviving column over the threshold (and the
        // reverse), so repeat until a pass removes nothing. The result is stable
        // under re-application.
        let mut passes = 0;
        loop {
            passes += 1;
            let sparse = self.sparse_columns(&table);
            for name in &sparse {
                table.drop_column(name);
            }
            if !sparse.is_empty() {
                info!(
                    "Pass {}: removed {} columns with > {}% missing observations: {:?}",
                    passes,
                    sparse.len(),
                    percent,
                    sparse
                );
                report.note(format!("pass {}: removed columns {:?}", passes, sparse));
            }

            let rows_removed = self.drop_sparse_rows(&mut table);
            if rows_removed > 0 {
                info!(
                    "Pass {}: removed {} rows with > {}% missing observations",
                    passes, rows_removed, percent
                );
                report.note(format!("pass {}: removed {} rows", passes, rows_removed));
            }

            let changed = !sparse.is_empty() || rows_removed > 0;
            report.columns_removed.extend(sparse);
            report.add_count("rows_removed", rows_removed);
            if !changed {
                break;
            }
        }
        report.add_count("passes", passes);

        self.impute(&mut table, &mut report);

        let report = report.finish(&table);
        Ok((table, report))
    }
}
