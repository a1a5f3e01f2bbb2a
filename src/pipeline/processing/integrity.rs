use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use super::CleaningStage;
use crate::config::DuplicateRuleConfig;
use crate::constants::{
    GRADE_COLUMN, GRADE_LETTERS, INTEREST_RATE_COLUMN, RAW_INDEX_COLUMN, SUB_GRADE_COLUMN,
};
use crate::error::Result;
use crate::pipeline::audit::StageReport;
use crate::table::{Cell, CellKey, RecordTable};

pub const STAGE: &str = "integrity";

/// One grade letter followed by exactly one digit
static SUB_GRADE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("^[{}][0-9]$", GRADE_LETTERS)).expect("sub-grade pattern is a valid regex")
});

/// Boolean condition evaluated once per row
pub trait RowCondition: Send + Sync {
    fn evaluate(&self, table: &RecordTable) -> Result<Vec<bool>>;

    fn describe(&self) -> String;
}

/// True where a numeric column is strictly greater than `limit`. Missing values never match.
#[derive(Debug, Clone)]
pub struct ColumnExceeds {
    pub column: String,
    pub limit: f64,
}

impl RowCondition for ColumnExceeds {
    fn evaluate(&self, table: &RecordTable) -> Result<Vec<bool>> {
        let column = table.require_column(STAGE, &self.column)?;
        Ok(column
            .cells
            .iter()
            .map(|c| c.as_number().map(|v| v > self.limit).unwrap_or(false))
            .collect())
    }

    fn describe(&self) -> String {
        format!("{} > {}", self.column, self.limit)
    }
}

/// Removes duplicates and logically inconsistent values.
pub struct IntegrityFilter {
    group_column: String,
    condition: Box<dyn RowCondition>,
    excluded_ids: HashSet<String>,
    grade_column: String,
    sub_grade_column: String,
    rate_column: String,
}

impl IntegrityFilter {
    pub fn new(group_column: impl Into<String>, condition: Box<dyn RowCondition>) -> Self {
        Self {
            group_column: group_column.into(),
            condition,
            excluded_ids: HashSet::new(),
            grade_column: GRADE_COLUMN.to_string(),
            sub_grade_column: SUB_GRADE_COLUMN.to_string(),
            rate_column: INTEREST_RATE_COLUMN.to_string(),
        }
    }

    pub fn from_rule(rule: &DuplicateRuleConfig) -> Self {
        Self::new(
            rule.group_column.clone(),
            Box::new(ColumnExceeds {
                column: rule.condition_column.clone(),
                limit: rule.greater_than,
            }),
        )
    }

    pub fn with_excluded_ids(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.excluded_ids = ids.into_iter().collect();
        self
    }

    fn drop_index_column(&self, table: &mut RecordTable, report: &mut StageReport) {
        if table.drop_column(RAW_INDEX_COLUMN).is_some() {
            debug!("Dropped raw index column '{}'", RAW_INDEX_COLUMN);
            report.columns_removed.push(RAW_INDEX_COLUMN.to_string());
        }
    }

    fn drop_excluded(&self, table: &mut RecordTable, report: &mut StageReport) -> Result<()> {
        if self.excluded_ids.is_empty() {
            return Ok(());
        }
        let keep: Vec<bool> = table
            .require_column(STAGE, &self.group_column)?
            .cells
            .iter()
            .map(|c| c.to_text().map_or(true, |id| !self.excluded_ids.contains(&id)))
            .collect();
        let removed = table.retain_rows(&keep);
        info!("Removed {} rows with force-excluded {} values", removed, self.group_column);
        report.add_count("excluded_rows", removed);
        Ok(())
    }

    fn drop_exact_duplicates(&self, table: &mut RecordTable, report: &mut StageReport) {
        let mut seen: HashSet<Vec<CellKey>> = HashSet::with_capacity(table.row_count());
        let keep: Vec<bool> = (0..table.row_count())
            .map(|row| seen.insert(table.row_key(row)))
            .collect();
        let removed = table.retain_rows(&keep);
        info!("Removed {} rows with duplicates", removed);
        report.add_count("exact_duplicates", removed);
    }

    /// Drops rows that share the grouping value with another row and satisfy the
    /// condition. Unique or missing grouping values are never touched.
    fn drop_conditional_duplicates(&self, table: &mut RecordTable, report: &mut StageReport) -> Result<()> {
        let condition = self.condition.evaluate(table)?;
        let group = table.require_column(STAGE, &self.group_column)?;

        let mut occurrences: HashMap<CellKey, usize> = HashMap::new();
        for cell in group.cells.iter().filter(|c| !c.is_null()) {
            *occurrences.entry(cell.key()).or_insert(0) += 1;
        }

        let keep: Vec<bool> = group
            .cells
            .iter()
            .zip(&condition)
            .map(|(cell, matches)| {
                let duplicated = !cell.is_null() && occurrences.get(&cell.key()).copied().unwrap_or(0) > 1;
                !(duplicated && *matches)
            })
            .collect();

        let removed = table.retain_rows(&keep);
        info!(
            "Removed {} rows which had the same {} as another entry and {}",
            removed,
            self.group_column,
            self.condition.describe()
        );
        report.add_count("conditional_duplicates", removed);
        Ok(())
    }

    /// Nulls sub-grades that do not start with a letter of their grade or do not
    /// look like `B3`.
    fn null_inconsistent_sub_grades(&self, table: &mut RecordTable, report: &mut StageReport) -> Result<()> {
        let grades: Vec<Option<String>> = table
            .require_column(STAGE, &self.grade_column)?
            .cells
            .iter()
            .map(Cell::to_text)
            .collect();
        let sub_grades = table.require_column_mut(STAGE, &self.sub_grade_column)?;

        let mut nulled = 0;
        for (cell, grade) in sub_grades.cells.iter_mut().zip(&grades) {
            if cell.is_null() {
                continue;
            }
            if !is_valid_sub_grade(cell, grade.as_deref()) {
                debug!("Nulled inconsistent sub-grade {:?} (grade {:?})", cell, grade);
                *cell = Cell::Null;
                nulled += 1;
            }
        }
        info!("Removed {} sub-grade entries that are inconsistent with grade or malformed", nulled);
        report.add_count("sub_grade_nulled", nulled);
        Ok(())
    }

    fn null_non_positive_rates(&self, table: &mut RecordTable, report: &mut StageReport) -> Result<()> {
        let rates = table.require_column_mut(STAGE, &self.rate_column)?;
        let mut nulled = 0;
        for cell in rates.cells.iter_mut() {
            if matches!(cell, Cell::Number(v) if *v <= 0.0) {
                *cell = Cell::Null;
                nulled += 1;
            }
        }
        info!("Replaced {} non-positive {} values with missing", nulled, self.rate_column);
        report.add_count("rate_nulled", nulled);
        Ok(())
    }
}

pub fn is_valid_sub_grade(sub_grade: &Cell, grade: Option<&str>) -> bool {
    let (Some(sub), Some(grade)) = (sub_grade.as_text(), grade) else {
        return false;
    };
    let Some(first) = sub.chars().next() else {
        return false;
    };
    grade.contains(first) && SUB_GRADE_PATTERN.is_match(sub)
}

impl CleaningStage for IntegrityFilter {
    fn stage_name(&self) -> &'static str {
        STAGE
    }

    fn apply(&self, mut table: RecordTable) -> Result<(RecordTable, StageReport)> {
        let mut report = StageReport::start(STAGE, &table);

        self.drop_index_column(&mut table, &mut report);
        self.drop_excluded(&mut table, &mut report)?;
        self.drop_exact_duplicates(&mut table, &mut report);
        self.drop_conditional_duplicates(&mut table, &mut report)?;
        self.null_inconsistent_sub_grades(&mut table, &mut report)?;
        self.null_non_positive_rates(&mut table, &mut report)?;

        let report = report.finish(&table);
        Ok((table, report))
    }
}
