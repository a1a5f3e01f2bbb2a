use chrono::NaiveDate;
use tracing::{debug, info, warn};

use super::CleaningStage;
use crate::constants::{DATE_COLUMN_PAIRS, MONTH_TOKEN_CORRECTIONS, YEAR_MONTH_FORMAT};
use crate::error::Result;
use crate::pipeline::audit::StageReport;
use crate::table::{Cell, Column, ColumnKind, RecordTable};

pub const STAGE: &str = "accuracy";

/// A (year, month) column pair merged into one date column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatePair {
    pub year_column: String,
    pub month_column: String,
    pub date_column: String,
}

impl DatePair {
    pub fn new(year: &str, month: &str, date: &str) -> Self {
        Self {
            year_column: year.to_string(),
            month_column: month.to_string(),
            date_column: date.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum MergeOutcome {
    Merged { rows_dropped: usize, unparsed: usize },
    Skipped(String),
}

/// Corrects malformed month tokens, then merges each date pair.
#[derive(Debug, Clone)]
pub struct AccuracyNormalizer {
    corrections: Vec<(String, String)>,
    pairs: Vec<DatePair>,
}

impl Default for AccuracyNormalizer {
    fn default() -> Self {
        Self {
            corrections: MONTH_TOKEN_CORRECTIONS
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
            pairs: DATE_COLUMN_PAIRS
                .iter()
                .map(|(y, m, d)| DatePair::new(y, m, d))
                .collect(),
        }
    }
}

impl AccuracyNormalizer {
    pub fn new(corrections: Vec<(String, String)>, pairs: Vec<DatePair>) -> Self {
        Self { corrections, pairs }
    }

    /// Literal whole-token substitution over every month column present
    fn correct_month_tokens(&self, table: &mut RecordTable, report: &mut StageReport) {
        for pair in &self.pairs {
            let Some(column) = table.column_mut(&pair.month_column) else {
                continue;
            };
            for cell in column.cells.iter_mut() {
                let Cell::Text(value) = cell else { continue };
                if let Some((from, to)) = self.corrections.iter().find(|(from, _)| from.as_str() == value.as_str()) {
                    debug!("Corrected month token '{}' -> '{}' in {}", from, to, pair.month_column);
                    *value = to.clone();
                    report.add_count("tokens_corrected", 1);
                }
            }
        }
    }

    fn merge_pair(&self, table: &mut RecordTable, pair: &DatePair) -> MergeOutcome {
        let (Some(year), Some(month)) = (table.column(&pair.year_column), table.column(&pair.month_column)) else {
            return MergeOutcome::Skipped("source column missing".to_string());
        };
        // Years may load as whole numbers; month names are always text
        if !year.is_string_like() || month.kind() != ColumnKind::Text {
            return MergeOutcome::Skipped("source columns are not string-like".to_string());
        }
        if table.has_column(&pair.date_column) {
            return MergeOutcome::Skipped(format!("target column '{}' already exists", pair.date_column));
        }

        // Rows with a missing component are dropped before the merge
        let keep: Vec<bool> = year
            .cells
            .iter()
            .zip(&month.cells)
            .map(|(y, m)| !y.is_null() && !m.is_null())
            .collect();
        let rows_dropped = table.retain_rows(&keep);

        let (Some(year), Some(month)) = (table.drop_column(&pair.year_column), table.drop_column(&pair.month_column)) else {
            return MergeOutcome::Skipped("source column missing".to_string());
        };

        let mut unparsed = 0;
        let dates: Vec<Cell> = year
            .cells
            .iter()
            .zip(&month.cells)
            .map(|(y, m)| match parse_year_month(y, m) {
                Some(date) => Cell::Date(date),
                None => {
                    unparsed += 1;
                    Cell::Null
                }
            })
            .collect();

        // The target name was checked above and the sources were just removed
        if let Err(e) = table.add_column(Column::new(pair.date_column.clone(), dates)) {
            return MergeOutcome::Skipped(e.to_string());
        }

        MergeOutcome::Merged { rows_dropped, unparsed }
    }
}

/// First day of the month named by a year cell and an abbreviated month cell
pub fn parse_year_month(year: &Cell, month: &Cell) -> Option<NaiveDate> {
    let year = year.to_text()?;
    let month = month.to_text()?;
    let composed = format!("{}-{}-01", year.trim(), month.trim());
    NaiveDate::parse_from_str(&composed, &format!("{}-%d", YEAR_MONTH_FORMAT)).ok()
}

impl CleaningStage for AccuracyNormalizer {
    fn stage_name(&self) -> &'static str {
        STAGE
    }

    fn apply(&self, mut table: RecordTable) -> Result<(RecordTable, StageReport)> {
        let mut report = StageReport::start(STAGE, &table);

        self.correct_month_tokens(&mut table, &mut report);

        for pair in &self.pairs {
            match self.merge_pair(&mut table, pair) {
                MergeOutcome::Merged { rows_dropped, unparsed } => {
                    info!(
                        "Merged {} and {} into {} ({} rows with missing components dropped, {} unparseable)",
                        pair.year_column, pair.month_column, pair.date_column, rows_dropped, unparsed
                    );
                    report.columns_removed.push(pair.year_column.clone());
                    report.columns_removed.push(pair.month_column.clone());
                    report.add_count("dates_merged", 1);
                    report.add_count("rows_missing_date_parts", rows_dropped);
                    report.add_count("dates_unparsed", unparsed);
                }
                MergeOutcome::Skipped(reason) => {
                    warn!("Skipped merging into {}: {}", pair.date_column, reason);
                    report.note(format!("{}: skipped ({})", pair.date_column, reason));
                }
            }
        }

        let report = report.finish(&table);
        Ok((table, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn issue_only() -> AccuracyNormalizer {
        AccuracyNormalizer::new(
            vec![("Octxyz".to_string(), "Oct".to_string())],
            vec![DatePair::new("issue_year", "issue_month", "issue_date")],
        )
    }

    fn date(y: i32, m: u32) -> Cell {
        Cell::Date(NaiveDate::from_ymd_opt(y, m, 1).unwrap())
    }

    #[test]
    fn merges_year_and_month_to_first_of_month() {
        assert_eq!(
            parse_year_month(&Cell::Number(2014.0), &text("Oct")),
            NaiveDate::from_ymd_opt(2014, 10, 1)
        );
        assert_eq!(parse_year_month(&text("2014"), &text("Foo")), None);
    }

    #[test]
    fn corrected_token_matches_canonical_month() {
        let table = RecordTable::from_columns(vec![
            Column::new("issue_year", vec![Cell::Number(2014.0), Cell::Number(2014.0)]),
            Column::new("issue_month", vec![text("Octxyz"), text("Oct")]),
        ])
        .unwrap();

        let (out, report) = issue_only().apply(table).unwrap();

        assert_eq!(out.column_names(), vec!["issue_date"]);
        assert_eq!(out.column("issue_date").unwrap().cells, vec![date(2014, 10), date(2014, 10)]);
        assert_eq!(report.count("tokens_corrected"), 1);
    }

    #[test]
    fn rows_missing_a_component_are_dropped_before_merge() {
        let table = RecordTable::from_columns(vec![
            Column::new("id", vec![Cell::Number(1.0), Cell::Number(2.0), Cell::Number(3.0)]),
            Column::new("issue_year", vec![text("2015"), Cell::Null, text("2016")]),
            Column::new("issue_month", vec![text("Jan"), text("Feb"), Cell::Null]),
        ])
        .unwrap();

        let (out, report) = issue_only().apply(table).unwrap();

        assert_eq!(out.row_count(), 1);
        assert_eq!(out.column("issue_date").unwrap().cells, vec![date(2015, 1)]);
        assert_eq!(report.count("rows_missing_date_parts"), 2);
    }

    #[test]
    fn non_string_like_pair_is_skipped() {
        let table = RecordTable::from_columns(vec![
            Column::new("issue_year", vec![Cell::Number(2014.5)]),
            Column::new("issue_month", vec![text("Oct")]),
        ])
        .unwrap();

        let (out, report) = issue_only().apply(table.clone()).unwrap();

        assert_eq!(out, table);
        assert_eq!(report.count("dates_merged"), 0);
        assert_eq!(report.notes.len(), 1);
    }

    #[test]
    fn numeric_month_pair_is_left_untouched() {
        let table = RecordTable::from_reader("id,issue_year,issue_month\n1,2014,10\n2,2015,3\n".as_bytes()).unwrap();

        let (out, report) = issue_only().apply(table.clone()).unwrap();

        assert_eq!(out, table);
        assert!(!out.has_column("issue_date"));
        assert_eq!(report.count("dates_merged"), 0);
        assert_eq!(report.notes.len(), 1);
    }

    #[test]
    fn all_missing_pair_keeps_every_row() {
        let table = RecordTable::from_columns(vec![
            Column::new("id", vec![Cell::Number(1.0), Cell::Number(2.0)]),
            Column::new("next_pymnt_year", vec![Cell::Null, Cell::Null]),
            Column::new("next_pymnt_month", vec![Cell::Null, Cell::Null]),
        ])
        .unwrap();

        let (out, report) = AccuracyNormalizer::default().apply(table.clone()).unwrap();

        assert_eq!(out, table);
        assert_eq!(report.rows_removed(), 0);
        assert_eq!(report.count("rows_missing_date_parts"), 0);
    }

    #[test]
    fn one_skipped_pair_does_not_stop_the_others() {
        let table = RecordTable::from_columns(vec![
            Column::new("issue_year", vec![text("2014")]),
            Column::new("issue_month", vec![text("Oct")]),
            Column::new("last_pymnt_year", vec![text("2016")]),
            Column::new("last_pymnt_month", vec![text("Mar")]),
        ])
        .unwrap();

        let (out, report) = AccuracyNormalizer::default().apply(table).unwrap();

        assert_eq!(out.column_names(), vec!["issue_date", "last_pymnt_date"]);
        assert_eq!(out.column("last_pymnt_date").unwrap().cells, vec![date(2016, 3)]);
        assert_eq!(report.count("dates_merged"), 2);
        // earliest_cr_line, next_pymnt and last_credit_pull are absent
        assert_eq!(report.notes.len(), 3);
    }

    #[test]
    fn unparseable_month_becomes_missing() {
        let table = RecordTable::from_columns(vec![
            Column::new("issue_year", vec![text("2014")]),
            Column::new("issue_month", vec![text("Smarch")]),
        ])
        .unwrap();

        let (out, report) = issue_only().apply(table).unwrap();
        assert_eq!(out.column("issue_date").unwrap().cells, vec![Cell::Null]);
        assert_eq!(report.count("dates_unparsed"), 1);
    }
}
