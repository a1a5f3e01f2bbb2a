use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::table::RecordTable;

/// What one stage did to one table
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: &'static str,
    pub rows_before: usize,
    pub rows_after: usize,
    pub columns_before: usize,
    pub columns_after: usize,
    pub columns_removed: Vec<String>,
    /// Named counters, e.g. `exact_duplicates` or `sub_grade_nulled`
    pub counts: BTreeMap<String, usize>,
    pub notes: Vec<String>,
}

impl StageReport {
    pub fn start(stage: &'static str, table: &RecordTable) -> Self {
        Self {
            stage,
            rows_before: table.row_count(),
            rows_after: table.row_count(),
            columns_before: table.column_count(),
            columns_after: table.column_count(),
            columns_removed: Vec::new(),
            counts: BTreeMap::new(),
            notes: Vec::new(),
        }
    }

    pub fn add_count(&mut self, name: &str, n: usize) {
        *self.counts.entry(name.to_string()).or_insert(0) += n;
    }

    pub fn count(&self, name: &str) -> usize {
        self.counts.get(name).copied().unwrap_or(0)
    }

    pub fn note(&mut self, message: impl Into<String>) {
        self.notes.push(message.into());
    }

    pub fn finish(mut self, table: &RecordTable) -> Self {
        self.rows_after = table.row_count();
        self.columns_after = table.column_count();
        self
    }

    pub fn rows_removed(&self) -> usize {
        self.rows_before.saturating_sub(self.rows_after)
    }

    /// Sum of the `*_nulled` counters
    pub fn cells_nulled(&self) -> usize {
        self.counts
            .iter()
            .filter(|(name, _)| name.ends_with("_nulled"))
            .map(|(_, n)| n)
            .sum()
    }
}

/// A stage report stamped with the run and file it belongs to
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub run_id: Uuid,
    pub file: String,
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub report: StageReport,
}

/// Written after a file's stage records when the file could not be finished
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub run_id: Uuid,
    pub file: String,
    pub recorded_at: DateTime<Utc>,
    pub status: &'static str,
    pub error: String,
}

/// Audit sink owned by the orchestrator. Every record is also emitted as a log
/// line. Records are held until their file is appended to disk.
#[derive(Debug)]
pub struct AuditLog {
    run_id: Uuid,
    records: Vec<AuditRecord>,
}

impl AuditLog {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            records: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn record(&mut self, file: &str, report: StageReport) {
        info!(
            stage = report.stage,
            file,
            rows_before = report.rows_before,
            rows_after = report.rows_after,
            columns_removed = ?report.columns_removed,
            counts = ?report.counts,
            "stage complete"
        );
        self.records.push(AuditRecord {
            run_id: self.run_id,
            file: file.to_string(),
            recorded_at: Utc::now(),
            report,
        });
    }

    /// Records not yet written to disk
    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    pub fn records_for<'a>(&'a self, file: &'a str) -> impl Iterator<Item = &'a AuditRecord> + 'a {
        self.records.iter().filter(move |r| r.file == file)
    }

    fn take_file(&mut self, file: &str) -> Vec<AuditRecord> {
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.records)
            .into_iter()
            .partition(|r| r.file == file);
        self.records = kept;
        taken
    }

    /// Append one file's records to a JSON-lines file and drop them from memory
    pub fn append_jsonl(&mut self, file: &str, path: &Path) -> Result<usize> {
        let records = self.take_file(file);
        let mut out = OpenOptions::new().create(true).append(true).open(path)?;
        for record in &records {
            serde_json::to_writer(&mut out, record)?;
            out.write_all(b"\n")?;
        }
        Ok(records.len())
    }

    /// Append the stage records a failed file produced, followed by the failure itself
    pub fn append_failure(&mut self, file: &str, status: &'static str, error: &str, path: &Path) -> Result<usize> {
        let written = self.append_jsonl(file, path)?;
        let failure = FailureRecord {
            run_id: self.run_id,
            file: file.to_string(),
            recorded_at: Utc::now(),
            status,
            error: error.to_string(),
        };
        let mut out = OpenOptions::new().create(true).append(true).open(path)?;
        serde_json::to_writer(&mut out, &failure)?;
        out.write_all(b"\n")?;
        Ok(written + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Cell, Column};

    #[test]
    fn report_tracks_shape_changes() {
        let mut table = RecordTable::from_columns(vec![
            Column::new("a", vec![Cell::Number(1.0), Cell::Null]),
            Column::new("b", vec![Cell::Null, Cell::Null]),
        ])
        .unwrap();

        let mut report = StageReport::start("completeness", &table);
        table.drop_column("b");
        table.retain_rows(&[true, false]);
        report.columns_removed.push("b".to_string());
        report.add_count("imputed", 2);
        report.add_count("imputed", 1);
        let report = report.finish(&table);

        assert_eq!(report.rows_removed(), 1);
        assert_eq!(report.columns_after, 1);
        assert_eq!(report.count("imputed"), 3);
        assert_eq!(report.count("missing"), 0);
        assert_eq!(report.cells_nulled(), 0);
    }

    #[test]
    fn cells_nulled_sums_nulling_counters() {
        let mut report = StageReport::start("integrity", &RecordTable::new());
        report.add_count("sub_grade_nulled", 2);
        report.add_count("rate_nulled", 1);
        report.add_count("exact_duplicates", 4);

        assert_eq!(report.cells_nulled(), 3);
    }

    #[test]
    fn appends_only_the_requested_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let table = RecordTable::new();

        let mut audit = AuditLog::new(Uuid::new_v4());
        audit.record("a.csv", StageReport::start("integrity", &table));
        audit.record("b.csv", StageReport::start("integrity", &table));
        audit.record("a.csv", StageReport::start("accuracy", &table));

        assert_eq!(audit.append_jsonl("a.csv", &path).unwrap(), 2);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["stage"], "accuracy");
        assert_eq!(lines[0]["file"], "a.csv");

        // Appended records leave memory; the other file's stay pending
        assert_eq!(audit.records().len(), 1);
        assert_eq!(audit.records()[0].file, "b.csv");
        assert_eq!(audit.append_jsonl("a.csv", &path).unwrap(), 0);
    }

    #[test]
    fn failure_follows_the_stage_records_of_its_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let table = RecordTable::new();

        let mut audit = AuditLog::new(Uuid::new_v4());
        audit.record("bad.csv", StageReport::start("completeness", &table));

        assert_eq!(audit.append_failure("bad.csv", "skipped", "missing grade", &path).unwrap(), 2);
        assert!(audit.records().is_empty());

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines[0]["stage"], "completeness");
        assert_eq!(lines[1]["status"], "skipped");
        assert_eq!(lines[1]["error"], "missing grade");
        assert_eq!(lines[1]["run_id"], audit.run_id().to_string());
    }
}
