use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use super::audit::AuditLog;
use super::processing::{
    AccuracyNormalizer, CleaningStage, CompletenessFilter, IntegrityFilter, RedactionStage, TextHarmonizer,
};
use super::profiling::TableProfile;
use crate::config::{Config, FailurePolicy};
use crate::constants::AUDIT_FILE_NAME;
use crate::error::Result;
use crate::table::RecordTable;

/// Where the orchestrator is in its run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Idle,
    Configured,
    ListingInputs,
    Loaded,
    Completed,
    Integrated,
    Accurate,
    Harmonized,
    Redacted,
    Profiled,
    Saved,
}

/// Outcome for one successfully cleaned file
#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub file: String,
    pub rows_in: usize,
    pub rows_out: usize,
    pub columns_in: usize,
    pub columns_out: usize,
    pub output: PathBuf,
    pub profile: Option<PathBuf>,
}

/// A file skipped under `FailurePolicy::SkipFile`
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub file: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub files: Vec<FileSummary>,
    pub failures: Vec<FileFailure>,
}

impl RunSummary {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            completed_at: None,
            files: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// Runs the fixed stage sequence over every input file, one file at a time.
///
/// Stage order: completeness, integrity, accuracy, text, redaction.
pub struct Pipeline {
    config: Config,
    stages: Vec<(Box<dyn CleaningStage>, PipelineState)>,
    audit: AuditLog,
    state: PipelineState,
}

impl Pipeline {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let stages = Self::build_stages(&config)?;
        let audit = AuditLog::new(Uuid::new_v4());
        debug!("Pipeline configured with {} stages", stages.len());
        Ok(Self {
            config,
            stages,
            audit,
            state: PipelineState::Configured,
        })
    }

    fn build_stages(config: &Config) -> Result<Vec<(Box<dyn CleaningStage>, PipelineState)>> {
        let completeness = CompletenessFilter::new(config.threshold_missing)?;
        let integrity = IntegrityFilter::from_rule(&config.duplicate_rule)
            .with_excluded_ids(config.excluded_member_ids.iter().cloned());
        let text = TextHarmonizer::new(config.cluster_list.clone(), config.similarity_score_threshold);
        let redaction = RedactionStage::from_config(&config.redaction)?;

        let mut stages: Vec<(Box<dyn CleaningStage>, PipelineState)> = Vec::with_capacity(5);
        stages.push((Box::new(completeness), PipelineState::Completed));
        stages.push((Box::new(integrity), PipelineState::Integrated));
        stages.push((Box::new(AccuracyNormalizer::default()), PipelineState::Accurate));
        stages.push((Box::new(text), PipelineState::Harmonized));
        stages.push((Box::new(redaction), PipelineState::Redacted));
        Ok(stages)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(from = ?self.state, to = ?next, "pipeline state");
        self.state = next;
    }

    /// Create the output (and profiling) directories
    pub fn setup(&self) -> Result<()> {
        fs::create_dir_all(&self.config.output_dir)?;
        if self.config.profile {
            fs::create_dir_all(&self.config.profiling_dir)?;
        }
        Ok(())
    }

    /// CSV files directly under the input directory, sorted by name. Other files are ignored.
    pub fn list_inputs(&mut self) -> Result<Vec<PathBuf>> {
        self.transition(PipelineState::ListingInputs);

        let mut inputs = Vec::new();
        for entry in fs::read_dir(&self.config.input_dir)? {
            let path = entry?.path();
            let is_csv = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("csv"))
                .unwrap_or(false);
            if path.is_file() && is_csv {
                inputs.push(path);
            } else {
                debug!("Ignoring non-CSV input {}", path.display());
            }
        }
        inputs.sort();
        Ok(inputs)
    }

    /// Apply every stage in order, recording each report under `file`
    pub fn clean(&mut self, table: RecordTable, file: &str) -> Result<RecordTable> {
        let mut table = table;
        for (stage, reached) in &self.stages {
            let (next, report) = stage.apply(table)?;

            let stage_name = stage.stage_name();
            counter!("loan_cleanse_rows_removed_total", "stage" => stage_name)
                .increment(report.rows_removed() as u64);
            counter!("loan_cleanse_columns_removed_total", "stage" => stage_name)
                .increment(report.columns_removed.len() as u64);
            counter!("loan_cleanse_cells_nulled_total", "stage" => stage_name)
                .increment(report.cells_nulled() as u64);

            self.audit.record(file, report);
            debug!(from = ?self.state, to = ?reached, "pipeline state");
            self.state = *reached;
            table = next;
        }
        Ok(table)
    }

    pub fn process_file(&mut self, path: &Path) -> Result<FileSummary> {
        let file = file_label(path);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.clone());

        info!("Loading data from {}", path.display());
        let table = RecordTable::read_csv(path)?;
        self.transition(PipelineState::Loaded);
        let (rows_in, columns_in) = (table.row_count(), table.column_count());

        let cleaned = self.clean(table, &file)?;

        let profile = if self.config.profile {
            let profile_path = self.config.profiling_dir.join(format!("{}_profile.html", stem));
            TableProfile::of(&file, &cleaned).write_html(&profile_path)?;
            info!("Wrote profiling report to {}", profile_path.display());
            self.transition(PipelineState::Profiled);
            Some(profile_path)
        } else {
            None
        };

        let output = self.output_path(&stem);
        cleaned.write_csv(&output)?;
        let audit_path = self.audit_path();
        self.audit.append_jsonl(&file, &audit_path)?;
        self.transition(PipelineState::Saved);
        info!(
            "Saved {} rows x {} columns to {}",
            cleaned.row_count(),
            cleaned.column_count(),
            output.display()
        );

        Ok(FileSummary {
            file,
            rows_in,
            rows_out: cleaned.row_count(),
            columns_in,
            columns_out: cleaned.column_count(),
            output,
            profile,
        })
    }

    fn audit_path(&self) -> PathBuf {
        self.config.output_dir.join(AUDIT_FILE_NAME)
    }

    fn output_path(&self, stem: &str) -> PathBuf {
        let name = if self.config.timestamp_outputs {
            format!("{}_clean_{}.csv", stem, chrono::Local::now().format("%Y%m%d-%H%M%S"))
        } else {
            format!("{}_clean.csv", stem)
        };
        self.config.output_dir.join(name)
    }

    /// Process every input file. Schema errors abort the run unless the failure
    /// policy says to skip the file; I/O and other errors always abort.
    pub fn run(&mut self) -> Result<RunSummary> {
        let run_id = self.audit.run_id();
        let span = info_span!("run", %run_id);
        let _enter = span.enter();

        self.setup()?;
        let inputs = self.list_inputs()?;
        info!(
            "Found {} CSV files in {}",
            inputs.len(),
            self.config.input_dir.display()
        );

        let mut summary = RunSummary::new(run_id);
        for path in inputs {
            let file_span = info_span!("file", name = %path.display());
            let _file_enter = file_span.enter();

            match self.process_file(&path) {
                Ok(file_summary) => {
                    counter!("loan_cleanse_files_processed_total").increment(1);
                    summary.files.push(file_summary);
                }
                Err(e) if e.is_schema() && self.config.failure_policy == FailurePolicy::SkipFile => {
                    counter!("loan_cleanse_files_failed_total").increment(1);
                    warn!("Skipping {}: {}", path.display(), e);
                    let audit_path = self.audit_path();
                    self.audit
                        .append_failure(&file_label(&path), "skipped", &e.to_string(), &audit_path)?;
                    summary.failures.push(FileFailure {
                        file: path.display().to_string(),
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    counter!("loan_cleanse_files_failed_total").increment(1);
                    error!("Processing {} failed: {}", path.display(), e);
                    let audit_path = self.audit_path();
                    if let Err(audit_err) = self
                        .audit
                        .append_failure(&file_label(&path), "aborted", &e.to_string(), &audit_path)
                    {
                        warn!("Could not record the failure in {}: {}", audit_path.display(), audit_err);
                    }
                    self.transition(PipelineState::Idle);
                    return Err(e);
                }
            }
        }

        summary.completed_at = Some(Utc::now());
        self.transition(PipelineState::Idle);
        info!(
            "Run finished: {} files cleaned, {} skipped",
            summary.files.len(),
            summary.failures.len()
        );
        Ok(summary)
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
