// Pipeline orchestration and the data-quality stages

pub mod audit;
pub mod orchestrator;
pub mod processing;
pub mod profiling;

pub use audit::{AuditLog, AuditRecord, FailureRecord, StageReport};
pub use orchestrator::{FileFailure, FileSummary, Pipeline, PipelineState, RunSummary};
pub use processing::CleaningStage;
pub use profiling::{ColumnProfile, TableProfile};
