// Data-quality stages, applied in this order by the orchestrator

pub mod accuracy;
pub mod completeness;
pub mod integrity;
pub mod redaction;
pub mod text;

use crate::error::Result;
use crate::pipeline::audit::StageReport;
use crate::table::RecordTable;

pub use accuracy::{AccuracyNormalizer, DatePair};
pub use completeness::CompletenessFilter;
pub use integrity::{ColumnExceeds, IntegrityFilter, RowCondition};
pub use redaction::{reveal_column, EncryptionKey, RedactionStage, Redactor};
pub use text::{GreedyHarmoniser, Harmoniser, LevenshteinRatio, SimilarityScorer, TextHarmonizer};

/// Common trait for all cleaning stages.
///
/// A stage consumes a table and returns the transformed table with a report of
/// what changed. Data-quality findings are resolved inside the stage; only
/// structural failures (missing columns, crypto setup) come back as errors.
pub trait CleaningStage {
    fn stage_name(&self) -> &'static str;

    fn apply(&self, table: RecordTable) -> Result<(RecordTable, StageReport)>;
}
