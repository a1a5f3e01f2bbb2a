pub mod similarity;

use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

use super::CleaningStage;
use crate::constants::{EMPLOYMENT_TITLE_COLUMN, TITLE_SUBSTITUTIONS};
use crate::error::Result;
use crate::pipeline::audit::StageReport;
use crate::table::{Cell, RecordTable};

pub use similarity::{LevenshteinRatio, SimilarityScorer};

pub const STAGE: &str = "text";

/// Rewrites free-text values onto canonical cluster labels
pub trait Harmoniser: Send + Sync {
    /// Returns the number of cells rewritten
    fn harmonise(&self, cells: &mut [Cell], clusters: &[String], threshold: f64) -> usize;
}

/// Order-dependent clustering.
///
/// Every label is scored against the column's original values, and each value
/// takes the last listed label it matches. A score equal to the threshold counts
/// as a match.
#[derive(Debug, Clone, Default)]
pub struct GreedyHarmoniser<S = LevenshteinRatio> {
    scorer: S,
}

impl<S: SimilarityScorer> GreedyHarmoniser<S> {
    pub fn new(scorer: S) -> Self {
        Self { scorer }
    }
}

impl<S: SimilarityScorer> Harmoniser for GreedyHarmoniser<S> {
    fn harmonise(&self, cells: &mut [Cell], clusters: &[String], threshold: f64) -> usize {
        let distinct: BTreeSet<String> = cells.iter().filter_map(Cell::as_text).map(str::to_string).collect();

        let mut assigned: HashMap<String, &String> = HashMap::new();
        for value in &distinct {
            let winner = clusters
                .iter()
                .filter(|label| self.scorer.score(label, value) >= threshold)
                .last();
            if let Some(label) = winner {
                if label != value {
                    debug!("Cluster '{}' absorbs '{}'", label, value);
                    assigned.insert(value.clone(), label);
                }
            }
        }
        if assigned.is_empty() {
            return 0;
        }

        let mut rewritten = 0;
        for cell in cells.iter_mut() {
            if let Cell::Text(value) = cell {
                if let Some(label) = assigned.get(value.as_str()) {
                    *value = (*label).clone();
                    rewritten += 1;
                }
            }
        }
        rewritten
    }
}

/// Lower-cases, trims, expands abbreviations and clusters one text column.
pub struct TextHarmonizer {
    column: String,
    substitutions: Vec<(String, String)>,
    clusters: Vec<String>,
    threshold: f64,
    harmoniser: Box<dyn Harmoniser>,
}

impl TextHarmonizer {
    pub fn new(clusters: Vec<String>, threshold: u32) -> Self {
        Self {
            column: EMPLOYMENT_TITLE_COLUMN.to_string(),
            substitutions: TITLE_SUBSTITUTIONS
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
            clusters,
            threshold: f64::from(threshold),
            harmoniser: Box::new(GreedyHarmoniser::<LevenshteinRatio>::default()),
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    pub fn with_harmoniser(mut self, harmoniser: Box<dyn Harmoniser>) -> Self {
        self.harmoniser = harmoniser;
        self
    }
}

impl CleaningStage for TextHarmonizer {
    fn stage_name(&self) -> &'static str {
        STAGE
    }

    fn apply(&self, mut table: RecordTable) -> Result<(RecordTable, StageReport)> {
        let mut report = StageReport::start(STAGE, &table);
        let column = table.require_column_mut(STAGE, &self.column)?;

        for cell in column.cells.iter_mut() {
            if let Cell::Text(value) = cell {
                *value = value.trim().to_lowercase();
            }
        }

        let mut substituted = 0;
        for cell in column.cells.iter_mut() {
            let Cell::Text(value) = cell else { continue };
            if let Some((_, to)) = self.substitutions.iter().find(|(from, _)| from.as_str() == value.as_str()) {
                *value = to.clone();
                substituted += 1;
            }
        }
        info!("Applied {} abbreviation substitutions in '{}'", substituted, self.column);

        let clustered = self
            .harmoniser
            .harmonise(&mut column.cells, &self.clusters, self.threshold);
        info!(
            "Harmonised {} '{}' values onto {} cluster labels (threshold {})",
            clustered,
            self.column,
            self.clusters.len(),
            self.threshold
        );

        report.add_count("substituted", substituted);
        report.add_count("clustered", clustered);
        let report = report.finish(&table);
        Ok((table, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;
    use std::collections::HashMap;

    /// Fixed scores per (label, value)
    struct TableScorer(HashMap<(&'static str, &'static str), f64>);

    impl SimilarityScorer for TableScorer {
        fn score(&self, a: &str, b: &str) -> f64 {
            self.0
                .iter()
                .find(|((label, value), _)| *label == a && *value == b)
                .map(|(_, s)| *s)
                .unwrap_or(0.0)
        }
    }

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn titles(values: Vec<Cell>) -> RecordTable {
        RecordTable::from_columns(vec![Column::new("emp_title", values)]).unwrap()
    }

    #[test]
    fn later_cluster_wins_when_both_match() {
        let scorer = TableScorer(HashMap::from([
            (("manager", "truck drvr mgr"), 92.0),
            (("driver", "truck drvr mgr"), 95.0),
            (("driver", "manager"), 10.0),
        ]));
        let mut cells = vec![text("truck drvr mgr"), text("teacher")];
        let clusters = vec!["manager".to_string(), "driver".to_string()];

        let rewritten = GreedyHarmoniser::new(scorer).harmonise(&mut cells, &clusters, 90.0);

        assert_eq!(cells, vec![text("driver"), text("teacher")]);
        assert_eq!(rewritten, 1);
    }

    #[test]
    fn labels_score_original_values_not_earlier_rewrites() {
        // "driver" would match the rewritten text "manager" but not "mgr"
        let scorer = TableScorer(HashMap::from([
            (("manager", "mgr"), 95.0),
            (("driver", "manager"), 92.0),
        ]));
        let mut cells = vec![text("mgr")];
        let clusters = vec!["manager".to_string(), "driver".to_string()];

        GreedyHarmoniser::new(scorer).harmonise(&mut cells, &clusters, 90.0);
        assert_eq!(cells, vec![text("manager")]);
    }

    #[test]
    fn value_equal_to_a_label_can_move_to_a_later_label() {
        let scorer = TableScorer(HashMap::from([
            (("manager", "manager"), 100.0),
            (("driver", "manager"), 92.0),
        ]));
        let mut cells = vec![text("manager"), text("manager")];
        let clusters = vec!["manager".to_string(), "driver".to_string()];

        let rewritten = GreedyHarmoniser::new(scorer).harmonise(&mut cells, &clusters, 90.0);
        assert_eq!(cells, vec![text("driver"), text("driver")]);
        assert_eq!(rewritten, 2);
    }

    #[test]
    fn threshold_is_inclusive() {
        let scorer = TableScorer(HashMap::from([(("nurse", "nurze"), 80.0)]));
        let mut cells = vec![text("nurze")];
        GreedyHarmoniser::new(scorer).harmonise(&mut cells, &["nurse".to_string()], 80.0);
        assert_eq!(cells, vec![text("nurse")]);
    }

    #[test]
    fn normalises_case_whitespace_and_abbreviations() {
        let table = titles(vec![
            text("  Registered Nurse "),
            text("RN"),
            text("Registred Nurse"),
            text("Teacher"),
            Cell::Null,
        ]);
        let stage = TextHarmonizer::new(vec!["registered nurse".to_string()], 90);

        let (out, report) = stage.apply(table).unwrap();

        assert_eq!(
            out.column("emp_title").unwrap().cells,
            vec![
                text("registered nurse"),
                text("registered nurse"),
                text("registered nurse"),
                text("teacher"),
                Cell::Null,
            ]
        );
        assert_eq!(report.count("substituted"), 1);
        assert_eq!(report.count("clustered"), 1);
    }

    #[test]
    fn missing_column_is_a_schema_error() {
        let table = RecordTable::from_columns(vec![Column::new("title", vec![text("x")])]).unwrap();
        assert!(TextHarmonizer::new(Vec::new(), 90).apply(table).unwrap_err().is_schema());
    }
}
