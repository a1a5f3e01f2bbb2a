use std::fs;
use std::path::Path;

use loan_cleanse::config::{Config, FailurePolicy};
use loan_cleanse::pipeline::processing::{reveal_column, Redactor};
use loan_cleanse::pipeline::{Pipeline, PipelineState};
use loan_cleanse::table::{Cell, RecordTable};
use tempfile::TempDir;

const KEY: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";
const FILLERS: usize = 10;

fn header() -> String {
    let mut columns = vec![
        "Unnamed: 0",
        "member_id",
        "installment",
        "grade",
        "sub_grade",
        "int_rate",
        "emp_title",
        "url",
        "issue_year",
        "issue_month",
    ]
    .into_iter()
    .map(str::to_string)
    .collect::<Vec<_>>();
    columns.extend((1..=FILLERS).map(|i| format!("f{}", i)));
    columns.push("desc".to_string());
    columns.join(",")
}

fn row(fields: &[&str]) -> String {
    let mut cells: Vec<String> = fields.iter().map(|s| s.to_string()).collect();
    cells.extend((0..FILLERS).map(|i| i.to_string()));
    cells.push(String::new());
    cells.join(",")
}

/// Six raw rows: one exact duplicate (ignoring the index), one large installment
/// sharing a member id, one nearly empty row, and an all-empty `desc` column.
fn loans_csv() -> String {
    let sparse = format!("5{}", ",".repeat(9 + FILLERS + 1));
    [
        header(),
        row(&["0", "100", "500", "A", "A1", "5.0", "RN", "https://lc.com/loan/0", "2014", "Octxyz"]),
        row(&["1", "101", "300", "B", "B3", "7.5", "Manager ", "https://lc.com/loan/1", "2015", "Jan"]),
        row(&["2", "101", "300", "B", "B3", "7.5", "Manager ", "https://lc.com/loan/1", "2015", "Jan"]),
        row(&["3", "102", "12000", "C", "C2", "10.0", "teacher", "https://lc.com/loan/3", "2016", "Feb"]),
        row(&["4", "102", "800", "C", "H1", "0", "nurse", "https://lc.com/loan/4", "2016", "Mar"]),
        sparse,
    ]
    .join("\n")
        + "\n"
}

fn test_config(dir: &Path, policy: &str) -> Config {
    let toml = format!(
        r#"
input_dir = '{input}'
output_dir = '{output}'
profiling_dir = '{profiling}'
log_dir = '{logs}'
threshold_missing = 0.9
similarity_score_threshold = 90
cluster_list = ["registered nurse", "manager"]
failure_policy = "{policy}"

[redaction]
column = "url"
mode = "reversible"
encryption_key = "{KEY}"
"#,
        input = dir.join("input").display(),
        output = dir.join("output/data").display(),
        profiling = dir.join("output/profiling").display(),
        logs = dir.join("logs").display(),
    );
    let config = Config::from_toml_str(&toml).unwrap();
    config.validate().unwrap();
    config
}

fn setup(policy: &str) -> (TempDir, Config) {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("input")).unwrap();
    let config = test_config(dir.path(), policy);
    (dir, config)
}

#[test]
fn cleans_a_loan_extract_end_to_end() {
    let (dir, config) = setup("abort");
    fs::write(dir.path().join("input/loans.csv"), loans_csv()).unwrap();

    let mut pipeline = Pipeline::new(config).unwrap();
    let summary = pipeline.run().unwrap();

    assert_eq!(summary.files.len(), 1);
    let file = &summary.files[0];
    assert_eq!(file.rows_in, 6);
    assert_eq!(file.rows_out, 3);
    assert_eq!(pipeline.state(), PipelineState::Idle);

    let cleaned = RecordTable::read_csv(&dir.path().join("output/data/loans_clean.csv")).unwrap();
    assert_eq!(cleaned.row_count(), 3);
    assert!(!cleaned.has_column("desc"));
    assert!(!cleaned.has_column("Unnamed: 0"));
    assert!(!cleaned.has_column("issue_year"));
    assert!(!cleaned.has_column("issue_month"));

    let members: Vec<Option<f64>> = cleaned.column("member_id").unwrap().cells.iter().map(Cell::as_number).collect();
    assert_eq!(members, vec![Some(100.0), Some(101.0), Some(102.0)]);

    let dates: Vec<String> = cleaned.column("issue_date").unwrap().cells.iter().map(|c| c.to_string()).collect();
    assert_eq!(dates, vec!["2014-10-01", "2015-01-01", "2016-03-01"]);

    let titles: Vec<String> = cleaned.column("emp_title").unwrap().cells.iter().map(|c| c.to_string()).collect();
    assert_eq!(titles, vec!["registered nurse", "manager", "nurse"]);

    // Inconsistent sub-grade and zero interest rate on the last surviving row
    assert_eq!(cleaned.column("sub_grade").unwrap().cells[2], Cell::Null);
    assert_eq!(cleaned.column("int_rate").unwrap().cells[2], Cell::Null);

    let urls = &cleaned.column("url").unwrap().cells;
    assert!(urls.iter().all(|c| !c.to_string().starts_with("https://")));
}

#[test]
fn writes_audit_lines_and_profile() {
    let (dir, config) = setup("abort");
    fs::write(dir.path().join("input/loans.csv"), loans_csv()).unwrap();

    let summary = Pipeline::new(config).unwrap().run().unwrap();

    let audit = fs::read_to_string(dir.path().join("output/data/audit.jsonl")).unwrap();
    let lines: Vec<serde_json::Value> = audit.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0]["stage"], "completeness");
    assert_eq!(lines[1]["stage"], "integrity");
    assert_eq!(lines[1]["counts"]["exact_duplicates"], 1);
    assert_eq!(lines[1]["counts"]["conditional_duplicates"], 1);
    assert_eq!(lines[4]["stage"], "redaction");
    assert_eq!(lines[0]["run_id"], summary.run_id.to_string());

    let profile = summary.files[0].profile.as_ref().unwrap();
    assert!(profile.ends_with("loans_profile.html"));
    assert!(fs::read_to_string(profile).unwrap().contains("emp_title"));
}

#[test]
fn redacted_column_decrypts_with_the_configured_key() {
    let (dir, config) = setup("abort");
    fs::write(dir.path().join("input/loans.csv"), loans_csv()).unwrap();
    let key = config.redaction.encryption_key.clone().unwrap();

    Pipeline::new(config).unwrap().run().unwrap();

    let mut cleaned = RecordTable::read_csv(&dir.path().join("output/data/loans_clean.csv")).unwrap();
    let revealed = reveal_column(&mut cleaned, "url", &Redactor::Reversible(key)).unwrap();

    assert_eq!(revealed, 3);
    let urls: Vec<String> = cleaned.column("url").unwrap().cells.iter().map(|c| c.to_string()).collect();
    assert_eq!(
        urls,
        vec!["https://lc.com/loan/0", "https://lc.com/loan/1", "https://lc.com/loan/4"]
    );
}

#[test]
fn skip_policy_keeps_going_after_a_schema_error() {
    let (dir, config) = setup("skip_file");
    assert_eq!(config.failure_policy, FailurePolicy::SkipFile);
    fs::write(dir.path().join("input/a_broken.csv"), "member_id,installment\n1,10\n").unwrap();
    fs::write(dir.path().join("input/b_loans.csv"), loans_csv()).unwrap();
    fs::write(dir.path().join("input/readme.md"), "not data").unwrap();

    let summary = Pipeline::new(config).unwrap().run().unwrap();

    assert_eq!(summary.failures.len(), 1);
    assert!(summary.failures[0].file.ends_with("a_broken.csv"));
    assert_eq!(summary.files.len(), 1);
    assert!(dir.path().join("output/data/b_loans_clean.csv").exists());
    assert!(!dir.path().join("output/data/readme_clean.csv").exists());

    let audit = fs::read_to_string(dir.path().join("output/data/audit.jsonl")).unwrap();
    let lines: Vec<serde_json::Value> = audit.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    // completeness ran on the broken file before integrity found no `grade`
    assert_eq!(lines.len(), 1 + 1 + 5);
    assert_eq!(lines[0]["file"], "a_broken.csv");
    assert_eq!(lines[0]["stage"], "completeness");
    assert_eq!(lines[1]["file"], "a_broken.csv");
    assert_eq!(lines[1]["status"], "skipped");
    assert!(lines[1]["error"].as_str().unwrap().contains("integrity"));
    assert!(lines[2..].iter().all(|l| l["file"] == "b_loans.csv"));
}

#[test]
fn abort_policy_stops_the_run() {
    let (dir, config) = setup("abort");
    fs::write(dir.path().join("input/a_broken.csv"), "member_id,installment\n1,10\n").unwrap();
    fs::write(dir.path().join("input/b_loans.csv"), loans_csv()).unwrap();

    let err = Pipeline::new(config).unwrap().run().unwrap_err();

    assert!(err.is_schema());
    assert!(!dir.path().join("output/data/b_loans_clean.csv").exists());

    let audit = fs::read_to_string(dir.path().join("output/data/audit.jsonl")).unwrap();
    let last: serde_json::Value = serde_json::from_str(audit.lines().last().unwrap()).unwrap();
    assert_eq!(last["status"], "aborted");
    assert_eq!(last["file"], "a_broken.csv");
}
