/// Column names and fixed rule tables for the loan-record schema.
/// These constants keep the stage implementations and tests in agreement.

// Index column pandas-style exports prepend to every row
pub const RAW_INDEX_COLUMN: &str = "Unnamed: 0";

pub const MEMBER_ID_COLUMN: &str = "member_id";
pub const INSTALLMENT_COLUMN: &str = "installment";
pub const GRADE_COLUMN: &str = "grade";
pub const SUB_GRADE_COLUMN: &str = "sub_grade";
pub const INTEREST_RATE_COLUMN: &str = "int_rate";
pub const EMPLOYMENT_TITLE_COLUMN: &str = "emp_title";
pub const URL_COLUMN: &str = "url";

/// Monthly installment above which a duplicated member id is treated as an erroneous re-submission
pub const DEFAULT_INSTALLMENT_LIMIT: f64 = 10_000.0;

/// Numeric fields whose remaining gaps are filled with zero after completeness filtering
pub const IMPUTE_ZERO_COLUMNS: &[&str] = &["mths_since_last_delinq", "tot_cur_bal", "tot_coll_amt"];

/// Grade letters a sub-grade may start with
pub const GRADE_LETTERS: &str = "ABCDEFG";

/// Corrupted month tokens observed in the source extracts, mapped to their canonical abbreviation
pub const MONTH_TOKEN_CORRECTIONS: &[(&str, &str)] = &[("Octxyz", "Oct")];

/// (year column, month column, merged date column)
pub const DATE_COLUMN_PAIRS: &[(&str, &str, &str)] = &[
    ("issue_year", "issue_month", "issue_date"),
    ("earliest_cr_line_year", "earliest_cr_line_month", "earliest_cr_line_date"),
    ("last_pymnt_year", "last_pymnt_month", "last_pymnt_date"),
    ("next_pymnt_year", "next_pymnt_month", "next_pymnt_date"),
    ("last_credit_pull_year", "last_credit_pull_month", "last_credit_pull_date"),
];

/// Year-month format used when merging date components (first of month is implied)
pub const YEAR_MONTH_FORMAT: &str = "%Y-%b";

/// Whole-value substitutions applied to job titles before clustering
pub const TITLE_SUBSTITUTIONS: &[(&str, &str)] = &[("rn", "registered nurse")];

/// Field tokens read as missing values when loading CSV files
pub const MISSING_TOKENS: &[&str] = &["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None", "#N/A"];

pub const DATE_OUTPUT_FORMAT: &str = "%Y-%m-%d";

pub const AUDIT_FILE_NAME: &str = "audit.jsonl";

pub const ENCRYPTION_KEY_ENV: &str = "LOAN_CLEANSE_ENCRYPTION_KEY";
