use thiserror::Error;

#[derive(Error, Debug)]
pub enum CleanseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema error in {stage}: required column '{column}' is missing")]
    Schema { stage: &'static str, column: String },

    #[error("Duplicate column name: {0}")]
    DuplicateColumn(String),

    #[error("Table shape error: {0}")]
    Shape(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Template rendering failed: {0}")]
    Template(#[from] askama::Error),
}

impl CleanseError {
    pub fn schema(stage: &'static str, column: impl Into<String>) -> Self {
        CleanseError::Schema {
            stage,
            column: column.into(),
        }
    }

    /// Schema errors are the only failures the per-file policy may skip over.
    pub fn is_schema(&self) -> bool {
        matches!(
            self,
            CleanseError::Schema { .. } | CleanseError::DuplicateColumn(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CleanseError>;
