use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{
    DEFAULT_INSTALLMENT_LIMIT, ENCRYPTION_KEY_ENV, INSTALLMENT_COLUMN, MEMBER_ID_COLUMN, URL_COLUMN,
};
use crate::error::{CleanseError, Result};
use crate::pipeline::processing::redaction::EncryptionKey;

/// Validated run configuration. Owned by the orchestrator and handed to each stage.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    #[serde(default = "default_profiling_dir")]
    pub profiling_dir: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Tolerated fraction of missing cells per column and per row, in [0, 1]
    pub threshold_missing: f64,
    #[serde(default)]
    pub excluded_member_ids: Vec<String>,
    #[serde(default)]
    pub cluster_list: Vec<String>,
    /// Fuzzy-match acceptance score, 0 to 100
    pub similarity_score_threshold: u32,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default = "default_true")]
    pub profile: bool,
    #[serde(default)]
    pub timestamp_outputs: bool,
    #[serde(default)]
    pub duplicate_rule: DuplicateRuleConfig,
    pub redaction: RedactionConfig,
}

/// What to do when one input file fails with a schema error
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the whole run on the first failing file
    #[default]
    Abort,
    /// Log the failure and continue with the next file
    SkipFile,
}

/// Conditional duplicate removal: rows sharing `group_column` with another row
/// are dropped when `condition_column > greater_than`.
#[derive(Debug, Clone, Deserialize)]
pub struct DuplicateRuleConfig {
    #[serde(default = "default_group_column")]
    pub group_column: String,
    #[serde(default = "default_condition_column")]
    pub condition_column: String,
    #[serde(default = "default_installment_limit")]
    pub greater_than: f64,
}

impl Default for DuplicateRuleConfig {
    fn default() -> Self {
        Self {
            group_column: default_group_column(),
            condition_column: default_condition_column(),
            greater_than: default_installment_limit(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionMode {
    /// AES-256-GCM; recoverable with the same key
    Reversible,
    /// SHA-256 digest; lossy, cannot be used for lookups back to the source value
    Irreversible,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedactionConfig {
    #[serde(default = "default_redaction_column")]
    pub column: String,
    pub mode: RedactionMode,
    #[serde(default)]
    pub encryption_key: Option<EncryptionKey>,
}

fn default_profiling_dir() -> PathBuf {
    PathBuf::from("output/profiling")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_true() -> bool {
    true
}

fn default_group_column() -> String {
    MEMBER_ID_COLUMN.to_string()
}

fn default_condition_column() -> String {
    INSTALLMENT_COLUMN.to_string()
}

fn default_installment_limit() -> f64 {
    DEFAULT_INSTALLMENT_LIMIT
}

fn default_redaction_column() -> String {
    URL_COLUMN.to_string()
}

impl Config {
    /// Load, apply the environment key override, and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            CleanseError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        let mut config = Self::from_toml_str(&content)?;
        if let Ok(raw) = std::env::var(ENCRYPTION_KEY_ENV) {
            if !raw.trim().is_empty() {
                config.redaction.encryption_key = Some(EncryptionKey::from_base64(raw.trim())?);
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse without touching the environment. Callers must still run `validate`.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold_missing) {
            return Err(CleanseError::Config(format!(
                "threshold_missing must be within [0, 1], got {}",
                self.threshold_missing
            )));
        }

        if self.similarity_score_threshold > 100 {
            return Err(CleanseError::Config(format!(
                "similarity_score_threshold must be within [0, 100], got {}",
                self.similarity_score_threshold
            )));
        }

        if !self.duplicate_rule.greater_than.is_finite() {
            return Err(CleanseError::Config(
                "duplicate_rule.greater_than must be a finite number".to_string(),
            ));
        }

        if self.redaction.mode == RedactionMode::Reversible && self.redaction.encryption_key.is_none() {
            return Err(CleanseError::Config(format!(
                "redaction.mode = \"reversible\" requires redaction.encryption_key or {}",
                ENCRYPTION_KEY_ENV
            )));
        }

        Ok(())
    }
}
