//! Engine configuration.
//!
//! Loaded from a YAML file. Unknown fields are rejected so typos fail at
//! startup instead of being silently ignored; validation collects all
//! errors before returning, enabling users to fix multiple issues in a
//! single iteration.

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// Minimum submission timeout: 100 milliseconds.
const MIN_SUBMISSION_TIMEOUT_MS: u64 = 100;
/// Maximum submission timeout: 2 minutes.
const MAX_SUBMISSION_TIMEOUT_MS: u64 = 120_000;

/// Maximum pending-event retry rounds.
const MAX_RETRY_ROUNDS: u32 = 64;

/// Root configuration for the engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Storage configuration.
    pub storage: StorageConfig,

    /// Ingestion configuration.
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Ledger submission configuration.
    #[serde(default)]
    pub submission: SubmissionConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite index database.
    pub db_path: String,

    /// Record cache capacity (entries). Default: 4096.
    #[serde(default = "StorageConfig::default_cache_entries")]
    pub cache_entries: usize,
}

impl StorageConfig {
    const fn default_cache_entries() -> usize {
        4096
    }
}

/// Ingestion configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestionConfig {
    /// Per-pipeline event channel capacity. Default: 1024.
    #[serde(default = "IngestionConfig::default_buffer_size")]
    pub buffer_size: usize,

    /// Retry rounds before an event waiting on a missing record is
    /// declared an orphan. Default: 8.
    #[serde(default = "IngestionConfig::default_max_retry_rounds")]
    pub max_retry_rounds: u32,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            buffer_size: Self::default_buffer_size(),
            max_retry_rounds: Self::default_max_retry_rounds(),
        }
    }
}

impl IngestionConfig {
    const fn default_buffer_size() -> usize {
        1024
    }

    const fn default_max_retry_rounds() -> u32 {
        8
    }
}

/// Ledger submission configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmissionConfig {
    /// Upper bound on a single grant/revoke submission. Default: 10s.
    #[serde(default = "SubmissionConfig::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: Self::default_timeout_ms(),
        }
    }
}

impl SubmissionConfig {
    const fn default_timeout_ms() -> u64 {
        10_000
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObservabilityConfig {
    /// Log level filter. Default: "info".
    #[serde(default = "ObservabilityConfig::default_log_level")]
    pub log_level: String,

    /// Emit JSON-formatted logs. Default: false.
    #[serde(default)]
    pub log_json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            log_json: false,
        }
    }
}

impl ObservabilityConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

/// Load and validate configuration from a YAML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let path_str = path.display().to_string();

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path_str.clone(),
        source: e,
    })?;

    load_config_from_str(&content, &path_str)
}

/// Load and validate configuration from a YAML string.
pub fn load_config_from_str(content: &str, source_name: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
        path: source_name.to_string(),
        source: e,
    })?;

    validate_config(&config)?;

    Ok(config)
}

/// Validate the entire configuration, collecting all errors.
pub fn validate_config(config: &EngineConfig) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.storage.db_path.is_empty() {
        errors.push("storage.db_path cannot be empty".to_string());
    }
    if config.storage.cache_entries == 0 {
        errors.push("storage.cache_entries must be greater than 0".to_string());
    }

    if config.ingestion.buffer_size == 0 {
        errors.push("ingestion.buffer_size must be greater than 0".to_string());
    }
    if config.ingestion.max_retry_rounds == 0 {
        errors.push("ingestion.max_retry_rounds must be greater than 0".to_string());
    }
    if config.ingestion.max_retry_rounds > MAX_RETRY_ROUNDS {
        errors.push(format!(
            "ingestion.max_retry_rounds must be at most {MAX_RETRY_ROUNDS}"
        ));
    }

    if config.submission.timeout_ms < MIN_SUBMISSION_TIMEOUT_MS {
        errors.push(format!(
            "submission.timeout_ms must be at least {MIN_SUBMISSION_TIMEOUT_MS}"
        ));
    }
    if config.submission.timeout_ms > MAX_SUBMISSION_TIMEOUT_MS {
        errors.push(format!(
            "submission.timeout_ms must be at most {MAX_SUBMISSION_TIMEOUT_MS}"
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationFailed(errors))
    }
}
