//! Configuration for analysis and cleanup runs.
//!
//! `PruneConfig` centralizes the naming conventions and limits that would
//! otherwise be hardcoded across the SQL generators, the model scanner and the
//! mutator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error_codes;

/// Which removable items are eligible for physical deletion from the model files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupMode {
    /// Measures and calculated columns only; imported columns stay until the
    /// database side has been dropped.
    #[default]
    ModelOnly,
    /// Every removable item.
    All,
}

impl CleanupMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CleanupMode::ModelOnly => "model_only",
            CleanupMode::All => "all",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PruneConfig {
    /// Database schema used in generated DROP statements.
    pub schema: String,
    pub cleanup_mode: CleanupMode,
    /// Extension appended to an edited file's name for its one-time backup.
    pub backup_suffix: String,
    /// Extension of model source files, without the dot.
    #[serde(alias = "tmdl_extension")]
    pub source_extension: String,
    pub semantic_link_annotation: String,
    /// Files larger than this are reported as unreadable instead of parsed.
    pub max_file_bytes: u64,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            schema: "dbo".to_string(),
            cleanup_mode: CleanupMode::ModelOnly,
            backup_suffix: "bak".to_string(),
            source_extension: "tmdl".to_string(),
            semantic_link_annotation: "__PBI_SemanticLinks".to_string(),
            max_file_bytes: 10 * 1024 * 1024,
        }
    }
}

impl PruneConfig {
    pub fn builder() -> PruneConfigBuilder {
        PruneConfigBuilder {
            inner: PruneConfig::default(),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: PruneConfig = serde_json::from_str(text).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_identifier(&self.schema, "schema")?;
        ensure_identifier(&self.backup_suffix, "backup_suffix")?;
        ensure_identifier(&self.source_extension, "source_extension")?;
        ensure_identifier(&self.semantic_link_annotation, "semantic_link_annotation")?;

        if self.backup_suffix.trim_start_matches('.') == self.source_extension.trim_start_matches('.') {
            return Err(ConfigError::BackupShadowsSource {
                suffix: self.backup_suffix.clone(),
            });
        }
        if self.max_file_bytes == 0 {
            return Err(ConfigError::NonPositiveLimit {
                field: "max_file_bytes",
                value: 0,
            });
        }
        Ok(())
    }

    /// `bak` and `.bak` are both accepted; the result never has a leading dot.
    pub fn backup_extension(&self) -> &str {
        self.backup_suffix.trim_start_matches('.')
    }

    pub fn source_extension(&self) -> &str {
        self.source_extension.trim_start_matches('.')
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("[PRUNE_CONFIG_001] {field} must not be empty or contain path separators (got {value:?})")]
    InvalidIdentifier { field: &'static str, value: String },
    #[error("[PRUNE_CONFIG_001] backup_suffix {suffix:?} would make backups look like model sources")]
    BackupShadowsSource { suffix: String },
    #[error("[PRUNE_CONFIG_001] {field} must be greater than zero (got {value})")]
    NonPositiveLimit { field: &'static str, value: u64 },
    #[error("[PRUNE_CONFIG_001] invalid configuration JSON: {reason}")]
    Parse { reason: String },
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        error_codes::CONFIG_INVALID
    }
}

fn ensure_identifier(value: &str, field: &'static str) -> Result<(), ConfigError> {
    let trimmed = value.trim().trim_start_matches('.');
    if trimmed.is_empty() || trimmed.contains(['/', '\\']) {
        return Err(ConfigError::InvalidIdentifier {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PruneConfigBuilder {
    inner: PruneConfig,
}

impl Default for PruneConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PruneConfigBuilder {
    pub fn new() -> Self {
        PruneConfig::builder()
    }

    pub fn schema(mut self, value: impl Into<String>) -> Self {
        self.inner.schema = value.into();
        self
    }

    pub fn cleanup_mode(mut self, value: CleanupMode) -> Self {
        self.inner.cleanup_mode = value;
        self
    }

    pub fn backup_suffix(mut self, value: impl Into<String>) -> Self {
        self.inner.backup_suffix = value.into();
        self
    }

    pub fn source_extension(mut self, value: impl Into<String>) -> Self {
        self.inner.source_extension = value.into();
        self
    }

    pub fn semantic_link_annotation(mut self, value: impl Into<String>) -> Self {
        self.inner.semantic_link_annotation = value.into();
        self
    }

    pub fn max_file_bytes(mut self, value: u64) -> Self {
        self.inner.max_file_bytes = value;
        self
    }

    pub fn build(self) -> Result<PruneConfig, ConfigError> {
        self.inner.validate()?;
        Ok(self.inner)
    }
}
