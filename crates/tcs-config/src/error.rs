//! Error types for configuration loading and validation

use std::path::PathBuf;

use tcs_core::EntityIdError;
use thiserror::Error;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("config entry '{entry_id}' has no thermostat selected")]
    MissingThermostat { entry_id: String },

    #[error("invalid entity id for '{key}': {source}")]
    InvalidEntityId {
        key: String,
        #[source]
        source: EntityIdError,
    },

    #[error("'{key}' must be a {expected} entity, got '{entity_id}'")]
    WrongDomain {
        key: String,
        entity_id: String,
        expected: &'static str,
    },

    #[error("area '{area_id}' is configured more than once")]
    DuplicateArea { area_id: String },

    #[error("config entry '{entry_id}' is configured more than once")]
    DuplicateEntry { entry_id: String },

    #[error("config entry not found: {entry_id}")]
    UnknownEntry { entry_id: String },

    #[error("area not found: {area_id}")]
    UnknownArea { area_id: String },

    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

impl ConfigError {
    /// Machine-readable reason, stable across releases
    pub fn reason_key(&self) -> &'static str {
        match self {
            ConfigError::ReadFile { .. } => "read_error",
            ConfigError::ParseYaml(_) => "invalid_yaml",
            ConfigError::MissingThermostat { .. } => "missing_thermostat",
            ConfigError::InvalidEntityId { .. } | ConfigError::WrongDomain { .. } => {
                "invalid_entity_id"
            }
            ConfigError::DuplicateArea { .. } => "duplicate_area",
            ConfigError::DuplicateEntry { .. } => "duplicate_entry",
            ConfigError::UnknownEntry { .. } => "unknown_entry",
            ConfigError::UnknownArea { .. } => "unknown_area",
            ConfigError::InvalidValue { .. } => "invalid_value",
        }
    }

    pub(crate) fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
