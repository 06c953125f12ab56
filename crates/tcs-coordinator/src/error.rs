//! Coordinator errors

use tcs_config::ConfigError;
use tcs_host::{ServiceError, StorageError};
use tcs_thermostat::ThermostatError;
use thiserror::Error;

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("config entry not found: {0}")]
    EntryNotFound(String),

    /// The entry's task has exited and no longer accepts requests
    #[error("coordinator for entry {0} is not running")]
    Stopped(String),

    #[error("area not found: {0}")]
    UnknownArea(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Thermostat(#[from] ThermostatError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl CoordinatorError {
    /// Machine-readable reason, stable across releases
    pub fn reason_key(&self) -> &'static str {
        match self {
            CoordinatorError::EntryNotFound(_) => "unknown_entry",
            CoordinatorError::Stopped(_) => "entry_not_running",
            CoordinatorError::UnknownArea(_) => "unknown_area",
            CoordinatorError::Config(err) => err.reason_key(),
            CoordinatorError::Thermostat(ThermostatError::HvacCommand { .. }) => {
                "hvac_command_failed"
            }
            CoordinatorError::Thermostat(ThermostatError::Storage(_))
            | CoordinatorError::Storage(_) => "storage_error",
        }
    }
}

impl From<CoordinatorError> for ServiceError {
    fn from(err: CoordinatorError) -> Self {
        match err {
            CoordinatorError::EntryNotFound(entry_id) => ServiceError::EntryNotFound(entry_id),
            other => ServiceError::CallFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_keys() {
        assert_eq!(
            CoordinatorError::EntryNotFound("x".into()).reason_key(),
            "unknown_entry"
        );
        let err = CoordinatorError::from(ConfigError::MissingThermostat {
            entry_id: "house".into(),
        });
        assert_eq!(err.reason_key(), "missing_thermostat");
    }

    #[test]
    fn test_unknown_entry_maps_to_service_error() {
        let err: ServiceError = CoordinatorError::EntryNotFound("nope".into()).into();
        assert!(matches!(err, ServiceError::EntryNotFound(id) if id == "nope"));
    }
}
