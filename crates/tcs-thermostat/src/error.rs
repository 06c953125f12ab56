//! Decision engine errors

use tcs_host::{ServiceError, StorageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThermostatError {
    /// The HVAC-mode command failed; the device may not match the recorded state
    #[error("failed to set hvac mode on {entity_id}: {source}")]
    HvacCommand {
        entity_id: String,
        #[source]
        source: ServiceError,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type ThermostatResult<T> = Result<T, ThermostatError>;
