//! Reading presence from sensor states

use tcs_core::{attrs, EntityState, STATE_ON};

/// A binary sensor is occupied while `on`
pub fn is_binary_sensor_occupied(state: Option<&EntityState>) -> bool {
    match state {
        Some(s) if !s.has_no_value() => s.is_on(),
        _ => false,
    }
}

/// A latched sensor is occupied while its `previous_valid_state` is `on`
///
/// The primary value is ignored, except that an unavailable or unknown sensor
/// never counts as occupied.
pub fn is_latched_sensor_occupied(state: Option<&EntityState>) -> bool {
    match state {
        Some(s) if !s.has_no_value() => {
            s.attribute::<String>(attrs::PREVIOUS_VALID_STATE).as_deref() == Some(STATE_ON)
        }
        _ => false,
    }
}

/// Which configured list a presence sensor belongs to
///
/// The role decides how the state is read; the entity's domain is not
/// consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorRole {
    /// Listed under `binary_sensors`
    Instant,
    /// Listed under `sensors`
    Latched,
}

impl SensorRole {
    pub fn is_occupied(self, state: Option<&EntityState>) -> bool {
        match self {
            SensorRole::Instant => is_binary_sensor_occupied(state),
            SensorRole::Latched => is_latched_sensor_occupied(state),
        }
    }
}
