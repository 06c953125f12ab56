//! Core types for the thermostat contact sensors engine
//!
//! This crate provides the vocabulary shared by every other crate in the
//! workspace: entity ids, entity state snapshots, the HVAC mode and fan mode
//! names understood by climate devices, temperature units, state-change event
//! data, service-call records, and the injectable [`Clock`].

mod clock;
mod context;
mod entity_id;
mod event;
pub mod hvac;
mod service_call;
mod state;
mod units;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use context::Context;
pub use entity_id::{EntityId, EntityIdError};
pub use event::StateChangedData;
pub use hvac::{FanMode, HvacMode, HvacModeParseError};
pub use service_call::ServiceCall;
pub use state::EntityState;
pub use units::TemperatureUnit;

/// Integration domain, used for storage keys and exposed services
pub const DOMAIN: &str = "thermostat_contact_sensors";

/// State value of an entity the host cannot reach
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// State value of an entity whose value is not known yet
pub const STATE_UNKNOWN: &str = "unknown";

/// "On" state for binary sensors (contact open, presence detected)
pub const STATE_ON: &str = "on";

/// "Off" state for binary sensors
pub const STATE_OFF: &str = "off";

/// Well-known entity domains
pub mod domains {
    pub const BINARY_SENSOR: &str = "binary_sensor";
    pub const SENSOR: &str = "sensor";
    pub const CLIMATE: &str = "climate";
    pub const COVER: &str = "cover";
    pub const NOTIFY: &str = "notify";
}

/// Well-known attribute keys read from host entities
pub mod attrs {
    pub const FRIENDLY_NAME: &str = "friendly_name";
    /// Member list of a group entity
    pub const ENTITY_ID: &str = "entity_id";
    pub const PREVIOUS_VALID_STATE: &str = "previous_valid_state";
    pub const CURRENT_TILT_POSITION: &str = "current_tilt_position";
    pub const TEMPERATURE: &str = "temperature";
    pub const TARGET_TEMP_LOW: &str = "target_temp_low";
    pub const TARGET_TEMP_HIGH: &str = "target_temp_high";
    pub const SUPPORTED_FEATURES: &str = "supported_features";
    pub const FAN_MODE: &str = "fan_mode";
    pub const FAN_MODES: &str = "fan_modes";
    pub const HVAC_MODE: &str = "hvac_mode";
}

/// Service names invoked on host entities
pub mod services {
    pub const SET_HVAC_MODE: &str = "set_hvac_mode";
    pub const SET_FAN_MODE: &str = "set_fan_mode";
    pub const SET_TEMPERATURE: &str = "set_temperature";
    pub const OPEN_COVER_TILT: &str = "open_cover_tilt";
    pub const CLOSE_COVER_TILT: &str = "close_cover_tilt";
}
