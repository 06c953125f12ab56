//! Persisted controller state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tcs_host::Storable;

/// Blob stored under `thermostat_contact_sensors.<entry_id>.thermostat_control`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermostatControlStore {
    pub we_turned_off: bool,
    pub previous_hvac_mode: Option<String>,
    pub previous_fan_mode: Option<String>,
    pub we_changed_fan_mode: bool,
    pub stored_target_temp: Option<f64>,
    pub stored_target_temp_low: Option<f64>,
    pub stored_target_temp_high: Option<f64>,
    pub last_on_time: Option<DateTime<Utc>>,
    pub last_off_time: Option<DateTime<Utc>>,
    pub saved_at: Option<DateTime<Utc>>,
}

impl Storable for ThermostatControlStore {
    const KEY_SUFFIX: &'static str = "thermostat_control";
    const VERSION: u32 = 1;
    const MINOR_VERSION: u32 = 1;
}
