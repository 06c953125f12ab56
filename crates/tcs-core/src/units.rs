//! Temperature unit of a deployment

use serde::{Deserialize, Serialize};

/// Unit the temperature sensors and setpoints are reported in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureUnit {
    Celsius,
    #[default]
    Fahrenheit,
}

impl TemperatureUnit {
    /// Convert a reading in this unit to Fahrenheit
    pub fn to_fahrenheit(&self, value: f64) -> f64 {
        match self {
            TemperatureUnit::Celsius => value * 9.0 / 5.0 + 32.0,
            TemperatureUnit::Fahrenheit => value,
        }
    }

    /// Convert a temperature *difference* in this unit to Fahrenheit degrees
    pub fn delta_to_fahrenheit(&self, delta: f64) -> f64 {
        match self {
            TemperatureUnit::Celsius => delta * 9.0 / 5.0,
            TemperatureUnit::Fahrenheit => delta,
        }
    }
}
