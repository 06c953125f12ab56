//! HVAC and fan mode vocabulary of climate devices

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// `supported_features` bit advertising fan-mode control
pub const FEATURE_FAN_MODE: u64 = 8;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown hvac mode: {0}")]
pub struct HvacModeParseError(pub String);

/// Operating mode of a climate device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    Off,
    Heat,
    Cool,
    /// Dual setpoint
    HeatCool,
    Auto,
    Dry,
    FanOnly,
}

impl HvacMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HvacMode::Off => "off",
            HvacMode::Heat => "heat",
            HvacMode::Cool => "cool",
            HvacMode::HeatCool => "heat_cool",
            HvacMode::Auto => "auto",
            HvacMode::Dry => "dry",
            HvacMode::FanOnly => "fan_only",
        }
    }

    pub fn is_off(&self) -> bool {
        matches!(self, HvacMode::Off)
    }
}

impl FromStr for HvacMode {
    type Err = HvacModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "off" => HvacMode::Off,
            "heat" => HvacMode::Heat,
            "cool" => HvacMode::Cool,
            "heat_cool" => HvacMode::HeatCool,
            "auto" => HvacMode::Auto,
            "dry" => HvacMode::Dry,
            "fan_only" => HvacMode::FanOnly,
            other => return Err(HvacModeParseError(other.to_string())),
        })
    }
}

impl fmt::Display for HvacMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fan mode selection helpers
///
/// Fan modes are free-form strings on the device, so these only rank the
/// names the device advertises in its `fan_modes` attribute.
pub struct FanMode;

impl FanMode {
    pub const ON: &'static str = "on";
    pub const OFF: &'static str = "off";
    pub const AUTO: &'static str = "auto";

    /// Highest-airflow mode to use while conditioning
    pub fn best_on_mode(available: &[String]) -> Option<String> {
        [Self::ON, "high", "medium", "low"]
            .iter()
            .find(|mode| available.iter().any(|a| a == *mode))
            .map(|mode| mode.to_string())
            .or_else(|| available.first().cloned())
    }

    /// Mode to use while idle: `auto`, else `off`, else nothing
    pub fn best_idle_mode(available: &[String]) -> Option<String> {
        [Self::AUTO, Self::OFF]
            .iter()
            .find(|mode| available.iter().any(|a| a == *mode))
            .map(|mode| mode.to_string())
    }
}
