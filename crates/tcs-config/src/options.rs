//! Tunable options of a config entry

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tcs_core::TemperatureUnit;

use crate::{ConfigError, ConfigResult};

/// Grace periods shorter than this are raised to it
pub const MIN_GRACE_PERIOD_MINUTES: u32 = 2;

/// How eco mode behaves while everyone is away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EcoAwayBehavior {
    /// Treat the house as if eco mode were off
    #[default]
    DisableEcoWhenAway,
    /// Keep eco mode, but judge every room against the eco away targets
    UseEcoAwayTargets,
    /// Keep eco mode unchanged; an empty house is not conditioned
    KeepEcoActive,
}

/// Options of a config entry. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Minutes a contact sensor must stay open before the HVAC pauses
    pub open_timeout: u32,
    /// Minutes all contact sensors must stay closed before the HVAC resumes
    pub close_timeout: u32,

    pub min_occupancy_minutes: u32,
    pub grace_period_minutes: u32,

    pub temperature_deadband: f64,
    pub min_cycle_on_minutes: u32,
    pub min_cycle_off_minutes: u32,
    /// Degrees below the heat target at which an unoccupied room is critical
    pub unoccupied_heating_threshold: f64,
    /// Degrees above the cool target at which an unoccupied room is critical
    pub unoccupied_cooling_threshold: f64,
    /// Added to the heat setpoint when the engine turns the HVAC on
    pub heating_boost_offset: f64,
    /// Subtracted from the cool setpoint when the engine turns the HVAC on
    pub cooling_boost_offset: f64,
    pub respect_user_off: bool,
    pub eco_mode: bool,
    pub only_track_selected_rooms: bool,
    pub eco_away_behavior: EcoAwayBehavior,
    pub eco_away_target_low: Option<f64>,
    pub eco_away_target_high: Option<f64>,
    pub default_target_low: Option<f64>,
    pub default_target_high: Option<f64>,
    pub temperature_unit: TemperatureUnit,

    /// Floor on open vents, counted in physical covers
    pub min_vents_open: u32,
    pub vent_open_delay_seconds: u32,
    pub vent_debounce_seconds: u32,

    pub notify_service: Option<String>,
    pub notify_title_paused: String,
    pub notify_message_paused: String,
    pub notify_title_resumed: String,
    pub notify_message_resumed: String,
    pub notification_tag: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            open_timeout: 5,
            close_timeout: 5,
            min_occupancy_minutes: 5,
            grace_period_minutes: 5,
            temperature_deadband: 0.5,
            min_cycle_on_minutes: 5,
            min_cycle_off_minutes: 5,
            unoccupied_heating_threshold: 3.0,
            unoccupied_cooling_threshold: 3.0,
            heating_boost_offset: 0.0,
            cooling_boost_offset: 0.0,
            respect_user_off: true,
            eco_mode: false,
            only_track_selected_rooms: false,
            eco_away_behavior: EcoAwayBehavior::default(),
            eco_away_target_low: None,
            eco_away_target_high: None,
            default_target_low: None,
            default_target_high: None,
            temperature_unit: TemperatureUnit::default(),
            min_vents_open: 5,
            vent_open_delay_seconds: 30,
            vent_debounce_seconds: 30,
            notify_service: None,
            notify_title_paused: "Thermostat · Paused".to_string(),
            notify_message_paused: "{{ trigger_sensor_name }} has been open for \
                {{ open_timeout }} minutes. Thermostat will shut down until all doors \
                and windows have been closed."
                .to_string(),
            notify_title_resumed: "Thermostat · Resumed".to_string(),
            notify_message_resumed: "All doors and windows have been closed for \
                {{ close_timeout }} minutes. Thermostat will resume normal operation \
                (restored to {{ previous_mode }} mode)."
                .to_string(),
            notification_tag: "thermostat_contact_sensors_notification".to_string(),
        }
    }
}

impl Options {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.open_timeout) * 60)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.close_timeout) * 60)
    }

    /// Grace period with the minimum applied
    pub fn effective_grace_period_minutes(&self) -> u32 {
        self.grace_period_minutes.max(MIN_GRACE_PERIOD_MINUTES)
    }

    /// Both eco away targets, when configured
    pub fn eco_away_targets(&self) -> Option<(f64, f64)> {
        Some((self.eco_away_target_low?, self.eco_away_target_high?))
    }

    /// `notify.x` and bare `x` both name the notify service `x`
    pub fn notify_service_name(&self) -> Option<&str> {
        let service = self.notify_service.as_deref()?.trim();
        let name = service.strip_prefix("notify.").unwrap_or(service);
        (!name.is_empty()).then_some(name)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        for (key, value) in [
            ("temperature_deadband", self.temperature_deadband),
            ("unoccupied_heating_threshold", self.unoccupied_heating_threshold),
            ("unoccupied_cooling_threshold", self.unoccupied_cooling_threshold),
            ("heating_boost_offset", self.heating_boost_offset),
            ("cooling_boost_offset", self.cooling_boost_offset),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::invalid(key, "must be a non-negative number"));
            }
        }

        if self.open_timeout == 0 {
            return Err(ConfigError::invalid("open_timeout", "must be at least 1 minute"));
        }
        if self.close_timeout == 0 {
            return Err(ConfigError::invalid("close_timeout", "must be at least 1 minute"));
        }

        for (key, pair) in [
            (
                "eco_away_target",
                (self.eco_away_target_low, self.eco_away_target_high),
            ),
            (
                "default_target",
                (self.default_target_low, self.default_target_high),
            ),
        ] {
            if let (Some(low), Some(high)) = pair {
                if low > high {
                    return Err(ConfigError::invalid(
                        key,
                        format!("low ({}) is above high ({})", low, high),
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let options: Options = serde_yaml::from_str("open_timeout: 2\nmin_vents_open: 3").unwrap();
        assert_eq!(options.open_timeout, 2);
        assert_eq!(options.min_vents_open, 3);
        assert_eq!(options.close_timeout, 5);
        assert_eq!(options.temperature_deadband, 0.5);
        assert_eq!(options.vent_debounce_seconds, 30);
        assert!(options.respect_user_off);
        assert_eq!(options.temperature_unit, TemperatureUnit::Fahrenheit);
        assert_eq!(options.eco_away_behavior, EcoAwayBehavior::DisableEcoWhenAway);
        assert_eq!(options.notify_title_paused, "Thermostat · Paused");
    }

    #[test]
    fn test_grace_period_is_clamped() {
        let options = Options {
            grace_period_minutes: 0,
            ..Default::default()
        };
        assert_eq!(options.effective_grace_period_minutes(), 2);
        assert_eq!(Options::default().effective_grace_period_minutes(), 5);
    }

    #[test]
    fn test_notify_service_name() {
        let mut options = Options::default();
        assert_eq!(options.notify_service_name(), None);
        options.notify_service = Some("notify.mobile_app_phone".into());
        assert_eq!(options.notify_service_name(), Some("mobile_app_phone"));
        options.notify_service = Some("family".into());
        assert_eq!(options.notify_service_name(), Some("family"));
        options.notify_service = Some("  ".into());
        assert_eq!(options.notify_service_name(), None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let options = Options {
            temperature_deadband: -1.0,
            ..Default::default()
        };
        assert_eq!(options.validate().unwrap_err().reason_key(), "invalid_value");

        let options = Options {
            eco_away_target_low: Some(75.0),
            eco_away_target_high: Some(60.0),
            ..Default::default()
        };
        assert!(options.validate().is_err());

        assert!(Options::default().validate().is_ok());
    }

    #[test]
    fn test_eco_away_behavior_names() {
        let behavior: EcoAwayBehavior = serde_yaml::from_str("use_eco_away_targets").unwrap();
        assert_eq!(behavior, EcoAwayBehavior::UseEcoAwayTargets);
    }
}
