//! Config entries and their areas

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tcs_core::{domains, EntityId};
use tracing::warn;

use crate::{AreaTable, ConfigError, ConfigResult, Options};

fn default_true() -> bool {
    true
}

fn new_entry_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// One configured zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaConfig {
    pub area_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Presence sensors read from their state (`on` = occupied)
    #[serde(default)]
    pub binary_sensors: Vec<String>,
    /// Presence sensors read from their `previous_valid_state` attribute
    #[serde(default)]
    pub sensors: Vec<String>,
    #[serde(default)]
    pub temperature_sensors: Vec<String>,
    #[serde(default)]
    pub vents: Vec<String>,
    /// Overrides the entry-wide `vent_open_delay_seconds`
    #[serde(default)]
    pub vent_open_delay_seconds: Option<u32>,
    #[serde(default)]
    pub target_temp_low: Option<f64>,
    #[serde(default)]
    pub target_temp_high: Option<f64>,
    /// Counted for decisions when `only_track_selected_rooms` is on
    #[serde(default = "default_true")]
    pub track: bool,
    /// Still protected from critical temperatures when not tracked
    #[serde(default)]
    pub force_critical: bool,
}

impl AreaConfig {
    pub fn new(area_id: impl Into<String>) -> Self {
        Self {
            area_id: area_id.into(),
            name: None,
            enabled: true,
            binary_sensors: Vec::new(),
            sensors: Vec::new(),
            temperature_sensors: Vec::new(),
            vents: Vec::new(),
            vent_open_delay_seconds: None,
            target_temp_low: None,
            target_temp_high: None,
            track: true,
            force_critical: false,
        }
    }

    /// Display name, falling back to the area id
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.area_id)
    }

    pub fn has_occupancy_sensors(&self) -> bool {
        !self.binary_sensors.is_empty() || !self.sensors.is_empty()
    }

    /// Instant sensors first, then latched ones
    pub fn occupancy_sensors(&self) -> impl Iterator<Item = &String> {
        self.binary_sensors.iter().chain(self.sensors.iter())
    }
}

/// Everything one thermostat needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    #[serde(default = "new_entry_id")]
    pub entry_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub thermostat: Option<String>,
    #[serde(default)]
    pub contact_sensors: Vec<String>,
    #[serde(default)]
    pub areas: Vec<AreaConfig>,
    #[serde(default)]
    pub options: Options,
}

impl ConfigEntry {
    pub fn new(thermostat: impl Into<String>) -> Self {
        Self {
            entry_id: new_entry_id(),
            title: None,
            thermostat: Some(thermostat.into()),
            contact_sensors: Vec::new(),
            areas: Vec::new(),
            options: Options::default(),
        }
    }

    /// The thermostat entity id, or `MissingThermostat`
    pub fn thermostat_id(&self) -> ConfigResult<&str> {
        match self.thermostat.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => Ok(id),
            _ => Err(ConfigError::MissingThermostat {
                entry_id: self.entry_id.clone(),
            }),
        }
    }

    /// Check ids, domains, area uniqueness and option ranges
    pub fn validate(&self) -> ConfigResult<()> {
        let thermostat = self.thermostat_id()?;
        check_entity("thermostat", thermostat, Some(domains::CLIMATE))?;

        for sensor in &self.contact_sensors {
            check_entity("contact_sensors", sensor, None)?;
        }

        let mut seen = HashSet::new();
        for area in &self.areas {
            if area.area_id.trim().is_empty() {
                return Err(ConfigError::invalid("area_id", "must not be empty"));
            }
            if !seen.insert(area.area_id.as_str()) {
                return Err(ConfigError::DuplicateArea {
                    area_id: area.area_id.clone(),
                });
            }
            for sensor in area.occupancy_sensors() {
                check_entity("binary_sensors", sensor, None)?;
            }
            for sensor in &area.temperature_sensors {
                check_entity("temperature_sensors", sensor, None)?;
            }
            for vent in &area.vents {
                check_entity("vents", vent, Some(domains::COVER))?;
            }
            if let (Some(low), Some(high)) = (area.target_temp_low, area.target_temp_high) {
                if low > high {
                    return Err(ConfigError::invalid(
                        format!("areas.{}.target_temp_low", area.area_id),
                        format!("low ({}) is above high ({})", low, high),
                    ));
                }
            }
            if area.enabled && !area.has_occupancy_sensors() {
                warn!(
                    area_id = %area.area_id,
                    "Area has no occupancy sensors and will not be tracked"
                );
            }
        }

        self.options.validate()
    }

    /// Lookup table over the enabled areas
    pub fn area_table(&self) -> AreaTable {
        AreaTable::build(&self.areas)
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.entry_id)
    }
}

fn check_entity(key: &str, entity_id: &str, domain: Option<&'static str>) -> ConfigResult<()> {
    let parsed: EntityId = entity_id
        .parse()
        .map_err(|source| ConfigError::InvalidEntityId {
            key: key.to_string(),
            source,
        })?;
    match domain {
        Some(expected) if !parsed.is_domain(expected) => Err(ConfigError::WrongDomain {
            key: key.to_string(),
            entity_id: entity_id.to_string(),
            expected,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ConfigEntry {
        let mut entry = ConfigEntry::new("climate.main");
        entry.contact_sensors = vec!["binary_sensor.front_door".into()];
        let mut den = AreaConfig::new("den");
        den.binary_sensors = vec!["binary_sensor.den_motion".into()];
        den.vents = vec!["cover.den_vent".into()];
        entry.areas.push(den);
        entry
    }

    #[test]
    fn test_valid_entry() {
        assert!(entry().validate().is_ok());
        assert_eq!(entry().entry_id.len(), 32);
    }

    #[test]
    fn test_missing_thermostat() {
        let mut e = entry();
        e.thermostat = None;
        assert_eq!(e.validate().unwrap_err().reason_key(), "missing_thermostat");
        e.thermostat = Some("  ".into());
        assert_eq!(e.validate().unwrap_err().reason_key(), "missing_thermostat");
    }

    #[test]
    fn test_wrong_domain_and_bad_ids() {
        let mut e = entry();
        e.thermostat = Some("switch.heater".into());
        assert_eq!(e.validate().unwrap_err().reason_key(), "invalid_entity_id");

        let mut e = entry();
        e.areas[0].vents = vec!["Cover.Den".into()];
        assert_eq!(e.validate().unwrap_err().reason_key(), "invalid_entity_id");
    }

    #[test]
    fn test_duplicate_area() {
        let mut e = entry();
        e.areas.push(AreaConfig::new("den"));
        let err = e.validate().unwrap_err();
        assert_eq!(err.reason_key(), "duplicate_area");
        assert!(err.to_string().contains("den"));
    }

    #[test]
    fn test_area_display_name() {
        let mut area = AreaConfig::new("living_room");
        assert_eq!(area.display_name(), "living_room");
        area.name = Some("Living Room".into());
        assert_eq!(area.display_name(), "Living Room");
    }
}
