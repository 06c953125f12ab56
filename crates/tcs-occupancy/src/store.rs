//! Persisted occupancy state

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tcs_host::Storable;
use tracing::debug;

use crate::AreaOccupancy;

/// What survives a restart for one area
///
/// Timestamps are kept as raw JSON so a corrupt value only loses that field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredArea {
    #[serde(default)]
    pub area_id: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub occupancy_start_time: Option<Value>,
    #[serde(default)]
    pub was_active_before_unoccupied: bool,
    #[serde(default)]
    pub unoccupancy_start_time: Option<Value>,
}

impl StoredArea {
    pub fn from_area(area: &AreaOccupancy) -> Self {
        Self {
            area_id: area.area_id.clone(),
            is_active: area.is_active,
            occupancy_start_time: area
                .occupancy_start_time
                .map(|t| Value::String(t.to_rfc3339())),
            was_active_before_unoccupied: area.was_active_before_unoccupied,
            unoccupancy_start_time: area
                .unoccupancy_start_time
                .map(|t| Value::String(t.to_rfc3339())),
        }
    }

    /// Copy the stored fields onto `area`, skipping unparseable timestamps
    pub fn restore_into(&self, area: &mut AreaOccupancy) {
        if self.is_active {
            area.is_active = true;
        }
        if let Some(start) = parse_timestamp(&area.area_id, "occupancy_start_time", &self.occupancy_start_time) {
            area.occupancy_start_time = Some(start);
        }
        if self.was_active_before_unoccupied {
            area.was_active_before_unoccupied = true;
        }
        if let Some(start) = parse_timestamp(&area.area_id, "unoccupancy_start_time", &self.unoccupancy_start_time) {
            area.unoccupancy_start_time = Some(start);
        }
    }
}

fn parse_timestamp(area_id: &str, field: &str, value: &Option<Value>) -> Option<DateTime<Utc>> {
    let raw = match value {
        None | Some(Value::Null) => return None,
        Some(Value::String(s)) if s.is_empty() => return None,
        Some(v) => v,
    };
    let parsed = raw
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc));
    if parsed.is_none() {
        debug!(area_id = %area_id, field = %field, value = %raw, "Discarding unparseable stored timestamp");
    }
    parsed
}

/// Blob stored under `thermostat_contact_sensors.<entry_id>.occupancy`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OccupancyStore {
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub areas: IndexMap<String, StoredArea>,
}

impl Storable for OccupancyStore {
    const KEY_SUFFIX: &'static str = "occupancy";
    const VERSION: u32 = 1;
    const MINOR_VERSION: u32 = 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_trip_timestamps() {
        let now = Utc::now();
        let mut area = AreaOccupancy::new("den", "Den", vec!["binary_sensor.a".into()], vec![]);
        area.is_active = true;
        area.occupancy_start_time = Some(now);

        let stored = StoredArea::from_area(&area);
        let mut restored = AreaOccupancy::new("den", "Den", vec!["binary_sensor.a".into()], vec![]);
        stored.restore_into(&mut restored);

        assert!(restored.is_active);
        assert_eq!(
            restored.occupancy_start_time.map(|t| t.timestamp_millis()),
            Some(now.timestamp_millis())
        );
        assert!(restored.unoccupancy_start_time.is_none());
    }

    #[test]
    fn test_corrupt_timestamp_only_loses_that_field() {
        let stored: StoredArea = serde_json::from_value(json!({
            "area_id": "den",
            "is_active": true,
            "occupancy_start_time": "yesterday-ish",
            "was_active_before_unoccupied": true,
            "unoccupancy_start_time": "2024-01-15T10:00:00+00:00"
        }))
        .unwrap();

        let mut area = AreaOccupancy::new("den", "Den", vec![], vec![]);
        stored.restore_into(&mut area);

        assert!(area.is_active);
        assert!(area.occupancy_start_time.is_none());
        assert!(area.was_active_before_unoccupied);
        assert!(area.unoccupancy_start_time.is_some());

        let numeric: StoredArea =
            serde_json::from_value(json!({"occupancy_start_time": 12345})).unwrap();
        let mut area = AreaOccupancy::new("den", "Den", vec![], vec![]);
        numeric.restore_into(&mut area);
        assert!(area.occupancy_start_time.is_none());
    }
}
