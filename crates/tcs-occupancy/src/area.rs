use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Occupancy state of one area
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaOccupancy {
    pub area_id: String,
    pub area_name: String,
    pub binary_sensors: Vec<String>,
    /// Latched sensors (`previous_valid_state`)
    pub sensors: Vec<String>,

    pub occupied_binary_sensors: BTreeSet<String>,
    pub occupied_sensors: BTreeSet<String>,
    /// Start of the current continuous occupancy
    pub occupancy_start_time: Option<DateTime<Utc>>,
    pub is_active: bool,

    /// When an active area last emptied; set only during the grace period
    pub unoccupancy_start_time: Option<DateTime<Utc>>,
    pub was_active_before_unoccupied: bool,
}

impl AreaOccupancy {
    pub fn new(
        area_id: impl Into<String>,
        area_name: impl Into<String>,
        binary_sensors: Vec<String>,
        sensors: Vec<String>,
    ) -> Self {
        Self {
            area_id: area_id.into(),
            area_name: area_name.into(),
            binary_sensors,
            sensors,
            occupied_binary_sensors: BTreeSet::new(),
            occupied_sensors: BTreeSet::new(),
            occupancy_start_time: None,
            is_active: false,
            unoccupancy_start_time: None,
            was_active_before_unoccupied: false,
        }
    }

    /// Any sensor reports presence
    pub fn is_occupied(&self) -> bool {
        !self.occupied_binary_sensors.is_empty() || !self.occupied_sensors.is_empty()
    }

    pub fn is_in_grace_period(&self) -> bool {
        !self.is_occupied()
            && self.was_active_before_unoccupied
            && self.unoccupancy_start_time.is_some()
    }

    pub fn all_sensors(&self) -> impl Iterator<Item = &String> {
        self.binary_sensors.iter().chain(self.sensors.iter())
    }

    pub fn occupied_sensor_count(&self) -> usize {
        self.occupied_binary_sensors.len() + self.occupied_sensors.len()
    }

    pub fn total_sensor_count(&self) -> usize {
        self.binary_sensors.len() + self.sensors.len()
    }

    pub fn occupancy_duration(&self, now: DateTime<Utc>) -> Option<Duration> {
        if !self.is_occupied() {
            return None;
        }
        self.occupancy_start_time.map(|start| now - start)
    }

    /// Minutes of continuous occupancy, 0 when unoccupied
    pub fn occupancy_minutes(&self, now: DateTime<Utc>) -> f64 {
        self.occupancy_duration(now).map(minutes).unwrap_or(0.0)
    }

    pub fn unoccupancy_duration(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.is_occupied() {
            return None;
        }
        self.unoccupancy_start_time.map(|start| now - start)
    }

    /// Minutes since an active area emptied, 0 otherwise
    pub fn unoccupancy_minutes(&self, now: DateTime<Utc>) -> f64 {
        self.unoccupancy_duration(now).map(minutes).unwrap_or(0.0)
    }
}

fn minutes(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64 / 60_000.0
}
