use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

/// One vent entity, possibly a group of physical covers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VentState {
    pub entity_id: String,
    pub area_id: String,
    pub is_group: bool,
    /// Physical vents behind this entity; 1 unless a group
    pub member_count: usize,
    pub is_open: bool,
    pub should_be_open: bool,
    pub last_command_time: Option<DateTime<Utc>>,
    pub open_reason: Option<String>,
    pub is_unresponsive: bool,
}

/// Vents of one area and why they should be open or closed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaVentState {
    pub area_id: String,
    pub area_name: String,
    pub vents: Vec<VentState>,
    /// Sum of member counts
    pub total_vent_count: usize,
    pub open_vent_count: usize,
    pub should_open: bool,
    pub open_reason: String,

    pub is_active: bool,
    pub is_occupied: bool,
    pub is_critical: bool,
    pub is_satiated: bool,
    pub occupancy_start_time: Option<DateTime<Utc>>,
    pub distance_from_target: Option<f64>,
    pub determining_temperature: Option<f64>,
}

/// A tilt command the allocator wants sent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VentCommand {
    pub entity_id: String,
    pub should_open: bool,
    pub reason: String,
}

/// Snapshot of one allocation cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VentControlState {
    pub total_vents: usize,
    pub open_vents: usize,
    pub vents_should_be_open: usize,
    pub min_vents_open: usize,
    pub area_states: IndexMap<String, AreaVentState>,
    pub pending_commands: Vec<VentCommand>,
}

impl VentControlState {
    pub fn vents(&self) -> impl Iterator<Item = &VentState> {
        self.area_states.values().flat_map(|a| a.vents.iter())
    }

    pub fn vent(&self, entity_id: &str) -> Option<&VentState> {
        self.vents().find(|v| v.entity_id == entity_id)
    }
}
