//! Decision snapshots

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tcs_core::HvacMode;

use crate::RoomTemperatureState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThermostatAction {
    #[default]
    None,
    TurnOn,
    TurnOff,
    /// Wants off, held by the minimum on time
    WaitCycleOn,
    /// Wants on, held by the minimum off time
    WaitCycleOff,
}

impl ThermostatAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThermostatAction::None => "none",
            ThermostatAction::TurnOn => "turn_on",
            ThermostatAction::TurnOff => "turn_off",
            ThermostatAction::WaitCycleOn => "wait_cycle_on",
            ThermostatAction::WaitCycleOff => "wait_cycle_off",
        }
    }
}

/// One decision cycle. Produced by [`ThermostatController::evaluate`] and
/// never mutated afterwards.
///
/// [`ThermostatController::evaluate`]: crate::ThermostatController::evaluate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThermostatState {
    pub thermostat_entity_id: String,
    /// `None` when the thermostat is missing or reports an unknown mode
    pub hvac_mode: Option<HvacMode>,
    pub is_on: bool,

    pub target_temperature: Option<f64>,
    pub target_temp_low: Option<f64>,
    pub target_temp_high: Option<f64>,

    /// House-wide trend while the thermostat is off
    pub inferred_hvac_mode: Option<HvacMode>,
    /// Mode a TURN_ON should engage
    pub mode_to_engage: Option<HvacMode>,
    pub rooms_need_heat: bool,
    pub rooms_need_cool: bool,

    /// Active rooms and evaluated inactive rooms
    pub room_states: IndexMap<String, RoomTemperatureState>,

    pub all_active_rooms_satiated: bool,
    pub active_room_count: usize,
    pub satiated_room_count: usize,
    pub critical_room_count: usize,

    pub last_on_time: Option<DateTime<Utc>>,
    pub last_off_time: Option<DateTime<Utc>>,

    pub recommended_action: ThermostatAction,
    pub action_reason: String,
}

impl ThermostatState {
    pub fn new(thermostat_entity_id: impl Into<String>) -> Self {
        Self {
            thermostat_entity_id: thermostat_entity_id.into(),
            hvac_mode: None,
            is_on: false,
            target_temperature: None,
            target_temp_low: None,
            target_temp_high: None,
            inferred_hvac_mode: None,
            mode_to_engage: None,
            rooms_need_heat: false,
            rooms_need_cool: false,
            room_states: IndexMap::new(),
            all_active_rooms_satiated: false,
            active_room_count: 0,
            satiated_room_count: 0,
            critical_room_count: 0,
            last_on_time: None,
            last_off_time: None,
            recommended_action: ThermostatAction::None,
            action_reason: String::new(),
        }
    }

    /// Mode the vent allocator scores against: the actual mode while running,
    /// the inferred trend while off
    pub fn effective_mode(&self) -> Option<HvacMode> {
        match self.hvac_mode {
            Some(HvacMode::Off) | None => self.inferred_hvac_mode,
            mode => mode,
        }
    }

    pub(crate) fn decide(&mut self, action: ThermostatAction, reason: impl Into<String>) {
        self.recommended_action = action;
        self.action_reason = reason.into();
    }
}
