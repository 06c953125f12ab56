//! Events processed by a coordinator, and the updates it publishes

use std::sync::Arc;

use tcs_config::{EcoAwayBehavior, Options};
use tcs_core::StateChangedData;
use tcs_occupancy::OccupancySummary;
use tcs_thermostat::ThermostatState;
use tcs_vents::VentControlState;
use tokio::sync::oneshot;

use crate::{CoordinatorResult, PauseStatus, TimerToken};

/// Requests accepted by a running coordinator
#[derive(Debug, Clone)]
pub enum Command {
    /// Pause now, bypassing the contact sensors
    Pause,
    /// Resume now, bypassing the contact sensors
    Resume,
    Recalculate,
    PauseIntegration,
    ResumeIntegration,
    SetEcoMode(bool),
    SetOnlyTrackSelectedRooms(bool),
    SetRoomTracked { area_id: String, tracked: bool },
    SetForceCritical { area_id: String, enabled: bool },
    SetRespectUserOff(bool),
    SetEcoAwayBehavior(EcoAwayBehavior),
    SetAway(bool),
    UpdateOptions(Box<Options>),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Recalculate => "recalculate",
            Command::PauseIntegration => "pause_integration",
            Command::ResumeIntegration => "resume_integration",
            Command::SetEcoMode(_) => "set_eco_mode",
            Command::SetOnlyTrackSelectedRooms(_) => "set_only_track_selected_rooms",
            Command::SetRoomTracked { .. } => "set_room_tracked",
            Command::SetForceCritical { .. } => "set_force_critical",
            Command::SetRespectUserOff(_) => "set_respect_user_off",
            Command::SetEcoAwayBehavior(_) => "set_eco_away_behavior",
            Command::SetAway(_) => "set_away",
            Command::UpdateOptions(_) => "update_options",
        }
    }
}

#[derive(Debug)]
pub enum CoordinatorEvent {
    StateChanged(StateChangedData),
    Timer(TimerToken),
    /// The occupancy tracker changed an area
    OccupancyChanged,
    Tick,
    Command {
        command: Command,
        reply: oneshot::Sender<CoordinatorResult<()>>,
    },
}

impl From<TimerToken> for CoordinatorEvent {
    fn from(token: TimerToken) -> Self {
        CoordinatorEvent::Timer(token)
    }
}

/// Published after every evaluation cycle and pause transition
#[derive(Debug, Clone)]
pub struct CoordinatorUpdate {
    pub entry_id: String,
    pub pause: PauseStatus,
    pub thermostat: Option<Arc<ThermostatState>>,
    pub vents: Option<Arc<VentControlState>>,
    pub occupancy: Arc<OccupancySummary>,
}
