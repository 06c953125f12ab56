//! Vent allocation
//!
//! Decides per area whether its vents should be open, then enforces a floor
//! of open vent members so the ducts never back up. Vent groups count once
//! per member. Commands to the same vent are debounced, and vents that stop
//! responding are eventually skipped.

mod controller;
mod priority;
mod state;

pub use controller::{
    AreaVentInput, VentController, VentSettings, VentSummary, CONFIRMATION_TIMEOUT_SECONDS,
    MAX_COMMAND_ATTEMPTS,
};
pub use priority::{priority_score, ScoringContext};
pub use state::{AreaVentState, VentCommand, VentControlState, VentState};
