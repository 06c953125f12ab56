//! Thermostat decision engine
//!
//! Every evaluation cycle the engine reads room temperatures, decides which
//! active rooms are satiated and which inactive rooms have drifted into a
//! critical range, infers a heating or cooling trend when the thermostat is
//! off, and recommends one of [`ThermostatAction`]. Cycle protection keeps the
//! compressor from short-cycling; recommendations are carried out by
//! [`ThermostatController::execute`].

mod controller;
mod error;
mod reading;
mod registry;
mod room;
mod state;
mod store;

pub use controller::{
    ControllerSettings, EvaluationInput, RoomInput, ThermostatController, ThermostatSummary,
};
pub use error::{ThermostatError, ThermostatResult};
pub use reading::{
    determine_rooms_need_mode, determining_reading, infer_effective_hvac_mode,
    is_room_satiated_for_heat, is_room_satiated_for_heat_cool, is_room_satiated_for_cool,
    temperature_from_state, NeedInput, NeedThresholds, Purpose, Reading, Readings,
};
pub use registry::{AreaThermostats, SharedRegistry, TargetRange, VirtualThermostatRegistry};
pub use room::{
    evaluate_room_critical, evaluate_room_satiation, AreaTargets, CriticalThresholds,
    RoomTemperatureState, SatiationReason,
};
pub use state::{ThermostatAction, ThermostatState};
pub use store::ThermostatControlStore;
