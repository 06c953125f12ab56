//! Room occupancy tracking
//!
//! An area is *occupied* while any of its presence sensors reports presence,
//! and *active* once it has been continuously occupied for
//! `min_occupancy_minutes`. An active area that empties stays active for a
//! grace period so short absences do not flap the HVAC or the vents.
//!
//! Two kinds of presence sensor are supported:
//!
//! - `binary_sensors` (instant): occupied while the state is `on`
//! - `sensors` (latched): occupied while the `previous_valid_state`
//!   attribute is `on`
//!
//! A sensor is read according to the list it is configured in, whatever its
//! domain.
//!
//! The tracker is owned by a single task. Snapshots handed out by
//! [`OccupancyTracker::get_area`] are immutable `Arc`s; the tracker replaces an
//! area's snapshot whenever it changes.

mod area;
mod sensor;
mod store;
mod tracker;

pub use area::AreaOccupancy;
pub use sensor::{is_binary_sensor_occupied, is_latched_sensor_occupied, SensorRole};
pub use store::{OccupancyStore, StoredArea};
pub use tracker::{
    AreaSummary, ListenerId, OccupancySummary, OccupancyTracker, UpdateCallback, TICK_INTERVAL,
};
