//! Configuration for thermostat contact sensors
//!
//! A configuration file holds one or more config entries. Each entry owns a
//! physical thermostat, the contact sensors that can pause it, and the areas
//! (rooms) whose occupancy, temperature sensors and vents drive it.
//!
//! ```yaml
//! entries:
//!   - entry_id: house
//!     thermostat: climate.main
//!     contact_sensors: [binary_sensor.front_door, binary_sensor.den_window]
//!     areas:
//!       - area_id: den
//!         binary_sensors: [binary_sensor.den_motion]
//!         temperature_sensors: [sensor.den_temperature]
//!         vents: [cover.den_vent]
//!     options:
//!       open_timeout: 5
//!       min_vents_open: 5
//! ```

mod area_table;
mod entry;
mod error;
mod loader;
mod options;

pub use area_table::{AreaTable, EntityRole};
pub use entry::{AreaConfig, ConfigEntry};
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_entries, parse_entries};
pub use options::{EcoAwayBehavior, Options, MIN_GRACE_PERIOD_MINUTES};
