//! Per-entry coordination for thermostat contact sensors
//!
//! An [`EntryCoordinator`] ties together the occupancy tracker, the
//! thermostat decision engine and the vent allocator of one config entry, and
//! adds the contact-sensor orchestrator on top:
//!
//! - a door or window open for `open_timeout` minutes pauses the HVAC (fan to
//!   idle, mode off, remembered previous mode, notification)
//! - once every sensor has been closed for `close_timeout` minutes the
//!   previous mode is restored and the decision engine runs again
//! - turning the thermostat on by hand while paused cancels the pause
//! - pausing the integration freezes all of the above
//!
//! Each coordinator runs on its own task. Other tasks reach it through a
//! [`CoordinatorHandle`], usually looked up in the [`EntryRegistry`].

mod contacts;
mod coordinator;
mod error;
mod event;
mod handle;
mod notify;
mod pause;
mod settings;
mod timers;

pub use contacts::{is_contact_open, OpenSensors};
pub use coordinator::{vent_settings, EntryCoordinator};
pub use error::{CoordinatorError, CoordinatorResult};
pub use event::{Command, CoordinatorEvent, CoordinatorUpdate};
pub use handle::{
    register_services, CoordinatorHandle, EntryRegistry, ATTR_CONFIG_ENTRY_ID, SERVICE_PAUSE,
    SERVICE_PAUSE_INTEGRATION, SERVICE_RECALCULATE, SERVICE_RESUME, SERVICE_RESUME_INTEGRATION,
};
pub use notify::{NotificationContext, NotificationKind, Notifier};
pub use pause::{ModeObservation, PauseState, PauseStatus};
pub use settings::RoomSettings;
pub use timers::{EntryTimers, TimerKind, TimerToken};
