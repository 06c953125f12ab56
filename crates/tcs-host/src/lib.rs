//! Host collaborator for the thermostat contact sensors engine
//!
//! The engine never talks to devices directly. Everything it observes or
//! changes goes through the [`Host`] trait: reading entity state, calling
//! services, subscribing to state changes, and persisting versioned blobs.
//!
//! [`LocalHost`] is a self-contained implementation built from a
//! [`StateStore`], a [`ServiceRegistry`] and [`Storage`]. It simulates the
//! climate and cover services the engine uses, which makes it suitable both
//! for the standalone binary and for tests.
//!
//! Timers are provided separately through the [`Scheduler`] trait.

mod host;
mod local;
mod scheduler;
mod services;
mod state_store;
mod storage;

pub use host::{Host, SharedHost, StateChangeStream};
pub use local::LocalHost;
pub use scheduler::{ManualScheduler, Scheduler, TimerHandle, TokioScheduler};
pub use services::{
    ServiceError, ServiceFuture, ServiceHandler, ServiceRegistry, ServiceResult,
    SharedServiceRegistry,
};
pub use state_store::{SharedStateStore, StateStore};
pub use storage::{
    decode_with_migration, MigrationFn, Storable, Storage, StorageError, StorageFile, StorageResult,
};
