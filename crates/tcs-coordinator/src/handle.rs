//! Handles to running coordinators, the entry registry and the exposed services

use std::sync::Arc;

use dashmap::DashMap;
use tcs_config::{EcoAwayBehavior, Options};
use tcs_core::{ServiceCall, DOMAIN};
use tcs_host::{ServiceError, ServiceRegistry, ServiceResult};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info};

use crate::{Command, CoordinatorError, CoordinatorEvent, CoordinatorResult, CoordinatorUpdate};

/// Services registered on the host, one per exposed operation
pub const SERVICE_PAUSE: &str = "pause";
pub const SERVICE_RESUME: &str = "resume";
pub const SERVICE_RECALCULATE: &str = "recalculate";
pub const SERVICE_PAUSE_INTEGRATION: &str = "pause_integration";
pub const SERVICE_RESUME_INTEGRATION: &str = "resume_integration";

/// Payload key naming the target entry
pub const ATTR_CONFIG_ENTRY_ID: &str = "config_entry_id";

/// Sends requests to a coordinator task
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    entry_id: String,
    events: mpsc::UnboundedSender<CoordinatorEvent>,
    updates: broadcast::Sender<CoordinatorUpdate>,
}

impl CoordinatorHandle {
    pub(crate) fn new(
        entry_id: &str,
        events: mpsc::UnboundedSender<CoordinatorEvent>,
        updates: broadcast::Sender<CoordinatorUpdate>,
    ) -> Self {
        Self {
            entry_id: entry_id.to_string(),
            events,
            updates,
        }
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorUpdate> {
        self.updates.subscribe()
    }

    pub fn is_running(&self) -> bool {
        !self.events.is_closed()
    }

    /// Queue a request and wait for the coordinator to finish it
    pub async fn send(&self, command: Command) -> CoordinatorResult<()> {
        let (reply, response) = oneshot::channel();
        debug!(entry_id = %self.entry_id, command = command.name(), "Sending request");
        self.events
            .send(CoordinatorEvent::Command { command, reply })
            .map_err(|_| CoordinatorError::Stopped(self.entry_id.clone()))?;
        response
            .await
            .map_err(|_| CoordinatorError::Stopped(self.entry_id.clone()))?
    }

    pub async fn pause(&self) -> CoordinatorResult<()> {
        self.send(Command::Pause).await
    }

    pub async fn resume(&self) -> CoordinatorResult<()> {
        self.send(Command::Resume).await
    }

    pub async fn recalculate(&self) -> CoordinatorResult<()> {
        self.send(Command::Recalculate).await
    }

    pub async fn pause_integration(&self) -> CoordinatorResult<()> {
        self.send(Command::PauseIntegration).await
    }

    pub async fn resume_integration(&self) -> CoordinatorResult<()> {
        self.send(Command::ResumeIntegration).await
    }

    pub async fn set_eco_mode(&self, enabled: bool) -> CoordinatorResult<()> {
        self.send(Command::SetEcoMode(enabled)).await
    }

    pub async fn set_only_track_selected_rooms(&self, enabled: bool) -> CoordinatorResult<()> {
        self.send(Command::SetOnlyTrackSelectedRooms(enabled)).await
    }

    pub async fn set_room_tracked(&self, area_id: &str, tracked: bool) -> CoordinatorResult<()> {
        self.send(Command::SetRoomTracked {
            area_id: area_id.to_string(),
            tracked,
        })
        .await
    }

    pub async fn set_force_critical(&self, area_id: &str, enabled: bool) -> CoordinatorResult<()> {
        self.send(Command::SetForceCritical {
            area_id: area_id.to_string(),
            enabled,
        })
        .await
    }

    pub async fn set_respect_user_off(&self, enabled: bool) -> CoordinatorResult<()> {
        self.send(Command::SetRespectUserOff(enabled)).await
    }

    pub async fn set_eco_away_behavior(&self, behavior: EcoAwayBehavior) -> CoordinatorResult<()> {
        self.send(Command::SetEcoAwayBehavior(behavior)).await
    }

    pub async fn set_away(&self, away: bool) -> CoordinatorResult<()> {
        self.send(Command::SetAway(away)).await
    }

    pub async fn update_options(&self, options: Options) -> CoordinatorResult<()> {
        self.send(Command::UpdateOptions(Box::new(options))).await
    }
}

/// Running coordinators keyed by config entry id
#[derive(Debug, Default)]
pub struct EntryRegistry {
    entries: DashMap<String, CoordinatorHandle>,
}

impl EntryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: CoordinatorHandle) {
        info!(entry_id = %handle.entry_id, "Registered coordinator");
        self.entries.insert(handle.entry_id.clone(), handle);
    }

    pub fn remove(&self, entry_id: &str) -> Option<CoordinatorHandle> {
        self.entries.remove(entry_id).map(|(_, handle)| handle)
    }

    pub fn get(&self, entry_id: &str) -> CoordinatorResult<CoordinatorHandle> {
        self.entries
            .get(entry_id)
            .map(|h| h.clone())
            .ok_or_else(|| CoordinatorError::EntryNotFound(entry_id.to_string()))
    }

    pub fn entry_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub async fn pause(&self, entry_id: &str) -> CoordinatorResult<()> {
        self.get(entry_id)?.pause().await
    }

    pub async fn resume(&self, entry_id: &str) -> CoordinatorResult<()> {
        self.get(entry_id)?.resume().await
    }

    pub async fn recalculate(&self, entry_id: &str) -> CoordinatorResult<()> {
        self.get(entry_id)?.recalculate().await
    }

    pub async fn pause_integration(&self, entry_id: &str) -> CoordinatorResult<()> {
        self.get(entry_id)?.pause_integration().await
    }

    pub async fn resume_integration(&self, entry_id: &str) -> CoordinatorResult<()> {
        self.get(entry_id)?.resume_integration().await
    }
}

/// Expose the entry operations as host services under [`DOMAIN`]
///
/// Every service takes `{"config_entry_id": "..."}`.
pub fn register_services(services: &ServiceRegistry, entries: Arc<EntryRegistry>) {
    for (service, command) in [
        (SERVICE_PAUSE, Command::Pause),
        (SERVICE_RESUME, Command::Resume),
        (SERVICE_RECALCULATE, Command::Recalculate),
        (SERVICE_PAUSE_INTEGRATION, Command::PauseIntegration),
        (SERVICE_RESUME_INTEGRATION, Command::ResumeIntegration),
    ] {
        let entries = entries.clone();
        services.register(DOMAIN, service, move |call| {
            call_entry(entries.clone(), command.clone(), call)
        });
    }
    info!(domain = DOMAIN, "Registered entry services");
}

async fn call_entry(entries: Arc<EntryRegistry>, command: Command, call: ServiceCall) -> ServiceResult {
    let entry_id: String = call.get(ATTR_CONFIG_ENTRY_ID).ok_or_else(|| {
        ServiceError::InvalidData(format!("missing '{}'", ATTR_CONFIG_ENTRY_ID))
    })?;
    entries.get(&entry_id)?.send(command).await?;
    Ok(None)
}
