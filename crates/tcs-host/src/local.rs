//! In-process host with simulated climate and cover devices

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use serde_json::{json, Value};
use tcs_core::{
    attrs, domains, services, Context, EntityId, EntityIdError, EntityState, ServiceCall,
    SharedClock, StateChangedData,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, instrument, warn};

use crate::{
    Host, ServiceError, ServiceRegistry, ServiceResult, SharedServiceRegistry, SharedStateStore,
    StateChangeStream, StateStore, Storage, StorageFile, StorageResult,
};

enum Backend {
    Memory(DashMap<String, StorageFile<Value>>),
    Disk(Storage),
}

/// A host that keeps entity state in memory
///
/// `climate.set_hvac_mode`, `climate.set_fan_mode`, `climate.set_temperature`,
/// `cover.open_cover_tilt` and `cover.close_cover_tilt` update the targeted
/// entities. Any `notify.*` service is accepted. Every call is recorded, and
/// individual services can be made to fail.
pub struct LocalHost {
    states: SharedStateStore,
    services: SharedServiceRegistry,
    backend: Backend,
    calls: Mutex<Vec<ServiceCall>>,
    failures: DashMap<String, String>,
}

impl LocalHost {
    /// Host with in-memory storage
    pub fn new(clock: SharedClock) -> Self {
        Self::build(clock, Backend::Memory(DashMap::new()))
    }

    /// Host persisting to `.storage/` on disk
    pub fn with_storage(clock: SharedClock, storage: Storage) -> Self {
        Self::build(clock, Backend::Disk(storage))
    }

    fn build(clock: SharedClock, backend: Backend) -> Self {
        let states = Arc::new(StateStore::new(clock));
        let services = Arc::new(ServiceRegistry::new());
        register_device_services(&services, &states);

        Self {
            states,
            services,
            backend,
            calls: Mutex::new(Vec::new()),
            failures: DashMap::new(),
        }
    }

    pub fn states(&self) -> &SharedStateStore {
        &self.states
    }

    /// The registry exposed operations are registered on
    pub fn services(&self) -> &SharedServiceRegistry {
        &self.services
    }

    /// Set an entity's state as if a device reported it
    pub fn set_state(
        &self,
        entity_id: &str,
        state: &str,
        attributes: HashMap<String, Value>,
    ) -> Result<StateChangedData, EntityIdError> {
        let entity_id: EntityId = entity_id.parse()?;
        Ok(self.states.set(&entity_id, state, attributes, Context::new()))
    }

    /// Change an entity's value, keeping its current attributes
    pub fn set_value(&self, entity_id: &str, state: &str) -> Result<StateChangedData, EntityIdError> {
        let attributes = self
            .states
            .get(entity_id)
            .map(|s| s.attributes)
            .unwrap_or_default();
        self.set_state(entity_id, state, attributes)
    }

    /// Make `domain.service` fail with `message` until cleared
    pub fn fail_service(&self, domain: &str, service: &str, message: impl Into<String>) {
        self.failures
            .insert(format!("{}.{}", domain, service), message.into());
    }

    pub fn clear_failures(&self) {
        self.failures.clear();
    }

    /// Every service call made so far
    pub fn recorded_calls(&self) -> Vec<ServiceCall> {
        self.lock_calls().clone()
    }

    /// Recorded calls to one service
    pub fn calls_to(&self, domain: &str, service: &str) -> Vec<ServiceCall> {
        self.lock_calls()
            .iter()
            .filter(|c| c.domain == domain && c.service == service)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock_calls().clear();
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<ServiceCall>> {
        match self.calls.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl Host for LocalHost {
    fn read_state(&self, entity_id: &str) -> Option<EntityState> {
        self.states.get(entity_id)
    }

    #[instrument(skip(self, data, context))]
    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: Value,
        context: Context,
    ) -> ServiceResult {
        self.lock_calls().push(ServiceCall::new(
            domain,
            service,
            data.clone(),
            context.clone(),
        ));

        if let Some(message) = self.failures.get(&format!("{}.{}", domain, service)) {
            warn!(domain = %domain, service = %service, "Injected service failure");
            return Err(ServiceError::CallFailed(message.clone()));
        }

        if domain == domains::NOTIFY && !self.services.has_service(domain, service) {
            info!(service = %service, title = ?data.get("title"), "Notification");
            return Ok(None);
        }

        self.services.call(domain, service, data, context).await
    }

    fn subscribe_state_changes(&self, entity_ids: &[String]) -> StateChangeStream {
        let wanted: HashSet<String> = entity_ids.iter().cloned().collect();
        let rx = self.states.subscribe();

        futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(change) => return Some((change, rx)),
                    Err(RecvError::Lagged(n)) => {
                        warn!("State change subscriber lagged by {} events", n);
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
        .filter(move |change| futures::future::ready(wanted.contains(&change.entity_id)))
        .boxed()
    }

    async fn persist(&self, file: StorageFile<Value>) -> StorageResult<()> {
        match &self.backend {
            Backend::Memory(map) => {
                debug!(key = %file.key, "Persisting in memory");
                map.insert(file.key.clone(), file);
                Ok(())
            }
            Backend::Disk(storage) => storage.save(&file).await,
        }
    }

    async fn load(&self, key: &str) -> StorageResult<Option<StorageFile<Value>>> {
        match &self.backend {
            Backend::Memory(map) => Ok(map.get(key).map(|f| f.clone())),
            Backend::Disk(storage) => storage.load(key).await,
        }
    }
}

/// Register the simulated climate and cover services on `registry`
fn register_device_services(registry: &ServiceRegistry, states: &SharedStateStore) {
    let store = states.clone();
    registry.register(domains::CLIMATE, services::SET_HVAC_MODE, move |call| {
        set_hvac_mode(store.clone(), call)
    });
    let store = states.clone();
    registry.register(domains::CLIMATE, services::SET_FAN_MODE, move |call| {
        set_fan_mode(store.clone(), call)
    });
    let store = states.clone();
    registry.register(domains::CLIMATE, services::SET_TEMPERATURE, move |call| {
        set_temperature(store.clone(), call)
    });
    let store = states.clone();
    registry.register(domains::COVER, services::OPEN_COVER_TILT, move |call| {
        move_tilt(store.clone(), call, "open", 100)
    });
    let store = states.clone();
    registry.register(domains::COVER, services::CLOSE_COVER_TILT, move |call| {
        move_tilt(store.clone(), call, "closed", 0)
    });
}

async fn set_hvac_mode(store: SharedStateStore, call: ServiceCall) -> ServiceResult {
    let mode: String = call
        .get("hvac_mode")
        .ok_or_else(|| ServiceError::InvalidData("hvac_mode is required".into()))?;
    for entity_id in targets(&call)? {
        let current = existing(&store, &entity_id)?;
        store.set(&entity_id, mode.clone(), current.attributes, call.context.clone());
    }
    Ok(None)
}

async fn set_fan_mode(store: SharedStateStore, call: ServiceCall) -> ServiceResult {
    let fan_mode: String = call
        .get("fan_mode")
        .ok_or_else(|| ServiceError::InvalidData("fan_mode is required".into()))?;
    for entity_id in targets(&call)? {
        let mut attributes = existing(&store, &entity_id)?.attributes;
        attributes.insert(attrs::FAN_MODE.to_string(), json!(fan_mode));
        store.set_attributes(&entity_id, attributes, call.context.clone());
    }
    Ok(None)
}

async fn set_temperature(store: SharedStateStore, call: ServiceCall) -> ServiceResult {
    for entity_id in targets(&call)? {
        let mut attributes = existing(&store, &entity_id)?.attributes;
        for key in [attrs::TEMPERATURE, attrs::TARGET_TEMP_LOW, attrs::TARGET_TEMP_HIGH] {
            if let Some(value) = call.data.get(key) {
                attributes.insert(key.to_string(), value.clone());
            }
        }
        store.set_attributes(&entity_id, attributes, call.context.clone());
    }
    Ok(None)
}

async fn move_tilt(
    store: SharedStateStore,
    call: ServiceCall,
    state: &'static str,
    position: u8,
) -> ServiceResult {
    for entity_id in targets(&call)? {
        let current = existing(&store, &entity_id)?;
        // Groups move their members too
        let members: Vec<String> = current.attribute(attrs::ENTITY_ID).unwrap_or_default();
        for member in members {
            if let (Ok(member_id), Some(member_state)) =
                (member.parse::<EntityId>(), store.get(&member))
            {
                set_tilt(&store, &member_id, member_state, state, position, &call);
            }
        }
        set_tilt(&store, &entity_id, current, state, position, &call);
    }
    Ok(None)
}

fn set_tilt(
    store: &StateStore,
    entity_id: &EntityId,
    current: EntityState,
    state: &str,
    position: u8,
    call: &ServiceCall,
) {
    let mut attributes = current.attributes;
    attributes.insert(attrs::CURRENT_TILT_POSITION.to_string(), json!(position));
    store.set(entity_id, state, attributes, call.context.clone());
}

fn targets(call: &ServiceCall) -> Result<Vec<EntityId>, ServiceError> {
    let ids = call.entity_ids();
    if ids.is_empty() {
        return Err(ServiceError::InvalidData("entity_id is required".into()));
    }
    ids.iter()
        .map(|id| {
            id.parse::<EntityId>()
                .map_err(|e| ServiceError::InvalidData(e.to_string()))
        })
        .collect()
}

fn existing(store: &StateStore, entity_id: &EntityId) -> Result<EntityState, ServiceError> {
    store
        .get(&entity_id.to_string())
        .ok_or_else(|| ServiceError::CallFailed(format!("unknown entity {}", entity_id)))
}
