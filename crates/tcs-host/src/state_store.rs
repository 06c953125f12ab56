//! Entity state storage with change notification
//!
//! The StateStore tracks the current state of every entity the host knows
//! about and broadcasts a [`StateChangedData`] for every write.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tcs_core::{Context, EntityId, EntityState, SharedClock, StateChangedData};
use tokio::sync::broadcast;
use tracing::{debug, instrument, trace};

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

pub struct StateStore {
    /// All entity states keyed by entity_id string
    states: DashMap<String, EntityState>,
    /// Index of entity_ids by domain
    domain_index: DashMap<String, Vec<String>>,
    changes: broadcast::Sender<StateChangedData>,
    clock: SharedClock,
}

impl StateStore {
    pub fn new(clock: SharedClock) -> Self {
        let (changes, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Self {
            states: DashMap::new(),
            domain_index: DashMap::new(),
            changes,
            clock,
        }
    }

    /// Set the state of an entity and broadcast the change
    ///
    /// `last_changed` only moves when the state value actually changed.
    #[instrument(skip(self, state, attributes, context), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: &EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> StateChangedData {
        let key = entity_id.to_string();
        let now = self.clock.now();
        let old_state = self.states.get(&key).map(|s| s.clone());

        let mut new_state = match &old_state {
            Some(existing) => existing.with_update(state, attributes, now, context.clone()),
            None => EntityState::new(key.clone(), state, attributes, now),
        };
        new_state.context = context.clone();

        debug!(
            state = %new_state.state,
            changed = old_state.as_ref().map(|s| s.state != new_state.state).unwrap_or(true),
            "Setting entity state"
        );

        self.states.insert(key.clone(), new_state.clone());

        if old_state.is_none() {
            self.domain_index
                .entry(entity_id.domain().to_string())
                .or_default()
                .push(key.clone());
        }

        let change = StateChangedData {
            entity_id: key,
            old_state,
            new_state: Some(new_state),
            context,
        };
        // No receivers is fine
        let _ = self.changes.send(change.clone());
        change
    }

    /// Rewrite only the attributes of an existing entity, keeping its value
    pub fn set_attributes(
        &self,
        entity_id: &EntityId,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> Option<StateChangedData> {
        let value = self.get_state(&entity_id.to_string())?;
        Some(self.set(entity_id, value, attributes, context))
    }

    pub fn get(&self, entity_id: &str) -> Option<EntityState> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// The raw state value, or None if the entity doesn't exist
    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    pub fn is_state(&self, entity_id: &str, state: &str) -> bool {
        self.get_state(entity_id).as_deref() == Some(state)
    }

    pub fn entity_ids(&self, domain: &str) -> Vec<String> {
        self.domain_index
            .get(domain)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Remove an entity, broadcasting a change with no new state
    #[instrument(skip(self, context), fields(entity_id = %entity_id))]
    pub fn remove(&self, entity_id: &EntityId, context: Context) -> Option<EntityState> {
        let key = entity_id.to_string();
        let old_state = self.states.remove(&key).map(|(_, s)| s);

        if let Some(ref state) = old_state {
            trace!("Removing entity state");
            if let Some(mut ids) = self.domain_index.get_mut(entity_id.domain()) {
                ids.retain(|id| id != &key);
            }
            let _ = self.changes.send(StateChangedData {
                entity_id: key,
                old_state: Some(state.clone()),
                new_state: None,
                context,
            });
        }

        old_state
    }

    /// Receive every change written to the store from now on
    pub fn subscribe(&self) -> broadcast::Receiver<StateChangedData> {
        self.changes.subscribe()
    }

    pub fn entity_count(&self) -> usize {
        self.states.len()
    }
}

/// Thread-safe wrapper for StateStore
pub type SharedStateStore = Arc<StateStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tcs_core::ManualClock;

    fn store() -> (StateStore, ManualClock) {
        let clock = ManualClock::new();
        (StateStore::new(Arc::new(clock.clone())), clock)
    }

    fn id(s: &str) -> EntityId {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_set_broadcasts_change() {
        let (store, _) = store();
        let mut rx = store.subscribe();

        store.set(&id("binary_sensor.front_door"), "off", HashMap::new(), Context::new());
        store.set(&id("binary_sensor.front_door"), "on", HashMap::new(), Context::new());

        let first = rx.recv().await.unwrap();
        assert!(first.old_state.is_none());
        assert_eq!(first.new_value(), Some("off"));

        let second = rx.recv().await.unwrap();
        assert_eq!(second.old_value(), Some("off"));
        assert_eq!(second.new_value(), Some("on"));
    }

    #[test]
    fn test_last_changed_uses_clock() {
        let (store, clock) = store();
        let entity = id("climate.main");
        store.set(&entity, "heat", HashMap::new(), Context::new());
        let first = store.get("climate.main").unwrap();

        clock.advance_seconds(30);
        let mut attrs = HashMap::new();
        attrs.insert("fan_mode".to_string(), json!("auto"));
        store.set_attributes(&entity, attrs, Context::new());

        let second = store.get("climate.main").unwrap();
        assert_eq!(second.state, "heat");
        assert_eq!(second.last_changed, first.last_changed);
        assert_eq!((second.last_updated - first.last_updated).num_seconds(), 30);
    }

    #[test]
    fn test_domain_index_and_remove() {
        let (store, _) = store();
        store.set(&id("cover.den_vent"), "open", HashMap::new(), Context::new());
        store.set(&id("cover.office_vent"), "closed", HashMap::new(), Context::new());
        store.set(&id("climate.main"), "off", HashMap::new(), Context::new());

        assert_eq!(store.entity_ids("cover").len(), 2);
        assert!(store.is_state("cover.den_vent", "open"));

        assert!(store.remove(&id("cover.den_vent"), Context::new()).is_some());
        assert_eq!(store.entity_ids("cover"), vec!["cover.office_vent".to_string()]);
        assert_eq!(store.entity_count(), 2);
    }
}
