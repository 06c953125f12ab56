//! The per-entry occupancy tracker

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tcs_config::{AreaTable, MIN_GRACE_PERIOD_MINUTES};
use tcs_core::{SharedClock, StateChangedData};
use tcs_host::{decode_with_migration, SharedHost, Storable, StorageResult};
use tracing::{debug, info, instrument, warn};

use crate::sensor::SensorRole;
use crate::{AreaOccupancy, OccupancyStore, StoredArea};

/// How often active status is re-derived without any sensor event
pub const TICK_INTERVAL: StdDuration = StdDuration::from_secs(30);

/// Identifies a registered update callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Called after every occupancy change
pub type UpdateCallback = Box<dyn Fn() + Send + Sync>;

/// Tracks occupancy for every enabled area that has presence sensors
pub struct OccupancyTracker {
    host: SharedHost,
    clock: SharedClock,
    entry_id: String,
    min_occupancy_minutes: u32,
    grace_period_minutes: u32,
    areas: IndexMap<String, Arc<AreaOccupancy>>,
    /// sensor entity id -> (area id, configured role)
    sensor_index: HashMap<String, (String, SensorRole)>,
    listeners: Vec<(ListenerId, UpdateCallback)>,
    next_listener_id: u64,
}

impl OccupancyTracker {
    pub fn new(
        host: SharedHost,
        clock: SharedClock,
        entry_id: impl Into<String>,
        areas: &AreaTable,
        min_occupancy_minutes: u32,
        grace_period_minutes: u32,
    ) -> Self {
        let mut tracker = Self {
            host,
            clock,
            entry_id: entry_id.into(),
            min_occupancy_minutes,
            grace_period_minutes: grace_period_minutes.max(MIN_GRACE_PERIOD_MINUTES),
            areas: IndexMap::new(),
            sensor_index: HashMap::new(),
            listeners: Vec::new(),
            next_listener_id: 1,
        };
        tracker.build_area_tracking(areas);
        tracker
    }

    fn build_area_tracking(&mut self, table: &AreaTable) {
        let previous = std::mem::take(&mut self.areas);
        self.sensor_index.clear();

        for config in table.iter().filter(|a| a.has_occupancy_sensors()) {
            let mut area = AreaOccupancy::new(
                config.area_id.clone(),
                config.display_name(),
                config.binary_sensors.clone(),
                config.sensors.clone(),
            );
            // Timing survives a rebuild; sensor sets are rescanned
            if let Some(old) = previous.get(&config.area_id) {
                area.occupancy_start_time = old.occupancy_start_time;
                area.is_active = old.is_active;
                area.unoccupancy_start_time = old.unoccupancy_start_time;
                area.was_active_before_unoccupied = old.was_active_before_unoccupied;
                area.occupied_binary_sensors = old.occupied_binary_sensors.clone();
                area.occupied_sensors = old.occupied_sensors.clone();
            }
            for sensor in &area.binary_sensors {
                self.sensor_index
                    .insert(sensor.clone(), (config.area_id.clone(), SensorRole::Instant));
            }
            for sensor in &area.sensors {
                self.sensor_index
                    .insert(sensor.clone(), (config.area_id.clone(), SensorRole::Latched));
            }
            self.areas.insert(config.area_id.clone(), Arc::new(area));
        }

        debug!(
            areas = self.areas.len(),
            sensors = self.sensor_index.len(),
            "Built occupancy tracking"
        );
    }

    pub fn min_occupancy_minutes(&self) -> u32 {
        self.min_occupancy_minutes
    }

    pub fn set_min_occupancy_minutes(&mut self, minutes: u32) {
        self.min_occupancy_minutes = minutes;
        self.update_all_active_status();
    }

    pub fn grace_period_minutes(&self) -> u32 {
        self.grace_period_minutes
    }

    /// Set the grace period; values below the minimum are raised to it
    pub fn set_grace_period_minutes(&mut self, minutes: u32) {
        self.grace_period_minutes = minutes.max(MIN_GRACE_PERIOD_MINUTES);
        self.update_all_active_status();
    }

    pub fn areas(&self) -> &IndexMap<String, Arc<AreaOccupancy>> {
        &self.areas
    }

    pub fn get_area(&self, area_id: &str) -> Option<Arc<AreaOccupancy>> {
        self.areas.get(area_id).cloned()
    }

    /// Every presence sensor of every tracked area
    pub fn tracked_sensors(&self) -> Vec<String> {
        self.areas
            .values()
            .flat_map(|a| a.all_sensors().cloned().collect::<Vec<_>>())
            .collect()
    }

    pub fn occupied_areas(&self) -> Vec<Arc<AreaOccupancy>> {
        self.filtered(|a| a.is_occupied())
    }

    pub fn active_areas(&self) -> Vec<Arc<AreaOccupancy>> {
        self.filtered(|a| a.is_active)
    }

    pub fn inactive_areas(&self) -> Vec<Arc<AreaOccupancy>> {
        self.filtered(|a| !a.is_active)
    }

    pub fn any_area_occupied(&self) -> bool {
        self.areas.values().any(|a| a.is_occupied())
    }

    pub fn any_area_active(&self) -> bool {
        self.areas.values().any(|a| a.is_active)
    }

    fn filtered(&self, keep: impl Fn(&AreaOccupancy) -> bool) -> Vec<Arc<AreaOccupancy>> {
        self.areas.values().filter(|a| keep(a)).cloned().collect()
    }

    /// Restore persisted state, then scan every sensor
    ///
    /// The caller subscribes to [`tracked_sensors`](Self::tracked_sensors) and
    /// calls [`force_update_active_status`](Self::force_update_active_status)
    /// every [`TICK_INTERVAL`].
    #[instrument(skip(self), fields(entry_id = %self.entry_id))]
    pub async fn setup(&mut self) {
        self.restore_state().await;

        let now = self.clock.now();
        let ids: Vec<String> = self.areas.keys().cloned().collect();
        for area_id in ids {
            self.update_area_occupancy(&area_id, now);
            // A restored start time only makes sense for a room that is occupied now
            if let Some(area) = self.areas.get_mut(&area_id) {
                if !area.is_occupied() && area.occupancy_start_time.is_some() {
                    Arc::make_mut(area).occupancy_start_time = None;
                }
            }
        }

        debug!(
            sensors = self.sensor_index.len(),
            areas = self.areas.len(),
            "Occupancy tracker setup complete"
        );
    }

    /// Persist state for the next start
    #[instrument(skip(self), fields(entry_id = %self.entry_id))]
    pub async fn shutdown(&mut self) -> StorageResult<()> {
        self.save_state().await?;
        debug!("Occupancy tracker shut down");
        Ok(())
    }

    pub async fn save_state(&self) -> StorageResult<()> {
        let store = OccupancyStore {
            saved_at: Some(self.clock.now()),
            areas: self
                .areas
                .iter()
                .map(|(id, area)| (id.clone(), StoredArea::from_area(area)))
                .collect(),
        };
        self.host.persist(store.to_storage_file(&self.entry_id)?).await?;
        debug!(areas = self.areas.len(), "Saved occupancy state");
        Ok(())
    }

    async fn restore_state(&mut self) {
        let key = OccupancyStore::storage_key(&self.entry_id);
        let file = match self.host.load(&key).await {
            Ok(Some(file)) => file,
            Ok(None) => {
                debug!("No stored occupancy state found");
                return;
            }
            Err(err) => {
                warn!(error = %err, "Failed to load occupancy state");
                return;
            }
        };

        let stored: OccupancyStore = match decode_with_migration(file, None) {
            Ok(stored) => stored,
            Err(err) => {
                warn!(error = %err, "Discarding unreadable occupancy state");
                return;
            }
        };

        let mut restored = 0;
        for (area_id, data) in &stored.areas {
            match self.areas.get_mut(area_id) {
                Some(area) => {
                    data.restore_into(Arc::make_mut(area));
                    restored += 1;
                }
                None => debug!(area_id = %area_id, "Dropping stored state for unknown area"),
            }
        }

        info!(
            restored,
            saved_at = ?stored.saved_at,
            "Restored occupancy state"
        );
    }

    /// Rebuild tracking from a new area table and rescan
    pub fn update_config(&mut self, table: &AreaTable) {
        self.build_area_tracking(table);
        let now = self.clock.now();
        let ids: Vec<String> = self.areas.keys().cloned().collect();
        for area_id in ids {
            self.update_area_occupancy(&area_id, now);
        }
    }

    /// Handle a presence sensor change
    ///
    /// Returns true, and notifies listeners, when the sensor's occupied flag
    /// actually changed.
    pub fn handle_state_change(&mut self, change: &StateChangedData) -> bool {
        if change.new_state.is_none() {
            return false;
        }
        let Some((area_id, role)) = self.sensor_index.get(&change.entity_id).cloned() else {
            return false;
        };

        let was_occupied = role.is_occupied(change.old_state.as_ref());
        let is_occupied = role.is_occupied(change.new_state.as_ref());
        if was_occupied == is_occupied {
            return false;
        }

        debug!(
            entity_id = %change.entity_id,
            was_occupied,
            is_occupied,
            "Sensor occupancy changed"
        );
        let now = self.clock.now();
        self.update_area_occupancy(&area_id, now);
        self.notify_update();
        true
    }

    /// Re-derive active status for every area and always notify listeners
    pub fn force_update_active_status(&mut self) {
        self.update_all_active_status();
        self.notify_update();
    }

    fn update_all_active_status(&mut self) {
        let now = self.clock.now();
        let (min_occupancy, grace) = (self.min_occupancy_minutes, self.grace_period_minutes);
        for area in self.areas.values_mut() {
            if needs_active_update(area, now, min_occupancy, grace) {
                update_active_status(Arc::make_mut(area), now, min_occupancy, grace);
            }
        }
    }

    fn update_area_occupancy(&mut self, area_id: &str, now: DateTime<Utc>) {
        let host = self.host.clone();
        let (min_occupancy, grace) = (self.min_occupancy_minutes, self.grace_period_minutes);
        let Some(slot) = self.areas.get_mut(area_id) else {
            return;
        };

        let occupied_binary: BTreeSet<String> = slot
            .binary_sensors
            .iter()
            .filter(|s| SensorRole::Instant.is_occupied(host.read_state(s).as_ref()))
            .cloned()
            .collect();
        let occupied_latched: BTreeSet<String> = slot
            .sensors
            .iter()
            .filter(|s| SensorRole::Latched.is_occupied(host.read_state(s).as_ref()))
            .cloned()
            .collect();

        let area = Arc::make_mut(slot);
        let was_occupied = area.is_occupied();
        let had_start_time = area.occupancy_start_time.is_some();

        area.occupied_binary_sensors = occupied_binary;
        area.occupied_sensors = occupied_latched;
        let is_occupied = area.is_occupied();

        if is_occupied && !was_occupied {
            if area.was_active_before_unoccupied {
                // Back in the room during the grace period: stay active
                area.occupancy_start_time =
                    Some(now - Duration::minutes(i64::from(min_occupancy) + 1));
                debug!(area_id = %area.area_id, "Area re-occupied during grace period, remaining active");
            } else if had_start_time {
                debug!(
                    area_id = %area.area_id,
                    start = ?area.occupancy_start_time,
                    "Area using restored occupancy start time"
                );
            } else {
                area.occupancy_start_time = Some(now);
                debug!(area_id = %area.area_id, "Area became occupied");
            }
            area.unoccupancy_start_time = None;
            area.was_active_before_unoccupied = false;
        } else if !is_occupied && was_occupied {
            area.occupancy_start_time = None;
            if area.is_active {
                area.unoccupancy_start_time = Some(now);
                area.was_active_before_unoccupied = true;
                debug!(area_id = %area.area_id, "Area became unoccupied while active, starting grace period");
            } else {
                area.unoccupancy_start_time = None;
                area.was_active_before_unoccupied = false;
                debug!(area_id = %area.area_id, "Area became unoccupied");
            }
        }

        update_active_status(area, now, min_occupancy, grace);
    }

    pub fn register_update_callback(&mut self, callback: UpdateCallback) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, callback));
        id
    }

    pub fn unregister_update_callback(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener, _)| *listener != id);
        self.listeners.len() != before
    }

    fn notify_update(&self) {
        for (_, callback) in &self.listeners {
            callback();
        }
    }

    pub fn summary(&self) -> OccupancySummary {
        let now = self.clock.now();
        OccupancySummary {
            total_areas: self.areas.len(),
            occupied_areas: self.areas.values().filter(|a| a.is_occupied()).count(),
            active_areas: self.areas.values().filter(|a| a.is_active).count(),
            min_occupancy_minutes: self.min_occupancy_minutes,
            grace_period_minutes: self.grace_period_minutes,
            areas: self
                .areas
                .iter()
                .map(|(id, area)| {
                    (
                        id.clone(),
                        AreaSummary {
                            name: area.area_name.clone(),
                            is_occupied: area.is_occupied(),
                            is_active: area.is_active,
                            is_in_grace_period: area.is_in_grace_period(),
                            occupancy_minutes: area.occupancy_minutes(now),
                            occupied_sensors: area
                                .occupied_binary_sensors
                                .iter()
                                .chain(area.occupied_sensors.iter())
                                .cloned()
                                .collect(),
                            total_sensors: area.total_sensor_count(),
                        },
                    )
                })
                .collect(),
        }
    }
}

/// Whether [`update_active_status`] would change anything
fn needs_active_update(area: &AreaOccupancy, now: DateTime<Utc>, min_occupancy: u32, grace: u32) -> bool {
    let mut probe = area.clone();
    update_active_status(&mut probe, now, min_occupancy, grace);
    probe != *area
}

fn update_active_status(area: &mut AreaOccupancy, now: DateTime<Utc>, min_occupancy: u32, grace: u32) {
    let was_active = area.is_active;

    if area.is_occupied() {
        area.is_active = area.occupancy_minutes(now) >= f64::from(min_occupancy);
    } else if area.is_in_grace_period() {
        let unoccupied = area.unoccupancy_minutes(now);
        if unoccupied >= f64::from(grace) {
            area.is_active = false;
            area.was_active_before_unoccupied = false;
            area.unoccupancy_start_time = None;
            debug!(
                area_id = %area.area_id,
                unoccupied_minutes = unoccupied,
                "Grace period expired, deactivating"
            );
        } else {
            area.is_active = true;
        }
    } else {
        area.is_active = false;
    }

    if area.is_active && !was_active {
        debug!(
            area_id = %area.area_id,
            occupied_minutes = area.occupancy_minutes(now),
            "Area became active"
        );
    } else if !area.is_active && was_active && !area.is_in_grace_period() {
        debug!(area_id = %area.area_id, "Area became inactive");
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AreaSummary {
    pub name: String,
    pub is_occupied: bool,
    pub is_active: bool,
    pub is_in_grace_period: bool,
    pub occupancy_minutes: f64,
    pub occupied_sensors: Vec<String>,
    pub total_sensors: usize,
}

/// Serializable overview for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct OccupancySummary {
    pub total_areas: usize,
    pub occupied_areas: usize,
    pub active_areas: usize,
    pub min_occupancy_minutes: u32,
    pub grace_period_minutes: u32,
    pub areas: IndexMap<String, AreaSummary>,
}
