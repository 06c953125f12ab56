//! Occupancy tracker driven by a LocalHost and a manual clock

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use tcs_config::{AreaConfig, AreaTable};
use tcs_core::{Clock, ManualClock};
use tcs_host::{Host, LocalHost, Storable, StorageFile};
use tcs_occupancy::{OccupancyStore, OccupancyTracker};

struct Fixture {
    clock: ManualClock,
    host: Arc<LocalHost>,
}

impl Fixture {
    fn new() -> Self {
        let clock = ManualClock::new();
        let host = Arc::new(LocalHost::new(Arc::new(clock.clone())));
        Self { clock, host }
    }

    fn tracker(&self, areas: &[AreaConfig]) -> OccupancyTracker {
        OccupancyTracker::new(
            self.host.clone(),
            Arc::new(self.clock.clone()),
            "entry1",
            &AreaTable::build(areas),
            5,
            5,
        )
    }

    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    fn set(&self, tracker: &mut OccupancyTracker, entity_id: &str, state: &str) -> bool {
        let change = self.host.set_state(entity_id, state, HashMap::new()).unwrap();
        tracker.handle_state_change(&change)
    }

    fn set_latched(&self, tracker: &mut OccupancyTracker, entity_id: &str, previous: &str) -> bool {
        let attrs = HashMap::from([("previous_valid_state".to_string(), json!(previous))]);
        let change = self.host.set_state(entity_id, "1", attrs).unwrap();
        tracker.handle_state_change(&change)
    }
}

fn den() -> AreaConfig {
    let mut area = AreaConfig::new("den");
    area.name = Some("Den".into());
    area.binary_sensors = vec!["binary_sensor.den_motion".into(), "binary_sensor.den_mmwave".into()];
    area
}

fn office() -> AreaConfig {
    let mut area = AreaConfig::new("office");
    area.sensors = vec!["sensor.office_presence".into()];
    area
}

#[tokio::test]
async fn test_areas_without_presence_sensors_are_skipped() {
    let fx = Fixture::new();
    let mut hallway = AreaConfig::new("hallway");
    hallway.temperature_sensors = vec!["sensor.hallway_temperature".into()];

    let mut tracker = fx.tracker(&[den(), hallway]);
    tracker.setup().await;

    assert_eq!(tracker.areas().len(), 1);
    assert!(tracker.get_area("hallway").is_none());
    assert_eq!(tracker.tracked_sensors().len(), 2);
}

#[tokio::test]
async fn test_sensor_handoff_keeps_occupancy_continuous() {
    let fx = Fixture::new();
    let mut tracker = fx.tracker(&[den()]);
    tracker.setup().await;

    assert!(fx.set(&mut tracker, "binary_sensor.den_motion", "on"));
    let started = tracker.get_area("den").unwrap().occupancy_start_time;
    assert!(started.is_some());

    fx.clock.advance_minutes(2);
    assert!(fx.set(&mut tracker, "binary_sensor.den_mmwave", "on"));
    fx.clock.advance_minutes(1);
    assert!(fx.set(&mut tracker, "binary_sensor.den_motion", "off"));

    let area = tracker.get_area("den").unwrap();
    assert!(area.is_occupied());
    assert_eq!(area.occupancy_start_time, started);
}

#[tokio::test]
async fn test_promotion_on_event_and_on_tick() {
    let fx = Fixture::new();
    let mut tracker = fx.tracker(&[den()]);
    tracker.setup().await;

    fx.set(&mut tracker, "binary_sensor.den_motion", "on");
    assert!(!tracker.any_area_active());

    fx.clock.advance_minutes(4);
    tracker.force_update_active_status();
    assert!(!tracker.any_area_active());

    fx.clock.advance_minutes(1);
    tracker.force_update_active_status();
    assert!(tracker.any_area_active());
    assert_eq!(tracker.active_areas().len(), 1);
    assert!(tracker.inactive_areas().is_empty());
}

#[tokio::test]
async fn test_old_snapshot_is_not_mutated() {
    let fx = Fixture::new();
    let mut tracker = fx.tracker(&[den()]);
    tracker.setup().await;

    let before = tracker.get_area("den").unwrap();
    fx.set(&mut tracker, "binary_sensor.den_motion", "on");

    assert!(!before.is_occupied());
    assert!(tracker.get_area("den").unwrap().is_occupied());
}

#[tokio::test]
async fn test_grace_period_then_expiry() {
    let fx = Fixture::new();
    let mut tracker = fx.tracker(&[den()]);
    tracker.setup().await;

    fx.set(&mut tracker, "binary_sensor.den_motion", "on");
    fx.clock.advance_minutes(6);
    tracker.force_update_active_status();
    assert!(tracker.any_area_active());

    fx.set(&mut tracker, "binary_sensor.den_motion", "off");
    let area = tracker.get_area("den").unwrap();
    assert!(area.is_active);
    assert!(area.is_in_grace_period());
    assert!(area.occupancy_start_time.is_none());

    fx.clock.advance_minutes(4);
    tracker.force_update_active_status();
    assert!(tracker.get_area("den").unwrap().is_active);

    fx.clock.advance_minutes(1);
    tracker.force_update_active_status();
    let area = tracker.get_area("den").unwrap();
    assert!(!area.is_active);
    assert!(!area.is_in_grace_period());
    assert!(area.unoccupancy_start_time.is_none());
}

#[tokio::test]
async fn test_reentry_during_grace_stays_active() {
    let fx = Fixture::new();
    let mut tracker = fx.tracker(&[den()]);
    tracker.setup().await;

    fx.set(&mut tracker, "binary_sensor.den_motion", "on");
    fx.clock.advance_minutes(6);
    tracker.force_update_active_status();
    fx.set(&mut tracker, "binary_sensor.den_motion", "off");

    fx.clock.advance_minutes(2);
    fx.set(&mut tracker, "binary_sensor.den_motion", "on");

    let area = tracker.get_area("den").unwrap();
    assert!(area.is_active);
    assert!(!area.was_active_before_unoccupied);
    assert!(area.occupancy_minutes(fx.now()) >= 5.0);
}

#[tokio::test]
async fn test_leaving_before_promotion_does_not_start_grace() {
    let fx = Fixture::new();
    let mut tracker = fx.tracker(&[den()]);
    tracker.setup().await;

    fx.set(&mut tracker, "binary_sensor.den_motion", "on");
    fx.clock.advance_minutes(2);
    fx.set(&mut tracker, "binary_sensor.den_motion", "off");

    let area = tracker.get_area("den").unwrap();
    assert!(!area.is_active);
    assert!(!area.is_in_grace_period());
}

#[tokio::test]
async fn test_latched_sensor_and_unchanged_events() {
    let fx = Fixture::new();
    let mut tracker = fx.tracker(&[office()]);
    tracker.setup().await;

    assert!(fx.set_latched(&mut tracker, "sensor.office_presence", "on"));
    assert!(tracker.any_area_occupied());
    // Value changes but the latched flag does not
    assert!(!fx.set_latched(&mut tracker, "sensor.office_presence", "on"));
    assert!(fx.set_latched(&mut tracker, "sensor.office_presence", "off"));
    assert!(!tracker.any_area_occupied());
}

#[tokio::test]
async fn test_sensor_read_by_configured_list() {
    let fx = Fixture::new();
    let mut bedroom = AreaConfig::new("bedroom");
    bedroom.sensors = vec!["binary_sensor.bed_presence".into()];
    let mut tracker = fx.tracker(&[bedroom]);
    tracker.setup().await;

    // Latched list: the attribute decides, the `1` value is ignored
    assert!(fx.set_latched(&mut tracker, "binary_sensor.bed_presence", "on"));
    let area = tracker.get_area("bedroom").unwrap();
    assert!(area.is_occupied());
    assert!(area.occupied_sensors.contains("binary_sensor.bed_presence"));

    assert!(fx.set_latched(&mut tracker, "binary_sensor.bed_presence", "off"));
    assert!(!tracker.any_area_occupied());
}

#[tokio::test]
async fn test_callbacks_fire_on_change_and_tick() {
    let fx = Fixture::new();
    let mut tracker = fx.tracker(&[den()]);
    tracker.setup().await;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let id = tracker.register_update_callback(Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    fx.set(&mut tracker, "binary_sensor.den_motion", "on");
    tracker.force_update_active_status();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    assert!(tracker.unregister_update_callback(id));
    tracker.force_update_active_status();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!tracker.unregister_update_callback(id));
}

#[tokio::test]
async fn test_grace_period_minimum_enforced() {
    let fx = Fixture::new();
    let mut tracker = fx.tracker(&[den()]);
    tracker.set_grace_period_minutes(0);
    assert_eq!(tracker.grace_period_minutes(), 2);
}

#[tokio::test]
async fn test_state_survives_restart() {
    let fx = Fixture::new();
    let mut tracker = fx.tracker(&[den()]);
    tracker.setup().await;

    fx.set(&mut tracker, "binary_sensor.den_motion", "on");
    fx.clock.advance_minutes(10);
    tracker.force_update_active_status();
    let started = tracker.get_area("den").unwrap().occupancy_start_time;
    tracker.shutdown().await.unwrap();

    // Sensor still on when the next tracker starts
    let mut restarted = fx.tracker(&[den()]);
    restarted.setup().await;
    let area = restarted.get_area("den").unwrap();
    assert!(area.is_active);
    assert_eq!(
        area.occupancy_start_time.map(|t| t.timestamp()),
        started.map(|t| t.timestamp())
    );
}

#[tokio::test]
async fn test_restore_ignores_unknown_areas_and_stale_start() {
    let fx = Fixture::new();
    let start = (fx.now() - chrono::Duration::minutes(30)).to_rfc3339();
    let data = json!({
        "saved_at": null,
        "areas": {
            "den": {"area_id": "den", "is_active": true, "occupancy_start_time": start},
            "attic": {"area_id": "attic", "is_active": true}
        }
    });
    fx.host
        .persist(StorageFile::new(
            OccupancyStore::storage_key("entry1"),
            data,
            1,
            1,
        ))
        .await
        .unwrap();

    // Nobody is in the den any more
    let mut tracker = fx.tracker(&[den()]);
    tracker.setup().await;

    assert!(tracker.get_area("attic").is_none());
    let area = tracker.get_area("den").unwrap();
    assert!(area.occupancy_start_time.is_none());
    assert!(!area.is_active);
}

#[tokio::test]
async fn test_summary_counts() {
    let fx = Fixture::new();
    let mut tracker = fx.tracker(&[den(), office()]);
    tracker.setup().await;
    fx.set(&mut tracker, "binary_sensor.den_motion", "on");

    let summary = tracker.summary();
    assert_eq!(summary.total_areas, 2);
    assert_eq!(summary.occupied_areas, 1);
    assert_eq!(summary.active_areas, 0);
    assert_eq!(summary.areas["den"].name, "Den");
    assert_eq!(summary.areas["den"].occupied_sensors, vec!["binary_sensor.den_motion"]);
    assert_eq!(summary.areas["office"].total_sensors, 1);
}
