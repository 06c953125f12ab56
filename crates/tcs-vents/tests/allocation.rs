//! Vent allocation against a LocalHost with simulated covers

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use serde_json::json;
use tcs_core::{Clock, HvacMode, ManualClock, TemperatureUnit};
use tcs_host::LocalHost;
use tcs_thermostat::{RoomTemperatureState, ThermostatState};
use tcs_vents::{AreaVentInput, VentController, VentSettings};

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

    fn vent(&self, entity_id: &str, state: &str) {
        self.host.set_state(entity_id, state, HashMap::new()).unwrap();
    }

    fn group(&self, entity_id: &str, members: &[&str]) {
        for member in members {
            self.vent(member, "closed");
        }
        let attrs = HashMap::from([("entity_id".to_string(), json!(members))]);
        self.host.set_state(entity_id, "closed", attrs).unwrap();
    }

    fn controller(&self, min_vents_open: usize) -> VentController {
        VentController::new(
            self.host.clone(),
            Arc::new(self.clock.clone()),
            VentSettings {
                min_vents_open,
                ..VentSettings::default()
            },
        )
    }
}

fn area(area_id: &str, vents: &[&str]) -> AreaVentInput {
    AreaVentInput {
        area_id: area_id.to_string(),
        area_name: area_id.to_string(),
        vents: vents.iter().map(|v| v.to_string()).collect(),
        is_active: false,
        is_occupied: false,
        occupancy_start_time: None,
        vent_open_delay_seconds: None,
    }
}

fn room(area_id: &str, temperature: f64) -> RoomTemperatureState {
    let sensor = format!("sensor.{}_temp", area_id);
    let readings = [(sensor.clone(), temperature)].into_iter().collect();
    let mut room = RoomTemperatureState::new(area_id, area_id, vec![sensor], readings);
    room.determining_temperature = Some(temperature);
    room.target_temperature = Some(70.0);
    room
}

fn heating(rooms: Vec<RoomTemperatureState>) -> ThermostatState {
    let mut state = ThermostatState::new("climate.main");
    state.hvac_mode = Some(HvacMode::Heat);
    state.is_on = true;
    for room in rooms {
        state.room_states.insert(room.area_id.clone(), room);
    }
    state
}

/// Three single vents and one 3-member group, all closed and inactive
fn four_areas(f: &Fixture) -> (Vec<AreaVentInput>, ThermostatState) {
    f.vent("cover.a_vent", "closed");
    f.vent("cover.b_vent", "closed");
    f.vent("cover.c_vent", "closed");
    f.group("cover.d_vents", &["cover.d_1", "cover.d_2", "cover.d_3"]);
    let areas = vec![
        area("a", &["cover.a_vent"]),
        area("b", &["cover.b_vent"]),
        area("c", &["cover.c_vent"]),
        area("d", &["cover.d_vents"]),
    ];
    let thermostat = heating(vec![room("a", 65.0), room("b", 70.0), room("c", 75.0), room("d", 60.0)]);
    (areas, thermostat)
}

#[test]
fn test_floor_counts_group_members() {
    let f = Fixture::new();
    let (areas, thermostat) = four_areas(&f);
    let mut vents = f.controller(5);

    let control = vents.evaluate(&areas, &thermostat);
    assert_eq!(control.total_vents, 6);
    assert_eq!(control.open_vents, 0);
    assert_eq!(control.vents_should_be_open, 5);

    let d = control.vent("cover.d_vents").unwrap();
    assert!(d.is_group);
    assert_eq!(d.member_count, 3);
    assert!(d.should_be_open);
    assert_eq!(d.open_reason.as_deref(), Some("Minimum vents (need 5)"));

    // Coldest first while heating: d (60), a (65), b (70)
    assert!(control.vent("cover.a_vent").unwrap().should_be_open);
    assert!(control.vent("cover.b_vent").unwrap().should_be_open);
    assert!(!control.vent("cover.c_vent").unwrap().should_be_open);
    assert_eq!(control.pending_commands.len(), 3);
}

#[test]
fn test_floor_passes_over_oversized_group() {
    let f = Fixture::new();
    let (areas, thermostat) = four_areas(&f);
    let mut vents = f.controller(2);

    let control = vents.evaluate(&areas, &thermostat);
    assert_eq!(control.vents_should_be_open, 2);
    assert!(!control.vent("cover.d_vents").unwrap().should_be_open);
    assert!(control.vent("cover.a_vent").unwrap().should_be_open);
    assert!(control.vent("cover.b_vent").unwrap().should_be_open);
}

#[test]
fn test_floor_gives_back_singles_when_group_ranks_last() {
    let f = Fixture::new();
    let (areas, _) = four_areas(&f);
    let thermostat = heating(vec![room("a", 60.0), room("b", 65.0), room("c", 70.0), room("d", 78.0)]);
    let mut vents = f.controller(5);

    // Greedy takes a, b, c and is still two short; only the group is left
    let control = vents.evaluate(&areas, &thermostat);
    assert_eq!(control.vents_should_be_open, 5);
    assert!(control.vent("cover.d_vents").unwrap().should_be_open);
    assert!(control.vent("cover.a_vent").unwrap().should_be_open);
    assert!(control.vent("cover.b_vent").unwrap().should_be_open);
    assert!(!control.vent("cover.c_vent").unwrap().should_be_open);
    assert_eq!(control.pending_commands.len(), 3);
}

#[test]
fn test_floor_already_met_opens_nothing_extra() {
    let f = Fixture::new();
    let (mut areas, mut thermostat) = four_areas(&f);
    areas[2].is_active = true;
    thermostat.room_states.get_mut("c").unwrap().is_satiated = false;
    let mut vents = f.controller(1);

    let control = vents.evaluate(&areas, &thermostat);
    assert_eq!(control.vents_should_be_open, 1);
    let c = control.vent("cover.c_vent").unwrap();
    assert_eq!(c.open_reason.as_deref(), Some("Active, needs conditioning"));
    assert_eq!(control.pending_commands.len(), 1);
}

#[test]
fn test_area_rules() {
    let f = Fixture::new();
    for id in ["cover.crit", "cover.occ", "cover.new", "cover.rush", "cover.sat", "cover.idle"] {
        f.vent(id, "closed");
    }
    let now = f.clock.now();

    let mut occupied = area("occ", &["cover.occ"]);
    occupied.is_occupied = true;
    occupied.occupancy_start_time = Some(now - Duration::seconds(45));

    let mut fresh = area("new", &["cover.new"]);
    fresh.is_occupied = true;
    fresh.occupancy_start_time = Some(now - Duration::seconds(10));

    let mut rushed = area("rush", &["cover.rush"]);
    rushed.is_occupied = true;
    rushed.is_active = true;
    rushed.occupancy_start_time = Some(now - Duration::seconds(10));

    let areas = vec![
        area("crit", &["cover.crit"]),
        occupied,
        fresh,
        rushed,
        area("sat", &["cover.sat"]),
        area("idle", &["cover.idle"]),
    ];

    let mut critical = room("crit", 60.0);
    critical.is_critical = true;
    let mut satiated = room("sat", 70.0);
    satiated.is_satiated = true;
    let thermostat = heating(vec![critical, room("rush", 66.0), satiated]);

    let mut vents = f.controller(0);
    let control = vents.evaluate(&areas, &thermostat);
    let reason = |id: &str| control.area_states[id].open_reason.clone();

    assert_eq!(reason("crit"), "Critical temperature");
    assert_eq!(reason("occ"), "Occupied for 45s (>= 30s)");
    assert_eq!(reason("new"), "Occupied only 10s (< 30s delay)");
    assert_eq!(reason("rush"), "Active, needs conditioning");
    assert_eq!(reason("sat"), "Satiated - at target temperature");
    assert_eq!(reason("idle"), "Inactive");
    assert_eq!(control.vents_should_be_open, 3);
}

#[test]
fn test_per_area_open_delay() {
    let f = Fixture::new();
    f.vent("cover.den", "closed");
    let mut den = area("den", &["cover.den"]);
    den.is_occupied = true;
    den.occupancy_start_time = Some(f.clock.now() - Duration::seconds(10));
    den.vent_open_delay_seconds = Some(5);

    let mut vents = f.controller(0);
    let control = vents.evaluate(&[den], &heating(Vec::new()));
    assert!(control.area_states["den"].should_open);
}

#[tokio::test]
async fn test_debounce_withholds_second_command() {
    let f = Fixture::new();
    f.vent("cover.a_vent", "closed");
    let areas = vec![area("a", &["cover.a_vent"])];
    let thermostat = heating(vec![room("a", 65.0)]);
    let mut vents = f.controller(1);

    let control = vents.evaluate(&areas, &thermostat);
    assert_eq!(vents.execute(&control).await, 1);
    assert_eq!(f.host.states().get_state("cover.a_vent").as_deref(), Some("open"));

    // The vent drifts closed right away; the repeat is held back
    f.vent("cover.a_vent", "closed");
    f.clock.advance_seconds(10);
    let control = vents.evaluate(&areas, &thermostat);
    assert!(control.pending_commands.is_empty());
    let (can_send, why) = vents.can_send_command("cover.a_vent", f.clock.now());
    assert!(!can_send);
    assert_eq!(why, "Debounce: 20s remaining");

    f.clock.advance_seconds(21);
    let control = vents.evaluate(&areas, &thermostat);
    assert_eq!(control.pending_commands.len(), 1);
}

#[tokio::test]
async fn test_failed_command_is_retried_next_cycle() {
    let f = Fixture::new();
    f.vent("cover.a_vent", "closed");
    f.host.fail_service("cover", "open_cover_tilt", "radio timeout");
    let areas = vec![area("a", &["cover.a_vent"])];
    let thermostat = heating(vec![room("a", 65.0)]);
    let mut vents = f.controller(1);

    let control = vents.evaluate(&areas, &thermostat);
    assert_eq!(vents.execute(&control).await, 0);

    let control = vents.evaluate(&areas, &thermostat);
    assert_eq!(control.pending_commands.len(), 1);
    assert!(vents.can_send_command("cover.a_vent", f.clock.now()).0);

    f.host.clear_failures();
    assert_eq!(vents.execute(&control).await, 1);
}

#[tokio::test]
async fn test_unresponsive_vent_is_replaced() {
    let f = Fixture::new();
    f.vent("cover.a_vent", "closed");
    f.vent("cover.b_vent", "closed");
    // Commands are acknowledged but nothing moves
    f.host
        .services()
        .register("cover", "open_cover_tilt", |_call| async { Ok(None) });
    let areas = vec![area("a", &["cover.a_vent"]), area("b", &["cover.b_vent"])];
    let thermostat = heating(vec![room("a", 60.0), room("b", 72.0)]);
    let mut vents = f.controller(1);

    // Cycles every 30s; the default debounce lets each one resend
    for _ in 0..3 {
        let control = vents.evaluate(&areas, &thermostat);
        assert_eq!(control.pending_commands[0].entity_id, "cover.a_vent");
        assert_eq!(vents.execute(&control).await, 1);
        f.clock.advance_seconds(30);
    }

    // Third attempt sent 30s ago; no fourth command while it is pending
    let control = vents.evaluate(&areas, &thermostat);
    assert_eq!(vents.execute(&control).await, 0);
    assert!(!vents.is_unresponsive("cover.a_vent"));
    f.clock.advance_seconds(30);

    let control = vents.evaluate(&areas, &thermostat);
    assert_eq!(vents.execute(&control).await, 0);
    assert!(vents.is_unresponsive("cover.a_vent"));
    assert_eq!(f.host.calls_to("cover", "open_cover_tilt").len(), 3);

    let control = vents.evaluate(&areas, &thermostat);
    assert!(control.vent("cover.a_vent").unwrap().is_unresponsive);
    assert!(!control.vent("cover.a_vent").unwrap().should_be_open);
    assert!(control.vent("cover.b_vent").unwrap().should_be_open);

    let change = f.host.set_value("cover.a_vent", "closed").unwrap();
    vents.handle_state_change(&change);
    assert!(!vents.is_unresponsive("cover.a_vent"));
}

#[test]
fn test_celsius_deployment_ranks_like_fahrenheit() {
    let f = Fixture::new();
    f.vent("cover.a_vent", "closed");
    f.vent("cover.b_vent", "closed");
    let areas = vec![area("a", &["cover.a_vent"]), area("b", &["cover.b_vent"])];
    // 21 °C is warmer than 18 °C; heating prefers b
    let thermostat = heating(vec![room("a", 21.0), room("b", 18.0)]);

    let mut vents = VentController::new(
        f.host.clone(),
        Arc::new(f.clock.clone()),
        VentSettings {
            min_vents_open: 1,
            temperature_unit: TemperatureUnit::Celsius,
            ..VentSettings::default()
        },
    );
    let control = vents.evaluate(&areas, &thermostat);
    assert!(control.vent("cover.b_vent").unwrap().should_be_open);
    assert!(!control.vent("cover.a_vent").unwrap().should_be_open);
}
