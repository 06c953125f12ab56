//! Loading whole configuration files

use std::io::Write;

use tcs_config::{load_entries, parse_entries, EcoAwayBehavior, EntityRole};
use tempfile::NamedTempFile;

const HOUSE: &str = r#"
entries:
  - entry_id: house
    title: House
    thermostat: climate.main
    contact_sensors:
      - binary_sensor.front_door
      - binary_sensor.den_window
    areas:
      - area_id: den
        name: Den
        binary_sensors: [binary_sensor.den_motion]
        temperature_sensors: [sensor.den_temperature]
        vents: [cover.den_vent]
        vent_open_delay_seconds: 10
        target_temp_low: 68
        target_temp_high: 76
      - area_id: office
        sensors: [sensor.office_presence]
        track: false
        force_critical: true
    options:
      open_timeout: 3
      temperature_unit: celsius
      eco_away_behavior: keep_eco_active
      notify_service: notify.phone
"#;

#[test]
fn test_parse_full_entry() {
    let entries = parse_entries(HOUSE).unwrap();
    assert_eq!(entries.len(), 1);

    let entry = &entries[0];
    assert_eq!(entry.entry_id, "house");
    assert_eq!(entry.display_title(), "House");
    assert_eq!(entry.thermostat_id().unwrap(), "climate.main");
    assert_eq!(entry.options.open_timeout, 3);
    assert_eq!(entry.options.close_timeout, 5);
    assert_eq!(entry.options.eco_away_behavior, EcoAwayBehavior::KeepEcoActive);
    assert_eq!(entry.options.notify_service_name(), Some("phone"));

    let table = entry.area_table();
    let den = table.get("den").unwrap();
    assert_eq!(den.display_name(), "Den");
    assert_eq!(den.vent_open_delay_seconds, Some(10));
    let office = table.get("office").unwrap();
    assert!(!office.track);
    assert!(office.force_critical);
    assert!(table.has_role("sensor.office_presence", EntityRole::LatchedPresence));
}

#[test]
fn test_generated_entry_ids_are_unique() {
    let yaml = "entries:\n  - thermostat: climate.a\n  - thermostat: climate.b\n";
    let entries = parse_entries(yaml).unwrap();
    assert_ne!(entries[0].entry_id, entries[1].entry_id);
}

#[test]
fn test_duplicate_entry_rejected() {
    let yaml = "entries:\n  - {entry_id: x, thermostat: climate.a}\n  - {entry_id: x, thermostat: climate.b}\n";
    assert_eq!(
        parse_entries(yaml).unwrap_err().reason_key(),
        "duplicate_entry"
    );
}

#[test]
fn test_missing_thermostat_reason() {
    let yaml = "entries:\n  - entry_id: x\n    contact_sensors: [binary_sensor.door]\n";
    assert_eq!(
        parse_entries(yaml).unwrap_err().reason_key(),
        "missing_thermostat"
    );
}

#[test]
fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(HOUSE.as_bytes()).unwrap();
    let entries = load_entries(file.path()).unwrap();
    assert_eq!(entries[0].areas.len(), 2);

    let err = load_entries("/nonexistent/tcs.yaml").unwrap_err();
    assert_eq!(err.reason_key(), "read_error");
}

#[test]
fn test_invalid_yaml() {
    assert_eq!(
        parse_entries("entries: [").unwrap_err().reason_key(),
        "invalid_yaml"
    );
}
