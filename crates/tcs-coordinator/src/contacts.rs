//! Bookkeeping of currently open contact sensors

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tcs_core::EntityState;

/// A contact sensor is open while its state is `on`
pub fn is_contact_open(state: Option<&EntityState>) -> bool {
    state.is_some_and(|s| !s.has_no_value() && s.is_on())
}

/// Open sensors with the time each one opened
#[derive(Debug, Clone, Default)]
pub struct OpenSensors {
    opened_at: IndexMap<String, DateTime<Utc>>,
}

impl OpenSensors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sensor as open. An already-tracked sensor keeps its first timestamp.
    pub fn open(&mut self, entity_id: &str, at: DateTime<Utc>) -> bool {
        if self.opened_at.contains_key(entity_id) {
            return false;
        }
        self.opened_at.insert(entity_id.to_string(), at);
        true
    }

    pub fn close(&mut self, entity_id: &str) -> bool {
        self.opened_at.shift_remove(entity_id).is_some()
    }

    pub fn clear(&mut self) {
        self.opened_at.clear();
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.opened_at.contains_key(entity_id)
    }

    pub fn opened_at(&self, entity_id: &str) -> Option<DateTime<Utc>> {
        self.opened_at.get(entity_id).copied()
    }

    /// The sensor that has been open longest; ties go to the first recorded
    pub fn earliest(&self) -> Option<(&str, DateTime<Utc>)> {
        self.opened_at
            .iter()
            .fold(None, |best: Option<(&str, DateTime<Utc>)>, (id, at)| match best {
                Some((_, best_at)) if best_at <= *at => best,
                _ => Some((id.as_str(), *at)),
            })
    }

    pub fn ids(&self) -> Vec<String> {
        self.opened_at.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.opened_at.len()
    }

    pub fn is_empty(&self) -> bool {
        self.opened_at.is_empty()
    }

    pub fn doors_count(&self) -> usize {
        self.opened_at.keys().filter(|id| id.contains("door")).count()
    }

    pub fn windows_count(&self) -> usize {
        self.opened_at.keys().filter(|id| id.contains("window")).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::HashMap;

    #[test]
    fn test_earliest_tracks_first_opened() {
        let t0 = Utc::now();
        let mut open = OpenSensors::new();
        open.open("binary_sensor.back_door", t0 + Duration::minutes(2));
        open.open("binary_sensor.front_door", t0);
        open.open("binary_sensor.den_window", t0 + Duration::minutes(1));

        assert_eq!(open.earliest(), Some(("binary_sensor.front_door", t0)));
        open.close("binary_sensor.front_door");
        assert_eq!(
            open.earliest().map(|(id, _)| id),
            Some("binary_sensor.den_window")
        );
    }

    #[test]
    fn test_reopen_keeps_first_timestamp() {
        let t0 = Utc::now();
        let mut open = OpenSensors::new();
        assert!(open.open("binary_sensor.front_door", t0));
        assert!(!open.open("binary_sensor.front_door", t0 + Duration::minutes(3)));
        assert_eq!(open.opened_at("binary_sensor.front_door"), Some(t0));
    }

    #[test]
    fn test_door_and_window_counts() {
        let t0 = Utc::now();
        let mut open = OpenSensors::new();
        open.open("binary_sensor.front_door", t0);
        open.open("binary_sensor.patio_door", t0);
        open.open("binary_sensor.den_window", t0);
        open.open("binary_sensor.garage", t0);

        assert_eq!(open.len(), 4);
        assert_eq!(open.doors_count(), 2);
        assert_eq!(open.windows_count(), 1);
    }

    #[test]
    fn test_contact_open_state() {
        let state = |value: &str| EntityState::new("binary_sensor.door", value, HashMap::new(), Utc::now());
        assert!(is_contact_open(Some(&state("on"))));
        assert!(!is_contact_open(Some(&state("off"))));
        assert!(!is_contact_open(Some(&state("unavailable"))));
        assert!(!is_contact_open(None));
    }
}
