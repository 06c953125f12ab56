//! Area lookup table built once per configuration

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::AreaConfig;

/// What an entity does for the area that lists it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRole {
    Presence,
    LatchedPresence,
    Temperature,
    Vent,
}

/// Enabled areas in configuration order, plus a reverse index from entity
/// id to the areas (and roles) that reference it
#[derive(Debug, Clone, Default)]
pub struct AreaTable {
    areas: IndexMap<String, AreaConfig>,
    by_entity: HashMap<String, Vec<(String, EntityRole)>>,
}

impl AreaTable {
    pub fn build(areas: &[AreaConfig]) -> Self {
        let mut table = Self::default();
        for area in areas.iter().filter(|a| a.enabled) {
            let roles = area
                .binary_sensors
                .iter()
                .map(|e| (e, EntityRole::Presence))
                .chain(area.sensors.iter().map(|e| (e, EntityRole::LatchedPresence)))
                .chain(
                    area.temperature_sensors
                        .iter()
                        .map(|e| (e, EntityRole::Temperature)),
                )
                .chain(area.vents.iter().map(|e| (e, EntityRole::Vent)));
            for (entity_id, role) in roles {
                table
                    .by_entity
                    .entry(entity_id.clone())
                    .or_default()
                    .push((area.area_id.clone(), role));
            }
            table.areas.insert(area.area_id.clone(), area.clone());
        }
        table
    }

    pub fn get(&self, area_id: &str) -> Option<&AreaConfig> {
        self.areas.get(area_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AreaConfig> {
        self.areas.values()
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    /// Areas that reference `entity_id`, with the role it plays there
    pub fn areas_for(&self, entity_id: &str) -> &[(String, EntityRole)] {
        self.by_entity
            .get(entity_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_role(&self, entity_id: &str, role: EntityRole) -> bool {
        self.areas_for(entity_id).iter().any(|(_, r)| *r == role)
    }

    /// Areas with at least one temperature sensor, mapped to their sensors
    pub fn temperature_sensors(&self) -> IndexMap<String, Vec<String>> {
        self.areas
            .values()
            .filter(|a| !a.temperature_sensors.is_empty())
            .map(|a| (a.area_id.clone(), a.temperature_sensors.clone()))
            .collect()
    }

    /// Every entity referenced by an enabled area
    pub fn entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.by_entity.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn areas() -> Vec<AreaConfig> {
        let mut den = AreaConfig::new("den");
        den.binary_sensors = vec!["binary_sensor.den_motion".into()];
        den.sensors = vec!["sensor.den_presence".into()];
        den.temperature_sensors = vec!["sensor.den_temperature".into()];
        den.vents = vec!["cover.den_vent".into()];

        let mut office = AreaConfig::new("office");
        office.temperature_sensors = vec!["sensor.shared_temperature".into()];

        let mut hall = AreaConfig::new("hall");
        hall.temperature_sensors = vec!["sensor.shared_temperature".into()];

        let mut attic = AreaConfig::new("attic");
        attic.enabled = false;
        attic.vents = vec!["cover.attic_vent".into()];

        vec![den, office, hall, attic]
    }

    #[test]
    fn test_disabled_areas_are_skipped() {
        let table = AreaTable::build(&areas());
        assert_eq!(table.len(), 3);
        assert!(table.get("attic").is_none());
        assert!(table.areas_for("cover.attic_vent").is_empty());
        let order: Vec<&str> = table.iter().map(|a| a.area_id.as_str()).collect();
        assert_eq!(order, vec!["den", "office", "hall"]);
    }

    #[test]
    fn test_reverse_index() {
        let table = AreaTable::build(&areas());
        assert_eq!(
            table.areas_for("sensor.den_presence"),
            &[("den".to_string(), EntityRole::LatchedPresence)]
        );
        assert!(table.has_role("cover.den_vent", EntityRole::Vent));
        assert_eq!(table.areas_for("sensor.shared_temperature").len(), 2);
        assert_eq!(table.temperature_sensors().len(), 3);
    }
}
