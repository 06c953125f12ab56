//! Runtime room settings changed through the coordinator's setters

use std::collections::HashSet;

use serde::Serialize;
use tcs_config::{AreaTable, EcoAwayBehavior, Options};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomSettings {
    pub eco_mode: bool,
    pub only_track_selected_rooms: bool,
    /// Rooms that count when only selected rooms are tracked
    pub tracked_rooms: HashSet<String>,
    /// Rooms always protected from critical temperatures
    pub force_critical_rooms: HashSet<String>,
    pub respect_user_off: bool,
    pub eco_away_behavior: EcoAwayBehavior,
    pub away: bool,
}

impl RoomSettings {
    pub fn new(options: &Options, areas: &AreaTable) -> Self {
        let mut settings = Self {
            eco_mode: false,
            only_track_selected_rooms: false,
            tracked_rooms: areas
                .iter()
                .filter(|a| a.track)
                .map(|a| a.area_id.clone())
                .collect(),
            force_critical_rooms: areas
                .iter()
                .filter(|a| a.force_critical)
                .map(|a| a.area_id.clone())
                .collect(),
            respect_user_off: true,
            eco_away_behavior: EcoAwayBehavior::default(),
            away: false,
        };
        settings.apply_options(options);
        settings
    }

    pub fn apply_options(&mut self, options: &Options) {
        self.eco_mode = options.eco_mode;
        self.only_track_selected_rooms = options.only_track_selected_rooms;
        self.respect_user_off = options.respect_user_off;
        self.eco_away_behavior = options.eco_away_behavior;
    }

    pub fn tracked_area_ids(&self) -> Option<&HashSet<String>> {
        self.only_track_selected_rooms.then_some(&self.tracked_rooms)
    }

    /// Eco mode and eco targets after the away behavior is applied
    pub fn effective_eco(&self, options: &Options) -> (bool, Option<(f64, f64)>) {
        if !self.eco_mode {
            return (false, None);
        }
        if !self.away {
            return (true, None);
        }
        match self.eco_away_behavior {
            EcoAwayBehavior::DisableEcoWhenAway => (false, None),
            EcoAwayBehavior::UseEcoAwayTargets => (true, options.eco_away_targets()),
            EcoAwayBehavior::KeepEcoActive => (true, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcs_config::AreaConfig;

    fn table() -> AreaTable {
        let mut den = AreaConfig::new("den");
        den.force_critical = true;
        let mut attic = AreaConfig::new("attic");
        attic.track = false;
        AreaTable::build(&[den, attic])
    }

    #[test]
    fn test_rooms_seeded_from_area_config() {
        let settings = RoomSettings::new(&Options::default(), &table());
        assert!(settings.tracked_rooms.contains("den"));
        assert!(!settings.tracked_rooms.contains("attic"));
        assert!(settings.force_critical_rooms.contains("den"));
        assert_eq!(settings.tracked_area_ids(), None);
    }

    #[test]
    fn test_away_behaviors() {
        let options = Options {
            eco_mode: true,
            eco_away_target_low: Some(62.0),
            eco_away_target_high: Some(82.0),
            ..Options::default()
        };
        let mut settings = RoomSettings::new(&options, &table());
        assert_eq!(settings.effective_eco(&options), (true, None));

        settings.away = true;
        assert_eq!(settings.effective_eco(&options), (false, None));

        settings.eco_away_behavior = EcoAwayBehavior::UseEcoAwayTargets;
        assert_eq!(settings.effective_eco(&options), (true, Some((62.0, 82.0))));

        settings.eco_away_behavior = EcoAwayBehavior::KeepEcoActive;
        assert_eq!(settings.effective_eco(&options), (true, None));

        settings.eco_mode = false;
        assert_eq!(settings.effective_eco(&options), (false, None));
    }
}
