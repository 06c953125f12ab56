//! Pause bookkeeping and thermostat-change classification

use serde::Serialize;
use tcs_core::HvacMode;

/// What a thermostat mode change means to the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeObservation {
    /// The change our own pause/resume command asked for
    OwnCommand,
    /// Someone turned the thermostat on while we hold it paused
    ManualOverride,
    /// Someone turned it back off while paused; remember what was running
    UserTurnedOff,
    Ignored,
}

#[derive(Debug, Clone, Default)]
pub struct PauseState {
    pub is_paused: bool,
    pub integration_paused: bool,
    pub previous_hvac_mode: Option<HvacMode>,
    pub trigger_sensor: Option<String>,
    /// Latest non-off mode seen on the thermostat
    pub last_known_hvac_mode: Option<HvacMode>,
    /// Mode our in-flight command will produce
    pub expected_mode: Option<HvacMode>,
}

impl PauseState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a thermostat change and update the remembered modes
    pub fn observe_mode_change(
        &mut self,
        old: Option<HvacMode>,
        new: HvacMode,
    ) -> ModeObservation {
        if !new.is_off() {
            self.last_known_hvac_mode = Some(new);
        }

        if self.expected_mode == Some(new) {
            self.expected_mode = None;
            return ModeObservation::OwnCommand;
        }
        if !self.is_paused {
            return ModeObservation::Ignored;
        }

        let was_off = old.map_or(true, |m| m.is_off());
        if !new.is_off() && was_off {
            self.is_paused = false;
            self.previous_hvac_mode = None;
            self.trigger_sensor = None;
            ModeObservation::ManualOverride
        } else if new.is_off() && !was_off {
            self.previous_hvac_mode = self.last_known_hvac_mode;
            ModeObservation::UserTurnedOff
        } else {
            ModeObservation::Ignored
        }
    }

    /// The mode a resume should restore, if any
    ///
    /// A thermostat the user had turned off stays off unless
    /// `respect_user_off` is false, in which case the last running mode comes
    /// back.
    pub fn mode_to_restore(&self, respect_user_off: bool) -> Option<HvacMode> {
        match self.previous_hvac_mode {
            Some(mode) if !mode.is_off() => Some(mode),
            _ if respect_user_off => None,
            _ => self.last_known_hvac_mode,
        }
    }
}

/// Serializable view of the orchestrator for status displays
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PauseStatus {
    pub is_paused: bool,
    pub integration_paused: bool,
    pub trigger_sensor: Option<String>,
    pub previous_hvac_mode: Option<HvacMode>,
    pub last_known_hvac_mode: Option<HvacMode>,
    pub open_sensors: Vec<String>,
    pub open_count: usize,
    pub open_doors_count: usize,
    pub open_windows_count: usize,
    pub open_timer_running: bool,
    pub close_timer_running: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paused(previous: HvacMode) -> PauseState {
        PauseState {
            is_paused: true,
            previous_hvac_mode: Some(previous),
            trigger_sensor: Some("binary_sensor.front_door".into()),
            last_known_hvac_mode: Some(previous),
            ..PauseState::default()
        }
    }

    #[test]
    fn test_own_command_is_consumed_once() {
        let mut state = paused(HvacMode::Heat);
        state.expected_mode = Some(HvacMode::Off);
        assert_eq!(
            state.observe_mode_change(Some(HvacMode::Heat), HvacMode::Off),
            ModeObservation::OwnCommand
        );
        assert_eq!(state.expected_mode, None);
        assert_eq!(state.previous_hvac_mode, Some(HvacMode::Heat));
    }

    #[test]
    fn test_manual_override_clears_pause() {
        let mut state = paused(HvacMode::Heat);
        assert_eq!(
            state.observe_mode_change(Some(HvacMode::Off), HvacMode::Cool),
            ModeObservation::ManualOverride
        );
        assert!(!state.is_paused);
        assert_eq!(state.previous_hvac_mode, None);
        assert_eq!(state.trigger_sensor, None);
        assert_eq!(state.last_known_hvac_mode, Some(HvacMode::Cool));
    }

    #[test]
    fn test_user_off_remembers_running_mode() {
        let mut state = paused(HvacMode::Off);
        state.last_known_hvac_mode = Some(HvacMode::Heat);
        // Turned on then off again without us noticing the on as an override
        state.expected_mode = Some(HvacMode::Cool);
        state.observe_mode_change(Some(HvacMode::Off), HvacMode::Cool);
        assert_eq!(
            state.observe_mode_change(Some(HvacMode::Cool), HvacMode::Off),
            ModeObservation::UserTurnedOff
        );
        assert_eq!(state.previous_hvac_mode, Some(HvacMode::Cool));
    }

    #[test]
    fn test_changes_ignored_when_not_paused() {
        let mut state = PauseState::new();
        assert_eq!(
            state.observe_mode_change(Some(HvacMode::Off), HvacMode::Heat),
            ModeObservation::Ignored
        );
        assert_eq!(state.last_known_hvac_mode, Some(HvacMode::Heat));
    }

    #[test]
    fn test_mode_to_restore() {
        let state = paused(HvacMode::Cool);
        assert_eq!(state.mode_to_restore(true), Some(HvacMode::Cool));

        let mut state = paused(HvacMode::Off);
        state.last_known_hvac_mode = Some(HvacMode::Heat);
        assert_eq!(state.mode_to_restore(true), None);
        assert_eq!(state.mode_to_restore(false), Some(HvacMode::Heat));
    }
}
