//! The thermostat decision engine

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tcs_config::Options;
use tcs_core::{
    attrs, domains, hvac::FEATURE_FAN_MODE, services, Context, FanMode, HvacMode, SharedClock,
};
use tcs_host::{decode_with_migration, SharedHost, Storable, StorageResult};
use tracing::{debug, info, instrument, warn};

use crate::reading::{
    determine_rooms_need_mode, infer_effective_hvac_mode, temperature_from_state, NeedInput,
    NeedThresholds, Readings,
};
use crate::room::{evaluate_room_critical, evaluate_room_satiation, AreaTargets, CriticalThresholds};
use crate::{
    RoomTemperatureState, SharedRegistry, ThermostatAction, ThermostatControlStore,
    ThermostatError, ThermostatResult, ThermostatState,
};

/// Fallback targets when nothing else provides one
const FALLBACK_TARGET_LOW: f64 = 70.0;
const FALLBACK_TARGET_HIGH: f64 = 78.0;

/// Tunables of the decision engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerSettings {
    pub temperature_deadband: f64,
    pub min_cycle_on_minutes: u32,
    pub min_cycle_off_minutes: u32,
    pub unoccupied_heating_threshold: f64,
    pub unoccupied_cooling_threshold: f64,
    pub heating_boost_offset: f64,
    pub cooling_boost_offset: f64,
    pub default_target_low: Option<f64>,
    pub default_target_high: Option<f64>,
}

impl ControllerSettings {
    pub fn from_options(options: &Options) -> Self {
        Self {
            temperature_deadband: options.temperature_deadband,
            min_cycle_on_minutes: options.min_cycle_on_minutes,
            min_cycle_off_minutes: options.min_cycle_off_minutes,
            unoccupied_heating_threshold: options.unoccupied_heating_threshold,
            unoccupied_cooling_threshold: options.unoccupied_cooling_threshold,
            heating_boost_offset: options.heating_boost_offset,
            cooling_boost_offset: options.cooling_boost_offset,
            default_target_low: options.default_target_low,
            default_target_high: options.default_target_high,
        }
    }

    fn critical_thresholds(&self) -> CriticalThresholds {
        CriticalThresholds {
            heating: self.unoccupied_heating_threshold,
            cooling: self.unoccupied_cooling_threshold,
        }
    }
}

/// One area as the decision engine sees it
#[derive(Debug, Clone, PartialEq)]
pub struct RoomInput {
    pub area_id: String,
    pub area_name: String,
    pub is_active: bool,
    pub temperature_sensors: Vec<String>,
}

/// Everything [`ThermostatController::evaluate`] needs besides the host
#[derive(Debug, Clone, Default)]
pub struct EvaluationInput<'a> {
    /// Every enabled area, active or not
    pub rooms: &'a [RoomInput],
    pub respect_user_off: bool,
    /// Only active rooms drive normal decisions; critical protection still applies
    pub eco_mode: bool,
    /// Replaces every area's targets
    pub eco_away_targets: Option<(f64, f64)>,
    /// `None` means every area is tracked
    pub tracked_area_ids: Option<&'a HashSet<String>>,
    /// Untracked areas still protected from critical temperatures
    pub force_critical_area_ids: Option<&'a HashSet<String>>,
}

impl EvaluationInput<'_> {
    fn is_tracked(&self, area_id: &str) -> bool {
        self.tracked_area_ids.map_or(true, |ids| ids.contains(area_id))
    }

    fn is_critical_eligible(&self, area_id: &str) -> bool {
        self.is_tracked(area_id)
            || self
                .force_critical_area_ids
                .is_some_and(|ids| ids.contains(area_id))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct StoredTargets {
    temp: Option<f64>,
    low: Option<f64>,
    high: Option<f64>,
}

/// Decides whether the thermostat should run, and carries the decision out
pub struct ThermostatController {
    host: SharedHost,
    clock: SharedClock,
    entry_id: String,
    thermostat_entity_id: String,
    registry: SharedRegistry,
    settings: ControllerSettings,

    paused_by_contact_sensors: bool,
    we_turned_off: bool,
    previous_hvac_mode: Option<HvacMode>,
    previous_fan_mode: Option<String>,
    we_changed_fan_mode: bool,
    stored_targets: StoredTargets,
    last_on_time: Option<DateTime<Utc>>,
    last_off_time: Option<DateTime<Utc>>,
    /// Persisted fields changed since the last save
    dirty: bool,
}

impl ThermostatController {
    pub fn new(
        host: SharedHost,
        clock: SharedClock,
        entry_id: impl Into<String>,
        thermostat_entity_id: impl Into<String>,
        registry: SharedRegistry,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            host,
            clock,
            entry_id: entry_id.into(),
            thermostat_entity_id: thermostat_entity_id.into(),
            registry,
            settings,
            paused_by_contact_sensors: false,
            we_turned_off: false,
            previous_hvac_mode: None,
            previous_fan_mode: None,
            we_changed_fan_mode: false,
            stored_targets: StoredTargets::default(),
            last_on_time: None,
            last_off_time: None,
            dirty: false,
        }
    }

    pub fn thermostat_entity_id(&self) -> &str {
        &self.thermostat_entity_id
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: ControllerSettings) {
        self.settings = settings;
    }

    pub fn is_paused_by_contact_sensors(&self) -> bool {
        self.paused_by_contact_sensors
    }

    /// While paused the engine evaluates for display but recommends nothing
    pub fn set_paused_by_contact_sensors(&mut self, paused: bool) {
        self.paused_by_contact_sensors = paused;
        debug!(paused, "Contact sensor pause state");
    }

    pub fn we_turned_off(&self) -> bool {
        self.we_turned_off
    }

    pub fn previous_hvac_mode(&self) -> Option<HvacMode> {
        self.previous_hvac_mode
    }

    pub fn last_on_time(&self) -> Option<DateTime<Utc>> {
        self.last_on_time
    }

    pub fn last_off_time(&self) -> Option<DateTime<Utc>> {
        self.last_off_time
    }

    /// Current mode and whether the unit is running
    pub fn thermostat_mode(&self) -> (Option<HvacMode>, bool) {
        let mode = self
            .host
            .read_state(&self.thermostat_entity_id)
            .and_then(|s| s.state.parse::<HvacMode>().ok());
        (mode, mode.is_some_and(|m| !m.is_off()))
    }

    pub fn supports_fan_mode(&self) -> bool {
        self.host
            .read_state(&self.thermostat_entity_id)
            .and_then(|s| s.attribute::<u64>(attrs::SUPPORTED_FEATURES))
            .is_some_and(|features| features & FEATURE_FAN_MODE != 0)
    }

    fn read_readings(&self, sensors: &[String]) -> Readings {
        sensors
            .iter()
            .filter_map(|id| {
                temperature_from_state(self.host.read_state(id).as_ref()).map(|t| (id.clone(), t))
            })
            .collect()
    }

    /// House-wide targets
    ///
    /// Sources in order: the global virtual thermostat, the physical
    /// thermostat's attributes (remembered for when it is off), the remembered
    /// values, then configured defaults. With `mode_override` the single
    /// target follows that mode instead of the thermostat's.
    pub fn target_temperatures(&mut self, mode_override: Option<HvacMode>) -> AreaTargets {
        if let Some(range) = self.registry.global_targets() {
            let mode = mode_override.or_else(|| self.thermostat_mode().0);
            return AreaTargets::for_mode(mode.unwrap_or(HvacMode::HeatCool), Some(range.low), Some(range.high));
        }

        let (temp, low, high) = match self.host.read_state(&self.thermostat_entity_id) {
            Some(state) => (
                state.attribute_f64(attrs::TEMPERATURE),
                state.attribute_f64(attrs::TARGET_TEMP_LOW),
                state.attribute_f64(attrs::TARGET_TEMP_HIGH),
            ),
            None => (None, None, None),
        };

        let before = self.stored_targets;
        if temp.is_some() {
            self.stored_targets.temp = temp;
        }
        if low.is_some() {
            self.stored_targets.low = low;
        }
        if high.is_some() {
            self.stored_targets.high = high;
        }
        if self.stored_targets != before {
            self.dirty = true;
        }

        let mut targets = AreaTargets {
            target: self.stored_targets.temp,
            low: self.stored_targets.low.or(self.settings.default_target_low),
            high: self.stored_targets.high.or(self.settings.default_target_high),
        };
        if targets.target.is_none() {
            targets.target = AreaTargets::for_mode(
                mode_override.unwrap_or(HvacMode::HeatCool),
                targets.low,
                targets.high,
            )
            .target;
        }

        match mode_override {
            Some(HvacMode::Heat) if targets.low.is_some() => targets.target = targets.low,
            Some(HvacMode::Cool) if targets.high.is_some() => targets.target = targets.high,
            Some(HvacMode::HeatCool) => {
                if let (Some(l), Some(h)) = (targets.low, targets.high) {
                    targets.target = Some((l + h) / 2.0);
                }
            }
            _ => {}
        }
        targets
    }

    /// Targets of one area: its virtual thermostat, else the house-wide ones
    pub fn area_target_temperatures(&mut self, area_id: &str, mode_override: Option<HvacMode>) -> AreaTargets {
        match self.registry.area_targets(area_id) {
            Some(range) => {
                let mode = mode_override.or_else(|| self.thermostat_mode().0);
                AreaTargets::for_mode(mode.unwrap_or(HvacMode::HeatCool), Some(range.low), Some(range.high))
            }
            None => self.target_temperatures(mode_override),
        }
    }

    pub fn can_turn_on(&self, now: DateTime<Utc>) -> (bool, String) {
        cycle_check(now, self.last_off_time, self.settings.min_cycle_off_minutes, "off")
    }

    pub fn can_turn_off(&self, now: DateTime<Utc>) -> (bool, String) {
        cycle_check(now, self.last_on_time, self.settings.min_cycle_on_minutes, "on")
    }

    pub fn record_thermostat_on(&mut self, now: DateTime<Utc>) {
        self.last_on_time = Some(now);
        self.dirty = true;
    }

    pub fn record_thermostat_off(&mut self, now: DateTime<Utc>) {
        self.last_off_time = Some(now);
        self.dirty = true;
    }

    /// Decide what the thermostat should do
    ///
    /// Every room is evaluated for display even when the outcome is NONE.
    /// Cycle timestamps are read but never written here.
    #[instrument(skip(self, input), fields(entity_id = %self.thermostat_entity_id))]
    pub fn evaluate(&mut self, input: &EvaluationInput<'_>) -> ThermostatState {
        let now = self.clock.now();
        let (hvac_mode, is_on) = self.thermostat_mode();
        let house = self.target_temperatures(None);

        let mut state = ThermostatState::new(&self.thermostat_entity_id);
        state.hvac_mode = hvac_mode;
        state.is_on = is_on;
        state.target_temperature = house.target;
        state.target_temp_low = house.low;
        state.target_temp_high = house.high;
        state.last_on_time = self.last_on_time;
        state.last_off_time = self.last_off_time;

        let trend_readings: Readings = input
            .rooms
            .iter()
            .flat_map(|room| self.read_readings(&room.temperature_sensors))
            .collect();

        let is_off = hvac_mode == Some(HvacMode::Off);
        let mut evaluation_mode = hvac_mode.unwrap_or(HvacMode::Off);
        let mut inferred = None;
        if is_off {
            inferred = infer_effective_hvac_mode(&trend_readings, house.low, house.high);
            state.inferred_hvac_mode = inferred;
            evaluation_mode = inferred.unwrap_or(HvacMode::Heat);
            debug!(
                inferred = ?inferred,
                sensors = trend_readings.len(),
                we_turned_off = self.we_turned_off,
                respect_user_off = input.respect_user_off,
                "Thermostat is off, evaluating in {}", evaluation_mode
            );
        }

        let user_turned_off = is_off && !self.we_turned_off && input.respect_user_off;
        let deadband = self.settings.temperature_deadband;
        let thresholds = self.settings.critical_thresholds();

        // Active rooms: satiation
        let mut tracked_active = 0;
        let mut satiated = 0;
        for room in input.rooms.iter().filter(|r| r.is_active) {
            let targets = self.targets_for_area(&room.area_id, evaluation_mode, input.eco_away_targets);
            let fresh = self.fresh_room_state(room);
            let room_state = evaluate_room_satiation(fresh, evaluation_mode, targets, deadband, thresholds);
            if input.is_tracked(&room.area_id) {
                tracked_active += 1;
                if room_state.is_satiated {
                    satiated += 1;
                }
            }
            state.room_states.insert(room.area_id.clone(), room_state);
        }
        state.active_room_count = tracked_active;
        state.satiated_room_count = satiated;
        state.all_active_rooms_satiated = tracked_active > 0 && satiated == tracked_active;

        // Inactive rooms: critical protection
        let mut critical = 0;
        for room in input.rooms.iter().filter(|r| !r.is_active) {
            if state.room_states.contains_key(&room.area_id) || room.temperature_sensors.is_empty() {
                continue;
            }
            let targets = self.targets_for_area(&room.area_id, evaluation_mode, input.eco_away_targets);
            let fresh = self.fresh_room_state(room);
            let room_state = evaluate_room_critical(fresh, evaluation_mode, targets, thresholds);
            if room_state.is_critical {
                if input.is_critical_eligible(&room.area_id) {
                    critical += 1;
                    debug!(area_id = %room.area_id, reason = ?room_state.critical_reason, "Inactive room is critical");
                } else {
                    debug!(area_id = %room.area_id, "Inactive room is critical but not tracked, ignoring");
                }
            }
            state.room_states.insert(room.area_id.clone(), room_state);
        }
        state.critical_room_count = critical;

        // Mode-independent needs
        let need_thresholds = NeedThresholds {
            target_low: house.low.or(house.target).unwrap_or(FALLBACK_TARGET_LOW),
            target_high: house.high.or(house.target).unwrap_or(FALLBACK_TARGET_HIGH),
            deadband,
            heating_critical_offset: thresholds.heating,
            cooling_critical_offset: thresholds.cooling,
        };
        let considered = state.room_states.iter().filter(|(area_id, room)| {
            (input.is_tracked(area_id) && (room.is_active || !input.eco_mode))
                || (room.is_critical && input.is_critical_eligible(area_id))
        });
        let (need_heat, need_cool) = determine_rooms_need_mode(
            considered.map(|(_, room)| NeedInput {
                is_active: room.is_active,
                temperature: room.determining_temperature,
            }),
            need_thresholds,
        );
        state.rooms_need_heat = need_heat;
        state.rooms_need_cool = need_cool;

        let unsatiated_active = tracked_active - satiated;
        let needs_conditioning = if is_off {
            need_heat || need_cool || critical > 0
        } else {
            unsatiated_active > 0 || critical > 0
        };
        debug!(need_heat, need_cool, needs_conditioning, "Rooms evaluated");

        if self.paused_by_contact_sensors {
            state.decide(ThermostatAction::None, "Paused by open contact sensors");
            return state;
        }
        if user_turned_off {
            state.decide(ThermostatAction::None, "Thermostat is off (user choice)");
            return state;
        }

        let any_active = input.rooms.iter().any(|r| r.is_active);
        if !any_active && critical == 0 && !(need_heat || need_cool) {
            let reason = if input.rooms.is_empty() {
                "No rooms configured"
            } else {
                "No active or critical rooms (idle)"
            };
            state.decide(ThermostatAction::None, reason);
            return state;
        }

        if !needs_conditioning {
            if is_on {
                let (can_off, why) = self.can_turn_off(now);
                if can_off {
                    state.decide(
                        ThermostatAction::TurnOff,
                        format!("All {} active rooms satiated, no critical rooms", satiated),
                    );
                } else {
                    state.decide(ThermostatAction::WaitCycleOn, format!("Want to turn off but {}", why));
                }
            } else {
                state.decide(ThermostatAction::None, "Already off, all rooms satiated");
            }
            return state;
        }

        let mut parts = Vec::new();
        if unsatiated_active > 0 {
            parts.push(format!("{} active rooms need conditioning", unsatiated_active));
        }
        if critical > 0 {
            parts.push(format!("{} critical rooms", critical));
        }
        if need_heat && critical == 0 && unsatiated_active == 0 {
            parts.push("inactive room(s) in critical heat range".to_string());
        }
        if need_cool && critical == 0 && unsatiated_active == 0 {
            parts.push("inactive room(s) in critical cool range".to_string());
        }
        let needs = parts.join(" and ");

        if is_on {
            state.decide(ThermostatAction::None, format!("Already on, {}", needs));
            return state;
        }

        let consensus = match inferred {
            Some(HvacMode::Heat) if need_heat => Some((HvacMode::Heat, "Trend=HEAT, rooms need heat")),
            Some(HvacMode::Cool) if need_cool => Some((HvacMode::Cool, "Trend=COOL, rooms need cool")),
            None if need_heat => Some((HvacMode::Heat, "No trend data, rooms need heat")),
            None if need_cool => Some((HvacMode::Cool, "No trend data, rooms need cool")),
            _ => None,
        };

        match consensus {
            Some((mode, why)) => {
                let (can_on, cycle) = self.can_turn_on(now);
                if can_on {
                    state.mode_to_engage = Some(mode);
                    state.decide(ThermostatAction::TurnOn, format!("{} ({})", needs, why));
                } else {
                    state.decide(ThermostatAction::WaitCycleOff, format!("Want to turn on but {}", cycle));
                }
            }
            None => {
                debug!(inferred = ?inferred, need_heat, need_cool, "No mode consensus, not turning on");
                let reason = match inferred {
                    Some(HvacMode::Heat) if need_cool => {
                        format!("Anomaly: house trend is HEAT but rooms need COOL ({})", needs)
                    }
                    Some(HvacMode::Cool) if need_heat => {
                        format!("Anomaly: house trend is COOL but rooms need HEAT ({})", needs)
                    }
                    _ => format!("No clear mode consensus ({})", needs),
                };
                state.decide(ThermostatAction::None, reason);
            }
        }
        state
    }

    fn targets_for_area(
        &mut self,
        area_id: &str,
        mode: HvacMode,
        eco_away_targets: Option<(f64, f64)>,
    ) -> AreaTargets {
        match eco_away_targets {
            Some((low, high)) => AreaTargets::for_mode(mode, Some(low), Some(high)),
            None => self.area_target_temperatures(area_id, Some(mode)),
        }
    }

    fn fresh_room_state(&self, room: &RoomInput) -> RoomTemperatureState {
        RoomTemperatureState::new(
            room.area_id.clone(),
            room.area_name.clone(),
            room.temperature_sensors.clone(),
            self.read_readings(&room.temperature_sensors),
        )
    }

    /// Carry out a TURN_ON or TURN_OFF recommendation
    ///
    /// Returns whether anything was done. A failed HVAC-mode command is
    /// returned as an error; fan and setpoint failures are only logged.
    #[instrument(skip(self, state), fields(entity_id = %self.thermostat_entity_id, action = state.recommended_action.as_str()))]
    pub async fn execute(&mut self, state: &ThermostatState) -> ThermostatResult<bool> {
        match state.recommended_action {
            ThermostatAction::None => Ok(false),
            ThermostatAction::WaitCycleOn | ThermostatAction::WaitCycleOff => {
                debug!(reason = %state.action_reason, "Waiting for cycle protection");
                Ok(false)
            }
            ThermostatAction::TurnOn => {
                let mode = state
                    .mode_to_engage
                    .filter(|m| !m.is_off())
                    .or(self.previous_hvac_mode.filter(|m| !m.is_off()))
                    .unwrap_or(HvacMode::Heat);
                info!(mode = %mode, reason = %state.action_reason, "Turning thermostat on");

                self.set_hvac_mode(mode).await?;
                self.apply_setpoint(mode, state).await;
                self.set_fan_conditioning().await;

                self.record_thermostat_on(self.clock.now());
                self.we_turned_off = false;
                Ok(true)
            }
            ThermostatAction::TurnOff => {
                info!(reason = %state.action_reason, "Turning thermostat off");

                if let (Some(mode), true) = self.thermostat_mode() {
                    self.previous_hvac_mode = Some(mode);
                }
                self.set_fan_idle().await;
                self.set_hvac_mode(HvacMode::Off).await?;

                self.record_thermostat_off(self.clock.now());
                self.we_turned_off = true;
                Ok(true)
            }
        }
    }

    /// Command the HVAC mode; a failure is returned, never swallowed
    pub async fn set_hvac_mode(&self, mode: HvacMode) -> ThermostatResult<()> {
        self.host
            .call_service(
                domains::CLIMATE,
                services::SET_HVAC_MODE,
                json!({
                    "entity_id": self.thermostat_entity_id,
                    "hvac_mode": mode.as_str(),
                }),
                Context::new(),
            )
            .await
            .map(|_| ())
            .map_err(|source| ThermostatError::HvacCommand {
                entity_id: self.thermostat_entity_id.clone(),
                source,
            })
    }

    /// Push the targets, with boost offsets, to the physical thermostat
    async fn apply_setpoint(&self, mode: HvacMode, state: &ThermostatState) {
        let heat_boost = self.settings.heating_boost_offset;
        let cool_boost = self.settings.cooling_boost_offset;

        let mut data = json!({ "entity_id": self.thermostat_entity_id });
        match mode {
            HvacMode::Heat | HvacMode::Cool => {
                let target = match mode {
                    HvacMode::Heat => state.target_temp_low.or(state.target_temperature),
                    _ => state.target_temp_high.or(state.target_temperature),
                };
                let Some(target) = target else {
                    return;
                };
                let temperature = if mode == HvacMode::Heat {
                    target + heat_boost
                } else {
                    target - cool_boost
                };
                data[attrs::TEMPERATURE] = json!(temperature);
                info!(temperature, target, "Setting thermostat temperature");
            }
            HvacMode::HeatCool => {
                if state.target_temp_low.is_none() && state.target_temp_high.is_none() {
                    return;
                }
                if let Some(low) = state.target_temp_low {
                    data[attrs::TARGET_TEMP_LOW] = json!(low + heat_boost);
                }
                if let Some(high) = state.target_temp_high {
                    data[attrs::TARGET_TEMP_HIGH] = json!(high - cool_boost);
                }
                info!(heat_boost, cool_boost, "Setting thermostat temperature range");
            }
            _ => return,
        }

        if let Err(err) = self
            .host
            .call_service(domains::CLIMATE, services::SET_TEMPERATURE, data, Context::new())
            .await
        {
            warn!(error = %err, "Failed to set thermostat temperature");
        }
    }

    /// Best-effort switch of the fan to its idle mode (`auto`, else `off`)
    ///
    /// Returns whether the fan mode was changed.
    pub async fn set_fan_idle(&mut self) -> bool {
        self.change_fan_mode(FanMode::best_idle_mode).await
    }

    async fn set_fan_conditioning(&mut self) -> bool {
        self.change_fan_mode(FanMode::best_on_mode).await
    }

    async fn change_fan_mode(&mut self, pick: fn(&[String]) -> Option<String>) -> bool {
        if !self.supports_fan_mode() {
            return false;
        }
        let Some(state) = self.host.read_state(&self.thermostat_entity_id) else {
            return false;
        };
        let available: Vec<String> = state.attribute(attrs::FAN_MODES).unwrap_or_default();
        let Some(target) = pick(&available) else {
            return false;
        };

        let current: Option<String> = state.attribute(attrs::FAN_MODE);
        if !self.we_changed_fan_mode && current.is_some() {
            self.previous_fan_mode = current.clone();
            self.dirty = true;
        }
        if current.as_deref() == Some(target.as_str()) {
            return false;
        }

        info!(fan_mode = %target, was = ?current, "Setting fan mode");
        match self
            .host
            .call_service(
                domains::CLIMATE,
                services::SET_FAN_MODE,
                json!({
                    "entity_id": self.thermostat_entity_id,
                    "fan_mode": target,
                }),
                Context::new(),
            )
            .await
        {
            Ok(_) => {
                self.we_changed_fan_mode = true;
                self.dirty = true;
                true
            }
            Err(err) => {
                warn!(error = %err, "Failed to set fan mode");
                false
            }
        }
    }

    /// Restore persisted state
    #[instrument(skip(self), fields(entry_id = %self.entry_id))]
    pub async fn setup(&mut self) {
        let key = ThermostatControlStore::storage_key(&self.entry_id);
        let stored: ThermostatControlStore = match self.host.load(&key).await {
            Ok(Some(file)) => match decode_with_migration(file, None) {
                Ok(stored) => stored,
                Err(err) => {
                    warn!(error = %err, "Discarding unreadable thermostat state");
                    return;
                }
            },
            Ok(None) => {
                debug!("No stored thermostat controller state found");
                return;
            }
            Err(err) => {
                warn!(error = %err, "Failed to load thermostat state");
                return;
            }
        };

        self.we_turned_off = stored.we_turned_off;
        self.previous_hvac_mode = stored
            .previous_hvac_mode
            .as_deref()
            .and_then(|m| m.parse().ok());
        self.previous_fan_mode = stored.previous_fan_mode;
        self.we_changed_fan_mode = stored.we_changed_fan_mode;
        self.stored_targets = StoredTargets {
            temp: stored.stored_target_temp,
            low: stored.stored_target_temp_low,
            high: stored.stored_target_temp_high,
        };
        self.last_on_time = stored.last_on_time;
        self.last_off_time = stored.last_off_time;

        debug!(
            we_turned_off = self.we_turned_off,
            previous_hvac_mode = ?self.previous_hvac_mode,
            saved_at = ?stored.saved_at,
            "Restored thermostat controller state"
        );
    }

    pub async fn shutdown(&mut self) -> StorageResult<()> {
        self.save_state().await
    }

    /// Save when anything persisted changed since the last save
    pub async fn save_if_dirty(&mut self) -> StorageResult<()> {
        if self.dirty {
            self.save_state().await?;
        }
        Ok(())
    }

    pub async fn save_state(&mut self) -> StorageResult<()> {
        let store = ThermostatControlStore {
            we_turned_off: self.we_turned_off,
            previous_hvac_mode: self.previous_hvac_mode.map(|m| m.as_str().to_string()),
            previous_fan_mode: self.previous_fan_mode.clone(),
            we_changed_fan_mode: self.we_changed_fan_mode,
            stored_target_temp: self.stored_targets.temp,
            stored_target_temp_low: self.stored_targets.low,
            stored_target_temp_high: self.stored_targets.high,
            last_on_time: self.last_on_time,
            last_off_time: self.last_off_time,
            saved_at: Some(self.clock.now()),
        };
        self.host.persist(store.to_storage_file(&self.entry_id)?).await?;
        self.dirty = false;
        debug!("Saved thermostat controller state");
        Ok(())
    }

    /// Diagnostics view of a decision together with the engine's settings
    pub fn summary(&self, state: &ThermostatState) -> ThermostatSummary {
        ThermostatSummary {
            state: state.clone(),
            settings: self.settings.clone(),
            is_paused_by_contact_sensors: self.paused_by_contact_sensors,
            we_turned_off: self.we_turned_off,
            previous_hvac_mode: self.previous_hvac_mode,
            previous_fan_mode: self.previous_fan_mode.clone(),
        }
    }
}

/// Serializable diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct ThermostatSummary {
    #[serde(flatten)]
    pub state: ThermostatState,
    pub settings: ControllerSettings,
    pub is_paused_by_contact_sensors: bool,
    pub we_turned_off: bool,
    pub previous_hvac_mode: Option<HvacMode>,
    pub previous_fan_mode: Option<String>,
}

fn cycle_check(
    now: DateTime<Utc>,
    since: Option<DateTime<Utc>>,
    min_minutes: u32,
    state: &str,
) -> (bool, String) {
    let Some(since) = since else {
        return (true, format!("No previous {} time recorded", state));
    };
    let elapsed = now - since;
    let required = Duration::minutes(i64::from(min_minutes));
    if elapsed >= required {
        (true, format!("{} for {:.1} minutes", capitalize(state), minutes(elapsed)))
    } else {
        (false, format!("Must wait {:.1} more minutes", minutes(required - elapsed)))
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn minutes(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64 / 60_000.0
}
