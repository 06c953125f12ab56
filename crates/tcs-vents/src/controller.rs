use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tcs_core::{attrs, domains, services, Context, EntityState, SharedClock, StateChangedData, TemperatureUnit};
use tcs_host::SharedHost;
use tcs_thermostat::{RoomTemperatureState, ThermostatState};
use tracing::{debug, error, instrument, warn};

use crate::{priority_score, AreaVentState, ScoringContext, VentCommand, VentControlState, VentState};

/// Seconds a commanded vent may take to reach the desired state before the
/// command is retried
pub const CONFIRMATION_TIMEOUT_SECONDS: i64 = 60;

/// Commands sent to a vent before it is considered unresponsive
pub const MAX_COMMAND_ATTEMPTS: u32 = 3;

const STATE_OPEN: &str = "open";
const STATE_CLOSED: &str = "closed";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VentSettings {
    /// Floor of open vent members
    pub min_vents_open: usize,
    pub vent_open_delay_seconds: u32,
    pub vent_debounce_seconds: u32,
    pub temperature_unit: TemperatureUnit,
}

impl Default for VentSettings {
    fn default() -> Self {
        Self {
            min_vents_open: 5,
            vent_open_delay_seconds: 30,
            vent_debounce_seconds: 30,
            temperature_unit: TemperatureUnit::default(),
        }
    }
}

/// One area's vents and occupancy as seen by the allocator
#[derive(Debug, Clone, PartialEq)]
pub struct AreaVentInput {
    pub area_id: String,
    pub area_name: String,
    pub vents: Vec<String>,
    pub is_active: bool,
    pub is_occupied: bool,
    pub occupancy_start_time: Option<DateTime<Utc>>,
    /// Overrides the global open delay
    pub vent_open_delay_seconds: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
struct PendingConfirmation {
    should_open: bool,
    command_time: DateTime<Utc>,
    attempts: u32,
}

/// Computes which vents should be open and sends the tilt commands
pub struct VentController {
    host: SharedHost,
    clock: SharedClock,
    settings: VentSettings,
    last_command_times: HashMap<String, DateTime<Utc>>,
    pending_confirmations: HashMap<String, PendingConfirmation>,
    /// Skipped until they report a state change
    unresponsive: HashSet<String>,
}

impl VentController {
    pub fn new(host: SharedHost, clock: SharedClock, settings: VentSettings) -> Self {
        Self {
            host,
            clock,
            settings,
            last_command_times: HashMap::new(),
            pending_confirmations: HashMap::new(),
            unresponsive: HashSet::new(),
        }
    }

    pub fn settings(&self) -> &VentSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: VentSettings) {
        self.settings = settings;
    }

    pub fn is_unresponsive(&self, entity_id: &str) -> bool {
        self.unresponsive.contains(entity_id)
    }

    /// A vent that reports any change is given another chance
    pub fn handle_state_change(&mut self, change: &StateChangedData) {
        if self.unresponsive.remove(&change.entity_id) {
            debug!(entity_id = %change.entity_id, "Unresponsive vent reported a state change");
        }
    }

    /// Open when the state is `open` or the tilt is past half way
    pub fn is_vent_open(state: Option<&EntityState>) -> bool {
        let Some(state) = state else {
            return false;
        };
        if state.has_no_value() {
            return false;
        }
        if state.state == STATE_OPEN {
            return true;
        }
        if let Some(tilt) = state.attribute_f64(attrs::CURRENT_TILT_POSITION) {
            return tilt > 50.0;
        }
        state.state != STATE_CLOSED
    }

    /// Members of a cover group, or `None` for a single vent
    fn group_members(state: Option<&EntityState>) -> Option<usize> {
        state?
            .attribute::<Vec<String>>(attrs::ENTITY_ID)
            .filter(|members| !members.is_empty())
            .map(|members| members.len())
    }

    pub fn can_send_command(&self, entity_id: &str, now: DateTime<Utc>) -> (bool, String) {
        let Some(last) = self.last_command_times.get(entity_id) else {
            return (true, "No previous command".to_string());
        };
        let elapsed = (now - *last).num_milliseconds() as f64 / 1000.0;
        let debounce = f64::from(self.settings.vent_debounce_seconds);
        if elapsed < debounce {
            (false, format!("Debounce: {:.0}s remaining", debounce - elapsed))
        } else {
            (true, "Debounce period passed".to_string())
        }
    }

    fn evaluate_area(
        &self,
        input: &AreaVentInput,
        room: Option<&RoomTemperatureState>,
        now: DateTime<Utc>,
    ) -> AreaVentState {
        let open_delay = input
            .vent_open_delay_seconds
            .unwrap_or(self.settings.vent_open_delay_seconds);
        let is_satiated = room.is_some_and(|r| r.is_satiated);
        let is_critical = room.is_some_and(|r| r.is_critical);
        let determining_temperature = room.and_then(|r| r.determining_temperature);
        let distance_from_target = room.and_then(|r| {
            let temp = r.determining_temperature?;
            Some(match r.target_temperature {
                _ if r.is_satiated => 0.0,
                Some(target) => (temp - target).abs(),
                None => 0.0,
            })
        });

        let occupied_since = input
            .occupancy_start_time
            .filter(|_| input.is_occupied)
            .map(|start| (now - start).num_milliseconds() as f64 / 1000.0);

        let (should_open, open_reason) = if is_critical {
            (true, "Critical temperature".to_string())
        } else if let Some(seconds) = occupied_since {
            if seconds >= f64::from(open_delay) {
                (true, format!("Occupied for {:.0}s (>= {}s)", seconds, open_delay))
            } else if input.is_active && !is_satiated {
                (true, "Active, needs conditioning".to_string())
            } else {
                (false, format!("Occupied only {:.0}s (< {}s delay)", seconds, open_delay))
            }
        } else if input.is_active && !is_satiated {
            (true, "Active, needs conditioning".to_string())
        } else if is_satiated {
            (false, "Satiated - at target temperature".to_string())
        } else {
            (false, "Inactive".to_string())
        };

        let mut area = AreaVentState {
            area_id: input.area_id.clone(),
            area_name: input.area_name.clone(),
            vents: Vec::with_capacity(input.vents.len()),
            total_vent_count: 0,
            open_vent_count: 0,
            should_open,
            open_reason: open_reason.clone(),
            is_active: input.is_active,
            is_occupied: input.is_occupied,
            is_critical,
            is_satiated,
            occupancy_start_time: input.occupancy_start_time,
            distance_from_target,
            determining_temperature,
        };

        for entity_id in &input.vents {
            let state = self.host.read_state(entity_id);
            let members = Self::group_members(state.as_ref());
            let member_count = members.unwrap_or(1);
            let is_open = Self::is_vent_open(state.as_ref());

            area.total_vent_count += member_count;
            if is_open {
                area.open_vent_count += member_count;
            }
            area.vents.push(VentState {
                entity_id: entity_id.clone(),
                area_id: input.area_id.clone(),
                is_group: members.is_some(),
                member_count,
                is_open,
                should_be_open: should_open,
                last_command_time: self.last_command_times.get(entity_id).copied(),
                open_reason: should_open.then(|| open_reason.clone()),
                is_unresponsive: self.unresponsive.contains(entity_id),
            });
        }
        area
    }

    /// Decide every vent's desired state for this cycle
    ///
    /// Uses the room states and effective mode of the decision snapshot from
    /// the same cycle. Areas without vents are skipped.
    #[instrument(skip_all)]
    pub fn evaluate(&mut self, areas: &[AreaVentInput], thermostat: &ThermostatState) -> VentControlState {
        let now = self.clock.now();
        let mut control = VentControlState {
            min_vents_open: self.settings.min_vents_open,
            ..Default::default()
        };

        for input in areas.iter().filter(|a| !a.vents.is_empty()) {
            let area = self.evaluate_area(input, thermostat.room_states.get(&input.area_id), now);
            control.total_vents += area.total_vent_count;
            control.open_vents += area.open_vent_count;
            control.area_states.insert(input.area_id.clone(), area);
        }

        self.apply_minimum_floor(&mut control, thermostat);

        control.vents_should_be_open = control
            .vents()
            .filter(|v| v.should_be_open)
            .map(|v| v.member_count)
            .sum();

        for vent in control.area_states.values().flat_map(|a| a.vents.iter()) {
            if vent.should_be_open == vent.is_open {
                continue;
            }
            if vent.is_unresponsive {
                debug!(entity_id = %vent.entity_id, "Skipping command for unresponsive vent");
                continue;
            }
            let (can_send, reason) = self.can_send_command(&vent.entity_id, now);
            if !can_send {
                debug!(entity_id = %vent.entity_id, reason = %reason, "Skipping vent command");
                continue;
            }
            control.pending_commands.push(VentCommand {
                entity_id: vent.entity_id.clone(),
                should_open: vent.should_be_open,
                reason: vent
                    .open_reason
                    .clone()
                    .unwrap_or_else(|| "Close vent".to_string()),
            });
        }

        debug!(
            total = control.total_vents,
            open = control.open_vents,
            should_be_open = control.vents_should_be_open,
            pending = control.pending_commands.len(),
            "Vents evaluated"
        );
        control
    }

    /// Open the best-ranked closed vents until the floor is met
    ///
    /// A group larger than the remaining need is passed over while smaller
    /// vents can still fill the gap. When only passed-over groups can close
    /// it, the one overshooting least is opened and lower-ranked singles it
    /// makes redundant are given back.
    fn apply_minimum_floor(&self, control: &mut VentControlState, thermostat: &ThermostatState) {
        let min = self.settings.min_vents_open;
        let open_by_rules: usize = control
            .vents()
            .filter(|v| v.should_be_open && !v.is_unresponsive)
            .map(|v| v.member_count)
            .sum();
        if open_by_rules >= min {
            return;
        }

        let ctx = ScoringContext {
            mode: thermostat.effective_mode(),
            unit: self.settings.temperature_unit,
        };
        let mut ranked: Vec<(String, usize, f64)> = control
            .area_states
            .values()
            .flat_map(|area| {
                let score = priority_score(area, ctx);
                area.vents
                    .iter()
                    .filter(|v| !v.should_be_open && !v.is_unresponsive)
                    .map(move |v| (v.entity_id.clone(), v.member_count, score))
            })
            .collect();
        // Stable, so equal scores keep configuration order
        ranked.sort_by(|a, b| b.2.total_cmp(&a.2));

        let mut needed = min - open_by_rules;
        // Rank order
        let mut chosen: Vec<(String, usize)> = Vec::new();
        let mut passed_over: Vec<(String, usize)> = Vec::new();
        for (entity_id, members, score) in ranked {
            if needed == 0 {
                break;
            }
            if members > needed {
                passed_over.push((entity_id, members));
                continue;
            }
            debug!(entity_id = %entity_id, score, "Opening vent for minimum");
            needed -= members;
            chosen.push((entity_id, members));
        }

        if needed > 0 {
            // Every passed-over group exceeds what is left; prefer the
            // smallest, earlier rank on ties
            let fallback = passed_over
                .iter()
                .enumerate()
                .min_by_key(|(rank, (_, members))| (*members, *rank))
                .map(|(_, vent)| vent.clone());
            if let Some((entity_id, members)) = fallback {
                debug!(entity_id = %entity_id, members, needed, "Opening oversized group for minimum");
                let mut surplus = members - needed;
                for index in (0..chosen.len()).rev() {
                    if chosen[index].1 <= surplus {
                        surplus -= chosen[index].1;
                        let (dropped, _) = chosen.remove(index);
                        debug!(entity_id = %dropped, "Vent no longer needed for minimum");
                    }
                }
                chosen.push((entity_id, members));
            }
        }

        let chosen: HashSet<String> = chosen.into_iter().map(|(entity_id, _)| entity_id).collect();
        let reason = format!("Minimum vents (need {})", min);
        for area in control.area_states.values_mut() {
            for vent in area.vents.iter_mut().filter(|v| chosen.contains(&v.entity_id)) {
                vent.should_be_open = true;
                vent.open_reason = Some(reason.clone());
            }
        }
    }

    /// Send the pending commands; returns how many succeeded
    ///
    /// Failed calls are logged and left for the next cycle without touching
    /// the debounce clock.
    #[instrument(skip_all, fields(pending = control.pending_commands.len()))]
    pub async fn execute(&mut self, control: &VentControlState) -> usize {
        let now = self.clock.now();
        self.reconcile_confirmations(now);

        let mut executed = 0;
        for command in &control.pending_commands {
            if self.unresponsive.contains(&command.entity_id) {
                debug!(entity_id = %command.entity_id, "Skipping command for unresponsive vent");
                continue;
            }
            if self.attempts_exhausted(&command.entity_id, command.should_open) {
                debug!(entity_id = %command.entity_id, "Awaiting confirmation of final attempt");
                continue;
            }
            let service = if command.should_open {
                services::OPEN_COVER_TILT
            } else {
                services::CLOSE_COVER_TILT
            };
            debug!(entity_id = %command.entity_id, service, reason = %command.reason, "Sending vent command");

            match self
                .host
                .call_service(
                    domains::COVER,
                    service,
                    json!({ "entity_id": command.entity_id }),
                    Context::new(),
                )
                .await
            {
                Ok(_) => {
                    self.last_command_times.insert(command.entity_id.clone(), now);
                    let attempts = self
                        .pending_confirmations
                        .get(&command.entity_id)
                        .filter(|p| p.should_open == command.should_open)
                        .map_or(0, |p| p.attempts);
                    self.pending_confirmations.insert(
                        command.entity_id.clone(),
                        PendingConfirmation {
                            should_open: command.should_open,
                            command_time: now,
                            attempts: attempts + 1,
                        },
                    );
                    executed += 1;
                }
                Err(err) => {
                    error!(entity_id = %command.entity_id, service, error = %err, "Vent command failed");
                }
            }
        }
        executed
    }

    /// The last allowed command in this direction is still unconfirmed
    fn attempts_exhausted(&self, entity_id: &str, should_open: bool) -> bool {
        self.pending_confirmations
            .get(entity_id)
            .is_some_and(|p| p.should_open == should_open && p.attempts >= MAX_COMMAND_ATTEMPTS)
    }

    /// Drop confirmed commands and give up on vents that keep ignoring them
    ///
    /// Attempts accumulate across resends in the same direction and only
    /// reset on confirmation or a change of direction.
    fn reconcile_confirmations(&mut self, now: DateTime<Utc>) {
        let host = &self.host;
        let unresponsive = &mut self.unresponsive;
        self.pending_confirmations.retain(|entity_id, pending| {
            let is_open = Self::is_vent_open(host.read_state(entity_id).as_ref());
            if is_open == pending.should_open {
                debug!(entity_id = %entity_id, "Vent confirmed in desired state");
                return false;
            }
            let elapsed = now - pending.command_time;
            if elapsed < Duration::seconds(CONFIRMATION_TIMEOUT_SECONDS) {
                return true;
            }
            if pending.attempts < MAX_COMMAND_ATTEMPTS {
                warn!(
                    entity_id = %entity_id,
                    elapsed_secs = elapsed.num_seconds(),
                    attempt = pending.attempts + 1,
                    "Vent has not responded, retrying"
                );
                true
            } else {
                error!(entity_id = %entity_id, attempts = pending.attempts, "Vent marked unresponsive");
                unresponsive.insert(entity_id.clone());
                false
            }
        });
    }

    pub fn summary(&self, control: &VentControlState) -> VentSummary {
        VentSummary {
            total_vents: control.total_vents,
            open_vents: control.open_vents,
            vents_should_be_open: control.vents_should_be_open,
            min_vents_required: self.settings.min_vents_open,
            pending_commands: control.pending_commands.len(),
            unresponsive_vents: {
                let mut ids: Vec<String> = self.unresponsive.iter().cloned().collect();
                ids.sort();
                ids
            },
            areas: control.area_states.clone(),
        }
    }
}

/// Serializable diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct VentSummary {
    pub total_vents: usize,
    pub open_vents: usize,
    pub vents_should_be_open: usize,
    pub min_vents_required: usize,
    pub pending_commands: usize,
    pub unresponsive_vents: Vec<String>,
    pub areas: indexmap::IndexMap<String, AreaVentState>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::collections::HashMap as Map;

    fn state(value: &str, attrs: &[(&str, Value)]) -> EntityState {
        let attributes: Map<String, Value> =
            attrs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        EntityState::new("cover.den_vent", value, attributes, Utc::now())
    }

    #[test]
    fn test_open_detection() {
        assert!(!VentController::is_vent_open(None));
        assert!(VentController::is_vent_open(Some(&state("open", &[]))));
        assert!(!VentController::is_vent_open(Some(&state("closed", &[]))));
        assert!(!VentController::is_vent_open(Some(&state("unavailable", &[]))));
        assert!(VentController::is_vent_open(Some(&state(
            "opening",
            &[("current_tilt_position", serde_json::json!(80))]
        ))));
        assert!(!VentController::is_vent_open(Some(&state(
            "opening",
            &[("current_tilt_position", serde_json::json!(50))]
        ))));
        assert!(VentController::is_vent_open(Some(&state("opening", &[]))));
    }

    #[test]
    fn test_group_detection() {
        let group = state("closed", &[("entity_id", serde_json::json!(["cover.a", "cover.b", "cover.c"]))]);
        assert_eq!(VentController::group_members(Some(&group)), Some(3));
        assert_eq!(VentController::group_members(Some(&state("closed", &[]))), None);
    }
}
