//! The per-entry coordinator
//!
//! One [`EntryCoordinator`] owns every piece of mutable state of a config
//! entry: the occupancy tracker, the thermostat decision engine, the vent
//! allocator and the contact-sensor pause orchestrator. It runs as a single
//! task and handles one event at a time, so none of that state needs a lock.
//!
//! Every evaluation cycle runs the decision engine first and the vent
//! allocator second, because vent priority depends on the HVAC mode and room
//! satiation computed in the same cycle.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::StreamExt;
use indexmap::IndexSet;
use serde_json::json;
use tcs_config::{AreaTable, ConfigEntry, EntityRole, Options};
use tcs_core::{EntityState, HvacMode, SharedClock, StateChangedData};
use tcs_host::{Scheduler, SharedHost, TokioScheduler};
use tcs_occupancy::{OccupancyTracker, TICK_INTERVAL};
use tcs_thermostat::{
    AreaThermostats, ControllerSettings, EvaluationInput, RoomInput, SharedRegistry,
    ThermostatController, ThermostatState,
};
use tcs_vents::{AreaVentInput, VentControlState, VentController, VentSettings};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::contacts::{is_contact_open, OpenSensors};
use crate::notify::{NotificationContext, NotificationKind, Notifier};
use crate::pause::{ModeObservation, PauseState, PauseStatus};
use crate::timers::{EntryTimers, TimerKind, TimerToken};
use crate::{
    Command, CoordinatorEvent, CoordinatorHandle, CoordinatorResult, CoordinatorUpdate,
    CoordinatorError, RoomSettings,
};

const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Vent allocator tunables taken from the entry options
pub fn vent_settings(options: &Options) -> VentSettings {
    VentSettings {
        min_vents_open: options.min_vents_open as usize,
        vent_open_delay_seconds: options.vent_open_delay_seconds,
        vent_debounce_seconds: options.vent_debounce_seconds,
        temperature_unit: options.temperature_unit,
    }
}

fn hvac_mode_of(state: &EntityState) -> Option<HvacMode> {
    if state.has_no_value() {
        return None;
    }
    state.state.parse().ok()
}

pub struct EntryCoordinator {
    entry_id: String,
    thermostat_id: String,
    contact_sensors: Vec<String>,
    areas: AreaTable,
    options: Options,
    settings: RoomSettings,

    host: SharedHost,
    clock: SharedClock,
    scheduler: Arc<dyn Scheduler<TimerToken>>,
    events_tx: mpsc::UnboundedSender<CoordinatorEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<CoordinatorEvent>>,
    updates: broadcast::Sender<CoordinatorUpdate>,

    tracker: OccupancyTracker,
    thermostat: ThermostatController,
    vents: VentController,
    area_thermostats: Arc<AreaThermostats>,

    open_sensors: OpenSensors,
    timers: EntryTimers,
    pause: PauseState,
    notifier: Notifier,

    last_thermostat_state: Option<Arc<ThermostatState>>,
    last_vent_state: Option<Arc<VentControlState>>,
}

impl EntryCoordinator {
    /// Coordinator whose timers run on tokio
    pub fn new(entry: ConfigEntry, host: SharedHost, clock: SharedClock) -> CoordinatorResult<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler: Arc<dyn Scheduler<TimerToken>> = Arc::new(TokioScheduler::new(tx.clone()));
        Self::build(entry, host, clock, scheduler, tx, rx)
    }

    /// Coordinator with an injected scheduler
    ///
    /// Timer tokens from `scheduler` must be handed to
    /// [`handle_timer`](Self::handle_timer) by the caller.
    pub fn with_scheduler(
        entry: ConfigEntry,
        host: SharedHost,
        clock: SharedClock,
        scheduler: Arc<dyn Scheduler<TimerToken>>,
    ) -> CoordinatorResult<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Self::build(entry, host, clock, scheduler, tx, rx)
    }

    fn build(
        entry: ConfigEntry,
        host: SharedHost,
        clock: SharedClock,
        scheduler: Arc<dyn Scheduler<TimerToken>>,
        events_tx: mpsc::UnboundedSender<CoordinatorEvent>,
        events_rx: mpsc::UnboundedReceiver<CoordinatorEvent>,
    ) -> CoordinatorResult<Self> {
        entry.validate()?;
        let thermostat_id = entry.thermostat_id()?.to_string();
        let areas = entry.area_table();
        let options = entry.options.clone();

        let area_thermostats = Arc::new(AreaThermostats::from_table(&areas));
        let registry: SharedRegistry = area_thermostats.clone();

        let tracker = OccupancyTracker::new(
            host.clone(),
            clock.clone(),
            &entry.entry_id,
            &areas,
            options.min_occupancy_minutes,
            options.grace_period_minutes,
        );
        let thermostat = ThermostatController::new(
            host.clone(),
            clock.clone(),
            &entry.entry_id,
            &thermostat_id,
            registry,
            ControllerSettings::from_options(&options),
        );
        let vents = VentController::new(host.clone(), clock.clone(), vent_settings(&options));
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        Ok(Self {
            entry_id: entry.entry_id.clone(),
            thermostat_id,
            contact_sensors: entry.contact_sensors.clone(),
            settings: RoomSettings::new(&options, &areas),
            notifier: Notifier::from_options(&options),
            areas,
            options,
            host,
            clock,
            scheduler,
            events_tx,
            events_rx: Some(events_rx),
            updates,
            tracker,
            thermostat,
            vents,
            area_thermostats,
            open_sensors: OpenSensors::new(),
            timers: EntryTimers::new(),
            pause: PauseState::new(),
            last_thermostat_state: None,
            last_vent_state: None,
        })
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn thermostat_entity_id(&self) -> &str {
        &self.thermostat_id
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn room_settings(&self) -> &RoomSettings {
        &self.settings
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused
    }

    pub fn is_integration_paused(&self) -> bool {
        self.pause.integration_paused
    }

    pub fn open_sensors(&self) -> &OpenSensors {
        &self.open_sensors
    }

    pub fn tracker(&self) -> &OccupancyTracker {
        &self.tracker
    }

    pub fn thermostat(&self) -> &ThermostatController {
        &self.thermostat
    }

    pub fn vents(&self) -> &VentController {
        &self.vents
    }

    /// Virtual per-area thermostats; changes apply from the next cycle
    pub fn area_thermostats(&self) -> Arc<AreaThermostats> {
        self.area_thermostats.clone()
    }

    pub fn last_thermostat_state(&self) -> Option<Arc<ThermostatState>> {
        self.last_thermostat_state.clone()
    }

    pub fn last_vent_state(&self) -> Option<Arc<VentControlState>> {
        self.last_vent_state.clone()
    }

    /// When the open timer will fire, if one is running
    pub fn open_timer_due(&self) -> Option<DateTime<Utc>> {
        self.timers.due(TimerKind::Open)
    }

    pub fn close_timer_due(&self) -> Option<DateTime<Utc>> {
        self.timers.due(TimerKind::Close)
    }

    pub fn pause_status(&self) -> PauseStatus {
        PauseStatus {
            is_paused: self.pause.is_paused,
            integration_paused: self.pause.integration_paused,
            trigger_sensor: self.pause.trigger_sensor.clone(),
            previous_hvac_mode: self.pause.previous_hvac_mode,
            last_known_hvac_mode: self.pause.last_known_hvac_mode,
            open_sensors: self.open_sensors.ids(),
            open_count: self.open_sensors.len(),
            open_doors_count: self.open_sensors.doors_count(),
            open_windows_count: self.open_sensors.windows_count(),
            open_timer_running: self.timers.is_running(TimerKind::Open),
            close_timer_running: self.timers.is_running(TimerKind::Close),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorUpdate> {
        self.updates.subscribe()
    }

    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle::new(&self.entry_id, self.events_tx.clone(), self.updates.clone())
    }

    /// Every entity whose changes this coordinator reacts to
    pub fn watched_entities(&self) -> Vec<String> {
        let mut ids: IndexSet<String> = self.contact_sensors.iter().cloned().collect();
        ids.insert(self.thermostat_id.clone());
        ids.extend(self.areas.entity_ids());
        ids.into_iter().collect()
    }

    pub fn diagnostics(&self) -> serde_json::Value {
        json!({
            "entry_id": self.entry_id,
            "thermostat": self.thermostat_id,
            "pause": self.pause_status(),
            "settings": self.settings,
            "occupancy": self.tracker.summary(),
            "decision": self
                .last_thermostat_state
                .as_deref()
                .map(|state| self.thermostat.summary(state)),
            "vents": self
                .last_vent_state
                .as_deref()
                .map(|control| self.vents.summary(control)),
        })
    }

    /// Restore persisted state, scan the contact sensors and run a first cycle
    #[instrument(skip(self), fields(entry_id = %self.entry_id))]
    pub async fn setup(&mut self) {
        self.tracker.setup().await;
        self.thermostat.setup().await;

        let tx = self.events_tx.clone();
        let entry_id = self.entry_id.clone();
        self.tracker.register_update_callback(Box::new(move || {
            if tx.send(CoordinatorEvent::OccupancyChanged).is_err() {
                debug!(entry_id = %entry_id, "Coordinator event queue closed, dropping occupancy change");
            }
        }));

        if let (Some(mode), true) = self.thermostat.thermostat_mode() {
            self.pause.last_known_hvac_mode = Some(mode);
        }

        info!(
            thermostat = %self.thermostat_id,
            contact_sensors = self.contact_sensors.len(),
            areas = self.areas.len(),
            "Coordinator set up"
        );

        if let Err(err) = self.scan_open_sensors().await {
            error!(error = %err, "Failed to pause for sensors open at startup");
        }
        let result = self.run_cycle().await;
        self.log_cycle(result);
    }

    /// Persist state and cancel timers
    #[instrument(skip(self), fields(entry_id = %self.entry_id))]
    pub async fn shutdown(&mut self) {
        self.timers.cancel_all();
        if let Err(err) = self.tracker.shutdown().await {
            warn!(error = %err, "Failed to save occupancy state");
        }
        if let Err(err) = self.thermostat.shutdown().await {
            warn!(error = %err, "Failed to save thermostat state");
        }
        info!("Coordinator stopped");
    }

    /// Run the coordinator on its own task
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> (CoordinatorHandle, JoinHandle<()>) {
        let handle = self.handle();
        let task = tokio::spawn(self.run(shutdown));
        (handle, task)
    }

    /// Set up, then process events until `shutdown` fires
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let Some(mut events) = self.events_rx.take() else {
            warn!(entry_id = %self.entry_id, "Coordinator is already running");
            return;
        };

        // Subscribe before the startup scan so no change slips between them
        let mut changes = self.host.subscribe_state_changes(&self.watched_entities());
        self.setup().await;

        let mut tick = tokio::time::interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tick.tick().await;

        info!(entry_id = %self.entry_id, "Coordinator running");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!(entry_id = %self.entry_id, "Received shutdown signal");
                    break;
                }
                change = changes.next() => match change {
                    Some(change) => self.handle_state_change(change).await,
                    None => {
                        warn!(entry_id = %self.entry_id, "State change stream closed");
                        break;
                    }
                },
                Some(event) = events.recv() => self.handle_event(event).await,
                _ = tick.tick() => self.handle_event(CoordinatorEvent::Tick).await,
            }
        }

        self.events_rx = Some(events);
        self.shutdown().await;
    }

    pub async fn handle_event(&mut self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::StateChanged(change) => self.handle_state_change(change).await,
            CoordinatorEvent::Timer(token) => {
                if let Err(err) = self.handle_timer(token).await {
                    error!(timer = token.kind.as_str(), error = %err, "Timer action failed");
                }
            }
            CoordinatorEvent::OccupancyChanged => {
                let result = self.run_cycle().await;
                self.log_cycle(result);
            }
            CoordinatorEvent::Tick => self.tracker.force_update_active_status(),
            CoordinatorEvent::Command { command, reply } => {
                let result = self.apply(command).await;
                if reply.send(result).is_err() {
                    debug!("Command requester stopped waiting for the result");
                }
            }
        }
    }

    /// Handle every queued event without waiting for more
    pub async fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let Some(Ok(event)) = self.events_rx.as_mut().map(|rx| rx.try_recv()) else {
                break;
            };
            self.handle_event(event).await;
            handled += 1;
        }
        handled
    }

    pub async fn handle_state_change(&mut self, change: StateChangedData) {
        self.vents.handle_state_change(&change);

        if self.contact_sensors.contains(&change.entity_id) {
            if let Err(err) = self.handle_contact_change(&change).await {
                error!(entity_id = %change.entity_id, error = %err, "Failed to handle contact sensor");
            }
        }

        if change.entity_id == self.thermostat_id {
            self.handle_thermostat_change(&change);
        }

        // The tracker's callback queues the evaluation
        if self.tracker.handle_state_change(&change) {
            if let Err(err) = self.tracker.save_state().await {
                warn!(error = %err, "Failed to save occupancy state");
            }
        }

        if self.areas.has_role(&change.entity_id, EntityRole::Temperature) {
            let result = self.run_cycle().await;
            self.log_cycle(result);
        }
    }

    async fn handle_contact_change(&mut self, change: &StateChangedData) -> CoordinatorResult<()> {
        let was_open = is_contact_open(change.old_state.as_ref());
        let is_open = is_contact_open(change.new_state.as_ref());
        if was_open == is_open {
            return Ok(());
        }
        if self.pause.integration_paused {
            debug!(entity_id = %change.entity_id, is_open, "Integration paused; ignoring contact sensor");
            return Ok(());
        }

        let now = self.clock.now();
        if is_open {
            self.contact_opened(&change.entity_id, now);
            self.publish();
            Ok(())
        } else {
            let result = self.contact_closed(&change.entity_id, now).await;
            self.publish();
            result
        }
    }

    fn contact_opened(&mut self, entity_id: &str, now: DateTime<Utc>) {
        self.open_sensors.open(entity_id, now);
        info!(entity_id, open_count = self.open_sensors.len(), "Contact sensor opened");

        self.timers.cancel(TimerKind::Close);
        if self.pause.is_paused {
            debug!("Already paused");
            return;
        }
        if !self.timers.is_running(TimerKind::Open) {
            let timeout = self.open_timeout();
            self.timers.start(
                self.scheduler.as_ref(),
                TimerKind::Open,
                timeout,
                Some(entity_id.to_string()),
                now,
            );
        }
    }

    async fn contact_closed(&mut self, entity_id: &str, now: DateTime<Utc>) -> CoordinatorResult<()> {
        let anchored = self.timers.anchor(TimerKind::Open) == Some(entity_id);
        self.open_sensors.close(entity_id);
        info!(entity_id, open_count = self.open_sensors.len(), "Contact sensor closed");

        if self.open_sensors.is_empty() {
            if self.pause.is_paused {
                let timeout = self.close_timeout();
                self.timers
                    .start(self.scheduler.as_ref(), TimerKind::Close, timeout, None, now);
            } else {
                self.timers.cancel(TimerKind::Open);
            }
            return Ok(());
        }

        if anchored && !self.pause.is_paused {
            return self.restart_open_timer(now).await;
        }
        Ok(())
    }

    /// Anchor the open timer to the earliest open sensor, pausing at once if
    /// that sensor is already past the timeout
    async fn restart_open_timer(&mut self, now: DateTime<Utc>) -> CoordinatorResult<()> {
        let Some((sensor, opened_at)) = self
            .open_sensors
            .earliest()
            .map(|(id, at)| (id.to_string(), at))
        else {
            self.timers.cancel(TimerKind::Open);
            return Ok(());
        };

        let remaining = self.open_timeout() - (now - opened_at);
        if remaining <= Duration::zero() {
            info!(sensor = %sensor, "Contact sensor already open past the timeout");
            self.timers.cancel(TimerKind::Open);
            return self.pause_hvac(Some(sensor)).await;
        }

        debug!(sensor = %sensor, seconds = remaining.num_seconds(), "Recalculated open timer");
        self.timers.start(
            self.scheduler.as_ref(),
            TimerKind::Open,
            remaining,
            Some(sensor),
            now,
        );
        Ok(())
    }

    /// Rebuild the open-sensor set from current states and restart timing
    async fn scan_open_sensors(&mut self) -> CoordinatorResult<()> {
        let now = self.clock.now();
        for entity_id in &self.contact_sensors {
            if let Some(state) = self.host.read_state(entity_id) {
                if is_contact_open(Some(&state)) {
                    self.open_sensors.open(entity_id, state.last_changed.min(now));
                }
            }
        }
        debug!(open_count = self.open_sensors.len(), "Scanned contact sensors");

        if self.pause.is_paused {
            if self.open_sensors.is_empty() && !self.timers.is_running(TimerKind::Close) {
                let timeout = self.close_timeout();
                self.timers
                    .start(self.scheduler.as_ref(), TimerKind::Close, timeout, None, now);
            }
            return Ok(());
        }
        self.restart_open_timer(now).await
    }

    fn handle_thermostat_change(&mut self, change: &StateChangedData) {
        let Some(new) = change.new_state.as_ref().and_then(hvac_mode_of) else {
            return;
        };
        let old = change.old_state.as_ref().and_then(hvac_mode_of);
        if old == Some(new) {
            return;
        }

        match self.pause.observe_mode_change(old, new) {
            ModeObservation::OwnCommand => debug!(mode = %new, "Thermostat reached commanded mode"),
            ModeObservation::ManualOverride => {
                info!(mode = %new, "Thermostat turned on manually while paused; clearing pause");
                self.thermostat.set_paused_by_contact_sensors(false);
                self.timers.cancel(TimerKind::Close);
                self.publish();
            }
            ModeObservation::UserTurnedOff => {
                info!(
                    restore = ?self.pause.previous_hvac_mode,
                    "Thermostat turned off manually while paused"
                );
                self.publish();
            }
            ModeObservation::Ignored => {}
        }
    }

    /// Accept a fired timer token
    pub async fn handle_timer(&mut self, token: TimerToken) -> CoordinatorResult<()> {
        let Some(anchor) = self.timers.take_fired(token) else {
            return Ok(());
        };
        if self.pause.integration_paused {
            debug!(timer = token.kind.as_str(), "Integration paused; ignoring timer");
            return Ok(());
        }

        match token.kind {
            TimerKind::Open => {
                if self.open_sensors.is_empty() || self.pause.is_paused {
                    debug!("Open timer fired with nothing to pause");
                    return Ok(());
                }
                let trigger = anchor
                    .filter(|sensor| self.open_sensors.contains(sensor))
                    .or_else(|| self.open_sensors.earliest().map(|(id, _)| id.to_string()));
                info!(trigger = ?trigger, open_count = self.open_sensors.len(), "Open timeout reached");
                self.pause_hvac(trigger).await
            }
            TimerKind::Close => {
                if !self.open_sensors.is_empty() || !self.pause.is_paused {
                    debug!("Close timer fired with nothing to resume");
                    return Ok(());
                }
                info!("Close timeout reached");
                self.resume_hvac().await
            }
        }
    }

    /// Remember the running mode, idle the fan, turn the HVAC off and notify
    #[instrument(skip(self), fields(entry_id = %self.entry_id))]
    async fn pause_hvac(&mut self, trigger: Option<String>) -> CoordinatorResult<()> {
        self.timers.cancel(TimerKind::Open);

        let (current, _) = self.thermostat.thermostat_mode();
        let previous = current.unwrap_or(HvacMode::Auto);
        if !previous.is_off() {
            self.pause.last_known_hvac_mode = Some(previous);
        }

        self.thermostat.set_fan_idle().await;
        if let Err(err) = self.command_mode(HvacMode::Off).await {
            error!(error = %err, "Failed to turn the thermostat off");
            return Err(err);
        }

        self.pause.previous_hvac_mode = Some(previous);
        self.pause.trigger_sensor = trigger;
        self.set_paused(true);
        info!(
            trigger = ?self.pause.trigger_sensor,
            previous = %previous,
            "Paused thermostat"
        );

        self.send_notification(NotificationKind::Paused, None).await;
        self.publish();
        Ok(())
    }

    /// Restore the remembered mode, notify, then re-evaluate once
    #[instrument(skip(self), fields(entry_id = %self.entry_id))]
    async fn resume_hvac(&mut self) -> CoordinatorResult<()> {
        self.timers.cancel(TimerKind::Close);

        let restore = self.pause.mode_to_restore(self.settings.respect_user_off);
        match restore {
            Some(mode) => {
                if let Err(err) = self.command_mode(mode).await {
                    error!(mode = %mode, error = %err, "Failed to restore the thermostat");
                    return Err(err);
                }
                info!(mode = %mode, "Restored thermostat mode");
            }
            None => info!(
                previous = ?self.pause.previous_hvac_mode,
                "Thermostat was off before the pause; leaving it off"
            ),
        }

        self.send_notification(NotificationKind::Resumed, restore).await;
        self.set_paused(false);
        self.pause.previous_hvac_mode = None;
        self.pause.trigger_sensor = None;

        self.run_cycle().await
    }

    /// Issue our own HVAC-mode command, marking the change it will produce
    async fn command_mode(&mut self, mode: HvacMode) -> CoordinatorResult<()> {
        let (current, _) = self.thermostat.thermostat_mode();
        if current != Some(mode) {
            self.pause.expected_mode = Some(mode);
        }
        match self.thermostat.set_hvac_mode(mode).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.pause.expected_mode = None;
                Err(err.into())
            }
        }
    }

    fn set_paused(&mut self, paused: bool) {
        self.pause.is_paused = paused;
        self.thermostat.set_paused_by_contact_sensors(paused);
    }

    async fn send_notification(&self, kind: NotificationKind, restored: Option<HvacMode>) {
        if !self.notifier.is_enabled() {
            return;
        }
        let context = self.notification_context(restored);
        self.notifier.send(&self.host, kind, &context).await;
    }

    fn notification_context(&self, restored: Option<HvacMode>) -> NotificationContext {
        let name_of = |entity_id: &str| {
            self.host
                .read_state(entity_id)
                .map(|s| s.friendly_name())
                .unwrap_or_else(|| entity_id.to_string())
        };
        let open_sensors = self.open_sensors.ids();

        NotificationContext {
            trigger_sensor_name: self
                .pause
                .trigger_sensor
                .as_deref()
                .map(name_of)
                .unwrap_or_else(|| "A sensor".to_string()),
            trigger_sensor: self.pause.trigger_sensor.clone(),
            open_sensor_names: open_sensors.iter().map(|id| name_of(id)).collect(),
            open_sensors,
            open_count: self.open_sensors.len(),
            open_doors: self.open_sensors.doors_count(),
            open_windows: self.open_sensors.windows_count(),
            open_timeout: self.options.open_timeout,
            close_timeout: self.options.close_timeout,
            previous_mode: restored
                .or(self.pause.previous_hvac_mode)
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            thermostat: self.thermostat_id.clone(),
            thermostat_name: name_of(&self.thermostat_id),
        }
    }

    /// Run the decision engine, then the vent allocator, and carry both out
    ///
    /// A failed HVAC-mode command is returned after the vents have been
    /// handled.
    #[instrument(skip(self), fields(entry_id = %self.entry_id))]
    pub async fn run_cycle(&mut self) -> CoordinatorResult<()> {
        if self.pause.integration_paused {
            debug!("Integration paused; skipping evaluation");
            return Ok(());
        }

        let rooms = self.room_inputs();
        let (eco_mode, eco_away_targets) = self.settings.effective_eco(&self.options);
        let input = EvaluationInput {
            rooms: &rooms,
            respect_user_off: self.settings.respect_user_off,
            eco_mode,
            eco_away_targets,
            tracked_area_ids: self.settings.tracked_area_ids(),
            force_critical_area_ids: Some(&self.settings.force_critical_rooms),
        };
        let state = self.thermostat.evaluate(&input);
        let executed = self.thermostat.execute(&state).await;

        let vent_inputs = self.vent_inputs();
        let control = self.vents.evaluate(&vent_inputs, &state);
        let commands = self.vents.execute(&control).await;

        if let Err(err) = self.thermostat.save_if_dirty().await {
            warn!(error = %err, "Failed to save thermostat state");
        }

        debug!(
            action = state.recommended_action.as_str(),
            reason = %state.action_reason,
            vents_should_be_open = control.vents_should_be_open,
            commands,
            "Evaluation cycle complete"
        );
        self.last_thermostat_state = Some(Arc::new(state));
        self.last_vent_state = Some(Arc::new(control));
        self.publish();

        executed.map(|_| ()).map_err(CoordinatorError::from)
    }

    fn log_cycle(&self, result: CoordinatorResult<()>) {
        if let Err(err) = result {
            error!(entry_id = %self.entry_id, error = %err, "Evaluation cycle failed");
        }
    }

    fn room_inputs(&self) -> Vec<RoomInput> {
        self.areas
            .iter()
            .map(|area| RoomInput {
                area_id: area.area_id.clone(),
                area_name: area.display_name().to_string(),
                is_active: self
                    .tracker
                    .get_area(&area.area_id)
                    .is_some_and(|a| a.is_active),
                temperature_sensors: area.temperature_sensors.clone(),
            })
            .collect()
    }

    fn vent_inputs(&self) -> Vec<AreaVentInput> {
        self.areas
            .iter()
            .filter(|area| !area.vents.is_empty())
            .map(|area| {
                let occupancy = self.tracker.get_area(&area.area_id);
                AreaVentInput {
                    area_id: area.area_id.clone(),
                    area_name: area.display_name().to_string(),
                    vents: area.vents.clone(),
                    is_active: occupancy.as_ref().is_some_and(|a| a.is_active),
                    is_occupied: occupancy.as_ref().is_some_and(|a| a.is_occupied()),
                    occupancy_start_time: occupancy.as_ref().and_then(|a| a.occupancy_start_time),
                    vent_open_delay_seconds: area.vent_open_delay_seconds,
                }
            })
            .collect()
    }

    fn publish(&self) {
        if self.updates.receiver_count() == 0 {
            return;
        }
        let update = CoordinatorUpdate {
            entry_id: self.entry_id.clone(),
            pause: self.pause_status(),
            thermostat: self.last_thermostat_state.clone(),
            vents: self.last_vent_state.clone(),
            occupancy: Arc::new(self.tracker.summary()),
        };
        // Receivers may drop between the check and the send
        if self.updates.send(update).is_err() {
            debug!(entry_id = %self.entry_id, "No update subscribers left");
        }
    }

    /// Carry out an operation or setter
    #[instrument(skip(self), fields(entry_id = %self.entry_id, command = command.name()))]
    pub async fn apply(&mut self, command: Command) -> CoordinatorResult<()> {
        match command {
            Command::Pause => {
                if self.pause.is_paused {
                    debug!("Already paused");
                    return Ok(());
                }
                let trigger = self.open_sensors.earliest().map(|(id, _)| id.to_string());
                self.pause_hvac(trigger).await
            }
            Command::Resume => {
                if !self.pause.is_paused {
                    debug!("Not paused");
                    return Ok(());
                }
                self.resume_hvac().await
            }
            Command::Recalculate => self.run_cycle().await,
            Command::PauseIntegration => {
                self.pause_integration();
                Ok(())
            }
            Command::ResumeIntegration => self.resume_integration().await,
            Command::SetEcoMode(enabled) => {
                self.settings.eco_mode = enabled;
                self.run_cycle().await
            }
            Command::SetOnlyTrackSelectedRooms(enabled) => {
                self.settings.only_track_selected_rooms = enabled;
                self.run_cycle().await
            }
            Command::SetRoomTracked { area_id, tracked } => {
                self.require_area(&area_id)?;
                if tracked {
                    self.settings.tracked_rooms.insert(area_id);
                } else {
                    self.settings.tracked_rooms.remove(&area_id);
                }
                self.run_cycle().await
            }
            Command::SetForceCritical { area_id, enabled } => {
                self.require_area(&area_id)?;
                if enabled {
                    self.settings.force_critical_rooms.insert(area_id);
                } else {
                    self.settings.force_critical_rooms.remove(&area_id);
                }
                self.run_cycle().await
            }
            Command::SetRespectUserOff(enabled) => {
                self.settings.respect_user_off = enabled;
                self.run_cycle().await
            }
            Command::SetEcoAwayBehavior(behavior) => {
                self.settings.eco_away_behavior = behavior;
                self.run_cycle().await
            }
            Command::SetAway(away) => {
                self.settings.away = away;
                self.run_cycle().await
            }
            Command::UpdateOptions(options) => {
                self.update_options(*options)?;
                self.run_cycle().await
            }
        }
    }

    fn require_area(&self, area_id: &str) -> CoordinatorResult<()> {
        match self.areas.get(area_id) {
            Some(_) => Ok(()),
            None => Err(CoordinatorError::UnknownArea(area_id.to_string())),
        }
    }

    fn pause_integration(&mut self) {
        if self.pause.integration_paused {
            return;
        }
        self.pause.integration_paused = true;
        self.timers.cancel_all();
        info!(entry_id = %self.entry_id, "Integration paused; automation frozen");
        self.publish();
    }

    async fn resume_integration(&mut self) -> CoordinatorResult<()> {
        if !self.pause.integration_paused {
            return Ok(());
        }
        self.pause.integration_paused = false;
        info!(entry_id = %self.entry_id, "Integration resumed");

        let cycle = self.run_cycle().await;
        // Sensors may have changed while frozen; rescan as on startup
        self.open_sensors.clear();
        self.scan_open_sensors().await?;
        self.publish();
        cycle
    }

    fn update_options(&mut self, options: Options) -> CoordinatorResult<()> {
        options.validate()?;
        self.thermostat
            .set_settings(ControllerSettings::from_options(&options));
        self.vents.set_settings(vent_settings(&options));
        self.tracker
            .set_min_occupancy_minutes(options.min_occupancy_minutes);
        self.tracker
            .set_grace_period_minutes(options.grace_period_minutes);
        self.notifier = Notifier::from_options(&options);
        self.settings.apply_options(&options);
        self.options = options;
        info!(entry_id = %self.entry_id, "Options updated");
        Ok(())
    }

    fn open_timeout(&self) -> Duration {
        Duration::minutes(i64::from(self.options.open_timeout))
    }

    fn close_timeout(&self) -> Duration {
        Duration::minutes(i64::from(self.options.close_timeout))
    }
}
