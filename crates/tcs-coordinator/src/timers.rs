//! The open and close timers of one entry
//!
//! At most one timer of each kind is live. Starting a timer cancels the
//! previous one of the same kind, and every start bumps a generation counter
//! carried in the token, so a token delivered after its timer was replaced is
//! recognised as stale and dropped.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tcs_host::{Scheduler, TimerHandle};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// A contact sensor has been open long enough to pause the HVAC
    Open,
    /// Every contact sensor has been closed long enough to resume
    Close,
}

impl TimerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerKind::Open => "open",
            TimerKind::Close => "close",
        }
    }
}

/// Delivered to the owning coordinator when a timer fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken {
    pub kind: TimerKind,
    pub generation: u64,
}

#[derive(Debug)]
struct ActiveTimer {
    handle: TimerHandle,
    generation: u64,
    /// Sensor the open timer is anchored to
    sensor: Option<String>,
    due: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct EntryTimers {
    open: Option<ActiveTimer>,
    close: Option<ActiveTimer>,
    next_generation: u64,
}

impl EntryTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) a timer of `kind` that fires after `after`
    pub fn start(
        &mut self,
        scheduler: &dyn Scheduler<TimerToken>,
        kind: TimerKind,
        after: Duration,
        sensor: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.cancel(kind);
        self.next_generation += 1;
        let generation = self.next_generation;

        let delay = after.to_std().unwrap_or(StdDuration::ZERO);
        let handle = scheduler.schedule(delay, TimerToken { kind, generation });
        debug!(
            timer = kind.as_str(),
            generation,
            seconds = delay.as_secs(),
            sensor = ?sensor,
            "Started timer"
        );

        *self.slot(kind) = Some(ActiveTimer {
            handle,
            generation,
            sensor,
            due: now + after,
        });
    }

    /// Cancel the timer of `kind`; returns whether one was running
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        match self.slot(kind).take() {
            Some(timer) => {
                timer.handle.cancel();
                debug!(timer = kind.as_str(), generation = timer.generation, "Cancelled timer");
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        self.cancel(TimerKind::Open);
        self.cancel(TimerKind::Close);
    }

    /// Accept a fired token
    ///
    /// Returns the anchor sensor (for open timers) and clears the slot when
    /// the token belongs to the live timer; `None` for a stale token.
    pub fn take_fired(&mut self, token: TimerToken) -> Option<Option<String>> {
        let slot = self.slot(token.kind);
        if slot.as_ref().is_some_and(|t| t.generation == token.generation) {
            return slot.take().map(|timer| timer.sensor);
        }
        debug!(
            timer = token.kind.as_str(),
            generation = token.generation,
            "Ignoring stale timer"
        );
        None
    }

    pub fn is_running(&self, kind: TimerKind) -> bool {
        self.get(kind).is_some()
    }

    pub fn anchor(&self, kind: TimerKind) -> Option<&str> {
        self.get(kind).and_then(|t| t.sensor.as_deref())
    }

    pub fn due(&self, kind: TimerKind) -> Option<DateTime<Utc>> {
        self.get(kind).map(|t| t.due)
    }

    fn get(&self, kind: TimerKind) -> Option<&ActiveTimer> {
        match kind {
            TimerKind::Open => self.open.as_ref(),
            TimerKind::Close => self.close.as_ref(),
        }
    }

    fn slot(&mut self, kind: TimerKind) -> &mut Option<ActiveTimer> {
        match kind {
            TimerKind::Open => &mut self.open,
            TimerKind::Close => &mut self.close,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcs_core::{Clock, ManualClock};
    use tcs_host::ManualScheduler;

    #[test]
    fn test_restart_makes_old_token_stale() {
        let clock = ManualClock::new();
        let scheduler = ManualScheduler::new(clock.clone());
        let mut timers = EntryTimers::new();

        timers.start(
            &scheduler,
            TimerKind::Open,
            Duration::minutes(5),
            Some("binary_sensor.front_door".into()),
            clock.now(),
        );
        let first = TimerToken { kind: TimerKind::Open, generation: 1 };
        timers.start(
            &scheduler,
            TimerKind::Open,
            Duration::minutes(4),
            Some("binary_sensor.back_door".into()),
            clock.now(),
        );

        assert_eq!(scheduler.pending_count(), 1);
        assert_eq!(timers.take_fired(first), None);
        assert_eq!(timers.anchor(TimerKind::Open), Some("binary_sensor.back_door"));

        clock.advance_minutes(4);
        let fired = scheduler.due();
        assert_eq!(fired.len(), 1);
        assert_eq!(
            timers.take_fired(fired[0]),
            Some(Some("binary_sensor.back_door".to_string()))
        );
        assert!(!timers.is_running(TimerKind::Open));
    }

    #[test]
    fn test_kinds_are_independent() {
        let clock = ManualClock::new();
        let scheduler = ManualScheduler::new(clock.clone());
        let mut timers = EntryTimers::new();

        timers.start(&scheduler, TimerKind::Open, Duration::minutes(5), None, clock.now());
        timers.start(&scheduler, TimerKind::Close, Duration::minutes(2), None, clock.now());
        assert!(timers.cancel(TimerKind::Close));
        assert!(!timers.cancel(TimerKind::Close));
        assert!(timers.is_running(TimerKind::Open));
        assert_eq!(timers.due(TimerKind::Open), Some(clock.now() + Duration::minutes(5)));
        assert_eq!(scheduler.pending_count(), 1);
    }
}
