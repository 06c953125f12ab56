//! One-shot timers that deliver typed tokens
//!
//! A timer never runs a closure. When it fires it hands its token to the
//! owner's event channel, so the owner handles it like any other event and
//! sees its own current state, not a captured copy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tcs_core::{Clock, ManualClock};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::trace;

/// Cancels a scheduled timer
#[derive(Debug)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    abort: Option<AbortHandle>,
}

impl TimerHandle {
    /// Prevent delivery. Cancelling twice, or after delivery, is harmless.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

pub trait Scheduler<T>: Send + Sync {
    /// Deliver `token` once `after` has elapsed
    fn schedule(&self, after: Duration, token: T) -> TimerHandle;
}

/// Scheduler backed by `tokio::time::sleep`, delivering into an mpsc channel
pub struct TokioScheduler<E> {
    tx: mpsc::UnboundedSender<E>,
}

impl<E> TokioScheduler<E> {
    pub fn new(tx: mpsc::UnboundedSender<E>) -> Self {
        Self { tx }
    }
}

impl<T, E> Scheduler<T> for TokioScheduler<E>
where
    T: Into<E> + Send + 'static,
    E: Send + 'static,
{
    fn schedule(&self, after: Duration, token: T) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let tx = self.tx.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if !flag.load(Ordering::SeqCst) {
                // The owner is gone when the send fails; nothing to do
                let _ = tx.send(token.into());
            }
        });

        TimerHandle {
            cancelled,
            abort: Some(task.abort_handle()),
        }
    }
}

struct PendingTimer<T> {
    due: DateTime<Utc>,
    token: T,
    cancelled: Arc<AtomicBool>,
}

/// Scheduler driven by a [`ManualClock`]
///
/// Nothing fires on its own. Advance the clock, then call [`due`](Self::due)
/// to collect the tokens whose time has come.
pub struct ManualScheduler<T> {
    clock: ManualClock,
    pending: Mutex<Vec<PendingTimer<T>>>,
}

impl<T> ManualScheduler<T> {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Remove and return every live token that is due, earliest first
    pub fn due(&self) -> Vec<T> {
        let now = self.clock.now();
        let mut pending = self.lock();
        pending.retain(|t| !t.cancelled.load(Ordering::SeqCst));
        pending.sort_by_key(|t| t.due);

        let split = pending.iter().take_while(|t| t.due <= now).count();
        pending.drain(..split).map(|t| t.token).collect()
    }

    /// Number of timers that are scheduled and not cancelled
    pub fn pending_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|t| !t.cancelled.load(Ordering::SeqCst))
            .count()
    }

    /// When the next live timer is due
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.lock()
            .iter()
            .filter(|t| !t.cancelled.load(Ordering::SeqCst))
            .map(|t| t.due)
            .min()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<PendingTimer<T>>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<T: Send> Scheduler<T> for ManualScheduler<T> {
    fn schedule(&self, after: Duration, token: T) -> TimerHandle {
        let due = self.clock.now() + chrono::Duration::milliseconds(after.as_millis() as i64);
        trace!(%due, "Scheduling manual timer");

        let cancelled = Arc::new(AtomicBool::new(false));
        self.lock().push(PendingTimer {
            due,
            token,
            cancelled: cancelled.clone(),
        });

        TimerHandle {
            cancelled,
            abort: None,
        }
    }
}
