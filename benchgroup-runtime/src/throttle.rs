//! Rate limiter that folds bursts of requests into a fixed refresh cadence.
//!
//! The first request of a quiet period runs the action right away and arms a
//! timer for the next slot. Requests arriving before that slot are owed one
//! execution, which the timer performs when it fires. Slots stay aligned to
//! `first_slot + k * interval`; after a stall the schedule jumps to the next
//! aligned slot instead of catching up with a burst.

use std::future::Future;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThrottleError {
    #[error("throttled action failed: {0}")]
    Action(String),

    #[error("throttle was dropped before the action ran")]
    Dropped,
}

type Action = Box<dyn Fn() -> Result<(), String> + Send + Sync>;
type Waiter = oneshot::Sender<Result<(), ThrottleError>>;

#[derive(Default)]
struct Schedule {
    /// Callers owed the next execution
    waiters: Vec<Waiter>,
    timer: Option<JoinHandle<()>>,
    /// Slot the current timer was armed for
    slot: Option<Instant>,
    /// Bumped whenever a timer is cancelled so a late wakeup can tell it is stale
    epoch: u64,
}

struct Shared {
    action: Action,
    interval: Duration,
    schedule: Mutex<Schedule>,
}

/// Cloneable handle; clones share one schedule.
///
/// Triggers must happen inside a tokio runtime since the timer is a spawned task.
#[derive(Clone)]
pub struct Throttle {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("interval", &self.shared.interval)
            .finish_non_exhaustive()
    }
}

impl Throttle {
    pub fn new<F, E>(action: F, interval: Duration) -> Self
    where
        F: Fn() -> Result<(), E> + Send + Sync + 'static,
        E: std::fmt::Display,
    {
        Self {
            shared: Arc::new(Shared {
                action: Box::new(move || action().map_err(|err| err.to_string())),
                interval,
                schedule: Mutex::new(Schedule::default()),
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.shared.interval
    }

    /// Request an execution.
    ///
    /// The scheduling decision is made before this returns; the future only
    /// waits for the execution that serves this call. With `run_immediately`
    /// any pending timer is cancelled and the action runs right now.
    pub fn trigger(&self, run_immediately: bool) -> impl Future<Output = Result<(), ThrottleError>> + Send + 'static {
        let (sender, receiver) = oneshot::channel();
        Shared::request(&self.shared, run_immediately, sender);

        async move { receiver.await.unwrap_or(Err(ThrottleError::Dropped)) }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Schedule> {
        self.schedule.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn request(this: &Arc<Self>, run_immediately: bool, waiter: Waiter) {
        let mut schedule = this.lock();
        schedule.waiters.push(waiter);

        if run_immediately || this.interval.is_zero() {
            if let Some(timer) = schedule.timer.take() {
                timer.abort();
            }
            schedule.slot = None;
            schedule.epoch += 1;

            let waiters = mem::take(&mut schedule.waiters);
            drop(schedule);
            this.execute(waiters);
            return;
        }

        if schedule.timer.is_some() {
            // owed; the pending fire picks it up
            return;
        }

        let slot = next_slot(schedule.slot, Instant::now(), this.interval);
        let epoch = schedule.epoch;
        schedule.slot = Some(slot);
        schedule.timer = Some(Self::arm(this, slot, epoch));

        let waiters = mem::take(&mut schedule.waiters);
        drop(schedule);
        this.execute(waiters);
    }

    fn arm(this: &Arc<Self>, slot: Instant, epoch: u64) -> JoinHandle<()> {
        let shared: Weak<Self> = Arc::downgrade(this);

        tokio::spawn(async move {
            tokio::time::sleep_until(slot).await;
            if let Some(shared) = shared.upgrade() {
                Self::fire(&shared, epoch);
            }
        })
    }

    fn fire(this: &Arc<Self>, epoch: u64) {
        let mut schedule = this.lock();
        if schedule.epoch != epoch {
            return;
        }
        schedule.timer = None;

        if schedule.waiters.is_empty() {
            // nothing owed, the cadence ends here
            schedule.slot = None;
            return;
        }

        let slot = next_slot(schedule.slot, Instant::now(), this.interval);
        schedule.slot = Some(slot);
        schedule.timer = Some(Self::arm(this, slot, epoch));

        let waiters = mem::take(&mut schedule.waiters);
        drop(schedule);
        this.execute(waiters);
    }

    fn execute(&self, waiters: Vec<Waiter>) {
        let outcome = (self.action)().map_err(ThrottleError::Action);
        if let Err(err) = &outcome {
            tracing::warn!("{}", err);
        }

        for waiter in waiters {
            // a caller that dropped its future no longer cares
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// Slot following `previous`, moved forward by whole intervals when it already passed.
fn next_slot(previous: Option<Instant>, now: Instant, interval: Duration) -> Instant {
    let Some(previous) = previous else {
        return now + interval;
    };

    let slot = previous + interval;
    if slot > now || interval.is_zero() {
        return slot;
    }

    let missed = (now - slot).as_nanos() / interval.as_nanos() + 1;
    slot + interval.saturating_mul(u32::try_from(missed).unwrap_or(u32::MAX))
}
