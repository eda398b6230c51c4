//! Lifecycle events published by a running suite.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::measurement::{CycleData, MeasurementError};
use crate::runner::RunError;

static NEXT_SUITE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies the suite an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SuiteId(u64);

impl SuiteId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SUITE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SuiteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "suite#{}", self.0)
    }
}

/// The test an event is about, with the group that directly contains it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BenchmarkTarget {
    pub group: Option<String>,
    pub test: String,
    /// Child indices from a root group down to the test
    pub path: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    SuiteStarted,
    SuiteFinished,
    SuiteError { error: RunError },
    BenchmarkStarted { target: BenchmarkTarget },
    BenchmarkCycle { target: BenchmarkTarget, cycle: CycleData },
    BenchmarkFinished { target: BenchmarkTarget },
    BenchmarkError { target: BenchmarkTarget, error: MeasurementError },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::SuiteStarted => "suite-started",
            EventKind::SuiteFinished => "suite-finished",
            EventKind::SuiteError { .. } => "suite-error",
            EventKind::BenchmarkStarted { .. } => "benchmark-started",
            EventKind::BenchmarkCycle { .. } => "benchmark-cycle",
            EventKind::BenchmarkFinished { .. } => "benchmark-finished",
            EventKind::BenchmarkError { .. } => "benchmark-error",
        }
    }

    pub fn target(&self) -> Option<&BenchmarkTarget> {
        match self {
            EventKind::BenchmarkStarted { target }
            | EventKind::BenchmarkCycle { target, .. }
            | EventKind::BenchmarkFinished { target }
            | EventKind::BenchmarkError { target, .. } => Some(target),
            EventKind::SuiteStarted | EventKind::SuiteFinished | EventKind::SuiteError { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuiteEvent {
    pub timestamp: DateTime<Utc>,
    pub suite: SuiteId,
    pub kind: EventKind,
}

/// Receiving end of a subscription. Events arrive in emission order.
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<SuiteEvent>,
}

impl EventStream {
    /// Wait for the next event. `None` once the suite is gone.
    pub async fn next(&mut self) -> Option<SuiteEvent> {
        self.receiver.recv().await
    }

    /// Take an event that is already queued, without waiting.
    pub fn try_next(&mut self) -> Option<SuiteEvent> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Debug)]
pub(crate) struct Emitter {
    suite: SuiteId,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<SuiteEvent>>>,
}

impl Emitter {
    pub(crate) fn new(suite: SuiteId) -> Self {
        Self {
            suite,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn suite(&self) -> SuiteId {
        self.suite
    }

    pub(crate) fn subscribe(&self) -> EventStream {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        EventStream { receiver }
    }

    /// Deliver to every live subscriber, forgetting those that went away.
    pub(crate) fn emit(&self, kind: EventKind) {
        tracing::trace!(suite = %self.suite, event = kind.name(), "emit");

        let event = SuiteEvent {
            timestamp: Utc::now(),
            suite: self.suite,
            kind,
        };

        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}
