//! Live rendering of a running suite.

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::ReporterConfig;
use crate::events::{BenchmarkTarget, EventKind, EventStream, SuiteId};
use crate::measurement::MeasurementError;
use crate::printer::Printer;
use crate::runner::{RunError, RunOptions, SuiteRunner};
use crate::table::{format_result_table, TableOptions};
use crate::throttle::{Throttle, ThrottleError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("a reporter is already attached to {0}")]
pub struct ReporterConflictError(pub SuiteId);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    #[error(transparent)]
    Run(#[from] RunError),

    #[error("failed to render results: {0}")]
    Render(#[from] ThrottleError),

    #[error(transparent)]
    Conflict(#[from] ReporterConflictError),

    #[error("event stream closed before the suite finished")]
    Closed,

    #[error("reporter task failed: {0}")]
    Task(String),
}

/// Claim on the runner's reporter slot, released at most once.
#[derive(Debug, Clone)]
struct Slot {
    runner: SuiteRunner,
    released: Arc<AtomicBool>,
}

impl Slot {
    fn new(runner: &SuiteRunner) -> Self {
        Self {
            runner: runner.clone(),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.runner.release_reporter();
        }
    }
}

/// Held by the event loop; frees the slot when the loop is gone.
struct SlotGuard(Slot);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Redraws the result table of one runner while it runs.
#[derive(Debug)]
pub struct Reporter {
    suite: SuiteId,
    slot: Slot,
    handle: JoinHandle<Result<(), ReportError>>,
}

impl Reporter {
    /// Start listening to `runner`. Only one reporter per runner at a time.
    ///
    /// Must be called inside a tokio runtime.
    pub fn attach(
        runner: &SuiteRunner,
        config: &ReporterConfig,
        printer: Arc<dyn Printer>,
    ) -> Result<Self, ReporterConflictError> {
        if !runner.claim_reporter() {
            return Err(ReporterConflictError(runner.id()));
        }
        let slot = Slot::new(runner);
        let events = runner.subscribe();

        let render = {
            let runner = runner.clone();
            let printer = Arc::clone(&printer);
            let options = TableOptions::default();
            Throttle::new(
                move || {
                    printer.replace(&format_result_table(&runner.extract_results(), &options));
                    Ok::<(), Infallible>(())
                },
                config.frame_interval(),
            )
        };

        tracing::debug!(suite = %runner.id(), interval = ?render.interval(), "reporter attached");
        let guard = SlotGuard(slot.clone());
        let handle = tokio::spawn(report(events, render, printer, config.print_on_cycle, guard));

        Ok(Self {
            suite: runner.id(),
            slot,
            handle,
        })
    }

    pub fn suite(&self) -> SuiteId {
        self.suite
    }

    /// Resolves once the final frame of the run is on screen.
    ///
    /// A failed run yields its error, after its final frame.
    pub async fn finished(self) -> Result<(), ReportError> {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(err) => Err(ReportError::Task(err.to_string())),
        }
    }

    /// Stop listening without waiting for the run to end.
    ///
    /// The runner accepts a new reporter as soon as this returns.
    pub fn abort(self) {
        self.handle.abort();
        self.slot.release();
    }
}

async fn report(
    mut events: EventStream,
    render: Throttle,
    printer: Arc<dyn Printer>,
    print_on_cycle: bool,
    _slot: SlotGuard,
) -> Result<(), ReportError> {
    while let Some(event) = events.next().await {
        match event.kind {
            EventKind::SuiteStarted | EventKind::BenchmarkFinished { .. } => request(&render),
            EventKind::BenchmarkCycle { .. } if print_on_cycle => request(&render),
            EventKind::BenchmarkError { target, error } => printer.append(&failure_line(&target, &error)),
            EventKind::SuiteFinished => {
                render.trigger(true).await?;
                printer.finish();
                return Ok(());
            }
            EventKind::SuiteError { error } => {
                render.trigger(true).await?;
                printer.finish();
                return Err(error.into());
            }
            _ => {}
        }
    }

    Err(ReportError::Closed)
}

fn failure_line(target: &BenchmarkTarget, error: &MeasurementError) -> String {
    match &target.group {
        Some(group) => format!("{} > {}: {}", group, target.test, error),
        None => format!("{}: {}", target.test, error),
    }
}

/// Ask for a redraw without waiting for it; the final frame is always awaited.
fn request(render: &Throttle) {
    let _ = render.trigger(false);
}

/// Run `runner` with a reporter attached and wait for both.
///
/// `Ok(false)` when the runner refused to start.
pub async fn run_and_report(
    runner: &SuiteRunner,
    config: &ReporterConfig,
    options: RunOptions,
    printer: Arc<dyn Printer>,
) -> Result<bool, ReportError> {
    let reporter = Reporter::attach(runner, config, printer)?;

    match runner.run(options).await {
        Ok(true) => {
            reporter.finished().await?;
            Ok(true)
        }
        Ok(false) => {
            reporter.abort();
            Ok(false)
        }
        Err(error) => {
            reporter.finished().await?;
            Err(error.into())
        }
    }
}
