use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::panic::{self, catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Once, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use crate::config::MeasurementConfig;
use crate::snapshot::{Figures, TestState};
use crate::statistics;
use crate::suite::{Context, Phase, Phases};

/// Upper bound for the calibrated iterations per sample
const MAX_ITERATIONS_PER_SAMPLE: u64 = 1 << 24;

thread_local! {
    static SAMPLING: Cell<bool> = const { Cell::new(false) };
}

static QUIET_HOOK: Once = Once::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseKind {
    Setup,
    Body,
    Teardown,
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PhaseKind::Setup => "setup",
            PhaseKind::Body => "body",
            PhaseKind::Teardown => "teardown",
        })
    }
}

/// A measurement could not be completed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeasurementError {
    #[error("benchmark '{test}' panicked during {phase}: {message}")]
    Panicked {
        test: String,
        phase: PhaseKind,
        message: String,
    },

    #[error("invalid measurement configuration for '{test}': {reason}")]
    InvalidConfig { test: String, reason: String },
}

/// Progress of one sampling iteration, delivered with every benchmark cycle event
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CycleData {
    /// 1-based index of the sample just taken
    pub cycle: usize,
    /// Body calls timed in this sample
    pub iterations: u64,
    pub elapsed: Duration,
    pub ops_per_second: f64,
    pub relative_margin_of_error: f64,
}

#[derive(Debug, Default)]
struct Stats {
    running: bool,
    samples: Vec<f64>,
    mean: f64,
    relative_margin_of_error: f64,
}

/// Shared handle to one run of a test.
///
/// The sampler writes through it while a run is in flight; everybody else
/// reads the current figures.
#[derive(Debug, Clone, Default)]
pub struct Measurement {
    stats: Arc<Mutex<Stats>>,
}

impl Measurement {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Stats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn sample_count(&self) -> usize {
        self.lock().samples.len()
    }

    /// Seconds per operation of every sample taken so far
    pub fn samples(&self) -> Vec<f64> {
        self.lock().samples.clone()
    }

    /// Mean seconds per operation
    pub fn mean(&self) -> f64 {
        self.lock().mean
    }

    pub fn ops_per_second(&self) -> f64 {
        ops_per_second(self.lock().mean)
    }

    /// Margin of error of the mean, in percent
    pub fn relative_margin_of_error(&self) -> f64 {
        self.lock().relative_margin_of_error
    }

    /// Figures and running flag read together, `Initialized` before the first sample
    pub fn state(&self) -> TestState {
        let stats = self.lock();
        if stats.samples.is_empty() {
            return TestState::Initialized;
        }

        let figures = Figures {
            ops_per_second: ops_per_second(stats.mean),
            relative_margin_of_error: stats.relative_margin_of_error,
            sample_count: stats.samples.len(),
        };
        if stats.running {
            TestState::Running(figures)
        } else {
            TestState::Finished(figures)
        }
    }

    fn start(&self) {
        let mut stats = self.lock();
        *stats = Stats::default();
        stats.running = true;
    }

    fn stop(&self) {
        self.lock().running = false;
    }

    fn record(&self, seconds_per_op: f64, iterations: u64, elapsed: Duration) -> CycleData {
        let mut stats = self.lock();
        stats.samples.push(seconds_per_op);
        stats.mean = statistics::mean(&stats.samples);
        stats.relative_margin_of_error = statistics::relative_margin_of_error(&stats.samples);

        CycleData {
            cycle: stats.samples.len(),
            iterations,
            elapsed,
            ops_per_second: ops_per_second(stats.mean),
            relative_margin_of_error: stats.relative_margin_of_error,
        }
    }
}

fn ops_per_second(mean: f64) -> f64 {
    if mean > 0.0 {
        1.0 / mean
    } else {
        0.0
    }
}

/// Collects timing samples for one test at a time.
#[derive(Debug, Clone, Default)]
pub struct Sampler {
    config: MeasurementConfig,
}

impl Sampler {
    pub fn new(config: MeasurementConfig) -> Self {
        Self { config }
    }

    /// Warm up, calibrate and sample a test, writing results into `measurement`.
    ///
    /// Yields to the runtime after every sample so that listeners can observe
    /// progress while the run is in flight.
    pub async fn run<F>(
        &self,
        test: &str,
        phases: &mut Phases,
        context: &Context,
        measurement: &Measurement,
        mut on_cycle: F,
    ) -> Result<(), MeasurementError>
    where
        F: FnMut(CycleData),
    {
        self.config
            .validate()
            .map_err(|reason| MeasurementError::InvalidConfig {
                test: test.to_string(),
                reason,
            })?;

        tracing::debug!(test, context = ?context.keys().collect::<Vec<_>>(), "sampling");

        measurement.start();
        let outcome = self.sample(test, phases, measurement, &mut on_cycle).await;
        measurement.stop();
        outcome
    }

    async fn sample<F>(
        &self,
        test: &str,
        phases: &mut Phases,
        measurement: &Measurement,
        on_cycle: &mut F,
    ) -> Result<(), MeasurementError>
    where
        F: FnMut(CycleData),
    {
        for _ in 0..self.config.warmup_iterations {
            run_phase(test, PhaseKind::Body, &mut phases.body)?;
        }

        let iterations = self.calibrate(test, phases)?;
        let started = Instant::now();

        loop {
            let elapsed = timed_sample(test, phases, iterations)?;
            let seconds_per_op = elapsed.as_secs_f64() / iterations as f64;
            on_cycle(measurement.record(seconds_per_op, iterations, elapsed));

            tokio::task::yield_now().await;

            let taken = measurement.sample_count();
            if taken >= self.config.max_samples
                || (taken >= self.config.min_samples && started.elapsed() >= self.config.max_time())
            {
                return Ok(());
            }
        }
    }

    /// Double the iterations per sample until one sample reaches the target duration
    fn calibrate(&self, test: &str, phases: &mut Phases) -> Result<u64, MeasurementError> {
        let target = self.config.target_sample_duration();
        let mut iterations = 1;

        loop {
            let elapsed = timed_sample(test, phases, iterations)?;
            if elapsed >= target || iterations >= MAX_ITERATIONS_PER_SAMPLE {
                return Ok(iterations);
            }
            iterations *= 2;
        }
    }
}

fn timed_sample(test: &str, phases: &mut Phases, iterations: u64) -> Result<Duration, MeasurementError> {
    run_phase(test, PhaseKind::Setup, &mut phases.setup)?;

    let body = &mut phases.body;
    let start = Instant::now();
    let result = quietly(|| {
        for _ in 0..iterations {
            body.call();
        }
    });
    let elapsed = start.elapsed();
    result.map_err(|panic| panicked(test, PhaseKind::Body, panic))?;

    run_phase(test, PhaseKind::Teardown, &mut phases.teardown)?;
    Ok(elapsed)
}

fn run_phase(test: &str, kind: PhaseKind, phase: &mut Phase) -> Result<(), MeasurementError> {
    quietly(|| phase.call()).map_err(|panic| panicked(test, kind, panic))
}

/// Catch a panic of `f` without the panic hook writing over the live table.
///
/// The previous hook still runs for panics outside of sampling.
fn quietly<R>(f: impl FnOnce() -> R) -> std::thread::Result<R> {
    QUIET_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if !SAMPLING.with(Cell::get) {
                previous(info);
            }
        }));
    });

    SAMPLING.with(|sampling| sampling.set(true));
    let result = catch_unwind(AssertUnwindSafe(f));
    SAMPLING.with(|sampling| sampling.set(false));
    result
}

fn panicked(test: &str, phase: PhaseKind, panic: Box<dyn Any + Send>) -> MeasurementError {
    let message = if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    };

    MeasurementError::Panicked {
        test: test.to_string(),
        phase,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::Phase;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quick_config() -> MeasurementConfig {
        MeasurementConfig {
            min_samples: 3,
            max_samples: 4,
            max_time_ms: 0,
            target_sample_duration_ms: 1,
            warmup_iterations: 2,
        }
    }

    fn phases(setup: Phase, body: Phase, teardown: Phase) -> Phases {
        Phases { setup, body, teardown }
    }

    #[test]
    fn test_record_updates_figures() {
        let measurement = Measurement::new();
        measurement.start();
        assert!(measurement.is_running());

        measurement.record(0.5, 10, Duration::from_secs(5));
        let cycle = measurement.record(0.25, 10, Duration::from_millis(2500));
        measurement.stop();

        assert!(!measurement.is_running());
        assert_eq!(measurement.sample_count(), 2);
        assert_eq!(cycle.cycle, 2);
        assert!((measurement.mean() - 0.375).abs() < 1e-12);
        assert!((measurement.ops_per_second() - 1.0 / 0.375).abs() < 1e-9);
        assert!(measurement.relative_margin_of_error() > 0.0);
    }

    #[test]
    fn test_state_reads_figures_of_one_sample() {
        let measurement = Measurement::new();
        assert_eq!(measurement.state(), TestState::Initialized);

        measurement.start();
        assert_eq!(measurement.state(), TestState::Initialized);

        measurement.record(0.5, 4, Duration::from_secs(2));
        let running = Figures {
            ops_per_second: 2.0,
            relative_margin_of_error: 0.0,
            sample_count: 1,
        };
        assert_eq!(measurement.state(), TestState::Running(running));

        measurement.stop();
        assert_eq!(measurement.state(), TestState::Finished(running));
    }

    #[test]
    fn test_empty_measurement_has_no_rate() {
        let measurement = Measurement::new();
        assert_eq!(measurement.sample_count(), 0);
        assert_eq!(measurement.ops_per_second(), 0.0);
    }

    #[tokio::test]
    async fn test_sampler_runs_phases_in_order() {
        let setups = Arc::new(AtomicUsize::new(0));
        let bodies = Arc::new(AtomicUsize::new(0));
        let teardowns = Arc::new(AtomicUsize::new(0));

        let mut phases = {
            let (s, b, t) = (setups.clone(), bodies.clone(), teardowns.clone());
            phases(
                Phase::new(move || {
                    s.fetch_add(1, Ordering::SeqCst);
                }),
                Phase::new(move || {
                    b.fetch_add(1, Ordering::SeqCst);
                }),
                Phase::new(move || {
                    t.fetch_add(1, Ordering::SeqCst);
                }),
            )
        };

        let measurement = Measurement::new();
        let mut cycles = Vec::new();
        Sampler::new(quick_config())
            .run("count", &mut phases, &Context::new(), &measurement, |cycle| cycles.push(cycle))
            .await
            .unwrap();

        assert!(!measurement.is_running());
        assert_eq!(measurement.sample_count(), 3);
        assert_eq!(cycles.iter().map(|c| c.cycle).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(setups.load(Ordering::SeqCst), teardowns.load(Ordering::SeqCst));
        assert!(bodies.load(Ordering::SeqCst) >= 2 + 3);
        assert!(measurement.ops_per_second() > 0.0);
    }

    #[tokio::test]
    async fn test_sampler_respects_max_samples() {
        let config = MeasurementConfig {
            max_time_ms: 60_000,
            ..quick_config()
        };
        let mut phases = phases(Phase::new(|| {}), Phase::new(|| {}), Phase::new(|| {}));
        let measurement = Measurement::new();

        Sampler::new(config)
            .run("capped", &mut phases, &Context::new(), &measurement, |_| {})
            .await
            .unwrap();

        assert_eq!(measurement.sample_count(), 4);
    }

    #[tokio::test]
    async fn test_sampler_reports_panicking_body() {
        let mut phases = phases(
            Phase::new(|| {}),
            Phase::new(|| panic!("this is an error")),
            Phase::new(|| {}),
        );
        let measurement = Measurement::new();

        let err = Sampler::new(quick_config())
            .run("throws", &mut phases, &Context::new(), &measurement, |_| {})
            .await
            .unwrap_err();

        assert_eq!(
            err,
            MeasurementError::Panicked {
                test: "throws".to_string(),
                phase: PhaseKind::Body,
                message: "this is an error".to_string(),
            }
        );
        assert!(!measurement.is_running());
        assert_eq!(measurement.sample_count(), 0);
    }

    #[test]
    fn test_quietly_catches_and_resets() {
        let caught = quietly(|| panic!("silenced"));
        assert!(caught.is_err());
        assert!(!SAMPLING.with(Cell::get));

        assert_eq!(quietly(|| 7).unwrap(), 7);
        assert!(!SAMPLING.with(Cell::get));
    }

    #[tokio::test]
    async fn test_sampler_reports_panicking_setup() {
        let mut phases = phases(
            Phase::new(|| panic!("{} failed", "setup")),
            Phase::new(|| {}),
            Phase::new(|| {}),
        );

        let config = MeasurementConfig {
            warmup_iterations: 0,
            ..quick_config()
        };
        let err = Sampler::new(config)
            .run("setup", &mut phases, &Context::new(), &Measurement::new(), |_| {})
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MeasurementError::Panicked { phase: PhaseKind::Setup, ref message, .. } if message == "setup failed"
        ));
    }

    #[tokio::test]
    async fn test_sampler_rejects_invalid_config() {
        let config = MeasurementConfig {
            min_samples: 0,
            ..quick_config()
        };
        let mut phases = phases(Phase::new(|| {}), Phase::new(|| {}), Phase::new(|| {}));

        let err = Sampler::new(config)
            .run("bad", &mut phases, &Context::new(), &Measurement::new(), |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, MeasurementError::InvalidConfig { .. }));
    }
}
