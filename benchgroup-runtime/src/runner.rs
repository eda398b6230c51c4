//! Runs a suite one test at a time and publishes its lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::config::MeasurementConfig;
use crate::events::{BenchmarkTarget, Emitter, EventKind, EventStream, SuiteId};
use crate::measurement::{Measurement, MeasurementError, Sampler};
use crate::snapshot::{ResultSnapshot, TestSnapshot};
use crate::suite::{DeclarationError, Node, Suite};
use crate::walker::{depth_first, depth_first_async, map_depth_first, TreeNode, Visit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Finished,
    Errored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Drop the measurements of the previous run before starting
    pub clear_previous_results: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            clear_previous_results: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error(transparent)]
    Measurement(#[from] MeasurementError),
}

struct Inner {
    forest: Vec<Node>,
    sampler: Sampler,
    state: Mutex<RunState>,
    events: Emitter,
    reporter_attached: AtomicBool,
}

/// Owns a built suite and drives its runs.
///
/// Cheap to clone; clones drive the same suite.
#[derive(Clone)]
pub struct SuiteRunner {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SuiteRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuiteRunner")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SuiteRunner {
    pub fn new(suite: Suite) -> Self {
        Self::with_config(suite, MeasurementConfig::default())
    }

    pub fn with_config(suite: Suite, config: MeasurementConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                forest: suite.into_forest(),
                sampler: Sampler::new(config),
                state: Mutex::new(RunState::Idle),
                events: Emitter::new(SuiteId::next()),
                reporter_attached: AtomicBool::new(false),
            }),
        }
    }

    /// Declare a suite and wrap it in a runner in one go.
    pub fn build<F>(config: MeasurementConfig, define: F) -> Result<Self, DeclarationError>
    where
        F: FnOnce(&mut Suite) -> Result<(), DeclarationError>,
    {
        let mut suite = Suite::new();
        define(&mut suite)?;
        Ok(Self::with_config(suite, config))
    }

    pub fn id(&self) -> SuiteId {
        self.inner.events.suite()
    }

    pub fn forest(&self) -> &[Node] {
        &self.inner.forest
    }

    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> RunState {
        *self.lock_state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    pub fn subscribe(&self) -> EventStream {
        self.inner.events.subscribe()
    }

    /// Node at the given child-index path, as reported in events.
    pub fn node_at(&self, path: &[usize]) -> Option<&Node> {
        let (first, rest) = path.split_first()?;
        let mut node = self.inner.forest.get(*first)?;
        for index in rest {
            node = node.children()?.get(*index)?;
        }
        Some(node)
    }

    /// Forget every test's measurement. Refused with `false` while running.
    pub fn clear_results(&self) -> bool {
        let state = self.lock_state();
        if *state == RunState::Running {
            return false;
        }
        self.clear_measurements();
        drop(state);
        true
    }

    fn clear_measurements(&self) {
        depth_first(&self.inner.forest, |visit| {
            if let Node::Test(test) = visit.node {
                test.set_measurement(None);
            }
        });
    }

    /// Copy of the current results with the shape of the suite.
    pub fn extract_results(&self) -> Vec<ResultSnapshot> {
        map_depth_first(&self.inner.forest, |visit| match visit.node {
            Node::Group(group) => ResultSnapshot::Group {
                name: group.title().to_string(),
                children: Vec::new(),
            },
            Node::Test(test) => {
                ResultSnapshot::Test(TestSnapshot::capture(test.title(), test.measurement().as_ref()))
            }
        })
    }

    /// Run every test in declaration order.
    ///
    /// Resolves to `false` without doing anything when the suite is empty or
    /// already running. The first failing test ends the run.
    pub async fn run(&self, options: RunOptions) -> Result<bool, RunError> {
        if self.inner.forest.is_empty() {
            return Ok(false);
        }

        {
            let mut state = self.lock_state();
            if *state == RunState::Running {
                tracing::debug!(suite = %self.id(), "run requested while running");
                return Ok(false);
            }
            if options.clear_previous_results {
                self.clear_measurements();
            }
            *state = RunState::Running;
        }

        tracing::debug!(suite = %self.id(), "suite started");
        self.inner.events.emit(EventKind::SuiteStarted);

        match depth_first_async(&self.inner.forest, |visit| self.run_node(visit)).await {
            Ok(()) => {
                *self.lock_state() = RunState::Finished;
                tracing::debug!(suite = %self.id(), "suite finished");
                self.inner.events.emit(EventKind::SuiteFinished);
                Ok(true)
            }
            Err(error) => {
                *self.lock_state() = RunState::Errored;
                tracing::warn!(suite = %self.id(), "suite failed: {}", error);
                self.inner.events.emit(EventKind::SuiteError { error: error.clone() });
                Err(error)
            }
        }
    }

    async fn run_node<'a>(&'a self, visit: Visit<'a, Node>) -> Result<(), RunError> {
        let Node::Test(test) = visit.node else {
            return Ok(());
        };

        let target = BenchmarkTarget {
            group: visit.parent.map(|parent| parent.title().to_string()),
            test: test.title().to_string(),
            path: visit.path,
        };

        let measurement = Measurement::new();
        test.set_measurement(Some(measurement.clone()));
        tracing::debug!(test = test.title(), "benchmark started");
        self.inner.events.emit(EventKind::BenchmarkStarted { target: target.clone() });

        let outcome = {
            let mut phases = test.phases().lock().await;
            self.inner
                .sampler
                .run(test.title(), &mut phases, test.context(), &measurement, |cycle| {
                    self.inner.events.emit(EventKind::BenchmarkCycle {
                        target: target.clone(),
                        cycle,
                    });
                })
                .await
        };

        match outcome {
            Ok(()) => {
                tracing::debug!(
                    test = test.title(),
                    ops_per_second = measurement.ops_per_second(),
                    samples = measurement.sample_count(),
                    "benchmark finished"
                );
                self.inner.events.emit(EventKind::BenchmarkFinished { target });
                Ok(())
            }
            Err(error) => {
                *self.lock_state() = RunState::Errored;
                self.inner.events.emit(EventKind::BenchmarkError {
                    target,
                    error: error.clone(),
                });
                Err(error.into())
            }
        }
    }

    /// Take the single reporter slot of this runner.
    pub(crate) fn claim_reporter(&self) -> bool {
        self.inner
            .reporter_attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn release_reporter(&self) {
        self.inner.reporter_attached.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::TestState;
    use crate::suite::Phase;
    use std::sync::atomic::AtomicUsize;

    fn quick() -> MeasurementConfig {
        MeasurementConfig {
            min_samples: 2,
            max_samples: 3,
            max_time_ms: 0,
            target_sample_duration_ms: 0,
            warmup_iterations: 0,
        }
    }

    fn drain(stream: &mut EventStream) -> Vec<&'static str> {
        std::iter::from_fn(|| stream.try_next())
            .map(|event| event.kind.name())
            .collect()
    }

    #[tokio::test]
    async fn test_empty_suite_does_not_run() {
        let runner = SuiteRunner::with_config(Suite::new(), quick());
        let mut events = runner.subscribe();

        assert_eq!(runner.run(RunOptions::default()).await, Ok(false));
        assert!(drain(&mut events).is_empty());
        assert_eq!(runner.state(), RunState::Idle);
    }

    #[tokio::test]
    async fn test_fresh_suite_extracts_initialized_tests() {
        let runner = SuiteRunner::build(quick(), |s| {
            s.group("outer", |s| {
                s.speed("a", || {})?;
                s.group("inner", |s| s.speed("b", || {}))
            })
        })
        .unwrap();

        let results = runner.extract_results();
        let mut states = Vec::new();
        depth_first(&results, |visit| {
            if let ResultSnapshot::Test(test) = visit.node {
                states.push((test.name.clone(), test.state));
            }
        });

        assert_eq!(
            states,
            vec![
                ("a".to_string(), TestState::Initialized),
                ("b".to_string(), TestState::Initialized),
            ]
        );
        assert_eq!(results[0].name(), "outer");
    }

    #[tokio::test]
    async fn test_run_emits_lifecycle_in_order() {
        let runner = SuiteRunner::build(quick(), |s| {
            s.group("g", |s| {
                s.speed("first", || {})?;
                s.speed("second", || {})
            })
        })
        .unwrap();
        let mut events = runner.subscribe();

        assert_eq!(runner.run(RunOptions::default()).await, Ok(true));
        assert_eq!(runner.state(), RunState::Finished);

        let names: Vec<_> = drain(&mut events)
            .into_iter()
            .filter(|name| *name != "benchmark-cycle")
            .collect();
        assert_eq!(
            names,
            vec![
                "suite-started",
                "benchmark-started",
                "benchmark-finished",
                "benchmark-started",
                "benchmark-finished",
                "suite-finished",
            ]
        );

        for result in runner.extract_results()[0].children().unwrap() {
            let test = result.as_test().unwrap();
            assert!(matches!(test.state, TestState::Finished(ref f) if f.sample_count >= 2));
        }
    }

    #[tokio::test]
    async fn test_events_name_their_group_and_path() {
        let runner = SuiteRunner::build(quick(), |s| {
            s.group("outer", |s| s.group("inner", |s| s.speed("deep", || {})))
        })
        .unwrap();
        let mut events = runner.subscribe();
        runner.run(RunOptions::default()).await.unwrap();

        let started = std::iter::from_fn(|| events.try_next())
            .find(|event| event.kind.name() == "benchmark-started")
            .unwrap();
        let target = started.kind.target().unwrap();

        assert_eq!(started.suite, runner.id());
        assert_eq!(target.group.as_deref(), Some("inner"));
        assert_eq!(target.test, "deep");
        assert_eq!(runner.node_at(&target.path).unwrap().title(), "deep");
    }

    #[tokio::test]
    async fn test_failure_stops_the_run() {
        let later = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&later);

        let runner = SuiteRunner::build(quick(), |s| {
            s.group("g", |s| {
                s.speed("throws", || panic!("this is an error"))?;
                s.speed("never", move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })
        })
        .unwrap();
        let mut events = runner.subscribe();

        let err = runner.run(RunOptions::default()).await.unwrap_err();
        assert!(matches!(
            err,
            RunError::Measurement(MeasurementError::Panicked { ref test, .. }) if test == "throws"
        ));
        assert_eq!(runner.state(), RunState::Errored);
        assert_eq!(later.load(Ordering::SeqCst), 0);

        assert_eq!(
            drain(&mut events),
            vec!["suite-started", "benchmark-started", "benchmark-error", "suite-error"]
        );

        // the next run is accepted again
        assert!(runner.clear_results());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_run_and_clear_are_refused() {
        let (started_tx, started_rx) = std::sync::mpsc::channel::<()>();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Mutex::new(Some(release_rx));
        let started_tx = Mutex::new(Some(started_tx));

        let config = MeasurementConfig {
            min_samples: 1,
            max_samples: 1,
            ..quick()
        };
        let runner = SuiteRunner::build(config, |s| {
            s.group("g", |s| {
                s.test(
                    "blocking",
                    vec![
                        Phase::new(move || {
                            // park the first setup until the test is done poking
                            if let Some(tx) = started_tx.lock().unwrap().take() {
                                tx.send(()).unwrap();
                            }
                            if let Some(rx) = release_rx.lock().unwrap().take() {
                                rx.recv().unwrap();
                            }
                        }),
                        Phase::new(|| {}),
                    ],
                )
            })
        })
        .unwrap();

        let mut events = runner.subscribe();
        let background = runner.clone();
        let handle = tokio::spawn(async move { background.run(RunOptions::default()).await });

        tokio::task::spawn_blocking(move || started_rx.recv().unwrap())
            .await
            .unwrap();

        assert!(runner.is_running());
        assert_eq!(runner.run(RunOptions::default()).await, Ok(false));
        assert!(!runner.clear_results());

        release_tx.send(()).unwrap();
        assert_eq!(handle.await.unwrap(), Ok(true));
        assert_eq!(runner.state(), RunState::Finished);

        // the refused calls left the in-flight run's events alone
        assert_eq!(
            drain(&mut events),
            vec![
                "suite-started",
                "benchmark-started",
                "benchmark-cycle",
                "benchmark-finished",
                "suite-finished",
            ]
        );
        assert!(runner.extract_results()[0].children().unwrap()[0]
            .as_test()
            .is_some_and(|test| matches!(test.state, TestState::Finished(ref f) if f.sample_count == 1)));
    }

    #[tokio::test]
    async fn test_results_survive_unless_cleared() {
        let runner = SuiteRunner::build(quick(), |s| s.group("g", |s| s.speed("t", || {}))).unwrap();
        runner.run(RunOptions::default()).await.unwrap();

        let sampled = |runner: &SuiteRunner| {
            let results = runner.extract_results();
            results[0].children().unwrap()[0].as_test().unwrap().state
        };
        assert!(matches!(sampled(&runner), TestState::Finished(_)));

        assert!(runner.clear_results());
        assert_eq!(sampled(&runner), TestState::Initialized);
    }
}
