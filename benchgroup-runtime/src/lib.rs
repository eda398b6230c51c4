//! Nested benchmark groups with live, throttled result tables.
//!
//! Declare a [`Suite`] of groups and tests, hand it to a [`SuiteRunner`], and
//! either drive it yourself through [`SuiteRunner::run`] and its events or let
//! [`run_and_report`] redraw the result table while it runs.

pub mod baseline;
pub mod config;
pub mod events;
pub mod measurement;
pub mod printer;
pub mod registry;
pub mod reporter;
pub mod runner;
pub mod snapshot;
pub mod statistics;
pub mod suite;
pub mod table;
pub mod throttle;
pub mod walker;

pub use baseline::baseline_bundle_basic;
pub use config::{BenchmarkConfig, ConfigError, MeasurementConfig, ReporterConfig};
pub use events::{BenchmarkTarget, EventKind, EventStream, SuiteEvent, SuiteId};
pub use measurement::{CycleData, Measurement, MeasurementError, PhaseKind, Sampler};
pub use printer::{ConsolePrinter, MemoryPrinter, Printer};
pub use registry::SuiteDefinition;
pub use reporter::{run_and_report, ReportError, Reporter, ReporterConflictError};
pub use runner::{RunError, RunOptions, RunState, SuiteRunner};
pub use snapshot::{Figures, ResultSnapshot, TestSnapshot, TestState};
pub use suite::{Context, DeclarationError, Group, Node, Phase, Suite, Test};
pub use table::{format_result_table, TableOptions};
pub use throttle::{Throttle, ThrottleError};
pub use walker::{depth_first, depth_first_async, map_depth_first, Branch, SkipChildren, TreeNode, Visit};

// Re-export inventory for use by the macro
pub use inventory;
