//! Serializable copies of a suite's results.

use serde::{Deserialize, Serialize};

use crate::measurement::Measurement;
use crate::walker::{Branch, TreeNode};

/// Figures of a test that has at least been started
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Figures {
    pub ops_per_second: f64,
    /// Percent of the mean
    pub relative_margin_of_error: f64,
    pub sample_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum TestState {
    /// Never ran, or was cleared since
    Initialized,
    Running(Figures),
    Finished(Figures),
}

impl TestState {
    pub fn figures(&self) -> Option<&Figures> {
        match self {
            TestState::Initialized => None,
            TestState::Running(figures) | TestState::Finished(figures) => Some(figures),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSnapshot {
    pub name: String,
    #[serde(flatten)]
    pub state: TestState,
}

impl TestSnapshot {
    /// Snapshot whatever the given measurement holds right now.
    ///
    /// A measurement without samples counts as not started.
    pub fn capture(name: impl Into<String>, measurement: Option<&Measurement>) -> Self {
        Self {
            name: name.into(),
            state: measurement.map_or(TestState::Initialized, Measurement::state),
        }
    }
}

/// Copy of one suite node, detached from the live suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResultSnapshot {
    Group {
        name: String,
        children: Vec<ResultSnapshot>,
    },
    Test(TestSnapshot),
}

impl ResultSnapshot {
    pub fn name(&self) -> &str {
        match self {
            ResultSnapshot::Group { name, .. } => name,
            ResultSnapshot::Test(test) => &test.name,
        }
    }

    pub fn as_test(&self) -> Option<&TestSnapshot> {
        match self {
            ResultSnapshot::Test(test) => Some(test),
            ResultSnapshot::Group { .. } => None,
        }
    }
}

impl TreeNode for ResultSnapshot {
    fn children(&self) -> Option<&[Self]> {
        match self {
            ResultSnapshot::Group { children, .. } => Some(children),
            ResultSnapshot::Test(_) => None,
        }
    }
}

impl Branch for ResultSnapshot {
    fn children_mut(&mut self) -> Option<&mut Vec<Self>> {
        match self {
            ResultSnapshot::Group { children, .. } => Some(children),
            ResultSnapshot::Test(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_capture_without_measurement_is_initialized() {
        let snapshot = TestSnapshot::capture("fresh", None);
        assert_eq!(snapshot.state, TestState::Initialized);
        assert!(snapshot.state.figures().is_none());
    }

    #[test]
    fn test_capture_without_samples_is_initialized() {
        let measurement = Measurement::new();
        let snapshot = TestSnapshot::capture("idle", Some(&measurement));

        assert_eq!(snapshot.state, TestState::Initialized);
    }

    #[test]
    fn test_json_layout() {
        let snapshot = ResultSnapshot::Group {
            name: "arrays".to_string(),
            children: vec![
                ResultSnapshot::Test(TestSnapshot {
                    name: "push".to_string(),
                    state: TestState::Finished(Figures {
                        ops_per_second: 1000.0,
                        relative_margin_of_error: 1.5,
                        sample_count: 12,
                    }),
                }),
                ResultSnapshot::Test(TestSnapshot::capture("pop", None)),
            ],
        };

        assert_eq!(
            serde_json::to_value(&snapshot).unwrap(),
            json!({
                "type": "group",
                "name": "arrays",
                "children": [
                    {
                        "type": "test",
                        "name": "push",
                        "state": "finished",
                        "opsPerSecond": 1000.0,
                        "relativeMarginOfError": 1.5,
                        "sampleCount": 12
                    },
                    { "type": "test", "name": "pop", "state": "initialized" }
                ]
            })
        );
    }
}
