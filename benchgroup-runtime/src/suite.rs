//! Suite model and the nesting builder used to declare it.
//!
//! A suite is an ordered forest of [`Node`]s. Groups are declared with
//! [`Suite::group`], which keeps the group open for the duration of its
//! closure; tests are declared into the innermost open group.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

use crate::measurement::Measurement;
use crate::walker::TreeNode;

/// Named values a test works with, kept alongside the test for reporting.
pub type Context = BTreeMap<String, serde_json::Value>;

/// Errors raised while declaring a suite. These are programming errors in the
/// benchmark definitions and are returned at the declaration call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclarationError {
    #[error("test '{title}' needs between one and three phases (setup, body, teardown), got {count}")]
    Arity { title: String, count: usize },

    #[error("test '{title}' must be declared inside a group")]
    Placement { title: String },
}

/// One zero-argument unit of work of a test.
pub struct Phase(Box<dyn FnMut() + Send>);

impl Phase {
    pub fn new<F>(f: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        Self(Box::new(f))
    }

    fn noop() -> Self {
        Self::new(|| {})
    }

    pub(crate) fn call(&mut self) {
        (self.0)()
    }
}

impl fmt::Debug for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Phase")
    }
}

/// setup, body and teardown of a test, in that order
#[derive(Debug)]
pub struct Phases {
    pub(crate) setup: Phase,
    pub(crate) body: Phase,
    pub(crate) teardown: Phase,
}

impl Phases {
    /// One phase is the body, two are (setup, body), three are (setup, body, teardown).
    fn from_declared(title: &str, phases: Vec<Phase>) -> Result<Self, DeclarationError> {
        let count = phases.len();
        let mut phases = phases.into_iter();

        let (setup, body, teardown) = match (phases.next(), phases.next(), phases.next()) {
            (Some(body), None, None) => (Phase::noop(), body, Phase::noop()),
            (Some(setup), Some(body), None) => (setup, body, Phase::noop()),
            (Some(setup), Some(body), Some(teardown)) if count == 3 => (setup, body, teardown),
            _ => {
                return Err(DeclarationError::Arity {
                    title: title.to_string(),
                    count,
                })
            }
        };

        Ok(Self { setup, body, teardown })
    }
}

#[derive(Debug)]
pub struct Group {
    title: String,
    children: Vec<Node>,
}

impl Group {
    fn new(title: String) -> Self {
        Self {
            title,
            children: Vec::new(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }
}

pub struct Test {
    title: String,
    context: Context,
    phases: tokio::sync::Mutex<Phases>,
    measurement: Mutex<Option<Measurement>>,
}

impl Test {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Handle to the latest run of this test, if it ran since the last clear.
    pub fn measurement(&self) -> Option<Measurement> {
        self.measurement
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_measurement(&self, measurement: Option<Measurement>) {
        *self.measurement.lock().unwrap_or_else(PoisonError::into_inner) = measurement;
    }

    pub(crate) fn phases(&self) -> &tokio::sync::Mutex<Phases> {
        &self.phases
    }
}

impl fmt::Debug for Test {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Test")
            .field("title", &self.title)
            .field("context", &self.context)
            .field("measurement", &self.measurement())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum Node {
    Group(Group),
    Test(Test),
}

impl Node {
    pub fn title(&self) -> &str {
        match self {
            Node::Group(group) => group.title(),
            Node::Test(test) => test.title(),
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Node::Group(group) => Some(group),
            Node::Test(_) => None,
        }
    }

    pub fn as_test(&self) -> Option<&Test> {
        match self {
            Node::Test(test) => Some(test),
            Node::Group(_) => None,
        }
    }
}

impl TreeNode for Node {
    fn children(&self) -> Option<&[Self]> {
        match self {
            Node::Group(group) => Some(&group.children),
            Node::Test(_) => None,
        }
    }
}

/// Builder for a suite forest.
///
/// Keeps its own stack of open groups, so independent suites can be declared
/// side by side.
#[derive(Debug, Default)]
pub struct Suite {
    roots: Vec<Node>,
    open: Vec<Vec<usize>>,
}

impl Suite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a group and run `define` with the group open.
    ///
    /// Groups and tests declared inside `define` become children of this group.
    pub fn group<F>(&mut self, title: impl Into<String>, define: F) -> Result<(), DeclarationError>
    where
        F: FnOnce(&mut Suite) -> Result<(), DeclarationError>,
    {
        let path = self.attach(Node::Group(Group::new(title.into())));
        self.open.push(path);
        let outcome = define(self);
        self.open.pop();
        outcome
    }

    /// Declare a test in the innermost open group.
    pub fn test(&mut self, title: impl Into<String>, phases: Vec<Phase>) -> Result<(), DeclarationError> {
        self.test_with_context(title, Context::new(), phases)
    }

    pub fn test_with_context(
        &mut self,
        title: impl Into<String>,
        context: Context,
        phases: Vec<Phase>,
    ) -> Result<(), DeclarationError> {
        let title = title.into();
        let phases = Phases::from_declared(&title, phases)?;

        if self.open.is_empty() {
            return Err(DeclarationError::Placement { title });
        }

        self.attach(Node::Test(Test {
            title,
            context,
            phases: tokio::sync::Mutex::new(phases),
            measurement: Mutex::new(None),
        }));
        Ok(())
    }

    /// Shorthand for a test that only has a body.
    pub fn speed<F>(&mut self, title: impl Into<String>, body: F) -> Result<(), DeclarationError>
    where
        F: FnMut() + Send + 'static,
    {
        self.test(title, vec![Phase::new(body)])
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn forest(&self) -> &[Node] {
        &self.roots
    }

    pub fn into_forest(self) -> Vec<Node> {
        self.roots
    }

    /// Append to the innermost open group (or the roots) and return the new node's path.
    fn attach(&mut self, node: Node) -> Vec<usize> {
        let Some(parent_path) = self.open.last().cloned() else {
            self.roots.push(node);
            return vec![self.roots.len() - 1];
        };

        // open paths only ever point at groups, appends never move them
        let Some(group) = self.group_at_mut(&parent_path) else {
            self.roots.push(node);
            return vec![self.roots.len() - 1];
        };
        group.children.push(node);

        let mut path = parent_path;
        path.push(group.children.len() - 1);
        path
    }

    fn group_at_mut(&mut self, path: &[usize]) -> Option<&mut Group> {
        let (first, rest) = path.split_first()?;
        let mut node = self.roots.get_mut(*first)?;

        for index in rest {
            node = match node {
                Node::Group(group) => group.children.get_mut(*index)?,
                Node::Test(_) => return None,
            };
        }

        match node {
            Node::Group(group) => Some(group),
            Node::Test(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::walker::depth_first;

    fn outline(suite: &Suite) -> Vec<(usize, String)> {
        let mut lines = Vec::new();
        depth_first(suite.forest(), |visit| {
            lines.push((visit.depth, visit.node.title().to_string()));
        });
        lines
    }

    #[test]
    fn test_nested_declaration_order() {
        let mut suite = Suite::new();

        suite
            .group("root 1", |s| {
                s.speed("speed 1.1", || {})?;
                s.speed("speed 1.2", || {})?;
                s.group("group 1.1", |s| s.speed("speed 1.1.1", || {}))
            })
            .unwrap();
        suite
            .group("root 2", |s| s.speed("speed 2.1", || {}))
            .unwrap();

        assert_eq!(
            outline(&suite),
            vec![
                (1, "root 1".to_string()),
                (2, "speed 1.1".to_string()),
                (2, "speed 1.2".to_string()),
                (2, "group 1.1".to_string()),
                (3, "speed 1.1.1".to_string()),
                (1, "root 2".to_string()),
                (2, "speed 2.1".to_string()),
            ]
        );
    }

    #[test]
    fn test_deep_nesting_returns_to_parent() {
        let mut suite = Suite::new();

        suite
            .group("a", |s| {
                s.group("b", |s| s.group("c", |s| s.speed("deep", || {})))?;
                s.speed("after", || {})
            })
            .unwrap();

        let a = suite.forest()[0].as_group().unwrap();
        assert_eq!(a.children().len(), 2);
        assert_eq!(a.children()[1].title(), "after");
    }

    #[test]
    fn test_placement_error_outside_group() {
        let mut suite = Suite::new();
        let err = suite.speed("lonely", || {}).unwrap_err();

        assert_eq!(
            err,
            DeclarationError::Placement {
                title: "lonely".to_string()
            }
        );
        assert!(suite.is_empty());
    }

    #[test]
    fn test_arity_errors() {
        let mut suite = Suite::new();

        let none = suite.group("g", |s| s.test("empty", vec![])).unwrap_err();
        assert_eq!(
            none,
            DeclarationError::Arity {
                title: "empty".to_string(),
                count: 0
            }
        );

        let four = suite
            .group("g", |s| {
                s.test(
                    "crowded",
                    vec![
                        Phase::new(|| {}),
                        Phase::new(|| {}),
                        Phase::new(|| {}),
                        Phase::new(|| {}),
                    ],
                )
            })
            .unwrap_err();
        assert!(matches!(four, DeclarationError::Arity { count: 4, .. }));
    }

    #[test]
    fn test_arity_checked_before_placement() {
        let mut suite = Suite::new();
        let err = suite.test("nothing", vec![]).unwrap_err();
        assert!(matches!(err, DeclarationError::Arity { .. }));
    }

    #[test]
    fn test_phase_ordering() {
        use std::sync::{Arc, Mutex};

        let calls = Arc::new(Mutex::new(Vec::new()));
        let record = |name: &'static str| {
            let calls = Arc::clone(&calls);
            Phase::new(move || calls.lock().unwrap().push(name))
        };

        let mut two = Phases::from_declared("two", vec![record("setup"), record("body")]).unwrap();
        two.setup.call();
        two.body.call();
        two.teardown.call();
        assert_eq!(*calls.lock().unwrap(), vec!["setup", "body"]);

        calls.lock().unwrap().clear();
        let mut one = Phases::from_declared("one", vec![record("body")]).unwrap();
        one.setup.call();
        one.body.call();
        one.teardown.call();
        assert_eq!(*calls.lock().unwrap(), vec!["body"]);

        calls.lock().unwrap().clear();
        let mut three = Phases::from_declared(
            "three",
            vec![record("setup"), record("body"), record("teardown")],
        )
        .unwrap();
        three.setup.call();
        three.body.call();
        three.teardown.call();
        assert_eq!(*calls.lock().unwrap(), vec!["setup", "body", "teardown"]);
    }

    #[test]
    fn test_context_is_kept_on_test() {
        let mut suite = Suite::new();
        let mut context = Context::new();
        context.insert("len".to_string(), serde_json::json!(200));

        suite
            .group("copy", |s| s.test_with_context("slice", context, vec![Phase::new(|| {})]))
            .unwrap();

        let group = suite.forest()[0].as_group().unwrap();
        let test = group.children()[0].as_test().unwrap();
        assert_eq!(test.context()["len"], serde_json::json!(200));
        assert!(test.measurement().is_none());
    }

    #[test]
    fn test_error_inside_group_closes_it() {
        let mut suite = Suite::new();

        let err = suite.group("g", |s| s.test("bad", vec![])).unwrap_err();
        assert!(matches!(err, DeclarationError::Arity { .. }));

        // the failed group is no longer open
        assert!(matches!(
            suite.speed("outside", || {}),
            Err(DeclarationError::Placement { .. })
        ));
    }
}
