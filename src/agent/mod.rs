//! Search agent.
//!
//! An [`Agent`] owns one `(tree, cursor)` pair and exposes it to search
//! drivers as a discrete action space:
//!
//! - [`Agent::apply_action`] runs one catalog action at the cursor;
//! - [`Agent::eval`] evaluates one catalog metric;
//! - [`Agent::available_actions`] lists the legal moves without touching the
//!   live state;
//! - [`Agent::serialize`] / [`Agent::deserialize`] checkpoint the state.
//!
//! A failed action leaves the state exactly as it was.
//!
//! # Example
//!
//! ```
//! use looptree::prelude::*;
//!
//! let tree = TreeBuilder::new()
//!     .open_loop("i", 8)
//!     .leaf(OpKind::Add, &["A", "B"], "C")
//!     .build()
//!     .unwrap();
//!
//! let mut agent = Agent::new(tree);
//! agent.apply_action("split_4").unwrap();
//! assert_eq!(agent.eval("FLOPs").unwrap(), 8.0);
//! // The outer trip count is now 2, which 3 does not divide.
//! let before = agent.serialize().unwrap();
//! assert!(agent.apply_action("split_3").unwrap_err().is_illegal_transform());
//! assert_eq!(agent.serialize().unwrap(), before);
//! ```

pub mod catalog;
pub mod state;

pub use catalog::{Action, Outcome, SplitFactor};

use crate::ir::{print_tree_with, LoopTree, NodeRef};
use crate::metrics::{self, Backend, CostModel, Metric};
use crate::utils::errors::{AgentError, AgentResult, TransformError, TransformErrorKind};
use log::{debug, trace};
use std::fmt;
use std::sync::Arc;

/// One loop tree under search, with a cursor.
#[derive(Clone)]
pub struct Agent {
    tree: LoopTree,
    /// Always resolves to a live node of `tree`
    cursor: NodeRef,
    backend: Arc<dyn Backend>,
}

impl Agent {
    /// Agent with the cursor on the root, timed by the default cost model.
    pub fn new(tree: LoopTree) -> Self {
        let cursor = tree.root();
        Self {
            tree,
            cursor,
            backend: Arc::new(CostModel::default()),
        }
    }

    /// Replace the runtime backend.
    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = backend;
        self
    }

    /// Place the cursor on `cursor`, which must be a live node.
    pub fn with_cursor(mut self, cursor: NodeRef) -> AgentResult<Self> {
        if !self.tree.contains(cursor) {
            return Err(TransformError::new(
                TransformErrorKind::UnknownRef,
                "with_cursor",
                format!("reference {} does not resolve to a live node", cursor),
            )
            .into());
        }
        self.cursor = cursor;
        Ok(self)
    }

    /// Rebuild an agent from [`Agent::serialize`] output.
    pub fn from_serialized(text: &str, backend: Arc<dyn Backend>) -> AgentResult<Self> {
        let (tree, cursor) = state::decode(text)?;
        Ok(Self { tree, cursor, backend })
    }

    /// The current tree.
    pub fn tree(&self) -> &LoopTree {
        &self.tree
    }

    /// The node actions apply at.
    pub fn cursor(&self) -> NodeRef {
        self.cursor
    }

    /// Backend used for `seconds` and `FLOPS`.
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Apply the catalog action called `name` at the cursor.
    pub fn apply_action(&mut self, name: &str) -> AgentResult<&mut Self> {
        let action = Action::from_name(name).ok_or_else(|| AgentError::UnknownAction {
            name: name.to_string(),
            help: help_actions(),
        })?;
        self.apply(action)
    }

    /// Apply `action` at the cursor.
    pub fn apply(&mut self, action: Action) -> AgentResult<&mut Self> {
        let outcome = match action.step(&self.tree, self.cursor) {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!("{} rejected at {}: {}", action, self.cursor, e);
                return Err(e.into());
            }
        };

        match outcome {
            Outcome::Moved(to) => {
                debug!("{}: cursor {} -> {}", action, self.cursor, to);
                self.cursor = to;
            }
            Outcome::Rewritten { rewrite, cursor } => {
                debug!("{} at {}: {} nodes", action, self.cursor, rewrite.tree.node_count());
                self.tree = rewrite.into_tree();
                self.cursor = cursor;
            }
        }
        Ok(self)
    }

    /// Evaluate the catalog metric called `name`.
    pub fn eval(&self, name: &str) -> AgentResult<f64> {
        let metric = Metric::from_name(name).ok_or_else(|| AgentError::UnknownMetric {
            name: name.to_string(),
            help: help_metrics(),
        })?;
        self.evaluate(metric)
    }

    /// Evaluate `metric` on the current tree.
    pub fn evaluate(&self, metric: Metric) -> AgentResult<f64> {
        metrics::evaluate(metric, &self.tree, self.backend.as_ref())
    }

    /// Names of the actions legal in the current state, in catalog order.
    pub fn available_actions(&self) -> AgentResult<Vec<&'static str>> {
        Ok(self.available()?.iter().map(Action::name).collect())
    }

    /// Actions legal in the current state, in catalog order.
    ///
    /// Legality predicates only ever report illegal moves, each of which
    /// just leaves its action out of the list.
    pub fn available(&self) -> AgentResult<Vec<Action>> {
        let mut legal = Vec::new();
        for action in Action::ALL {
            match action.check(&self.tree, self.cursor) {
                Ok(()) => {
                    trace!("check {} at {}: legal", action, self.cursor);
                    legal.push(action);
                }
                Err(e) => trace!("check {} at {}: {}", action, self.cursor, e),
            }
        }
        Ok(legal)
    }

    /// Single-action form of [`Agent::available`].
    pub fn is_available(&self, action: Action) -> bool {
        action.check(&self.tree, self.cursor).is_ok()
    }

    /// Checkpoint text for the current state.
    pub fn serialize(&self) -> AgentResult<String> {
        state::encode(&self.tree, self.cursor)
    }

    /// A new agent holding the state encoded in `text`, sharing this agent's
    /// backend. `self` is not modified.
    pub fn deserialize(&self, text: &str) -> AgentResult<Agent> {
        Self::from_serialized(text, Arc::clone(&self.backend))
    }

    /// Tree rendering with the cursor line marked.
    pub fn dump(&self) -> String {
        let cursor = self.cursor;
        print_tree_with(&self.tree, |r| {
            if r == cursor {
                format!("<<<<<< cursor (ref {})", r)
            } else {
                String::new()
            }
        })
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("cursor", &self.cursor)
            .field("nodes", &self.tree.node_count())
            .field("backend", &self.backend.name())
            .finish()
    }
}

/// Listing of the action catalog.
pub fn help_actions() -> String {
    let mut out = String::from("Available actions:\n");
    for action in Action::ALL {
        out.push_str(&format!("  {:<16} {}\n", action.name(), action.description()));
    }
    out
}

/// Listing of the metric catalog.
pub fn help_metrics() -> String {
    let mut out = String::from("Available metrics:\n");
    for metric in Metric::ALL {
        out.push_str(&format!("  {:<16} {}\n", metric.name(), metric.description()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{OpKind, TreeBuilder};
    use crate::metrics::FixedBackend;

    fn matmul() -> LoopTree {
        TreeBuilder::new()
            .open_loop("m", 16)
            .open_loop("n", 16)
            .open_loop("k", 16)
            .leaf(OpKind::MulAdd, &["A", "B"], "C")
            .build()
            .expect("Failed to build matmul")
    }

    #[test]
    fn test_unknown_action_lists_catalog() {
        let mut agent = Agent::new(matmul());
        match agent.apply_action("tile") {
            Err(AgentError::UnknownAction { name, help }) => {
                assert_eq!(name, "tile");
                assert!(help.contains("split_256"));
                assert!(help.contains("decrease_reuse"));
            }
            other => panic!("unexpected result: {:?}", other.map(|a| a.cursor())),
        }
    }

    #[test]
    fn test_unknown_metric_lists_catalog() {
        let agent = Agent::new(matmul());
        match agent.eval("gflops") {
            Err(AgentError::UnknownMetric { help, .. }) => {
                assert!(help.contains("FLOPs"));
                assert!(help.contains("seconds"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_failed_action_keeps_state() {
        let mut agent = Agent::new(matmul());
        let before = agent.serialize().expect("Failed to serialize");
        let err = agent.apply_action("split_3").unwrap_err();
        assert!(err.is_illegal_transform());
        assert_eq!(agent.serialize().expect("Failed to serialize"), before);
    }

    #[test]
    fn test_split_3_on_divisible_trip() {
        let tree = TreeBuilder::new()
            .open_loop("i", 12)
            .leaf(OpKind::Add, &["A", "B"], "C")
            .build()
            .expect("Failed to build tree");
        let mut agent = Agent::new(tree);
        assert!(agent.is_available(Action::Split(SplitFactor::F3)));
        agent.apply_action("split_3").expect("Failed to split");
        let root = agent.tree().root();
        assert_eq!(agent.tree().as_loop(root).map(|l| l.trip_count), Some(4));
    }

    #[test]
    fn test_chaining() {
        let mut agent = Agent::new(matmul());
        agent
            .apply_action("split_4").expect("Failed to split")
            .apply_action("down").expect("Failed to move")
            .apply_action("vectorize").expect("Failed to annotate");
        let inner = agent.cursor();
        assert_eq!(agent.tree().as_loop(inner).map(|l| l.trip_count), Some(4));
    }

    #[test]
    fn test_root_availability() {
        let agent = Agent::new(matmul());
        let available = agent.available_actions().expect("Failed to list actions");
        assert!(!available.contains(&"up"));
        assert!(!available.contains(&"swap_up"));
        assert!(!available.contains(&"merge"));
        assert!(!available.contains(&"decrease_reuse"));
        assert!(!available.contains(&"split_32"));
        assert!(!available.contains(&"split_3"));
        for name in ["down", "swap_down", "split_2", "split_16", "vectorize", "unroll",
                     "copy_input_0", "copy_input_1", "increase_reuse"] {
            assert!(available.contains(&name), "{} should be available", name);
        }
    }

    #[test]
    fn test_dump_marks_cursor() {
        let mut agent = Agent::new(matmul());
        agent.apply_action("down").expect("Failed to move");
        let dump = agent.dump();
        let marked: Vec<&str> = dump.lines().filter(|l| l.contains("<<<<<< cursor")).collect();
        assert_eq!(marked.len(), 1);
        assert!(marked[0].trim_start().starts_with("for n in 16"));
        assert!(marked[0].ends_with(&format!("(ref {})", agent.cursor())));
    }

    #[test]
    fn test_deserialize_shares_backend() {
        let agent = Agent::new(matmul()).with_backend(Arc::new(FixedBackend::new(1.0)));
        let text = agent.serialize().expect("Failed to serialize");
        let restored = agent.deserialize(&text).expect("Failed to deserialize");
        assert_eq!(restored.backend().name(), "fixed");
        assert_eq!(restored.tree(), agent.tree());
    }

    #[test]
    fn test_with_cursor_rejects_dangling() {
        let err = Agent::new(matmul()).with_cursor(NodeRef(42)).unwrap_err();
        assert!(err.is_illegal_transform());
    }

    #[test]
    fn test_agent_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Agent>();
        assert_send_sync::<LoopTree>();
    }
}
