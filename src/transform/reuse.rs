//! Reuse parameter adjustment.
//!
//! Each loop carries a reuse parameter in `0..=tree.max_reuse()` trading
//! locality against working-set size. Increase and decrease move it by one
//! step and are exact inverses within the bounds. Every reference survives.

use crate::ir::{LoopTree, NodeRef};
use crate::transform::{resolve_loop, vanished, Rewrite, Transform};
use crate::utils::errors::{TransformError, TransformErrorKind, TransformResult};

/// Direction of a reuse adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReuseStep {
    /// Up by one, to at most `max_reuse`
    Increase,
    /// Down by one, to at least 0
    Decrease,
}

/// Move a loop's reuse parameter one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjustReuse {
    /// Direction
    pub step: ReuseStep,
}

impl AdjustReuse {
    /// Adjustment in direction `step`.
    pub fn new(step: ReuseStep) -> Self {
        Self { step }
    }

    fn next_value(&self, tree: &LoopTree, at: NodeRef) -> TransformResult<u32> {
        let current = resolve_loop(tree, at, self.name())?.reuse;
        let next = match self.step {
            ReuseStep::Increase if current < tree.max_reuse() => Some(current + 1),
            ReuseStep::Decrease => current.checked_sub(1),
            ReuseStep::Increase => None,
        };
        next.ok_or_else(|| {
            TransformError::new(
                TransformErrorKind::ReuseBound,
                self.name(),
                format!(
                    "reuse of loop {} is already {} (bounds 0..={})",
                    at, current, tree.max_reuse()
                ),
            )
        })
    }
}

impl Transform for AdjustReuse {
    fn check(&self, tree: &LoopTree, at: NodeRef) -> TransformResult<()> {
        self.next_value(tree, at).map(|_| ())
    }

    fn apply(&self, tree: &LoopTree, at: NodeRef) -> TransformResult<Rewrite> {
        let next = self.next_value(tree, at)?;

        let mut new_tree = tree.clone();
        new_tree.loop_mut(at).ok_or_else(|| vanished(at, self.name()))?.reuse = next;
        Ok(Rewrite::new(new_tree))
    }

    fn name(&self) -> &str {
        match self.step {
            ReuseStep::Increase => "increase_reuse",
            ReuseStep::Decrease => "decrease_reuse",
        }
    }
}

/// Raise the reuse parameter of loop `at` by one.
pub fn increase_reuse(tree: &LoopTree, at: NodeRef) -> TransformResult<Rewrite> {
    AdjustReuse::new(ReuseStep::Increase).apply(tree, at)
}

/// Lower the reuse parameter of loop `at` by one.
pub fn decrease_reuse(tree: &LoopTree, at: NodeRef) -> TransformResult<Rewrite> {
    AdjustReuse::new(ReuseStep::Decrease).apply(tree, at)
}
