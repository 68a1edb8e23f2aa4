//! Loop splitting (strip-mining).
//!
//! Splitting a loop of trip count N by factor F produces two nested loops
//! over the same variable:
//!
//! ```text
//! for i in N:            for i in N/F:
//!   body          =>       for i in F:
//!                            body
//! ```
//!
//! The split reference stays on the outer loop and keeps its annotation and
//! reuse parameter. The inner loop is a new node that adopts the former
//! children. Every existing reference survives.

use crate::ir::{Loop, LoopTree, Node, NodeKind, NodeRef};
use crate::transform::{resolve_loop, vanished, Rewrite, Transform};
use crate::utils::errors::{TransformError, TransformErrorKind, TransformResult};

/// Loop split transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split {
    /// Trip count of the new inner loop
    pub factor: u64,
}

impl Split {
    /// Split off an inner loop of `factor` iterations.
    pub fn new(factor: u64) -> Self {
        Self { factor }
    }
}

impl Transform for Split {
    fn check(&self, tree: &LoopTree, at: NodeRef) -> TransformResult<()> {
        let l = resolve_loop(tree, at, self.name())?;
        if self.factor == 0 || l.trip_count % self.factor != 0 {
            return Err(TransformError::new(
                TransformErrorKind::IndivisibleFactor,
                self.name(),
                format!(
                    "factor {} does not divide trip count {} of loop {}",
                    self.factor, l.trip_count, at
                ),
            ));
        }
        Ok(())
    }

    fn apply(&self, tree: &LoopTree, at: NodeRef) -> TransformResult<Rewrite> {
        self.check(tree, at)?;

        let mut new_tree = tree.clone();
        let (var, trip_count) = match new_tree.as_loop(at) {
            Some(l) => (l.var.clone(), l.trip_count),
            None => return Err(vanished(at, self.name())),
        };

        let children = new_tree.children(at).to_vec();
        let inner = new_tree.alloc(Node {
            parent: Some(at),
            children,
            kind: NodeKind::Loop(Loop::new(var, self.factor)),
        });
        new_tree.reparent_children(inner);

        if let Some(node) = new_tree.node_mut(at) {
            node.children = vec![inner];
        }
        if let Some(outer) = new_tree.loop_mut(at) {
            outer.trip_count = trip_count / self.factor;
        }

        Ok(Rewrite::new(new_tree))
    }

    fn name(&self) -> &str {
        "split"
    }
}

/// Split loop `at` so that the new inner loop has trip count `factor`.
pub fn split(tree: &LoopTree, at: NodeRef, factor: u64) -> TransformResult<Rewrite> {
    Split::new(factor).apply(tree, at)
}
