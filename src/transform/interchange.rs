//! Loop interchange.
//!
//! Swapping exchanges the nesting order of two directly nested loops:
//!
//! ```text
//! for i in N:            for j in M:
//!   for j in M:   =>       for i in N:
//!     body                   body
//! ```
//!
//! Legality:
//! - the two loops must be parent and child, and the outer one must enclose
//!   nothing but the inner one (a perfect nest), so no sibling statement
//!   changes scope;
//! - loops over the same variable never exchange order, since their nesting
//!   encodes the index decomposition `i = outer * inner_trip + inner`.
//!
//! Nodes are relinked rather than copied, so every reference survives and
//! keeps naming the same loop.

use crate::ir::{LoopTree, NodeRef};
use crate::transform::{resolve_loop, vanished, Rewrite, Transform};
use crate::utils::errors::{TransformError, TransformErrorKind, TransformResult};

/// Loop interchange of the node it is applied at with `other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Swap {
    /// The neighbor to exchange with
    pub other: NodeRef,
}

impl Swap {
    /// Exchange with `other`.
    pub fn new(other: NodeRef) -> Self {
        Self { other }
    }

    /// Order the pair as (outer, inner), checking legality.
    fn nest(&self, tree: &LoopTree, at: NodeRef) -> TransformResult<(NodeRef, NodeRef)> {
        let a = resolve_loop(tree, at, self.name())?;
        let b = resolve_loop(tree, self.other, self.name())?;

        let (outer, inner) = if tree.parent(self.other) == Some(at) {
            (at, self.other)
        } else if tree.parent(at) == Some(self.other) {
            (self.other, at)
        } else {
            return Err(TransformError::new(
                TransformErrorKind::NoSwappableNeighbor,
                self.name(),
                format!("loops {} and {} are not directly nested", at, self.other),
            ));
        };

        if tree.children(outer).len() != 1 {
            return Err(TransformError::new(
                TransformErrorKind::NoSwappableNeighbor,
                self.name(),
                format!("loop {} encloses more than loop {}", outer, inner),
            ));
        }

        if a.var == b.var {
            return Err(TransformError::new(
                TransformErrorKind::DependenceViolation,
                self.name(),
                format!(
                    "loops {} and {} are pieces of index `{}` and must keep their order",
                    at, self.other, a.var
                ),
            ));
        }

        Ok((outer, inner))
    }
}

impl Transform for Swap {
    fn check(&self, tree: &LoopTree, at: NodeRef) -> TransformResult<()> {
        self.nest(tree, at).map(|_| ())
    }

    fn apply(&self, tree: &LoopTree, at: NodeRef) -> TransformResult<Rewrite> {
        let (outer, inner) = self.nest(tree, at)?;

        let mut new_tree = tree.clone();
        let grandparent = new_tree.parent(outer);
        let body = new_tree.children(inner).to_vec();

        // Hook the inner loop where the outer one was.
        match grandparent {
            Some(g) => {
                let node = new_tree.node_mut(g).ok_or_else(|| vanished(g, self.name()))?;
                for c in node.children.iter_mut() {
                    if *c == outer {
                        *c = inner;
                    }
                }
            }
            None => new_tree.set_root(inner),
        }

        let inner_node = new_tree.node_mut(inner).ok_or_else(|| vanished(inner, self.name()))?;
        inner_node.parent = grandparent;
        inner_node.children = vec![outer];

        let outer_node = new_tree.node_mut(outer).ok_or_else(|| vanished(outer, self.name()))?;
        outer_node.parent = Some(inner);
        outer_node.children = body;
        new_tree.reparent_children(outer);

        Ok(Rewrite::new(new_tree))
    }

    fn name(&self) -> &str {
        "swap"
    }
}

/// Exchange the nesting order of loops `a` and `b`.
pub fn swap(tree: &LoopTree, a: NodeRef, b: NodeRef) -> TransformResult<Rewrite> {
    Swap::new(b).apply(tree, a)
}
