//! Loop merging, the inverse of splitting.
//!
//! Adjacency rule: a loop merges with its immediately enclosed loop, which
//! must be its only child and iterate the same variable.
//!
//! ```text
//! for i in A:            for i in A*B:
//!   for i in B:   =>       body
//!     body
//! ```
//!
//! The merged reference keeps its annotation and reuse parameter. The inner
//! loop's reference is retired and maps to the merged loop.

use crate::ir::{LoopTree, NodeRef};
use crate::transform::{resolve_loop, vanished, Rewrite, Transform};
use crate::utils::errors::{TransformError, TransformErrorKind, TransformResult};

/// Loop merge transformation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Merge;

impl Merge {
    /// Create a merge.
    pub fn new() -> Self {
        Self
    }

    /// The enclosed loop `at` would merge with.
    fn partner(&self, tree: &LoopTree, at: NodeRef) -> TransformResult<NodeRef> {
        let outer = resolve_loop(tree, at, self.name())?;
        let no_partner = |why: &str| {
            TransformError::new(
                TransformErrorKind::NoMergeableNeighbor,
                self.name(),
                format!("loop {} cannot merge: {}", at, why),
            )
        };

        let children = tree.children(at);
        if children.len() != 1 {
            return Err(no_partner("it does not enclose exactly one node"));
        }
        let inner_ref = children[0];
        let inner = tree.as_loop(inner_ref)
            .ok_or_else(|| no_partner("its only child is not a loop"))?;
        if inner.var != outer.var {
            return Err(no_partner("the enclosed loop iterates a different variable"));
        }
        if outer.trip_count.checked_mul(inner.trip_count).is_none() {
            return Err(no_partner("the merged trip count overflows"));
        }
        Ok(inner_ref)
    }
}

impl Transform for Merge {
    fn check(&self, tree: &LoopTree, at: NodeRef) -> TransformResult<()> {
        self.partner(tree, at).map(|_| ())
    }

    fn apply(&self, tree: &LoopTree, at: NodeRef) -> TransformResult<Rewrite> {
        let inner_ref = self.partner(tree, at)?;

        let mut new_tree = tree.clone();
        let inner_node = new_tree.retire(inner_ref)
            .ok_or_else(|| vanished(inner_ref, self.name()))?;
        let inner_trip = inner_node.as_loop().map_or(1, |l| l.trip_count);

        if let Some(node) = new_tree.node_mut(at) {
            node.children = inner_node.children;
        }
        new_tree.reparent_children(at);
        if let Some(outer) = new_tree.loop_mut(at) {
            outer.trip_count *= inner_trip;
        }

        let mut rewrite = Rewrite::new(new_tree);
        rewrite.retire(inner_ref, at);
        Ok(rewrite)
    }

    fn name(&self) -> &str {
        "merge"
    }
}

/// Merge loop `at` with its immediately enclosed loop.
pub fn merge(tree: &LoopTree, at: NodeRef) -> TransformResult<Rewrite> {
    Merge::new().apply(tree, at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{OpKind, TreeBuilder};
    use crate::transform::split;

    #[test]
    fn test_merge_after_split() {
        let tree = TreeBuilder::new()
            .open_loop("i", 8)
            .leaf(OpKind::Add, &["A", "B"], "C")
            .build()
            .expect("Failed to build tree");
        let root = tree.root();

        let split_tree = split(&tree, root, 4).expect("Failed to split").tree;
        let inner = split_tree.children(root)[0];

        let rewrite = merge(&split_tree, root).expect("Failed to merge");
        assert_eq!(rewrite.follow(inner), root);
        let merged = rewrite.tree;
        assert!(!merged.contains(inner));
        assert_eq!(merged.as_loop(root).map(|l| l.trip_count), Some(8));
        assert_eq!(merged.iteration_count(root), tree.iteration_count(root));
        assert_eq!(merged.leaves().len(), 1);
        assert!(merged.validate().is_ok());
    }

    #[test]
    fn test_merge_different_vars_rejected() {
        let tree = TreeBuilder::new()
            .open_loop("i", 8)
            .open_loop("j", 8)
            .leaf(OpKind::Add, &["A", "B"], "C")
            .build()
            .expect("Failed to build tree");
        let err = merge(&tree, tree.root()).unwrap_err();
        assert_eq!(err.kind, TransformErrorKind::NoMergeableNeighbor);
    }

    #[test]
    fn test_merge_innermost_rejected() {
        let tree = TreeBuilder::new()
            .open_loop("i", 8)
            .leaf(OpKind::Add, &["A", "B"], "C")
            .build()
            .expect("Failed to build tree");
        assert!(!Merge::new().is_legal(&tree, tree.root()));
    }

    #[test]
    fn test_merge_imperfect_nest_rejected() {
        let tree = TreeBuilder::new()
            .open_loop("i", 4)
            .open_loop("i", 2)
            .leaf(OpKind::Add, &["A", "B"], "C")
            .close()
            .leaf(OpKind::Copy, &["C"], "D")
            .build()
            .expect("Failed to build tree");
        assert!(merge(&tree, tree.root()).is_err());
    }
}
