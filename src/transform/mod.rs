//! Loop tree transformations.
//!
//! Every primitive is a pure function of its tree argument: it either returns
//! a [`Rewrite`] holding a fresh tree, or a [`TransformError`] and leaves
//! nothing behind. Each primitive also has a legality predicate that
//! answers the same question without building a tree.
//!
//! Reference survival is documented per primitive. References that a
//! primitive retires are recorded in the rewrite and map to their nearest
//! surviving ancestor.

pub mod split;
pub mod merge;
pub mod interchange;
pub mod annotate;
pub mod copy_input;
pub mod reuse;
pub mod navigation;

pub use split::{split, Split};
pub use merge::{merge, Merge};
pub use interchange::{swap, Swap};
pub use annotate::{annotate, Annotate};
pub use copy_input::{copy_input, CopyInput};
pub use reuse::{decrease_reuse, increase_reuse, AdjustReuse, ReuseStep};
pub use navigation::{first_ref, last_ref, next_ref, previous_ref};

use crate::ir::{LoopTree, Loop, Node, NodeRef};
use crate::utils::errors::{TransformError, TransformErrorKind, TransformResult};
use std::collections::BTreeMap;

/// Transformation primitive applied at one node.
pub trait Transform {
    /// Check legality without building anything.
    fn check(&self, tree: &LoopTree, at: NodeRef) -> TransformResult<()>;

    /// Apply the transformation, returning the rewritten tree.
    fn apply(&self, tree: &LoopTree, at: NodeRef) -> TransformResult<Rewrite>;

    /// Whether `apply` would succeed.
    fn is_legal(&self, tree: &LoopTree, at: NodeRef) -> bool {
        self.check(tree, at).is_ok()
    }

    /// Get transformation name.
    fn name(&self) -> &str;
}

/// Result of a structural primitive: the new tree plus the retired
/// references and where they now point.
#[derive(Debug, Clone, PartialEq)]
pub struct Rewrite {
    /// The rewritten tree
    pub tree: LoopTree,
    retired: BTreeMap<NodeRef, NodeRef>,
}

impl Rewrite {
    /// A rewrite in which every reference survives.
    pub fn new(tree: LoopTree) -> Self {
        Self {
            tree,
            retired: BTreeMap::new(),
        }
    }

    /// Record that `old` was retired in favor of `replacement`.
    pub fn retire(&mut self, old: NodeRef, replacement: NodeRef) {
        self.retired.insert(old, replacement);
    }

    /// Where a reference from the input tree points in the new tree.
    pub fn follow(&self, r: NodeRef) -> NodeRef {
        let mut cur = r;
        // Chains are at most as long as the retired map.
        for _ in 0..=self.retired.len() {
            match self.retired.get(&cur) {
                Some(&next) => cur = next,
                None => break,
            }
        }
        cur
    }

    /// Retired references and their direct replacements.
    pub fn retired(&self) -> impl Iterator<Item = (NodeRef, NodeRef)> + '_ {
        self.retired.iter().map(|(&old, &new)| (old, new))
    }

    /// Take the rewritten tree.
    pub fn into_tree(self) -> LoopTree {
        self.tree
    }
}

pub(crate) fn resolve<'t>(tree: &'t LoopTree, at: NodeRef, transform: &str) -> TransformResult<&'t Node> {
    tree.get(at).ok_or_else(|| {
        TransformError::new(
            TransformErrorKind::UnknownRef,
            transform,
            format!("reference {} does not resolve to a live node", at),
        )
    })
}

pub(crate) fn resolve_loop<'t>(tree: &'t LoopTree, at: NodeRef, transform: &str) -> TransformResult<&'t Loop> {
    resolve(tree, at, transform)?.as_loop().ok_or_else(|| {
        TransformError::new(
            TransformErrorKind::NotALoop,
            transform,
            format!("node {} is not a loop", at),
        )
    })
}

/// Failure for a primitive that expected to edit a node its check resolved.
pub(crate) fn vanished(at: NodeRef, transform: &str) -> TransformError {
    TransformError::new(
        TransformErrorKind::UnknownRef,
        transform,
        format!("node {} vanished during rewrite", at),
    )
}
