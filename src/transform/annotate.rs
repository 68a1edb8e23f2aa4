//! Scheduling annotations (vectorize, unroll).
//!
//! Annotations are toggled: applying a tag a node already carries clears it,
//! otherwise the tag replaces whatever annotation was there. They carry no
//! legality condition beyond the node existing, and every reference survives.

use crate::ir::{Annotation, LoopTree, NodeRef};
use crate::transform::{resolve, vanished, Rewrite, Transform};
use crate::utils::errors::TransformResult;

/// Annotation toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Annotate {
    /// Tag to toggle
    pub tag: Annotation,
}

impl Annotate {
    /// Toggle `tag`.
    pub fn new(tag: Annotation) -> Self {
        Self { tag }
    }
}

impl Transform for Annotate {
    fn check(&self, tree: &LoopTree, at: NodeRef) -> TransformResult<()> {
        resolve(tree, at, self.name()).map(|_| ())
    }

    fn apply(&self, tree: &LoopTree, at: NodeRef) -> TransformResult<Rewrite> {
        let current = resolve(tree, at, self.name())?.annotation();

        let mut new_tree = tree.clone();
        new_tree.node_mut(at)
            .ok_or_else(|| vanished(at, self.name()))?
            .set_annotation(current.toggled(self.tag));

        Ok(Rewrite::new(new_tree))
    }

    fn name(&self) -> &str {
        "annotate"
    }
}

/// Toggle `tag` on node `at`.
pub fn annotate(tree: &LoopTree, at: NodeRef, tag: Annotation) -> TransformResult<Rewrite> {
    Annotate::new(tag).apply(tree, at)
}
