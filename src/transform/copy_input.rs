//! Input materialization.
//!
//! `copy_input` stages one input of a compute leaf through an explicit copy
//! placed immediately before the leaf, in the same enclosing loop:
//!
//! ```text
//! for i in N:              for i in N:
//!   C = add(A, B)   =>       A_copy = copy(A)
//!                            C = add(A_copy, B)
//! ```
//!
//! When applied at a loop, the target is the first compute leaf under it in
//! canonical order. Every existing reference survives; the copy is a new
//! node writing a new tensor.

use crate::ir::{Annotation, Leaf, LoopTree, Node, NodeKind, NodeRef, OpKind};
use crate::transform::{resolve, vanished, Rewrite, Transform};
use crate::utils::errors::{TransformError, TransformErrorKind, TransformResult};

/// Materialize input `index` of the target leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyInput {
    /// Position in the leaf's input list
    pub index: usize,
}

impl CopyInput {
    /// Materialize input `index`.
    pub fn new(index: usize) -> Self {
        Self { index }
    }

    /// Resolve (target leaf, its enclosing loop, position among siblings).
    fn target(&self, tree: &LoopTree, at: NodeRef) -> TransformResult<(NodeRef, NodeRef, usize)> {
        resolve(tree, at, self.name())?;

        let leaf_ref = tree.first_leaf(at).ok_or_else(|| {
            TransformError::new(
                TransformErrorKind::NoComputeLeaf,
                self.name(),
                format!("no compute leaf at or under node {}", at),
            )
        })?;
        let n_inputs = tree.as_leaf(leaf_ref).map_or(0, |l| l.inputs.len());
        if self.index >= n_inputs {
            return Err(TransformError::new(
                TransformErrorKind::InputOutOfRange,
                self.name(),
                format!(
                    "input {} out of range: leaf {} has {} inputs",
                    self.index, leaf_ref, n_inputs
                ),
            ));
        }

        let scope = tree.parent(leaf_ref).ok_or_else(|| {
            TransformError::new(
                TransformErrorKind::NoEnclosingScope,
                self.name(),
                format!("leaf {} has no enclosing loop", leaf_ref),
            )
        })?;
        let position = tree.children(scope)
            .iter()
            .position(|&c| c == leaf_ref)
            .ok_or_else(|| vanished(leaf_ref, self.name()))?;

        Ok((leaf_ref, scope, position))
    }
}

impl Transform for CopyInput {
    fn check(&self, tree: &LoopTree, at: NodeRef) -> TransformResult<()> {
        self.target(tree, at).map(|_| ())
    }

    fn apply(&self, tree: &LoopTree, at: NodeRef) -> TransformResult<Rewrite> {
        let (leaf_ref, scope, position) = self.target(tree, at)?;

        let mut new_tree = tree.clone();
        let source = new_tree.as_leaf(leaf_ref)
            .map(|l| l.inputs[self.index])
            .ok_or_else(|| vanished(leaf_ref, self.name()))?;
        let staged = new_tree.add_tensor(format!("{}_copy", tree.tensor_name(source)));

        let copy = new_tree.alloc(Node {
            parent: Some(scope),
            children: Vec::new(),
            kind: NodeKind::Leaf(Leaf {
                op: OpKind::Copy,
                inputs: vec![source],
                output: staged,
                annotation: Annotation::None,
            }),
        });
        new_tree.node_mut(scope)
            .ok_or_else(|| vanished(scope, self.name()))?
            .children
            .insert(position, copy);
        new_tree.leaf_mut(leaf_ref)
            .ok_or_else(|| vanished(leaf_ref, self.name()))?
            .inputs[self.index] = staged;

        Ok(Rewrite::new(new_tree))
    }

    fn name(&self) -> &str {
        "copy_input"
    }
}

/// Materialize input `index` of the compute leaf at (or first under) `at`.
pub fn copy_input(tree: &LoopTree, at: NodeRef, index: usize) -> TransformResult<Rewrite> {
    CopyInput::new(index).apply(tree, at)
}
