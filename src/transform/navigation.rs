//! Cursor navigation along the canonical linearization.
//!
//! The canonical order is pre-order: a node comes before its children and
//! children keep their order, so loops precede the leaves they enclose.
//! Moving past either end fails instead of clamping.

use crate::ir::{LoopTree, NodeRef};
use crate::transform::resolve;
use crate::utils::errors::{TransformError, TransformErrorKind, TransformResult};

/// The first node in canonical order.
pub fn first_ref(tree: &LoopTree) -> NodeRef {
    tree.root()
}

/// The last node in canonical order.
pub fn last_ref(tree: &LoopTree) -> NodeRef {
    last_descendant(tree, tree.root())
}

/// The node after `at` in canonical order.
pub fn next_ref(tree: &LoopTree, at: NodeRef) -> TransformResult<NodeRef> {
    let node = resolve(tree, at, "next_ref")?;
    if let Some(&first) = node.children.first() {
        return Ok(first);
    }

    // Climb until some ancestor has a following sibling.
    let mut cur = at;
    while let Some(parent) = tree.parent(cur) {
        if let Some(sibling) = sibling_after(tree, parent, cur) {
            return Ok(sibling);
        }
        cur = parent;
    }
    Err(boundary("next_ref", at, "last"))
}

/// The node before `at` in canonical order.
pub fn previous_ref(tree: &LoopTree, at: NodeRef) -> TransformResult<NodeRef> {
    resolve(tree, at, "previous_ref")?;
    let parent = match tree.parent(at) {
        Some(p) => p,
        None => return Err(boundary("previous_ref", at, "first")),
    };

    let siblings = tree.children(parent);
    match siblings.iter().position(|&c| c == at) {
        Some(0) | None => Ok(parent),
        Some(pos) => Ok(last_descendant(tree, siblings[pos - 1])),
    }
}

fn sibling_after(tree: &LoopTree, parent: NodeRef, child: NodeRef) -> Option<NodeRef> {
    let siblings = tree.children(parent);
    let pos = siblings.iter().position(|&c| c == child)?;
    siblings.get(pos + 1).copied()
}

fn last_descendant(tree: &LoopTree, at: NodeRef) -> NodeRef {
    let mut cur = at;
    while let Some(&last) = tree.children(cur).last() {
        cur = last;
    }
    cur
}

fn boundary(transform: &str, at: NodeRef, which: &str) -> TransformError {
    TransformError::new(
        TransformErrorKind::Boundary,
        transform,
        format!("node {} is the {} node", at, which),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{OpKind, TreeBuilder};

    fn branching() -> LoopTree {
        TreeBuilder::new()
            .open_loop("i", 4)
            .open_loop("j", 4)
            .leaf(OpKind::Mul, &["A", "B"], "C")
            .close()
            .open_loop("k", 2)
            .leaf(OpKind::Add, &["C", "D"], "E")
            .close()
            .leaf(OpKind::Copy, &["E"], "F")
            .build()
            .expect("Failed to build tree")
    }

    #[test]
    fn test_next_walks_preorder() {
        let tree = branching();
        let order = tree.preorder();
        let mut cur = first_ref(&tree);
        let mut walked = vec![cur];
        while let Ok(next) = next_ref(&tree, cur) {
            walked.push(next);
            cur = next;
        }
        assert_eq!(walked, order);
        assert_eq!(cur, last_ref(&tree));
    }

    #[test]
    fn test_previous_walks_reverse_preorder() {
        let tree = branching();
        let mut order = tree.preorder();
        order.reverse();
        let mut cur = last_ref(&tree);
        let mut walked = vec![cur];
        while let Ok(prev) = previous_ref(&tree, cur) {
            walked.push(prev);
            cur = prev;
        }
        assert_eq!(walked, order);
    }

    #[test]
    fn test_boundaries_fail() {
        let tree = branching();
        let err = previous_ref(&tree, first_ref(&tree)).unwrap_err();
        assert_eq!(err.kind, TransformErrorKind::Boundary);
        let err = next_ref(&tree, last_ref(&tree)).unwrap_err();
        assert_eq!(err.kind, TransformErrorKind::Boundary);
    }

    #[test]
    fn test_unknown_ref() {
        let tree = branching();
        let err = next_ref(&tree, NodeRef(1000)).unwrap_err();
        assert_eq!(err.kind, TransformErrorKind::UnknownRef);
    }
}
