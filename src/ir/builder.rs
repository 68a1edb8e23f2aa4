//! Construction of initial loop trees.
//!
//! The external graph frontend (and the tests) describe a loop nest with a
//! small stack-based builder:
//!
//! ```rust
//! use looptree::ir::{TreeBuilder, OpKind};
//!
//! let tree = TreeBuilder::new()
//!     .open_loop("i", 128)
//!     .open_loop("j", 64)
//!     .leaf(OpKind::Add, &["A", "B"], "C")
//!     .build()
//!     .unwrap();
//! assert_eq!(tree.node_count(), 3);
//! ```

use crate::ir::tree::{
    Leaf, Loop, LoopTree, Node, NodeKind, NodeRef, OpKind, Tensor, TensorId, DEFAULT_MAX_REUSE,
};
use anyhow::{bail, Result};
use std::collections::HashMap;

/// Stack-based loop tree builder.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    nodes: Vec<Option<Node>>,
    tensors: Vec<Tensor>,
    tensor_ids: HashMap<String, TensorId>,
    /// Currently open loops, innermost last
    open: Vec<NodeRef>,
    root: Option<NodeRef>,
    max_reuse: Option<u32>,
    /// First construction error, reported by `build`
    error: Option<String>,
}

impl TreeBuilder {
    /// Empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the upper bound of every loop's reuse parameter.
    pub fn with_max_reuse(mut self, max_reuse: u32) -> Self {
        self.max_reuse = Some(max_reuse);
        self
    }

    /// Open a loop nested in the innermost open loop.
    pub fn open_loop(mut self, var: &str, trip_count: u64) -> Self {
        if trip_count == 0 {
            self.fail(format!("loop `{}` has trip count 0", var));
        }
        let r = self.push(NodeKind::Loop(Loop::new(var, trip_count)));
        self.open.push(r);
        self
    }

    /// Close the innermost open loop.
    pub fn close(mut self) -> Self {
        if self.open.pop().is_none() {
            self.fail("close() without an open loop".to_string());
        }
        self
    }

    /// Add a compute leaf to the innermost open loop. Tensors are identified
    /// by name; the first use of a name allocates it.
    pub fn leaf(mut self, op: OpKind, inputs: &[&str], output: &str) -> Self {
        let inputs = inputs.iter().map(|name| self.tensor(name)).collect();
        let output = self.tensor(output);
        self.push(NodeKind::Leaf(Leaf {
            op,
            inputs,
            output,
            annotation: Default::default(),
        }));
        self
    }

    /// Finish the tree. Loops still open are closed implicitly.
    pub fn build(self) -> Result<LoopTree> {
        if let Some(err) = self.error {
            bail!("invalid loop tree: {}", err);
        }
        let root = match self.root {
            Some(r) => r,
            None => bail!("invalid loop tree: no nodes"),
        };
        let max_reuse = self.max_reuse.unwrap_or(DEFAULT_MAX_REUSE);
        LoopTree::from_parts(self.nodes, root, self.tensors, max_reuse)
            .map_err(|e| anyhow::anyhow!("invalid loop tree: {}", e))
    }

    fn tensor(&mut self, name: &str) -> TensorId {
        if let Some(&id) = self.tensor_ids.get(name) {
            return id;
        }
        let id = TensorId::new(self.tensors.len() as u32);
        self.tensors.push(Tensor { name: name.to_string() });
        self.tensor_ids.insert(name.to_string(), id);
        id
    }

    fn push(&mut self, kind: NodeKind) -> NodeRef {
        let r = NodeRef::new(self.nodes.len() as u32);
        let parent = self.open.last().copied();
        match parent {
            Some(p) => {
                if let Some(Some(node)) = self.nodes.get_mut(p.0 as usize) {
                    node.children.push(r);
                }
            }
            None if self.root.is_none() => self.root = Some(r),
            None => self.fail("a loop tree has exactly one root".to_string()),
        }
        self.nodes.push(Some(Node {
            parent,
            children: Vec::new(),
            kind,
        }));
        r
    }

    fn fail(&mut self, message: String) {
        if self.error.is_none() {
            self.error = Some(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_nested() {
        let tree = TreeBuilder::new()
            .open_loop("i", 8)
            .open_loop("j", 4)
            .leaf(OpKind::Mul, &["A", "B"], "C")
            .close()
            .leaf(OpKind::Add, &["C", "D"], "E")
            .build()
            .expect("Failed to build tree");

        assert_eq!(tree.node_count(), 4);
        assert_eq!(tree.children(tree.root()).len(), 2);
        assert_eq!(tree.tensors().len(), 5);
        assert_eq!(tree.max_reuse(), DEFAULT_MAX_REUSE);
    }

    #[test]
    fn test_shared_tensor_names() {
        let tree = TreeBuilder::new()
            .open_loop("i", 8)
            .leaf(OpKind::Add, &["A", "A"], "B")
            .build()
            .expect("Failed to build tree");
        let inputs = tree.inputs(tree.root()).expect("leaf exists");
        assert_eq!(inputs[0], inputs[1]);
    }

    #[test]
    fn test_second_root_rejected() {
        let result = TreeBuilder::new()
            .open_loop("i", 8)
            .close()
            .open_loop("j", 8)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_trip_rejected() {
        assert!(TreeBuilder::new().open_loop("i", 0).build().is_err());
    }

    #[test]
    fn test_empty_rejected() {
        assert!(TreeBuilder::new().build().is_err());
    }
}
