//! Diagnostic rendering of loop trees.
//!
//! Output is one node per line, indented by nesting depth:
//!
//! ```text
//! for m in 64 [unroll]
//!   for k in 32 reuse=2
//!     C = muladd(A, B)
//! ```

use crate::ir::tree::{Annotation, LoopTree, NodeKind, NodeRef};

/// Pretty printer for loop trees.
pub struct TreePrinter<'t> {
    tree: &'t LoopTree,
    /// Output buffer
    buffer: String,
}

impl<'t> TreePrinter<'t> {
    /// Printer over `tree`.
    pub fn new(tree: &'t LoopTree) -> Self {
        Self {
            tree,
            buffer: String::new(),
        }
    }

    /// Take the output.
    pub fn take_output(self) -> String {
        self.buffer
    }

    /// Print every node; `suffix` may append text to a node's line.
    pub fn print_with<F>(&mut self, suffix: F)
    where
        F: Fn(NodeRef) -> String,
    {
        for r in self.tree.preorder() {
            self.print_node(r, &suffix);
        }
    }

    fn print_node<F>(&mut self, r: NodeRef, suffix: &F)
    where
        F: Fn(NodeRef) -> String,
    {
        let node = match self.tree.get(r) {
            Some(n) => n,
            None => return,
        };

        for _ in 0..self.tree.depth(r) {
            self.buffer.push_str("  ");
        }

        match &node.kind {
            NodeKind::Loop(l) => {
                self.buffer.push_str(&format!("for {} in {}", l.var, l.trip_count));
                self.write_annotation(l.annotation);
                if l.reuse > 0 {
                    self.buffer.push_str(&format!(" reuse={}", l.reuse));
                }
            }
            NodeKind::Leaf(leaf) => {
                let inputs: Vec<String> = leaf.inputs.iter()
                    .map(|&t| self.tree.tensor_name(t))
                    .collect();
                self.buffer.push_str(&format!(
                    "{} = {}({})",
                    self.tree.tensor_name(leaf.output),
                    leaf.op,
                    inputs.join(", ")
                ));
                self.write_annotation(leaf.annotation);
            }
        }

        let extra = suffix(r);
        if !extra.is_empty() {
            self.buffer.push(' ');
            self.buffer.push_str(&extra);
        }
        self.buffer.push('\n');
    }

    fn write_annotation(&mut self, annotation: Annotation) {
        if annotation != Annotation::None {
            self.buffer.push_str(&format!(" [{}]", annotation));
        }
    }
}

/// Render a tree without side annotations.
pub fn print_tree(tree: &LoopTree) -> String {
    print_tree_with(tree, |_| String::new())
}

/// Render a tree, appending `suffix(r)` to each node's line.
pub fn print_tree_with<F>(tree: &LoopTree, suffix: F) -> String
where
    F: Fn(NodeRef) -> String,
{
    let mut printer = TreePrinter::new(tree);
    printer.print_with(suffix);
    printer.take_output()
}
