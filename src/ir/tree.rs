//! Loop Tree IR.
//!
//! A [`LoopTree`] is a single-rooted ordered tree of Loop nodes and compute
//! Leaf nodes. Nodes live in an arena indexed by [`NodeRef`]; slots are never
//! reused, so a reference retired by a transformation can never resolve to a
//! different node later in the same tree lineage.
//!
//! Trees have value semantics: cloning copies the whole arena and there is no
//! interior mutability, so two handles never observe each other's edits.

use serde::{Serialize, Deserialize};
use std::fmt;

/// Default upper bound on a loop's reuse parameter.
pub const DEFAULT_MAX_REUSE: u32 = 8;

/// A stable identifier for one node of a loop tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeRef(pub u32);

impl NodeRef {
    /// Reference to arena slot `index`.
    pub fn new(index: u32) -> Self { Self(index) }

    fn index(self) -> usize { self.0 as usize }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a tensor in the tree's tensor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TensorId(pub u32);

impl TensorId {
    /// Id of tensor-table entry `index`.
    pub fn new(index: u32) -> Self { Self(index) }
}

/// Information about a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tensor {
    /// Display name
    pub name: String,
}

/// Scheduling hint attached to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Annotation {
    /// No hint
    #[default]
    None,
    /// Execute in SIMD lanes
    Vectorize,
    /// Fully unroll
    Unroll,
}

impl Annotation {
    /// Toggle `tag` against the current annotation: clears it if already set,
    /// otherwise replaces whatever annotation was there.
    pub fn toggled(self, tag: Annotation) -> Annotation {
        if self == tag {
            Annotation::None
        } else {
            tag
        }
    }

    /// Lowercase name; empty for [`Annotation::None`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Annotation::None => "",
            Annotation::Vectorize => "vectorize",
            Annotation::Unroll => "unroll",
        }
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Compute operation performed by a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    /// `out = a + b`
    Add,
    /// `out = a - b`
    Sub,
    /// `out = a * b`
    Mul,
    /// `out = max(a, b)`
    Max,
    /// Fused multiply-accumulate (`out += a * b`)
    MulAdd,
    /// Explicit materialization of an input
    Copy,
}

impl OpKind {
    /// Floating-point operations performed per iteration of the enclosing domain.
    pub fn flops_per_iteration(&self) -> u64 {
        match self {
            OpKind::Add | OpKind::Sub | OpKind::Mul | OpKind::Max => 1,
            OpKind::MulAdd => 2,
            OpKind::Copy => 0,
        }
    }

    /// Name used in the printer and the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Add => "add",
            OpKind::Sub => "sub",
            OpKind::Mul => "mul",
            OpKind::Max => "max",
            OpKind::MulAdd => "muladd",
            OpKind::Copy => "copy",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A loop over one iteration variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loop {
    /// Iteration variable; split pieces of one index share it
    pub var: String,
    /// Number of iterations (at least 1)
    pub trip_count: u64,
    /// Scheduling hint
    pub annotation: Annotation,
    /// Locality/tiling knob in `0..=max_reuse`
    pub reuse: u32,
}

impl Loop {
    /// Unannotated loop with reuse 0.
    pub fn new(var: impl Into<String>, trip_count: u64) -> Self {
        Self {
            var: var.into(),
            trip_count,
            annotation: Annotation::None,
            reuse: 0,
        }
    }
}

/// A compute operation bound to the enclosing loop scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaf {
    /// Operation performed per iteration
    pub op: OpKind,
    /// Ordered input tensors
    pub inputs: Vec<TensorId>,
    /// Tensor written
    pub output: TensorId,
    /// Scheduling hint
    pub annotation: Annotation,
}

/// Node payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Inner node
    Loop(Loop),
    /// Compute operation; never has children
    Leaf(Leaf),
}

/// A node with its structural links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// `None` only for the root
    pub parent: Option<NodeRef>,
    /// Ordered children
    pub children: Vec<NodeRef>,
    /// Payload
    pub kind: NodeKind,
}

impl Node {
    /// Whether this is a loop node.
    pub fn is_loop(&self) -> bool {
        matches!(self.kind, NodeKind::Loop(_))
    }

    /// Loop payload, if any.
    pub fn as_loop(&self) -> Option<&Loop> {
        match &self.kind {
            NodeKind::Loop(l) => Some(l),
            NodeKind::Leaf(_) => None,
        }
    }

    /// Leaf payload, if any.
    pub fn as_leaf(&self) -> Option<&Leaf> {
        match &self.kind {
            NodeKind::Leaf(l) => Some(l),
            NodeKind::Loop(_) => None,
        }
    }

    /// Annotation of either payload.
    pub fn annotation(&self) -> Annotation {
        match &self.kind {
            NodeKind::Loop(l) => l.annotation,
            NodeKind::Leaf(l) => l.annotation,
        }
    }

    pub(crate) fn set_annotation(&mut self, annotation: Annotation) {
        match &mut self.kind {
            NodeKind::Loop(l) => l.annotation = annotation,
            NodeKind::Leaf(l) => l.annotation = annotation,
        }
    }
}

/// The nested-loop IR of one tensor computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopTree {
    /// Arena; retired slots stay `None` forever
    nodes: Vec<Option<Node>>,
    root: NodeRef,
    tensors: Vec<Tensor>,
    max_reuse: u32,
}

impl LoopTree {
    /// Assemble a tree from raw parts, checking structural well-formedness.
    pub(crate) fn from_parts(
        nodes: Vec<Option<Node>>,
        root: NodeRef,
        tensors: Vec<Tensor>,
        max_reuse: u32,
    ) -> Result<Self, String> {
        let tree = Self { nodes, root, tensors, max_reuse };
        tree.validate()?;
        Ok(tree)
    }

    /// The root node.
    pub fn root(&self) -> NodeRef {
        self.root
    }

    /// Upper bound on any loop's reuse parameter.
    pub fn max_reuse(&self) -> u32 {
        self.max_reuse
    }

    /// Resolve a reference to a live node.
    pub fn get(&self, r: NodeRef) -> Option<&Node> {
        self.nodes.get(r.index()).and_then(|slot| slot.as_ref())
    }

    /// Whether `r` resolves to a live node.
    pub fn contains(&self, r: NodeRef) -> bool {
        self.get(r).is_some()
    }

    /// Parent of `r`; `None` for the root or a dead reference.
    pub fn parent(&self, r: NodeRef) -> Option<NodeRef> {
        self.get(r).and_then(|n| n.parent)
    }

    /// Children of `r`, empty for leaves and dead references.
    pub fn children(&self, r: NodeRef) -> &[NodeRef] {
        self.get(r).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Whether `r` is a live loop.
    pub fn is_loop(&self, r: NodeRef) -> bool {
        self.get(r).map_or(false, Node::is_loop)
    }

    /// Loop payload of `r`.
    pub fn as_loop(&self, r: NodeRef) -> Option<&Loop> {
        self.get(r).and_then(Node::as_loop)
    }

    /// Leaf payload of `r`.
    pub fn as_leaf(&self, r: NodeRef) -> Option<&Leaf> {
        self.get(r).and_then(Node::as_leaf)
    }

    /// Current annotation of a node.
    pub fn annotation(&self, r: NodeRef) -> Option<Annotation> {
        self.get(r).map(Node::annotation)
    }

    /// The compute leaf a node stands for: itself if it is a leaf, otherwise
    /// the first leaf under it in canonical order.
    pub fn first_leaf(&self, r: NodeRef) -> Option<NodeRef> {
        let mut stack = vec![r];
        while let Some(cur) = stack.pop() {
            let node = self.get(cur)?;
            if !node.is_loop() {
                return Some(cur);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        None
    }

    /// Inputs of the compute leaf at (or first under) `r`.
    pub fn inputs(&self, r: NodeRef) -> Option<&[TensorId]> {
        let leaf = self.first_leaf(r)?;
        self.as_leaf(leaf).map(|l| l.inputs.as_slice())
    }

    /// Look up a tensor-table entry.
    pub fn tensor(&self, id: TensorId) -> Option<&Tensor> {
        self.tensors.get(id.0 as usize)
    }

    /// Name of a tensor, or a placeholder for unknown ids.
    pub fn tensor_name(&self, id: TensorId) -> String {
        self.tensor(id)
            .map(|t| t.name.clone())
            .unwrap_or_else(|| format!("%{}", id.0))
    }

    /// The tensor table.
    pub fn tensors(&self) -> &[Tensor] {
        &self.tensors
    }

    /// All live nodes in canonical order: a node before its children,
    /// children in order.
    pub fn preorder(&self) -> Vec<NodeRef> {
        let mut order = Vec::with_capacity(self.node_count());
        let mut stack = vec![self.root];
        while let Some(r) = stack.pop() {
            order.push(r);
            stack.extend(self.children(r).iter().rev().copied());
        }
        order
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    /// Live leaf references in canonical order.
    pub fn leaves(&self) -> Vec<NodeRef> {
        self.preorder()
            .into_iter()
            .filter(|&r| !self.is_loop(r))
            .collect()
    }

    /// Number of loops enclosing a node (the root has depth 0).
    pub fn depth(&self, r: NodeRef) -> usize {
        let mut depth = 0;
        let mut cur = self.parent(r);
        while let Some(p) = cur {
            depth += 1;
            cur = self.parent(p);
        }
        depth
    }

    /// Loops enclosing `r`, innermost first.
    pub fn enclosing_loops(&self, r: NodeRef) -> Vec<NodeRef> {
        let mut loops = Vec::new();
        let mut cur = self.parent(r);
        while let Some(p) = cur {
            if self.is_loop(p) {
                loops.push(p);
            }
            cur = self.parent(p);
        }
        loops
    }

    /// Product of trip counts of every loop enclosing `r`, saturating.
    pub fn enclosing_trip_product(&self, r: NodeRef) -> u64 {
        self.enclosing_loops(r)
            .iter()
            .filter_map(|&l| self.as_loop(l))
            .fold(1u64, |acc, l| acc.saturating_mul(l.trip_count))
    }

    /// Total iteration count over the nest rooted at `r`: for every leaf in
    /// the subtree, the product of trip counts of the loops between `r`
    /// (inclusive) and the leaf, summed over leaves.
    pub fn iteration_count(&self, r: NodeRef) -> u64 {
        let mut total = 0u64;
        // (node, product of the trip counts above it within the nest)
        let mut stack = vec![(r, 1u64)];
        while let Some((cur, above)) = stack.pop() {
            let node = match self.get(cur) {
                Some(n) => n,
                None => continue,
            };
            match &node.kind {
                NodeKind::Leaf(_) => total = total.saturating_add(above),
                NodeKind::Loop(l) => {
                    let inner = above.saturating_mul(l.trip_count);
                    stack.extend(node.children.iter().map(|&c| (c, inner)));
                }
            }
        }
        total
    }

    /// Check structural well-formedness.
    pub fn validate(&self) -> Result<(), String> {
        let root = self.get(self.root)
            .ok_or_else(|| format!("root {} is not a live node", self.root))?;
        if root.parent.is_some() {
            return Err(format!("root {} has a parent", self.root));
        }

        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![self.root];
        while let Some(r) = stack.pop() {
            if seen[r.index()] {
                return Err(format!("node {} is reachable twice", r));
            }
            seen[r.index()] = true;

            let node = self.get(r).ok_or_else(|| format!("node {} is not live", r))?;
            match &node.kind {
                NodeKind::Loop(l) => {
                    if l.trip_count == 0 {
                        return Err(format!("loop {} has trip count 0", r));
                    }
                    if l.reuse > self.max_reuse {
                        return Err(format!(
                            "loop {} has reuse {} above bound {}",
                            r, l.reuse, self.max_reuse
                        ));
                    }
                }
                NodeKind::Leaf(leaf) => {
                    if !node.children.is_empty() {
                        return Err(format!("leaf {} has children", r));
                    }
                    for t in leaf.inputs.iter().chain(std::iter::once(&leaf.output)) {
                        if self.tensor(*t).is_none() {
                            return Err(format!("leaf {} references unknown tensor {}", r, t.0));
                        }
                    }
                }
            }

            for &c in &node.children {
                let child = self.get(c)
                    .ok_or_else(|| format!("node {} has dangling child {}", r, c))?;
                if child.parent != Some(r) {
                    return Err(format!("node {} does not point back to parent {}", c, r));
                }
                stack.push(c);
            }
        }

        let live = self.node_count();
        let reached = seen.iter().filter(|&&s| s).count();
        if reached != live {
            return Err(format!(
                "tree is not connected: {} of {} live nodes reachable from root",
                reached, live
            ));
        }
        Ok(())
    }

    // Arena editing, used by transformation primitives on their private copy.

    pub(crate) fn node_mut(&mut self, r: NodeRef) -> Option<&mut Node> {
        self.nodes.get_mut(r.index()).and_then(|slot| slot.as_mut())
    }

    pub(crate) fn loop_mut(&mut self, r: NodeRef) -> Option<&mut Loop> {
        match self.node_mut(r).map(|n| &mut n.kind) {
            Some(NodeKind::Loop(l)) => Some(l),
            _ => None,
        }
    }

    pub(crate) fn leaf_mut(&mut self, r: NodeRef) -> Option<&mut Leaf> {
        match self.node_mut(r).map(|n| &mut n.kind) {
            Some(NodeKind::Leaf(l)) => Some(l),
            _ => None,
        }
    }

    pub(crate) fn alloc(&mut self, node: Node) -> NodeRef {
        let r = NodeRef(self.nodes.len() as u32);
        self.nodes.push(Some(node));
        r
    }

    pub(crate) fn retire(&mut self, r: NodeRef) -> Option<Node> {
        self.nodes.get_mut(r.index()).and_then(Option::take)
    }

    pub(crate) fn set_root(&mut self, r: NodeRef) {
        self.root = r;
    }

    pub(crate) fn add_tensor(&mut self, name: impl Into<String>) -> TensorId {
        let id = TensorId(self.tensors.len() as u32);
        self.tensors.push(Tensor { name: name.into() });
        id
    }

    /// Point every child of `r` back at `r`.
    pub(crate) fn reparent_children(&mut self, r: NodeRef) {
        let children = self.children(r).to_vec();
        for c in children {
            if let Some(child) = self.node_mut(c) {
                child.parent = Some(r);
            }
        }
    }
}

impl fmt::Display for LoopTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::ir::printer::print_tree(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::TreeBuilder;

    fn matmul(m: u64, n: u64, k: u64) -> LoopTree {
        TreeBuilder::new()
            .open_loop("m", m)
            .open_loop("n", n)
            .open_loop("k", k)
            .leaf(OpKind::MulAdd, &["A", "B"], "C")
            .build()
            .expect("Failed to build matmul")
    }

    #[test]
    fn test_preorder_loops_before_leaves() {
        let tree = matmul(4, 8, 16);
        let order = tree.preorder();
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], tree.root());
        assert!(tree.is_loop(order[0]));
        assert!(tree.is_loop(order[2]));
        assert!(!tree.is_loop(order[3]));
    }

    #[test]
    fn test_iteration_count() {
        let tree = matmul(4, 8, 16);
        assert_eq!(tree.iteration_count(tree.root()), 4 * 8 * 16);
        let leaf = tree.leaves()[0];
        assert_eq!(tree.enclosing_trip_product(leaf), 4 * 8 * 16);
        assert_eq!(tree.depth(leaf), 3);
    }

    #[test]
    fn test_inputs_of_loop_resolve_to_first_leaf() {
        let tree = matmul(2, 2, 2);
        let inputs = tree.inputs(tree.root()).expect("root has a leaf");
        assert_eq!(inputs.len(), 2);
        assert_eq!(tree.tensor_name(inputs[0]), "A");
        assert_eq!(tree.tensor_name(inputs[1]), "B");
    }

    #[test]
    fn test_annotation_toggle() {
        assert_eq!(Annotation::None.toggled(Annotation::Vectorize), Annotation::Vectorize);
        assert_eq!(Annotation::Vectorize.toggled(Annotation::Vectorize), Annotation::None);
        assert_eq!(Annotation::Unroll.toggled(Annotation::Vectorize), Annotation::Vectorize);
    }

    #[test]
    fn test_validate_rejects_broken_links() {
        let mut tree = matmul(2, 2, 2);
        let leaf = tree.leaves()[0];
        tree.node_mut(leaf).expect("leaf is live").parent = None;
        assert!(tree.validate().is_err());
    }

    #[test]
    fn test_deep_chain_walks_without_recursion() {
        let depth = 100_000;
        let mut builder = TreeBuilder::new();
        for _ in 0..depth {
            builder = builder.open_loop("i", 1);
        }
        let tree = builder
            .leaf(OpKind::Add, &["A", "B"], "C")
            .build()
            .expect("Failed to build deep chain");

        let leaf = tree.first_leaf(tree.root()).expect("chain ends in a leaf");
        assert!(!tree.is_loop(leaf));
        assert_eq!(tree.iteration_count(tree.root()), 1);
        assert_eq!(tree.inputs(tree.root()).map(|i| i.len()), Some(2));
    }

    #[test]
    fn test_iteration_count_sums_branches() {
        let tree = TreeBuilder::new()
            .open_loop("i", 4)
            .open_loop("j", 3)
            .leaf(OpKind::Add, &["A", "B"], "C")
            .close()
            .leaf(OpKind::Copy, &["C"], "D")
            .open_loop("k", 5)
            .build()
            .expect("Failed to build tree");
        // 4*3 for the nested leaf, 4 for the sibling leaf, 0 for the empty loop
        assert_eq!(tree.iteration_count(tree.root()), 16);
    }

    #[test]
    fn test_retired_slot_never_resolves() {
        let mut tree = matmul(2, 2, 2);
        let leaf = tree.leaves()[0];
        tree.retire(leaf);
        assert!(!tree.contains(leaf));
        let fresh = tree.alloc(Node {
            parent: None,
            children: vec![],
            kind: NodeKind::Loop(Loop::new("x", 1)),
        });
        assert_ne!(fresh, leaf);
    }
}
