//! Text encoding of loop trees.
//!
//! Trees are encoded as JSON through their serde derives. Decoding checks
//! structural well-formedness, so a decoded tree satisfies the same
//! invariants as one produced by [`TreeBuilder`](crate::ir::TreeBuilder).

use crate::ir::tree::LoopTree;
use anyhow::{Context, Result};

/// Encode a tree as text.
pub fn encode(tree: &LoopTree) -> Result<String> {
    serde_json::to_string(tree).context("Failed to encode loop tree")
}

/// Decode a tree previously produced by [`encode`].
pub fn decode(text: &str) -> Result<LoopTree> {
    let tree: LoopTree = serde_json::from_str(text)
        .context("Failed to parse loop tree encoding")?;
    tree.validate()
        .map_err(|e| anyhow::anyhow!("structurally invalid loop tree: {}", e))?;
    Ok(tree)
}
