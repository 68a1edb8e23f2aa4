//! Agent state checkpoints.
//!
//! Format: the cursor in decimal, a line break, then the tree encoding from
//! [`crate::ir::serial`] verbatim.

use crate::ir::{serial, LoopTree, NodeRef};
use crate::utils::errors::{AgentError, AgentResult};
use log::debug;

/// Encode a `(tree, cursor)` pair.
pub fn encode(tree: &LoopTree, cursor: NodeRef) -> AgentResult<String> {
    let body = serial::encode(tree).map_err(|e| AgentError::Encoding(format!("{:#}", e)))?;
    Ok(format!("{}\n{}", cursor, body))
}

/// Decode a `(tree, cursor)` pair, rejecting anything that would not make a
/// valid agent state.
pub fn decode(text: &str) -> AgentResult<(LoopTree, NodeRef)> {
    let (head, body) = text
        .split_once('\n')
        .ok_or_else(|| AgentError::malformed("missing line break after cursor", text))?;

    if head.is_empty() || !head.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AgentError::malformed("cursor is not an integer: expected decimal digits", head));
    }
    let cursor = head
        .parse::<u32>()
        .map(NodeRef)
        .map_err(|e| AgentError::malformed(format!("cursor is not an integer: {}", e), head))?;

    let tree = serial::decode(body).map_err(|e| AgentError::malformed(format!("{:#}", e), body))?;

    if !tree.contains(cursor) {
        return Err(AgentError::malformed(
            format!("cursor {} does not resolve to a live node", cursor),
            head,
        ));
    }

    debug!("decoded state: {} nodes, cursor at {}", tree.node_count(), cursor);
    Ok((tree, cursor))
}
