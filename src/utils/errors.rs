//! Error types for the loop-tree agent.
//!
//! Errors are organized by the layer that produces them: transformation
//! primitives report [`TransformError`], metric backends report
//! [`BackendError`], and the agent wraps both in [`AgentError`].

use thiserror::Error;
use std::fmt;

/// Top-level error type returned by the agent.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    /// Action name not present in the catalog
    #[error("Unknown action `{name}`\n{help}")]
    UnknownAction {
        /// The requested name
        name: String,
        /// Listing of the catalog
        help: String,
    },

    /// Metric name not present in the catalog
    #[error("Unknown metric `{name}`\n{help}")]
    UnknownMetric {
        /// The requested name
        name: String,
        /// Listing of the catalog
        help: String,
    },

    /// A transformation or navigation primitive refused to apply
    #[error("Illegal transform: {0}")]
    IllegalTransform(#[from] TransformError),

    /// Serialized state could not be reconstructed
    #[error("Malformed state: {reason} (input: {input:?})")]
    MalformedState {
        /// What was wrong
        reason: String,
        /// The offending piece of input, truncated
        input: String,
    },

    /// Throughput requested for a zero measured time
    #[error("Division undefined: measured time is zero")]
    DivisionUndefined,

    /// The runtime backend failed
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// The tree could not be encoded
    #[error("Encoding failed: {0}")]
    Encoding(String),
}

impl AgentError {
    /// Build a [`AgentError::MalformedState`], truncating the input for display.
    pub fn malformed(reason: impl Into<String>, input: &str) -> Self {
        const MAX_INPUT: usize = 80;
        let input = if input.chars().count() > MAX_INPUT {
            let head: String = input.chars().take(MAX_INPUT).collect();
            format!("{}...", head)
        } else {
            input.to_string()
        };
        AgentError::MalformedState {
            reason: reason.into(),
            input,
        }
    }

    /// Whether this error only signals an illegal move.
    pub fn is_illegal_transform(&self) -> bool {
        matches!(self, AgentError::IllegalTransform(_))
    }
}

/// Error raised by a transformation or navigation primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct TransformError {
    /// The error message
    pub message: String,
    /// The kind of transformation error
    pub kind: TransformErrorKind,
    /// The primitive that failed
    pub transform: String,
}

impl TransformError {
    /// Create a new transform error.
    pub fn new(kind: TransformErrorKind, transform: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            transform: transform.to_string(),
        }
    }
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.message, self.transform)
    }
}

/// Cause of a [`TransformError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformErrorKind {
    /// Reference does not resolve to a live node
    UnknownRef,
    /// Primitive requires a Loop node
    NotALoop,
    /// Split factor is zero or does not divide the trip count
    IndivisibleFactor,
    /// No enclosed loop satisfies the merge rule
    NoMergeableNeighbor,
    /// Neighbor missing or not directly nested
    NoSwappableNeighbor,
    /// Reordering would violate a dependence
    DependenceViolation,
    /// Input index out of range for the leaf
    InputOutOfRange,
    /// No compute leaf at or under the reference
    NoComputeLeaf,
    /// Leaf has no enclosing loop to materialize into
    NoEnclosingScope,
    /// Reuse parameter already at its bound
    ReuseBound,
    /// Navigation past the first or last node
    Boundary,
}

/// Error raised by a runtime backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Lowering or execution failed in the external executor
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Every benchmark run failed
    #[error("No successful runs out of {0}")]
    NoSuccessfulRuns(usize),
}

impl From<anyhow::Error> for BackendError {
    fn from(err: anyhow::Error) -> Self {
        BackendError::ExecutionFailed(format!("{:#}", err))
    }
}

/// Result type using AgentError.
pub type AgentResult<T> = Result<T, AgentError>;

/// Result type using TransformError.
pub type TransformResult<T> = Result<T, TransformError>;
