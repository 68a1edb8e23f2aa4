//! Metric evaluation.
//!
//! `FLOPs` is a static count over the tree. `seconds` goes through a
//! [`Backend`], and `FLOPS` divides the two.

pub mod backend;
pub mod config;

pub use backend::{Backend, BenchmarkResult, CostModel, Executor, FixedBackend, MeasuredBackend};
pub use config::{BenchmarkConfig, CostModelConfig};

use crate::ir::LoopTree;
use crate::utils::errors::{AgentError, AgentResult, BackendError};
use serde::{Serialize, Deserialize};
use std::fmt;

/// The metrics an agent can evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    /// Static floating-point operation count
    #[serde(rename = "FLOPs")]
    Flops,
    /// Throughput, `FLOPs / seconds`
    #[serde(rename = "FLOPS")]
    FlopsPerSecond,
    /// Runtime reported by the backend
    #[serde(rename = "seconds")]
    Seconds,
}

impl Metric {
    /// Every metric, in catalog order.
    pub const ALL: [Metric; 3] = [Metric::Flops, Metric::FlopsPerSecond, Metric::Seconds];

    /// Catalog name.
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Flops => "FLOPs",
            Metric::FlopsPerSecond => "FLOPS",
            Metric::Seconds => "seconds",
        }
    }

    /// Look up a metric by its catalog name.
    pub fn from_name(name: &str) -> Option<Metric> {
        Metric::ALL.iter().copied().find(|m| m.name() == name)
    }

    /// One-line description for help listings.
    pub fn description(&self) -> &'static str {
        match self {
            Metric::Flops => "floating-point operations performed",
            Metric::FlopsPerSecond => "floating-point operations per second",
            Metric::Seconds => "runtime reported by the backend",
        }
    }

    /// Whether search should maximize this metric.
    pub fn higher_is_better(&self) -> bool {
        match self {
            Metric::Flops | Metric::Seconds => false,
            Metric::FlopsPerSecond => true,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Floating-point operations performed by the whole tree.
pub fn flops(tree: &LoopTree) -> u64 {
    tree.leaves()
        .into_iter()
        .filter_map(|r| {
            let leaf = tree.as_leaf(r)?;
            Some(leaf.op.flops_per_iteration().saturating_mul(tree.enclosing_trip_product(r)))
        })
        .fold(0u64, u64::saturating_add)
}

/// Runtime of the tree according to `backend`.
pub fn seconds(tree: &LoopTree, backend: &dyn Backend) -> Result<f64, BackendError> {
    backend.seconds(tree)
}

/// Throughput of the tree; undefined when the runtime is zero.
pub fn flops_per_second(tree: &LoopTree, backend: &dyn Backend) -> AgentResult<f64> {
    let time = seconds(tree, backend)?;
    if time == 0.0 {
        return Err(AgentError::DivisionUndefined);
    }
    Ok(flops(tree) as f64 / time)
}

/// Evaluate one metric.
pub fn evaluate(metric: Metric, tree: &LoopTree, backend: &dyn Backend) -> AgentResult<f64> {
    match metric {
        Metric::Flops => Ok(flops(tree) as f64),
        Metric::FlopsPerSecond => flops_per_second(tree, backend),
        Metric::Seconds => Ok(seconds(tree, backend)?),
    }
}
