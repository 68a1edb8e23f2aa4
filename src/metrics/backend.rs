//! Runtime backends.
//!
//! `seconds` is the one expensive, non-deterministic metric, so it goes
//! through the [`Backend`] trait. Three implementations are provided:
//!
//! - [`CostModel`]: deterministic analytical estimate (the default)
//! - [`FixedBackend`]: a constant, for tests
//! - [`MeasuredBackend`]: wall-clock timing of an external [`Executor`]
//!
//! Calls are blocking with no timeout; a deployment timing real kernels
//! should bound them in its [`Executor`].

use super::config::{BenchmarkConfig, CostModelConfig};
use crate::ir::{Annotation, LoopTree, NodeRef};
use crate::utils::errors::BackendError;
use log::{debug, warn};
use std::time::Instant;

/// Produces the runtime of a loop tree.
pub trait Backend: Send + Sync {
    /// Runtime of the tree in seconds.
    fn seconds(&self, tree: &LoopTree) -> Result<f64, BackendError>;

    /// Get backend name.
    fn name(&self) -> &str;
}

/// Lowers and runs a tree once. Implemented by the code generator.
pub trait Executor: Send + Sync {
    /// Run the lowered tree to completion once.
    fn execute(&self, tree: &LoopTree) -> anyhow::Result<()>;
}

impl<F> Executor for F
where
    F: Fn(&LoopTree) -> anyhow::Result<()> + Send + Sync,
{
    fn execute(&self, tree: &LoopTree) -> anyhow::Result<()> {
        self(tree)
    }
}

/// Backend that always reports the same runtime.
#[derive(Clone, Debug, PartialEq)]
pub struct FixedBackend {
    seconds: f64,
}

impl FixedBackend {
    /// Backend reporting `seconds` for every tree.
    pub fn new(seconds: f64) -> Self {
        Self { seconds }
    }
}

impl Backend for FixedBackend {
    fn seconds(&self, _tree: &LoopTree) -> Result<f64, BackendError> {
        Ok(self.seconds)
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Analytical runtime estimate.
///
/// Per leaf, the estimate is the larger of compute time and memory time:
/// - compute is the leaf's FLOPs over peak throughput, sped up by the
///   vector width (capped by the innermost trip count) when the leaf or its
///   innermost loop is vectorized;
/// - memory is one element per operand per iteration, divided by
///   `1 + reuse` and inflated by `cache_pressure * reuse^2`, where `reuse`
///   sums the reuse parameters of the enclosing loops.
///
/// Each loop adds bookkeeping overhead per executed iteration; unrolled
/// loops pay it once per entry instead.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CostModel {
    config: CostModelConfig,
}

impl CostModel {
    /// Cost model with the given machine parameters.
    pub fn new(config: CostModelConfig) -> Self {
        Self { config }
    }

    /// Machine parameters in use.
    pub fn config(&self) -> &CostModelConfig {
        &self.config
    }

    fn leaf_seconds(&self, tree: &LoopTree, leaf_ref: NodeRef) -> f64 {
        let leaf = match tree.as_leaf(leaf_ref) {
            Some(l) => l,
            None => return 0.0,
        };
        let loops = tree.enclosing_loops(leaf_ref);
        let iterations = tree.enclosing_trip_product(leaf_ref) as f64;

        let innermost = loops.first().and_then(|&l| tree.as_loop(l));
        let vectorized = leaf.annotation == Annotation::Vectorize
            || innermost.map_or(false, |l| l.annotation == Annotation::Vectorize);
        let lanes = match innermost {
            Some(l) if vectorized => self.config.vector_width.min(l.trip_count).max(1),
            _ => 1,
        };
        let flops = leaf.op.flops_per_iteration() as f64 * iterations;
        let compute = flops / (self.config.peak_flops * lanes as f64);

        let reuse: f64 = loops.iter()
            .filter_map(|&l| tree.as_loop(l))
            .map(|l| l.reuse as f64)
            .sum();
        let operands = (leaf.inputs.len() + 1) as f64;
        let bytes = operands * iterations * self.config.element_bytes;
        let traffic = bytes * (1.0 + self.config.cache_pressure * reuse * reuse) / (1.0 + reuse);
        let memory = traffic / self.config.bandwidth;

        compute.max(memory)
    }

    fn loop_overhead(&self, tree: &LoopTree, loop_ref: NodeRef) -> f64 {
        let l = match tree.as_loop(loop_ref) {
            Some(l) => l,
            None => return 0.0,
        };
        let entries = tree.enclosing_trip_product(loop_ref) as f64;
        let executed = if l.annotation == Annotation::Unroll {
            entries
        } else {
            entries * l.trip_count as f64
        };
        executed * self.config.loop_overhead
    }
}

impl Backend for CostModel {
    fn seconds(&self, tree: &LoopTree) -> Result<f64, BackendError> {
        let total = tree.preorder()
            .into_iter()
            .map(|r| {
                if tree.is_loop(r) {
                    self.loop_overhead(tree, r)
                } else {
                    self.leaf_seconds(tree, r)
                }
            })
            .sum();
        Ok(total)
    }

    fn name(&self) -> &str {
        "cost_model"
    }
}

/// Result of a benchmark run
#[derive(Clone, Debug, PartialEq)]
pub struct BenchmarkResult {
    /// Individual run times
    pub times: Vec<f64>,
    /// Median time
    pub median_time: f64,
    /// Minimum time
    pub min_time: f64,
    /// Maximum time
    pub max_time: f64,
    /// Standard deviation
    pub std_dev: f64,
}

impl BenchmarkResult {
    /// Summarize a set of run times; `None` when there are no runs.
    pub fn from_times(times: Vec<f64>) -> Option<Self> {
        let mut sorted = times.clone();
        sorted.sort_by(f64::total_cmp);
        let (&min_time, &max_time) = (sorted.first()?, sorted.last()?);
        let median_time = sorted[sorted.len() / 2];

        let n = times.len() as f64;
        let (sum, sum_sq) = times.iter().fold((0.0, 0.0), |(s, sq), &t| (s + t, sq + t * t));
        let mean = sum / n;
        let std_dev = (sum_sq / n - mean * mean).max(0.0).sqrt();

        Some(Self { times, median_time, min_time, max_time, std_dev })
    }
}

/// Times an external executor.
pub struct MeasuredBackend<E> {
    executor: E,
    config: BenchmarkConfig,
}

impl<E: Executor> MeasuredBackend<E> {
    /// Time `executor` according to `config`.
    pub fn new(executor: E, config: BenchmarkConfig) -> Self {
        Self { executor, config }
    }

    /// Run warmups, then time `config.iterations` runs.
    pub fn benchmark(&self, tree: &LoopTree) -> Result<BenchmarkResult, BackendError> {
        for _ in 0..self.config.warmup_iterations {
            self.executor.execute(tree)?;
        }

        let mut times = Vec::with_capacity(self.config.iterations);
        for run in 0..self.config.iterations {
            let start = Instant::now();
            match self.executor.execute(tree) {
                Ok(()) => times.push(start.elapsed().as_secs_f64()),
                Err(e) => warn!("benchmark run {} failed: {:#}", run, e),
            }
        }

        let result = BenchmarkResult::from_times(times)
            .ok_or(BackendError::NoSuccessfulRuns(self.config.iterations))?;
        debug!(
            "measured {} runs: median {:.6}s (min {:.6}s, max {:.6}s)",
            result.times.len(), result.median_time, result.min_time, result.max_time
        );
        Ok(result)
    }
}

impl<E: Executor> Backend for MeasuredBackend<E> {
    fn seconds(&self, tree: &LoopTree) -> Result<f64, BackendError> {
        self.benchmark(tree).map(|r| r.median_time)
    }

    fn name(&self) -> &str {
        "measured"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{OpKind, TreeBuilder};
    use crate::transform::{annotate, increase_reuse, split};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tree() -> LoopTree {
        TreeBuilder::new()
            .open_loop("i", 64)
            .open_loop("j", 64)
            .leaf(OpKind::MulAdd, &["A", "B"], "C")
            .build()
            .expect("Failed to build tree")
    }

    #[test]
    fn test_benchmark_result() {
        let result = BenchmarkResult::from_times(vec![4.0, 2.0, 5.0, 1.0, 3.0])
            .expect("Failed to summarize");
        assert_eq!(result.median_time, 3.0);
        assert_eq!(result.min_time, 1.0);
        assert_eq!(result.max_time, 5.0);
        assert!((result.std_dev - 2.0_f64.sqrt()).abs() < 1e-12);
        assert_eq!(result.times, vec![4.0, 2.0, 5.0, 1.0, 3.0]);
    }

    #[test]
    fn test_benchmark_result_empty() {
        assert!(BenchmarkResult::from_times(Vec::new()).is_none());
    }

    #[test]
    fn test_cost_model_deterministic() {
        let model = CostModel::default();
        let t = tree();
        let a = model.seconds(&t).expect("Failed to estimate");
        let b = model.seconds(&t).expect("Failed to estimate");
        assert_eq!(a, b);
        assert!(a > 0.0);
    }

    #[test]
    fn test_cost_model_rewards_vectorization() {
        let model = CostModel::default();
        let t = tree();
        let inner = t.children(t.root())[0];
        let vectorized = annotate(&t, inner, Annotation::Vectorize)
            .expect("Failed to annotate")
            .tree;
        let base = model.seconds(&t).expect("Failed to estimate");
        let fast = model.seconds(&vectorized).expect("Failed to estimate");
        assert!(fast < base);
    }

    #[test]
    fn test_cost_model_reuse_tradeoff() {
        let model = CostModel::new(CostModelConfig::new().peak_flops(1.0e15));
        let t = tree();
        let r = t.root();
        let mut cur = t.clone();
        let mut times = vec![model.seconds(&cur).expect("Failed to estimate")];
        for _ in 0..8 {
            cur = increase_reuse(&cur, r).expect("Failed to increase").tree;
            times.push(model.seconds(&cur).expect("Failed to estimate"));
        }
        // Memory bound: a little reuse helps, a lot hurts.
        assert!(times[1] < times[0]);
        assert!(times[8] > times[3]);
    }

    #[test]
    fn test_cost_model_unroll_saves_overhead() {
        let model = CostModel::default();
        let t = split(&tree(), NodeRef(1), 4).expect("Failed to split").tree;
        let inner = t.children(NodeRef(1))[0];
        let unrolled = annotate(&t, inner, Annotation::Unroll).expect("Failed to annotate").tree;
        assert!(model.seconds(&unrolled).unwrap() < model.seconds(&t).unwrap());
    }

    #[test]
    fn test_measured_counts_runs() {
        let runs = AtomicUsize::new(0);
        let backend = MeasuredBackend::new(
            |_: &LoopTree| -> anyhow::Result<()> {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            BenchmarkConfig::new().iterations(4).warmup(2),
        );
        let result = backend.benchmark(&tree()).expect("Failed to benchmark");
        assert_eq!(result.times.len(), 4);
        assert_eq!(runs.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_measured_all_runs_fail() {
        let backend = MeasuredBackend::new(
            |_: &LoopTree| -> anyhow::Result<()> { anyhow::bail!("device lost") },
            BenchmarkConfig::new().iterations(3).warmup(0),
        );
        let err = backend.seconds(&tree()).unwrap_err();
        assert_eq!(err, BackendError::NoSuccessfulRuns(3));
    }

    #[test]
    fn test_measured_warmup_failure_propagates() {
        let backend = MeasuredBackend::new(
            |_: &LoopTree| -> anyhow::Result<()> { anyhow::bail!("lowering failed") },
            BenchmarkConfig::new().iterations(3).warmup(1),
        );
        match backend.seconds(&tree()) {
            Err(BackendError::ExecutionFailed(msg)) => assert!(msg.contains("lowering failed")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
