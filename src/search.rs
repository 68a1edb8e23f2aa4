//! Reference search drivers.
//!
//! A driver repeatedly asks a [`SearchStrategy`] for one of the currently
//! available actions, applies it, evaluates the configured metric and
//! records a checkpoint. The best checkpoint can be restored with
//! [`Agent::deserialize`].

use crate::agent::{Action, Agent};
use crate::metrics::Metric;
use crate::utils::errors::{AgentError, AgentResult};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Serialize, Deserialize};

/// Trait for search strategies
pub trait SearchStrategy: Send {
    /// Pick the next action among `available`, or stop.
    fn choose(&mut self, agent: &Agent, available: &[Action]) -> Option<Action>;

    /// Get name of the strategy
    fn name(&self) -> &str;
}

/// Uniformly random legal moves.
pub struct RandomWalk {
    rng: StdRng,
}

impl RandomWalk {
    /// Walk seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl SearchStrategy for RandomWalk {
    fn choose(&mut self, _agent: &Agent, available: &[Action]) -> Option<Action> {
        available.choose(&mut self.rng).copied()
    }

    fn name(&self) -> &str {
        "random_walk"
    }
}

/// Hill climbing: take the action that improves the metric most, otherwise
/// walk the cursor forward, otherwise stop.
pub struct GreedySearch {
    metric: Metric,
}

impl GreedySearch {
    /// Climb on `metric`.
    pub fn new(metric: Metric) -> Self {
        Self { metric }
    }

    fn score(&self, agent: &Agent) -> Option<f64> {
        match agent.evaluate(self.metric) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("could not evaluate {}: {}", self.metric, e);
                None
            }
        }
    }
}

impl Default for GreedySearch {
    fn default() -> Self {
        Self::new(Metric::FlopsPerSecond)
    }
}

impl SearchStrategy for GreedySearch {
    fn choose(&mut self, agent: &Agent, available: &[Action]) -> Option<Action> {
        let mut best = self.score(agent).map(|v| (None, v));

        for &action in available.iter().filter(|a| !a.is_navigation()) {
            let mut trial = agent.clone();
            if trial.apply(action).is_err() {
                continue;
            }
            let value = match self.score(&trial) {
                Some(v) => v,
                None => continue,
            };
            let improves = match best {
                Some((_, current)) => is_better(self.metric, value, current),
                None => true,
            };
            if improves {
                best = Some((Some(action), value));
            }
        }

        match best {
            Some((Some(action), _)) => Some(action),
            _ if available.contains(&Action::Down) => Some(Action::Down),
            _ => None,
        }
    }

    fn name(&self) -> &str {
        "greedy"
    }
}

fn is_better(metric: Metric, candidate: f64, current: f64) -> bool {
    if metric.higher_is_better() {
        candidate > current
    } else {
        candidate < current
    }
}

/// Search loop parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum number of actions applied
    pub max_steps: usize,
    /// Metric recorded at every step
    pub metric: Metric,
    /// Seed for randomized strategies
    pub seed: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_steps: 64,
            metric: Metric::FlopsPerSecond,
            seed: 0,
        }
    }
}

impl SearchConfig {
    /// Create default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the step budget
    pub fn max_steps(mut self, n: usize) -> Self {
        self.max_steps = n;
        self
    }

    /// Set the recorded metric
    pub fn metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    /// Set the random seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// One recorded state of a search.
#[derive(Clone, Debug, PartialEq)]
pub struct TrajectoryStep {
    /// Action that produced this state; `None` for the initial state
    pub action: Option<Action>,
    /// Metric value, if it could be evaluated
    pub value: Option<f64>,
    /// Serialized agent state
    pub checkpoint: String,
}

/// Every state visited by one search run, initial state first.
#[derive(Clone, Debug, PartialEq)]
pub struct Trajectory {
    /// Metric recorded at each step
    pub metric: Metric,
    /// Recorded states
    pub steps: Vec<TrajectoryStep>,
}

impl Trajectory {
    fn new(metric: Metric) -> Self {
        Self {
            metric,
            steps: Vec::new(),
        }
    }

    /// Number of actions applied.
    pub fn len(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }

    /// Whether no action was applied.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The best evaluated state; earliest wins ties.
    pub fn best(&self) -> Option<&TrajectoryStep> {
        let mut best: Option<(&TrajectoryStep, f64)> = None;
        for step in &self.steps {
            if let Some(v) = step.value {
                let better = match best {
                    Some((_, current)) => is_better(self.metric, v, current),
                    None => true,
                };
                if better {
                    best = Some((step, v));
                }
            }
        }
        best.map(|(step, _)| step)
    }

    /// Actions in the order they were applied.
    pub fn actions(&self) -> Vec<Action> {
        self.steps.iter().filter_map(|s| s.action).collect()
    }

    /// Export to CSV format
    pub fn to_csv(&self) -> String {
        let mut csv = format!("step,action,{}\n", self.metric);
        for (i, step) in self.steps.iter().enumerate() {
            csv.push_str(&format!(
                "{},{},{}\n",
                i,
                step.action.map_or("", |a| a.name()),
                step.value.map(|v| v.to_string()).unwrap_or_default()
            ));
        }
        csv
    }

    fn record(&mut self, action: Option<Action>, agent: &Agent) -> AgentResult<()> {
        let value = match agent.evaluate(self.metric) {
            Ok(v) => Some(v),
            Err(e @ (AgentError::Backend(_) | AgentError::DivisionUndefined)) => {
                warn!("{} unavailable after {:?}: {}", self.metric, action.map(|a| a.name()), e);
                None
            }
            Err(e) => return Err(e),
        };
        self.steps.push(TrajectoryStep {
            action,
            value,
            checkpoint: agent.serialize()?,
        });
        Ok(())
    }
}

/// Drive `agent` with `strategy` for at most `config.max_steps` actions.
pub fn run_search(
    agent: &mut Agent,
    strategy: &mut dyn SearchStrategy,
    config: &SearchConfig,
) -> AgentResult<Trajectory> {
    info!(
        "starting {} search: up to {} steps on {}",
        strategy.name(), config.max_steps, config.metric
    );

    let mut trajectory = Trajectory::new(config.metric);
    trajectory.record(None, agent)?;

    for step in 0..config.max_steps {
        let available = agent.available()?;
        let action = match strategy.choose(agent, &available) {
            Some(a) => a,
            None => {
                info!("{} stopped after {} steps", strategy.name(), step);
                break;
            }
        };
        agent.apply(action)?;
        trajectory.record(Some(action), agent)?;
        debug!("step {}: {} -> {:?}", step, action, trajectory.steps.last().and_then(|s| s.value));
    }

    if let Some(best) = trajectory.best() {
        info!("best {}: {:?} after {} steps", config.metric, best.value, trajectory.len());
    }
    Ok(trajectory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{LoopTree, OpKind, TreeBuilder};
    use crate::metrics::FixedBackend;
    use std::sync::Arc;

    fn matmul() -> LoopTree {
        TreeBuilder::new()
            .open_loop("m", 32)
            .open_loop("n", 32)
            .open_loop("k", 32)
            .leaf(OpKind::MulAdd, &["A", "B"], "C")
            .build()
            .expect("Failed to build matmul")
    }

    #[test]
    fn test_random_walk_is_reproducible() {
        let config = SearchConfig::new().max_steps(20).seed(7);
        let run = || {
            let mut agent = Agent::new(matmul());
            let mut strategy = RandomWalk::new(config.seed);
            run_search(&mut agent, &mut strategy, &config).expect("Failed to search")
        };
        let a = run();
        let b = run();
        assert_eq!(a.actions(), b.actions());
        assert_eq!(a.len(), 20);
    }

    #[test]
    fn test_greedy_never_regresses() {
        let config = SearchConfig::new().max_steps(30);
        let mut agent = Agent::new(matmul());
        let mut strategy = GreedySearch::default();
        let trajectory = run_search(&mut agent, &mut strategy, &config).expect("Failed to search");

        let values: Vec<f64> = trajectory.steps.iter()
            .map(|s| s.value.expect("cost model always evaluates"))
            .collect();
        assert!(values.windows(2).all(|w| w[1] >= w[0]));
        assert!(values.last() > values.first());
    }

    #[test]
    fn test_best_checkpoint_restores() {
        let config = SearchConfig::new().max_steps(10);
        let mut agent = Agent::new(matmul());
        let mut strategy = GreedySearch::default();
        let trajectory = run_search(&mut agent, &mut strategy, &config).expect("Failed to search");

        let best = trajectory.best().expect("some state evaluates");
        let restored = agent.deserialize(&best.checkpoint).expect("Failed to restore");
        let value = restored.evaluate(Metric::FlopsPerSecond).expect("Failed to evaluate");
        assert_eq!(Some(value), best.value);
    }

    #[test]
    fn test_zero_time_recorded_as_missing() {
        let config = SearchConfig::new().max_steps(3).seed(1);
        let mut agent = Agent::new(matmul()).with_backend(Arc::new(FixedBackend::new(0.0)));
        let mut strategy = RandomWalk::new(config.seed);
        let trajectory = run_search(&mut agent, &mut strategy, &config).expect("Failed to search");
        assert!(trajectory.steps.iter().all(|s| s.value.is_none()));
        assert!(trajectory.best().is_none());
    }

    #[test]
    fn test_csv_export() {
        let config = SearchConfig::new().max_steps(2).metric(Metric::Flops);
        let mut agent = Agent::new(matmul());
        let mut strategy = RandomWalk::new(3);
        let csv = run_search(&mut agent, &mut strategy, &config)
            .expect("Failed to search")
            .to_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "step,action,FLOPs");
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("0,,"));
    }
}
