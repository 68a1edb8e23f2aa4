//! Runtime backend configuration

use serde::{Serialize, Deserialize};

/// Configuration for measured runs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Number of timed runs
    pub iterations: usize,

    /// Untimed runs before measuring
    pub warmup_iterations: usize,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            iterations: 5,
            warmup_iterations: 1,
        }
    }
}

impl BenchmarkConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set number of timed runs
    pub fn iterations(mut self, n: usize) -> Self {
        self.iterations = n;
        self
    }

    /// Set number of warmup runs
    pub fn warmup(mut self, n: usize) -> Self {
        self.warmup_iterations = n;
        self
    }

    /// Quick preset (fast but noisy)
    pub fn quick() -> Self {
        Self {
            iterations: 2,
            warmup_iterations: 0,
        }
    }

    /// Thorough preset (slow but stable)
    pub fn thorough() -> Self {
        Self {
            iterations: 15,
            warmup_iterations: 3,
        }
    }
}

/// Parameters of the analytical cost model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostModelConfig {
    /// Scalar floating-point throughput (FLOP/s)
    pub peak_flops: f64,

    /// Memory bandwidth (bytes/s)
    pub bandwidth: f64,

    /// Bytes per tensor element
    pub element_bytes: f64,

    /// SIMD lanes available to vectorized loops
    pub vector_width: u64,

    /// Cost of one loop iteration's bookkeeping (s)
    pub loop_overhead: f64,

    /// Working-set growth per unit of squared reuse
    pub cache_pressure: f64,
}

impl Default for CostModelConfig {
    fn default() -> Self {
        Self {
            peak_flops: 1.0e10,
            bandwidth: 1.0e11,
            element_bytes: 4.0,
            vector_width: 8,
            loop_overhead: 1.0e-10,
            cache_pressure: 0.05,
        }
    }
}

impl CostModelConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set SIMD width
    pub fn vector_width(mut self, lanes: u64) -> Self {
        self.vector_width = lanes;
        self
    }

    /// Set memory bandwidth
    pub fn bandwidth(mut self, bytes_per_second: f64) -> Self {
        self.bandwidth = bytes_per_second;
        self
    }

    /// Set scalar throughput
    pub fn peak_flops(mut self, flops: f64) -> Self {
        self.peak_flops = flops;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_json() {
        let config: BenchmarkConfig = serde_json::from_str(r#"{"iterations": 9}"#)
            .expect("Failed to parse config");
        assert_eq!(config.iterations, 9);
        assert_eq!(config.warmup_iterations, 1);

        let model: CostModelConfig = serde_json::from_str(r#"{"vector_width": 16}"#)
            .expect("Failed to parse config");
        assert_eq!(model.vector_width, 16);
        assert_eq!(model.element_bytes, 4.0);
    }
}
