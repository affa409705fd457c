//! End-to-end latency measurement for `classify`.
//!
//! Each timed call covers decode, preprocess, forward pass and argmax on one
//! fixed payload.

use std::path::Path;
use std::time::{Duration, Instant};

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::predictor::InferenceService;
use super::{BENCHMARK_ITERATIONS, WARMUP_ITERATIONS};
use crate::backend::backend_name;
use crate::utils::error::{DigitError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Untimed calls before measuring
    pub warmup_iterations: usize,
    pub iterations: usize,
    /// Keep every iteration time in the result
    pub verbose: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            warmup_iterations: WARMUP_ITERATIONS,
            iterations: BENCHMARK_ITERATIONS,
            verbose: false,
        }
    }
}

/// Outcome of a benchmark run, serializable to JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub latency: LatencyStats,
    /// Classifications per second at the mean latency
    pub throughput: f64,
    /// Empty unless the run was verbose
    pub iteration_times_ms: Vec<f64>,
    /// Digit returned for the payload
    pub label: usize,
    pub config: BenchmarkConfig,
    pub backend: String,
}

impl BenchmarkResult {
    pub fn from_timings(timings: &[Duration], label: usize, config: BenchmarkConfig) -> Self {
        let times_ms: Vec<f64> = timings.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
        let latency = LatencyStats::from_millis(&times_ms);
        let throughput = if latency.mean_ms > 0.0 {
            1000.0 / latency.mean_ms
        } else {
            0.0
        };

        Self {
            latency,
            throughput,
            iteration_times_ms: if config.verbose { times_ms } else { Vec::new() },
            label,
            config,
            backend: backend_name().to_string(),
        }
    }

    /// Write the result as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| DigitError::Internal(format!("Failed to serialize benchmark: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn summary(&self) -> String {
        format!(
            "label {} | mean {:.2}ms, p95 {:.2}ms, p99 {:.2}ms | {:.1} img/s",
            self.label, self.latency.mean_ms, self.latency.p95_ms, self.latency.p99_ms, self.throughput
        )
    }
}

/// Latency distribution in milliseconds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyStats {
    pub mean_ms: f64,
    pub std_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl LatencyStats {
    pub fn from_millis(times_ms: &[f64]) -> Self {
        if times_ms.is_empty() {
            return Self::default();
        }

        let mut sorted = times_ms.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let variance = sorted.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / n;

        // Nearest rank on the sorted sample
        let rank = |p: f64| sorted[((p / 100.0) * (n - 1.0)).round() as usize];

        Self {
            mean_ms: mean,
            std_ms: variance.sqrt(),
            min_ms: sorted[0],
            max_ms: sorted[sorted.len() - 1],
            p50_ms: rank(50.0),
            p95_ms: rank(95.0),
            p99_ms: rank(99.0),
        }
    }
}

/// Time repeated `classify` calls on one payload.
///
/// The payload must classify successfully; the first failure aborts the run.
pub fn run_benchmark<B: Backend>(
    service: &InferenceService<B>,
    payload: &str,
    config: BenchmarkConfig,
) -> Result<BenchmarkResult> {
    if config.iterations == 0 {
        return Err(DigitError::Config(
            "benchmark iterations must be at least 1".to_string(),
        ));
    }

    info!(
        "Running benchmark: {} warmup + {} timed iterations",
        config.warmup_iterations, config.iterations
    );

    for _ in 0..config.warmup_iterations {
        service.classify(payload)?;
    }

    let mut timings = Vec::with_capacity(config.iterations);
    let mut label = 0;
    for i in 0..config.iterations {
        let start = Instant::now();
        label = service.classify(payload)?;
        let elapsed = start.elapsed();
        debug!("Iteration {}: {:?}", i, elapsed);
        timings.push(elapsed);
    }

    let result = BenchmarkResult::from_timings(&timings, label, config);
    info!("Benchmark done: {}", result.summary());
    Ok(result)
}
