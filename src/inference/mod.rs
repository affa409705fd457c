//! Inference module: from an encoded image to a predicted digit
//!
//! This module provides:
//! - Payload decoding to grayscale
//! - Resize and normalization into the network input tensor
//! - The classification service
//! - Latency benchmarking
//!
//! ## Pipeline
//!
//! ```text
//! base64 -> decoder -> GrayImage -> preprocess -> [1,1,28,28] -> DigitClassifier -> argmax
//! ```

pub mod benchmark;
pub mod decoder;
pub mod predictor;
pub mod preprocess;

// Re-export main types for convenience
pub use benchmark::{run_benchmark, BenchmarkConfig, BenchmarkResult, LatencyStats};
pub use decoder::{decode_bytes, decode_image};
pub use predictor::{argmax, InferenceService, Prediction};
pub use preprocess::Preprocessor;

/// Default number of warmup iterations for benchmarking
pub const WARMUP_ITERATIONS: usize = 10;

/// Default number of benchmark iterations
pub const BENCHMARK_ITERATIONS: usize = 100;
