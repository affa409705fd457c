//! # Digit Inference
//!
//! A Rust service for handwritten digit classification using the Burn framework.
//!
//! ## Features
//!
//! - **Fixed-topology CNN** trained on MNIST, loaded from PyTorch or Burn checkpoints
//! - **Image pipeline** that accepts any format the `image` crate can sniff, in any size
//! - **HTTP endpoint** (`POST /predict`) backed by a pool of inference threads
//!
//! ## Modules
//!
//! - `model`: CNN architecture and checkpoint loading
//! - `inference`: Decoding, preprocessing, classification and benchmarking
//! - `server`: Axum router, worker pool and error mapping
//! - `config`: TOML service configuration
//! - `utils`: Logging and error types
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use digit_infer::backend::{default_device, DefaultBackend};
//! use digit_infer::InferenceService;
//!
//! let device = default_device();
//! let service = InferenceService::<DefaultBackend>::from_checkpoint("model/mnist_cnn.pt".as_ref(), device)?;
//! let label = service.classify(&payload_base64)?;
//! ```

pub mod backend;
pub mod config;
pub mod inference;
pub mod model;
pub mod server;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::ServiceConfig;
pub use inference::benchmark::BenchmarkResult;
pub use inference::predictor::{InferenceService, Prediction};
pub use inference::preprocess::Preprocessor;
pub use model::cnn::{DigitClassifier, DigitClassifierConfig};
pub use utils::error::{DigitError, InputError, Result};

/// Digit classes (0 through 9)
pub const NUM_CLASSES: usize = 10;

/// Side length of the square network input
pub const INPUT_SIZE: usize = 28;

/// Mean pixel intensity of the MNIST training set, in [0, 1]
pub const MNIST_MEAN: f32 = 0.1307;

/// Standard deviation of MNIST pixel intensities, in [0, 1]
pub const MNIST_STD: f32 = 0.3081;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
