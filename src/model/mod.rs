//! Model module for the digit CNN using the Burn framework
//!
//! This module provides:
//! - The fixed-topology digit classifier
//! - Checkpoint loading (PyTorch `.pt` and Burn `.mpk`) with shape validation

pub mod checkpoint;
pub mod cnn;

// Re-export main types for convenience
pub use checkpoint::{load_classifier, save_classifier, CheckpointFormat};
pub use cnn::{DigitClassifier, DigitClassifierConfig, DigitClassifierRecord};
