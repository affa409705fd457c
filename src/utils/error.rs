//! Error Handling Module
//!
//! Defines the error taxonomy of the inference service. Uses thiserror for
//! ergonomic error definitions.
//!
//! - [`InputError`]: the caller sent something that is not a decodable image.
//! - [`DigitError::Internal`]: preprocessing or inference failed unexpectedly.
//! - [`DigitError::CheckpointNotFound`], [`DigitError::CheckpointCorrupt`] and
//!   [`DigitError::ShapeMismatch`]: the model could not be loaded, the service must not start.

use std::any::Any;
use std::path::PathBuf;

use thiserror::Error;

/// Malformed or unrecognizable image payload
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    /// The bytes do not start with any known image container signature
    #[error("Cannot recognize image format, please check that the payload is a base64-encoded image")]
    UnrecognizedFormat,

    /// Base64 decoding failed, or the container was recognized but its data is broken
    #[error("Failed to decode base64 image: {0}")]
    Decode(String),
}

/// Main error type for digit inference operations
#[derive(Error, Debug)]
pub enum DigitError {
    /// The request payload is not a usable image
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    /// Unexpected failure during preprocessing or the forward pass
    #[error("Internal error: {0}")]
    Internal(String),

    /// Checkpoint file does not exist
    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(PathBuf),

    /// Checkpoint exists but could not be decoded
    #[error("Failed to load checkpoint '{0}': {1}")]
    CheckpointCorrupt(PathBuf, String),

    /// A parameter in the checkpoint does not fit the network topology
    #[error("Checkpoint parameter '{name}' has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DigitError {
    /// Reclassify anything that is not an input error as an internal error
    pub fn into_request_error(self) -> Self {
        match self {
            DigitError::Input(_) | DigitError::Internal(_) => self,
            other => DigitError::Internal(other.to_string()),
        }
    }
}

/// Convenience Result type for digit inference operations
pub type Result<T> = std::result::Result<T, DigitError>;

/// Extract a readable message from a caught panic payload
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_error_display() {
        let err = DigitError::from(InputError::Decode("Invalid padding".to_string()));
        assert_eq!(
            err.to_string(),
            "Input error: Failed to decode base64 image: Invalid padding"
        );
    }

    #[test]
    fn test_unrecognized_format_message() {
        let msg = InputError::UnrecognizedFormat.to_string();
        assert!(msg.starts_with("Cannot recognize image format"));
    }

    #[test]
    fn test_shape_mismatch_display() {
        let err = DigitError::ShapeMismatch {
            name: "fc1.weight".to_string(),
            expected: vec![2304, 128],
            actual: vec![2304, 64],
        };
        assert!(err.to_string().contains("fc1.weight"));
        assert!(err.to_string().contains("[2304, 64]"));
    }

    #[test]
    fn test_into_request_error() {
        let io = DigitError::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(matches!(io.into_request_error(), DigitError::Internal(_)));

        let input = DigitError::from(InputError::UnrecognizedFormat);
        assert!(matches!(input.into_request_error(), DigitError::Input(_)));
    }

    #[test]
    fn test_panic_message() {
        let caught = std::panic::catch_unwind(|| panic!("weights exploded")).unwrap_err();
        assert_eq!(panic_message(caught), "weights exploded");

        let caught = std::panic::catch_unwind(|| panic!("{} layers", 2)).unwrap_err();
        assert_eq!(panic_message(caught), "2 layers");
    }
}
