//! Utilities module for logging and error handling
//!
//! This module provides:
//! - Structured logging with tracing
//! - Error handling types

pub mod error;
pub mod logging;

// Re-export main types for convenience
pub use error::{DigitError, InputError, Result};
pub use logging::{init_logging, LogConfig, LogLevel};

/// Format a latency in milliseconds in a human-readable way
pub fn format_latency(ms: f64) -> String {
    if ms < 1.0 {
        format!("{:.0}µs", ms * 1000.0)
    } else if ms < 1000.0 {
        format!("{:.2}ms", ms)
    } else {
        format!("{:.2}s", ms / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_latency() {
        assert_eq!(format_latency(0.25), "250µs");
        assert_eq!(format_latency(12.345), "12.35ms");
        assert_eq!(format_latency(1500.0), "1.50s");
    }
}
