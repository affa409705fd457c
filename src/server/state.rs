//! Application state for the inference server

use std::sync::Arc;
use std::time::Instant;

use super::pool::InferencePool;

/// Shared application state
pub struct AppState {
    /// Inference workers
    pub pool: InferencePool,
    /// Human-readable backend name reported by `/health`
    pub backend: String,
    /// Server start time
    pub started_at: Instant,
}

impl AppState {
    pub fn new(pool: InferencePool, backend: impl Into<String>) -> Self {
        Self {
            pool,
            backend: backend.into(),
            started_at: Instant::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;
