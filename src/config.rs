//! Configuration structures for the digit inference service.
//!
//! Configuration is read from a TOML file. Every section is optional; missing
//! values fall back to their defaults.
//!
//! ```toml
//! [model]
//! path = "model/mnist_cnn.pt"
//!
//! [server]
//! host = "0.0.0.0"
//! port = 8000
//! workers = 4
//!
//! [logging]
//! level = "info"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::utils::error::{DigitError, Result};
use crate::utils::logging::LogLevel;

/// Default checkpoint location, relative to the working directory
pub const DEFAULT_MODEL_PATH: &str = "model/mnist_cnn.pt";

/// Top-level service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Model configuration
    pub model: ModelSettings,
    /// HTTP server configuration
    pub server: ServerSettings,
    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Where the checkpoint lives
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelSettings {
    /// Path to the checkpoint (`.pt`/`.pth` or `.mpk`)
    pub path: PathBuf,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_MODEL_PATH),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Number of inference worker threads
    pub workers: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: LogLevel,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a TOML file and validate it
    pub fn from_file(path: &Path) -> Result<Self> {
        let config: ServiceConfig = load_toml_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(DigitError::Config("server.port must be non-zero".to_string()));
        }
        if self.server.workers == 0 {
            return Err(DigitError::Config(
                "server.workers must be at least 1".to_string(),
            ));
        }
        if self.model.path.as_os_str().is_empty() {
            return Err(DigitError::Config("model.path must not be empty".to_string()));
        }
        Ok(())
    }

    /// Socket address string for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path)
        .map_err(|e| DigitError::Config(format!("Failed to read config {}: {e}", path.display())))?;

    toml::from_str(&content)
        .map_err(|e| DigitError::Config(format!("Failed to parse config {}: {e}", path.display())))
}
