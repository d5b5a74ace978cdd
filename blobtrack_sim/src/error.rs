//! Error types for the simulator binary.

use blobtrack_core::ConfigError;
use blobtrack_env::EnvError;
use thiserror::Error;

/// Errors that stop a replay or a scenario run.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Env(#[from] EnvError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Oracle noise or miss parameters out of range
    #[error("Invalid oracle parameter: {0}")]
    InvalidParameter(String),

    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),
}

impl SimError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
