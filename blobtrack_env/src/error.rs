//! Error types for the blobtrack transport layer.

use thiserror::Error;

/// Errors that can occur while moving frames and snapshots.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The snapshot consumer has gone away
    #[error("Sink closed: {0}")]
    SinkClosed(String),

    /// The detection producer failed (not the same as a clean end of stream)
    #[error("Source error: {0}")]
    SourceError(String),

    /// Frame or snapshot (de)serialization failed
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Underlying I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EnvError {
    /// Creates a sink-closed error.
    pub fn sink_closed(msg: impl Into<String>) -> Self {
        Self::SinkClosed(msg.into())
    }

    /// Creates a source error.
    pub fn source(msg: impl Into<String>) -> Self {
        Self::SourceError(msg.into())
    }

    /// Creates a serialization error.
    pub fn serialization(err: impl std::fmt::Display) -> Self {
        Self::SerializationError(err.to_string())
    }
}
