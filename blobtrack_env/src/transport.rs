//! Source and sink abstractions around the tracker.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::{DetectionFrame, FrameSnapshot};

/// Producer of detection frames.
///
/// # Implementations
///
/// - **Production**: `ChannelSource` fed by the detector task
/// - **Replay**: JSON lines files (see `blobtrack_sim`)
///
/// # Frame Flow
///
/// ```text
/// Detector               Source                 Tracker
///   |                       |                      |
///   |-- frame k ----------->|                      |
///   |                       |-- recv() -> frame k->|
///   |                       |                      |-- snapshot k -> Sink
/// ```
#[async_trait]
pub trait DetectionSource: Send {
    /// Receives the next frame in arrival order.
    ///
    /// # Returns
    /// * `Ok(Some(frame))` - The next frame
    /// * `Ok(None)` - The stream has ended (shutdown)
    /// * `Err(EnvError::SourceError)` - The producer failed; no further frames
    ///
    /// A frame returned here is owned by the caller and is never re-delivered.
    async fn recv(&mut self) -> Result<Option<DetectionFrame>, EnvError>;
}

/// Consumer of per-frame track snapshots.
#[async_trait]
pub trait SnapshotSink: Send {
    /// Publishes one snapshot.
    ///
    /// # Returns
    /// * `Ok(())` - Snapshot handed off
    /// * `Err(EnvError::SinkClosed)` - Nobody is listening any more
    async fn publish(&mut self, snapshot: FrameSnapshot) -> Result<(), EnvError>;
}
