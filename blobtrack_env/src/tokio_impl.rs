//! Channel-backed transport using Tokio mpsc queues.

use crate::error::EnvError;
use crate::transport::{DetectionSource, SnapshotSink};
use crate::types::{DetectionFrame, FrameSnapshot};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Detection source backed by a bounded Tokio channel.
///
/// The detector side holds the matching `mpsc::Sender`. Dropping every
/// sender ends the stream.
pub struct ChannelSource {
    rx: mpsc::Receiver<DetectionFrame>,
}

impl ChannelSource {
    /// Wraps an existing receiver.
    pub fn new(rx: mpsc::Receiver<DetectionFrame>) -> Self {
        Self { rx }
    }
}

#[async_trait]
impl DetectionSource for ChannelSource {
    async fn recv(&mut self) -> Result<Option<DetectionFrame>, EnvError> {
        Ok(self.rx.recv().await)
    }
}

/// Snapshot sink backed by a bounded Tokio channel.
pub struct ChannelSink {
    tx: mpsc::Sender<FrameSnapshot>,
}

impl ChannelSink {
    /// Wraps an existing sender.
    pub fn new(tx: mpsc::Sender<FrameSnapshot>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl SnapshotSink for ChannelSink {
    async fn publish(&mut self, snapshot: FrameSnapshot) -> Result<(), EnvError> {
        let seq = snapshot.seq;
        self.tx
            .send(snapshot)
            .await
            .map_err(|_| EnvError::sink_closed(format!("snapshot for frame {} not delivered", seq)))
    }
}

/// Creates a detection channel: the sender goes to the detector, the source to the tracker.
pub fn detection_channel(capacity: usize) -> (mpsc::Sender<DetectionFrame>, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity);
    (tx, ChannelSource::new(rx))
}

/// Creates a snapshot channel: the sink goes to the tracker, the receiver to the consumer.
pub fn snapshot_channel(capacity: usize) -> (ChannelSink, mpsc::Receiver<FrameSnapshot>) {
    let (tx, rx) = mpsc::channel(capacity);
    (ChannelSink::new(tx), rx)
}
