//! Tracker node - wires the frame processor to a detection source and a snapshot sink.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       TrackerNode                        │
//! │                                                          │
//! │  DetectionSource ──► FrameProcessor ──► SnapshotSink     │
//! │   (recv().await)      (sync, owns        (publish().await)│
//! │                        the registry)                     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Frames are pulled one at a time; the next frame is not requested until
//! the current snapshot has been handed to the sink.
//!
//! # Usage
//!
//! ```ignore
//! use blobtrack_core::{TrackerConfig, TrackerNode};
//! use blobtrack_env::{detection_channel, snapshot_channel};
//!
//! let (frames, source) = detection_channel(32);
//! let (sink, snapshots) = snapshot_channel(32);
//! let node = TrackerNode::new(TrackerConfig::default(), source, sink)?;
//! let metrics = node.run().await?;
//! ```

use crate::config::{ConfigError, TrackerConfig};
use crate::metrics::TrackerMetrics;
use crate::processor::FrameProcessor;
use blobtrack_env::{DetectionSource, EnvError, SnapshotSink};
use tracing::{debug, info};

/// A tracker running against an external source and sink.
pub struct TrackerNode<Src, Snk>
where
    Src: DetectionSource,
    Snk: SnapshotSink,
{
    /// Frame input
    source: Src,

    /// Snapshot output
    sink: Snk,

    /// Tracking core
    processor: FrameProcessor,

    /// Running totals
    metrics: TrackerMetrics,
}

impl<Src, Snk> TrackerNode<Src, Snk>
where
    Src: DetectionSource,
    Snk: SnapshotSink,
{
    /// Creates a node with an empty registry.
    pub fn new(config: TrackerConfig, source: Src, sink: Snk) -> Result<Self, ConfigError> {
        Ok(Self {
            source,
            sink,
            processor: FrameProcessor::new(config)?,
            metrics: TrackerMetrics::new(),
        })
    }

    /// Processes a single frame.
    ///
    /// Returns `Ok(false)` once the source is exhausted.
    pub async fn step(&mut self) -> Result<bool, EnvError> {
        let Some(frame) = self.source.recv().await? else {
            return Ok(false);
        };

        let output = self.processor.process(&frame);
        self.metrics.record(&output.stats);
        self.sink.publish(output.snapshot).await?;

        Ok(true)
    }

    /// Runs until the source ends, returning the accumulated metrics.
    ///
    /// Stops early if the source or the sink fails.
    pub async fn run(mut self) -> Result<TrackerMetrics, EnvError> {
        while self.step().await? {
            if self.metrics.frames % 100 == 0 {
                debug!(
                    frames = self.metrics.frames,
                    live = self.processor.registry().len(),
                    "tracker progress"
                );
            }
        }

        info!(
            frames = self.metrics.frames,
            born = self.metrics.born,
            destroyed = self.metrics.destroyed,
            degraded = self.metrics.degraded,
            "detection stream ended"
        );
        Ok(self.metrics)
    }

    pub fn processor(&self) -> &FrameProcessor {
        &self.processor
    }

    pub fn metrics(&self) -> &TrackerMetrics {
        &self.metrics
    }
}
