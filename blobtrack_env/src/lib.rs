//! blobtrack Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" boundary around the tracker core:
//! - Wire types for detection frames and published snapshots
//! - `DetectionSource` / `SnapshotSink` traits for the surrounding transport
//! - Tokio channel implementations for in-process wiring
//!
//! The tracker never touches sockets or files directly; whoever embeds it
//! supplies a source and a sink.
//!
//! # Example
//!
//! ```ignore
//! use blobtrack_env::{detection_channel, snapshot_channel};
//!
//! let (frame_tx, source) = detection_channel(32);
//! let (sink, mut snapshots) = snapshot_channel(32);
//! // hand `source` and `sink` to a TrackerNode, feed frames through `frame_tx`
//! ```

mod error;
mod tokio_impl;
mod transport;
mod types;

pub use error::EnvError;
pub use tokio_impl::{detection_channel, snapshot_channel, ChannelSink, ChannelSource};
pub use transport::{DetectionSource, SnapshotSink};
pub use types::{Detection, DetectionFrame, FrameSnapshot, TrackEstimate};
