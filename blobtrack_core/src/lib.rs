//! blobtrack Core - Multi-Object Blob Tracking
//!
//! Turns a per-frame stream of blob detections (position, area, orientation)
//! into persistent tracks:
//! 1. **Filter**: one discrete linear Kalman filter per track, sharing a single model
//! 2. **Association**: greedy, persistence-ordered nearest-detection matching with a covariance gate
//! 3. **Lifecycle**: births from unclaimed detections, capacity pruning, ordered snapshots

pub mod association;
pub mod config;
pub mod kalman;
pub mod layout;
pub mod metrics;
pub mod node;
pub mod processor;
pub mod registry;
pub mod track;

// Re-export key types for convenience
pub use association::{Association, AssociationMetric, Associator};
pub use config::{ConfigError, KalmanParameters, TrackerConfig, TrackerSettings};
pub use kalman::{DiscreteKalmanFilter, FilterError, FilterStep, KalmanModel, StepOutcome};
pub use metrics::{FrameStats, TrackerMetrics};
pub use node::TrackerNode;
pub use processor::{FrameOutput, FrameProcessor};
pub use registry::{ApplyReport, TrackRegistry};
pub use track::{FrameHeader, Track, TrackId};
