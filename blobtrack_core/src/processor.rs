//! Frame processor - drives one detection frame end to end.
//!
//! ```text
//! DetectionFrame ─► drop malformed ─► associate (ranked tracks)
//!                                        │
//!                     apply_frame ◄──────┘
//!                          │
//!                   enforce_limits ─► snapshot ─► FrameOutput
//! ```
//!
//! The processor owns the registry; nothing outside it can observe a
//! partially updated frame. Every frame is processed to completion and
//! numeric failures stay confined to the track they happened in.

use crate::association::Associator;
use crate::config::{ConfigError, TrackerConfig};
use crate::layout::measurement_vector;
use crate::metrics::FrameStats;
use crate::registry::TrackRegistry;
use crate::track::FrameHeader;
use blobtrack_env::{DetectionFrame, FrameSnapshot};
use nalgebra::DVector;
use tracing::{debug, warn};

/// Everything produced by one frame.
#[derive(Debug, Clone)]
pub struct FrameOutput {
    /// Published snapshot (post lifecycle limits)
    pub snapshot: FrameSnapshot,

    /// Counters for this frame
    pub stats: FrameStats,
}

/// Single-threaded, frame-synchronous tracker.
pub struct FrameProcessor {
    registry: TrackRegistry,
    associator: Associator,
    last_seq: Option<u64>,
}

impl FrameProcessor {
    /// Creates a processor with an empty registry.
    pub fn new(config: TrackerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            registry: TrackRegistry::new(&config),
            associator: Associator::new(config.association_metric, config.n_covariances_to_reject_data),
            last_seq: None,
        })
    }

    /// Processes one frame and returns its snapshot.
    pub fn process(&mut self, frame: &DetectionFrame) -> FrameOutput {
        let header = FrameHeader {
            seq: frame.seq,
            stamp: frame.stamp,
        };

        if let Some(last) = self.last_seq {
            if frame.seq <= last {
                warn!(frame = frame.seq, previous = last, "frame sequence did not increase");
            }
        }
        self.last_seq = Some(frame.seq);

        let measurements: Vec<DVector<f64>> = frame
            .detections
            .iter()
            .filter(|d| {
                let ok = d.is_finite();
                if !ok {
                    warn!(frame = frame.seq, detection = ?d, "dropping malformed detection");
                }
                ok
            })
            .map(measurement_vector)
            .collect();
        let dropped = frame.detections.len() - measurements.len();

        let association = {
            let ranked = self.registry.ranked();
            self.associator.associate(&ranked, &measurements)
        };

        let report = self.registry.apply_frame(&association, &measurements, header);
        let destroyed = self.registry.enforce_limits();
        let snapshot = self.registry.snapshot(header);

        let stats = FrameStats {
            seq: frame.seq,
            detections: frame.detections.len(),
            dropped,
            matched: report.corrected.len(),
            propagated: report.propagated.len(),
            degraded: report.degraded.len(),
            born: report.born.len(),
            destroyed: destroyed.len(),
            live_tracks: self.registry.len(),
            most_persistent: self.registry.ranked_ids().first().copied(),
        };

        debug!(
            frame = stats.seq,
            detections = stats.detections,
            matched = stats.matched,
            propagated = stats.propagated,
            born = stats.born,
            destroyed = stats.destroyed,
            live = stats.live_tracks,
            "frame processed"
        );

        FrameOutput { snapshot, stats }
    }

    /// Read-only view of the registry between frames.
    pub fn registry(&self) -> &TrackRegistry {
        &self.registry
    }

    /// Sequence number of the last processed frame.
    pub fn last_seq(&self) -> Option<u64> {
        self.last_seq
    }
}
