//! Per-frame and cumulative tracker statistics.
//!
//! `FrameStats` is produced by the frame processor for every frame and is
//! logged at debug level; `TrackerMetrics` accumulates them over a run.

use crate::track::TrackId;
use serde::{Deserialize, Serialize};

/// Counters for a single processed frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameStats {
    /// Frame sequence number
    pub seq: u64,
    /// Detections received
    pub detections: usize,
    /// Detections dropped for non-finite fields
    pub dropped: usize,
    /// Tracks corrected with a detection
    pub matched: usize,
    /// Tracks propagated without a detection
    pub propagated: usize,
    /// Tracks whose correction fell back to predict-only
    pub degraded: usize,
    /// Tracks spawned
    pub born: usize,
    /// Tracks destroyed by the lifecycle limits
    pub destroyed: usize,
    /// Live tracks after the frame
    pub live_tracks: usize,
    /// Most persistent live track
    pub most_persistent: Option<TrackId>,
}

/// Running totals across frames.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerMetrics {
    pub frames: u64,
    pub detections: u64,
    pub dropped: u64,
    pub matched: u64,
    pub propagated: u64,
    pub degraded: u64,
    pub born: u64,
    pub destroyed: u64,
    /// Largest number of live tracks seen after any frame
    pub peak_tracks: usize,
}

impl TrackerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one frame into the totals.
    pub fn record(&mut self, stats: &FrameStats) {
        self.frames += 1;
        self.detections += stats.detections as u64;
        self.dropped += stats.dropped as u64;
        self.matched += stats.matched as u64;
        self.propagated += stats.propagated as u64;
        self.degraded += stats.degraded as u64;
        self.born += stats.born as u64;
        self.destroyed += stats.destroyed as u64;
        self.peak_tracks = self.peak_tracks.max(stats.live_tracks);
    }

    /// Fraction of accepted detections that updated an existing track.
    pub fn match_rate(&self) -> f64 {
        let accepted = self.detections.saturating_sub(self.dropped);
        if accepted > 0 {
            self.matched as f64 / accepted as f64
        } else {
            0.0
        }
    }
}
