//! Wire types exchanged between the detector, the tracker and its consumers.

use serde::{Deserialize, Serialize};

/// One blob observed by the upstream detector in a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Image-plane x coordinate
    pub x: f64,

    /// Image-plane y coordinate
    pub y: f64,

    /// Blob area
    pub area: f64,

    /// Blob orientation (radians)
    pub angle: f64,
}

impl Detection {
    /// Creates a new detection.
    pub fn new(x: f64, y: f64, area: f64, angle: f64) -> Self {
        Self { x, y, area, angle }
    }

    /// Returns true if every field is a finite number.
    ///
    /// Detections failing this check are dropped before association.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.area.is_finite() && self.angle.is_finite()
    }
}

/// All detections produced for one camera frame.
///
/// The sequence number and timestamp are copied verbatim into every track
/// touched while this frame is processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionFrame {
    /// Frame sequence number assigned by the detector
    pub seq: u64,

    /// Capture time in seconds
    pub stamp: f64,

    /// Detections in this frame (may be empty)
    #[serde(default)]
    pub detections: Vec<Detection>,
}

impl DetectionFrame {
    /// Creates a frame with the given detections.
    pub fn new(seq: u64, stamp: f64, detections: Vec<Detection>) -> Self {
        Self {
            seq,
            stamp,
            detections,
        }
    }

    /// Creates a frame with no detections.
    pub fn empty(seq: u64, stamp: f64) -> Self {
        Self::new(seq, stamp, Vec::new())
    }

    /// Returns the number of detections in the frame.
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    /// Returns true if the frame carries no detections.
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// Published estimate of a single track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackEstimate {
    /// Track identifier (never reused)
    pub objid: u64,

    /// Estimated position [x, y, z]; z is always 0 for image-plane tracking
    pub position: [f64; 3],

    /// Estimated velocity [vx, vy, vz]
    pub velocity: [f64; 3],

    /// Estimated orientation
    pub angle: f64,

    /// Estimated blob size
    pub size: f64,

    /// Most recently applied measurement [x, y, 0]
    pub measurement: [f64; 3],

    /// Measurement-space covariance figure-of-merit
    pub covariance: f64,

    /// Number of frames this track has existed
    pub persistence: u64,
}

/// Ordered set of track estimates published after one frame.
///
/// Tracks are sorted by persistence (descending), ties by ascending id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSnapshot {
    /// Sequence number of the frame that produced this snapshot
    pub seq: u64,

    /// Timestamp of that frame
    pub stamp: f64,

    /// Track estimates
    pub tracks: Vec<TrackEstimate>,
}

impl FrameSnapshot {
    /// Returns the most persistent track, if any.
    pub fn most_persistent(&self) -> Option<&TrackEstimate> {
        self.tracks.first()
    }
}
