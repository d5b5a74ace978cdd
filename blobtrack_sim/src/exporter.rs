//! JSON exporter for offline inspection.
//!
//! Exports simulation frames (ground truth next to published tracks) as one
//! pretty-printed JSON document.

use crate::error::SimError;
use blobtrack_env::TrackEstimate;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// Ground truth and tracker output for one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Frame sequence number
    pub seq: u64,

    /// Oracle clock at observation time
    pub time_sec: f64,

    /// Ground truth blob positions
    pub ground_truth: Vec<BlobPosition>,

    /// Published track estimates, in snapshot order
    pub tracks: Vec<TrackEstimate>,

    /// Number of detections the tracker received
    pub detections: usize,
}

/// Position of a ground truth blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobPosition {
    pub id: u64,
    pub x: f64,
    pub y: f64,
}

impl BlobPosition {
    pub fn new(id: u64, pos: Vector2<f64>) -> Self {
        Self { id, x: pos.x, y: pos.y }
    }
}

/// One scenario run, frame by frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rms_error: Option<f64>,

    pub id_switches: usize,
}

impl SimExport {
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            rms_error: None,
            id_switches: 0,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, rms_error: Option<f64>, id_switches: usize) {
        self.passed = passed;
        self.rms_error = rms_error;
        self.id_switches = id_switches;
    }

    /// Writes the export as pretty-printed JSON.
    pub fn write_to_file(&self, path: &str) -> Result<(), SimError> {
        let text = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path).map_err(|e| SimError::io(path, e))?;
        file.write_all(text.as_bytes()).map_err(|e| SimError::io(path, e))?;
        Ok(())
    }
}
