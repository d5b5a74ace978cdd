//! Ground truth oracle for synthetic runs.
//!
//! The Oracle maintains the "God's eye view" of the simulated image plane:
//! - True positions, sizes and orientations of all blobs
//! - Constant-velocity kinematics
//! - Detection frame generation (Gaussian noise, random misses, blackouts)

use crate::error::SimError;
use blobtrack_env::{Detection, DetectionFrame};
use nalgebra::Vector2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A ground truth blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundTruthBlob {
    /// Unique blob ID
    pub id: u64,

    /// Position in image coordinates
    pub position: Vector2<f64>,

    /// Velocity in image units per second
    pub velocity: Vector2<f64>,

    /// True area
    pub area: f64,

    /// True orientation (radians)
    pub angle: f64,

    /// Blob is still in the scene
    pub active: bool,
}

/// The Oracle - maintains ground truth and generates detection frames.
pub struct Oracle {
    /// RNG for noise and misses
    rng: ChaCha8Rng,

    /// All blobs, ordered by id so sampling order is reproducible
    blobs: BTreeMap<u64, GroundTruthBlob>,

    next_id: u64,

    /// Current simulation time (seconds)
    current_time: f64,

    /// Position noise
    position_noise: Normal<f64>,

    /// Probability that a blob is absent from a frame
    miss_probability: f64,
}

impl Oracle {
    /// Creates an oracle with no noise and no misses.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            blobs: BTreeMap::new(),
            next_id: 0,
            current_time: 0.0,
            position_noise: Normal::new(0.0, 0.0).unwrap_or_else(|e| unreachable!("zero-width normal: {e}")),
            miss_probability: 0.0,
        }
    }

    /// Sets the position noise standard deviation.
    pub fn with_position_noise(mut self, std_dev: f64) -> Result<Self, SimError> {
        self.position_noise = Normal::new(0.0, std_dev)
            .map_err(|e| SimError::InvalidParameter(format!("position noise {std_dev}: {e}")))?;
        Ok(self)
    }

    /// Sets the per-blob miss probability.
    pub fn with_miss_probability(mut self, probability: f64) -> Result<Self, SimError> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(SimError::InvalidParameter(format!(
                "miss probability {probability} outside [0, 1]"
            )));
        }
        self.miss_probability = probability;
        Ok(self)
    }

    /// Spawns a new blob and returns its ID.
    pub fn spawn_blob(&mut self, position: Vector2<f64>, velocity: Vector2<f64>, area: f64, angle: f64) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        self.blobs.insert(
            id,
            GroundTruthBlob {
                id,
                position,
                velocity,
                area,
                angle,
                active: true,
            },
        );
        id
    }

    /// Removes a blob from the scene.
    pub fn remove_blob(&mut self, id: u64) {
        if let Some(blob) = self.blobs.get_mut(&id) {
            blob.active = false;
        }
    }

    /// Advances kinematics by dt seconds.
    pub fn step(&mut self, dt: f64) {
        self.current_time += dt;
        for blob in self.blobs.values_mut().filter(|b| b.active) {
            blob.position += blob.velocity * dt;
        }
    }

    pub fn time(&self) -> f64 {
        self.current_time
    }

    /// Returns all active blobs in id order.
    pub fn active_blobs(&self) -> impl Iterator<Item = &GroundTruthBlob> {
        self.blobs.values().filter(|b| b.active)
    }

    pub fn blob(&self, id: u64) -> Option<&GroundTruthBlob> {
        self.blobs.get(&id)
    }

    /// Generates the detection frame for the current instant.
    ///
    /// With `blackout` set every blob is missed. Otherwise each active blob is
    /// independently missed with the configured probability and its position
    /// is perturbed with Gaussian noise.
    pub fn observe(&mut self, seq: u64, blackout: bool) -> DetectionFrame {
        if blackout {
            return DetectionFrame::empty(seq, self.current_time);
        }

        let mut detections = Vec::new();
        for blob in self.blobs.values().filter(|b| b.active) {
            if self.miss_probability > 0.0 && self.rng.gen_bool(self.miss_probability) {
                continue;
            }
            let dx = self.position_noise.sample(&mut self.rng);
            let dy = self.position_noise.sample(&mut self.rng);
            detections.push(Detection::new(
                blob.position.x + dx,
                blob.position.y + dy,
                blob.area,
                blob.angle,
            ));
        }

        DetectionFrame::new(seq, self.current_time, detections)
    }

    /// Returns ground truth positions for error calculation.
    pub fn ground_truth_positions(&self) -> Vec<(u64, Vector2<f64>)> {
        self.active_blobs().map(|b| (b.id, b.position)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oracle_spawn_blob() {
        let mut oracle = Oracle::new(42);
        let id = oracle.spawn_blob(Vector2::new(100.0, 200.0), Vector2::new(1.0, 0.0), 12.0, 0.5);

        let blob = oracle.blob(id).unwrap();
        assert_eq!(blob.position.x, 100.0);
        assert_eq!(blob.area, 12.0);
    }

    #[test]
    fn test_oracle_kinematics() {
        let mut oracle = Oracle::new(42);
        let id = oracle.spawn_blob(Vector2::zeros(), Vector2::new(2.0, -1.0), 5.0, 0.0);

        oracle.step(1.0);
        oracle.step(1.0);

        let blob = oracle.blob(id).unwrap();
        assert!((blob.position.x - 4.0).abs() < 1e-12);
        assert!((blob.position.y + 2.0).abs() < 1e-12);
        assert!((oracle.time() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_oracle_deterministic_noise() {
        let build = || {
            let mut oracle = Oracle::new(7).with_position_noise(0.5).unwrap();
            oracle.spawn_blob(Vector2::new(10.0, 10.0), Vector2::zeros(), 5.0, 0.0);
            oracle
        };
        let mut a = build();
        let mut b = build();

        // Same seed = same noise
        assert_eq!(a.observe(0, false), b.observe(0, false));
    }

    #[test]
    fn test_noise_free_observation_is_exact() {
        let mut oracle = Oracle::new(1);
        oracle.spawn_blob(Vector2::new(3.0, 4.0), Vector2::zeros(), 9.0, 0.1);

        let frame = oracle.observe(5, false);
        assert_eq!(frame.seq, 5);
        assert_eq!(frame.detections, vec![Detection::new(3.0, 4.0, 9.0, 0.1)]);
    }

    #[test]
    fn test_blackout_and_certain_miss() {
        let mut oracle = Oracle::new(1).with_miss_probability(1.0).unwrap();
        oracle.spawn_blob(Vector2::zeros(), Vector2::zeros(), 5.0, 0.0);
        assert!(oracle.observe(0, false).is_empty());

        let mut oracle = Oracle::new(1);
        oracle.spawn_blob(Vector2::zeros(), Vector2::zeros(), 5.0, 0.0);
        assert!(oracle.observe(0, true).is_empty());
        assert_eq!(oracle.observe(1, false).len(), 1);
    }

    #[test]
    fn test_removed_blob_not_observed() {
        let mut oracle = Oracle::new(3);
        let a = oracle.spawn_blob(Vector2::zeros(), Vector2::zeros(), 5.0, 0.0);
        oracle.spawn_blob(Vector2::new(50.0, 0.0), Vector2::zeros(), 5.0, 0.0);
        oracle.remove_blob(a);

        assert_eq!(oracle.observe(0, false).len(), 1);
        assert_eq!(oracle.ground_truth_positions().len(), 1);
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(Oracle::new(0).with_miss_probability(1.5).is_err());
        assert!(Oracle::new(0).with_position_noise(-1.0).is_err());
    }
}
