//! Synthetic tracking scenarios.

use nalgebra::Vector2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::ops::Range;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// One slow blob, clean detections
    SingleBlob,

    /// One blob that disappears for several frames and returns
    Dropout,

    /// Two blobs passing each other on parallel lanes
    Crossing,

    /// A grid of drifting blobs with random misses
    Crowd,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::SingleBlob,
            ScenarioId::Dropout,
            ScenarioId::Crossing,
            ScenarioId::Crowd,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::SingleBlob => "single_blob",
            ScenarioId::Dropout => "dropout",
            ScenarioId::Crossing => "crossing",
            ScenarioId::Crowd => "crowd",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::SingleBlob => "one blob at constant velocity, identity must hold",
            ScenarioId::Dropout => "three-frame blackout, the same track must reacquire",
            ScenarioId::Crossing => "two blobs pass 20 units apart without swapping ids",
            ScenarioId::Crowd => "eight drifting blobs with 10% misses under capacity",
        }
    }

    /// Builds the ground truth layout for this scenario.
    ///
    /// Only `Crowd` draws from the seed.
    pub fn plan(&self, seed: u64) -> ScenarioPlan {
        match self {
            ScenarioId::SingleBlob => ScenarioPlan {
                blobs: vec![BlobPlan::new([20.0, 30.0], [0.5, 0.25], 12.0, 0.3)],
                ..ScenarioPlan::default()
            },
            ScenarioId::Dropout => ScenarioPlan {
                blobs: vec![BlobPlan::new([50.0, 50.0], [0.4, 0.0], 10.0, 0.0)],
                blackout: Some(10..13),
                ..ScenarioPlan::default()
            },
            ScenarioId::Crossing => ScenarioPlan {
                blobs: vec![
                    BlobPlan::new([0.0, 0.0], [0.5, 0.0], 10.0, 0.0),
                    BlobPlan::new([40.0, 20.0], [-0.5, 0.0], 14.0, 1.0),
                ],
                ..ScenarioPlan::default()
            },
            ScenarioId::Crowd => {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let blobs = (0..8)
                    .map(|i| {
                        let cell = [(i % 4) as f64 * 60.0, (i / 4) as f64 * 60.0];
                        let velocity = [rng.gen_range(-0.3..0.3), rng.gen_range(-0.3..0.3)];
                        BlobPlan::new(cell, velocity, rng.gen_range(5.0..20.0), rng.gen_range(0.0..3.0))
                    })
                    .collect();
                ScenarioPlan {
                    blobs,
                    miss_probability: 0.1,
                    max_id_switches: 1,
                    ..ScenarioPlan::default()
                }
            }
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single_blob" | "singleblob" | "single" => Ok(ScenarioId::SingleBlob),
            "dropout" => Ok(ScenarioId::Dropout),
            "crossing" => Ok(ScenarioId::Crossing),
            "crowd" => Ok(ScenarioId::Crowd),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

/// Initial conditions of one ground truth blob.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobPlan {
    pub position: Vector2<f64>,
    pub velocity: Vector2<f64>,
    pub area: f64,
    pub angle: f64,
}

impl BlobPlan {
    pub fn new(position: [f64; 2], velocity: [f64; 2], area: f64, angle: f64) -> Self {
        Self {
            position: Vector2::new(position[0], position[1]),
            velocity: Vector2::new(velocity[0], velocity[1]),
            area,
            angle,
        }
    }
}

/// Everything the runner needs to drive one scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioPlan {
    pub blobs: Vec<BlobPlan>,

    /// Position noise standard deviation
    pub noise_std: f64,

    /// Per-blob miss probability
    pub miss_probability: f64,

    /// Frames in which nothing is detected
    pub blackout: Option<Range<u64>>,

    /// Pass criterion: tolerated identity changes
    pub max_id_switches: usize,

    /// Pass criterion: RMS position error bound
    pub rms_threshold: f64,
}

impl Default for ScenarioPlan {
    fn default() -> Self {
        Self {
            blobs: Vec::new(),
            noise_std: 0.5,
            miss_probability: 0.0,
            blackout: None,
            max_id_switches: 0,
            rms_threshold: 5.0,
        }
    }
}

impl ScenarioPlan {
    pub fn in_blackout(&self, seq: u64) -> bool {
        self.blackout.as_ref().is_some_and(|r| r.contains(&seq))
    }
}
