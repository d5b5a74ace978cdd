//! The association engine - greedy, persistence-ordered data association
//!
//! For every live track (most persistent first) this module:
//! 1. Scores each still-unclaimed detection against the track's predicted measurement
//! 2. Gates the scores by a multiple of the track's covariance
//! 3. Claims the closest detection that passes the gate
//!
//! Detections nobody claims become birth candidates; tracks that claim
//! nothing are propagated without a measurement.

use crate::track::{Track, TrackId};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Distance used to compare a detection with a track's prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationMetric {
    /// ‖a ∘ (z − Hx̄)‖ gated at `n · sqrt(figure-of-merit)`
    #[default]
    Weighted,

    /// sqrt((z − Hx̄)ᵀ S⁻¹ (z − Hx̄)) gated at `n`
    Mahalanobis,
}

/// Outcome of associating one frame.
///
/// Detections are referred to by their index in the frame's measurement list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Association {
    /// (track, detection index) pairs, in the order tracks claimed them
    pub matched: Vec<(TrackId, usize)>,

    /// Tracks that claimed no detection this frame
    pub unmatched_tracks: Vec<TrackId>,

    /// Detection indices nobody claimed, ascending
    pub births: Vec<usize>,
}

/// Greedy nearest-detection associator.
#[derive(Debug, Clone)]
pub struct Associator {
    metric: AssociationMetric,
    n_covariances: f64,
}

impl Associator {
    pub fn new(metric: AssociationMetric, n_covariances: f64) -> Self {
        Self {
            metric,
            n_covariances,
        }
    }

    pub fn metric(&self) -> AssociationMetric {
        self.metric
    }

    /// Distance between a track's predicted measurement and `z`.
    ///
    /// Returns `None` if the distance cannot be computed (singular
    /// innovation covariance or non-finite result).
    pub fn distance(&self, track: &Track, z: &DVector<f64>) -> Option<f64> {
        let filter = track.filter();
        let residual = z - filter.predicted_measurement();

        let d = match self.metric {
            AssociationMetric::Weighted => {
                residual.component_mul(filter.model().association()).norm()
            }
            AssociationMetric::Mahalanobis => {
                let s_inv = filter.innovation_covariance().cholesky()?.inverse();
                let d_squared = (residual.transpose() * s_inv * &residual)[(0, 0)];
                d_squared.max(0.0).sqrt()
            }
        };

        d.is_finite().then_some(d)
    }

    /// Largest distance at which `track` may still claim a detection.
    pub fn gate(&self, track: &Track) -> f64 {
        match self.metric {
            AssociationMetric::Weighted => self.n_covariances * track.covariance_figure().sqrt(),
            AssociationMetric::Mahalanobis => self.n_covariances,
        }
    }

    /// Associates one frame.
    ///
    /// `tracks` must already be in persistence order (most persistent first);
    /// earlier tracks claim detections before later ones. Each track and
    /// each detection is used at most once.
    pub fn associate(&self, tracks: &[&Track], measurements: &[DVector<f64>]) -> Association {
        let mut claimed = vec![false; measurements.len()];
        let mut association = Association::default();

        for track in tracks {
            let gate = self.gate(track);

            let best = measurements
                .iter()
                .enumerate()
                .filter(|(idx, _)| !claimed[*idx])
                .filter_map(|(idx, z)| self.distance(track, z).map(|d| (idx, d)))
                .filter(|(_, d)| *d <= gate)
                .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));

            match best {
                Some((idx, _)) => {
                    claimed[idx] = true;
                    association.matched.push((track.id(), idx));
                }
                None => association.unmatched_tracks.push(track.id()),
            }
        }

        association.births = claimed
            .iter()
            .enumerate()
            .filter_map(|(idx, taken)| (!taken).then_some(idx))
            .collect();

        association
    }
}
