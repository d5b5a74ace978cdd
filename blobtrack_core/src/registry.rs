//! Track registry and lifecycle: birth, propagation, pruning and snapshots.
//!
//! The registry exclusively owns every `Track`. Tracks move through
//! `spawned → active → destroyed`; destruction is final and ids are never
//! handed out twice.

use crate::association::Association;
use crate::config::TrackerConfig;
use crate::kalman::{DiscreteKalmanFilter, FilterError, KalmanModel, StepOutcome};
use crate::layout::initial_state;
use crate::track::{FrameHeader, Track, TrackId};
use blobtrack_env::FrameSnapshot;
use nalgebra::DVector;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// What `apply_frame` did, per track.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    /// Tracks corrected with a measurement
    pub corrected: Vec<TrackId>,

    /// Tracks propagated without a measurement
    pub propagated: Vec<TrackId>,

    /// Tracks whose correction failed and fell back to predict-only
    pub degraded: Vec<(TrackId, FilterError)>,

    /// Tracks spawned this frame
    pub born: Vec<TrackId>,
}

/// Owner of all live tracks.
pub struct TrackRegistry {
    /// All live tracks, keyed by id
    tracks: BTreeMap<TrackId, Track>,

    /// Next id to hand out
    next_id: u64,

    /// Tracks born in the current frame; exempt from this frame's limits
    newborn: BTreeSet<TrackId>,

    /// Shared model for newborn filters
    model: Arc<KalmanModel>,

    max_tracked_objects: usize,
    max_covariance: Option<f64>,
    history_len: usize,
}

impl TrackRegistry {
    /// Creates an empty registry.
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            tracks: BTreeMap::new(),
            next_id: 0,
            newborn: BTreeSet::new(),
            model: Arc::clone(&config.model),
            max_tracked_objects: config.max_tracked_objects,
            max_covariance: config.max_covariance,
            history_len: config.history_len,
        }
    }

    // ========================================================================
    // ORDERING
    // ========================================================================

    /// All tracks ordered by persistence (descending), ties by lower id.
    pub fn ranked(&self) -> Vec<&Track> {
        let mut ranked: Vec<&Track> = self.tracks.values().collect();
        // BTreeMap iteration is id-ascending and the sort is stable, so ties
        // keep the lower id first.
        ranked.sort_by(|a, b| b.persistence().cmp(&a.persistence()));
        ranked
    }

    /// Ids in ranked order.
    pub fn ranked_ids(&self) -> Vec<TrackId> {
        self.ranked().into_iter().map(Track::id).collect()
    }

    // ========================================================================
    // FRAME APPLICATION
    // ========================================================================

    /// Applies one frame's association result.
    ///
    /// Matched tracks are corrected, unmatched tracks are propagated, and
    /// every birth candidate becomes a new track. `measurements` must be the
    /// same list the association was computed against. A track listed more
    /// than once is advanced only for its first entry.
    pub fn apply_frame(
        &mut self,
        association: &Association,
        measurements: &[DVector<f64>],
        header: FrameHeader,
    ) -> ApplyReport {
        let mut report = ApplyReport::default();
        let mut advanced = HashSet::new();
        self.newborn.clear();

        for &(id, idx) in &association.matched {
            if !advanced.insert(id) {
                warn!(track = %id, frame = header.seq, "track already advanced this frame");
                continue;
            }
            let (Some(track), Some(z)) = (self.tracks.get_mut(&id), measurements.get(idx)) else {
                warn!(track = %id, detection = idx, "association refers to unknown track or detection");
                continue;
            };
            match track.advance(Some(z.clone()), header) {
                StepOutcome::Corrected => report.corrected.push(id),
                StepOutcome::Degraded(err) => {
                    warn!(track = %id, frame = header.seq, error = %err, "correction skipped, propagating");
                    report.degraded.push((id, err));
                }
                StepOutcome::Predicted => report.propagated.push(id),
            }
        }

        for &id in &association.unmatched_tracks {
            if !advanced.insert(id) {
                warn!(track = %id, frame = header.seq, "track already advanced this frame");
                continue;
            }
            if let Some(track) = self.tracks.get_mut(&id) {
                track.advance(None, header);
                report.propagated.push(id);
            }
        }

        for &idx in &association.births {
            let Some(z) = measurements.get(idx) else {
                continue;
            };
            match self.spawn(z.clone(), header) {
                Ok(id) => {
                    self.newborn.insert(id);
                    report.born.push(id);
                }
                Err(err) => warn!(detection = idx, error = %err, "failed to spawn track"),
            }
        }

        report
    }

    /// Creates a track from a measurement and returns its id.
    pub fn spawn(&mut self, measurement: DVector<f64>, header: FrameHeader) -> Result<TrackId, FilterError> {
        let filter = DiscreteKalmanFilter::new(Arc::clone(&self.model), initial_state(&measurement))?;
        let id = TrackId(self.next_id);
        self.next_id += 1;

        let track = Track::new(id, filter, measurement, header, self.history_len);
        debug!(track = %id, frame = header.seq, "track spawned");
        self.tracks.insert(id, track);

        Ok(id)
    }

    // ========================================================================
    // LIFECYCLE LIMITS
    // ========================================================================

    /// Destroys tracks ranked beyond `max_tracked_objects`, then (if
    /// configured) tracks whose covariance figure exceeds `max_covariance`.
    ///
    /// Tracks born by the last `apply_frame` are not ranked and cannot be
    /// destroyed until the next frame's evaluation.
    ///
    /// Returns the destroyed ids in ranked order.
    pub fn enforce_limits(&mut self) -> Vec<TrackId> {
        let ranked: Vec<TrackId> = self
            .ranked_ids()
            .into_iter()
            .filter(|id| !self.newborn.contains(id))
            .collect();
        let mut destroyed: Vec<TrackId> = ranked
            .iter()
            .skip(self.max_tracked_objects)
            .copied()
            .collect();

        if let Some(max_cov) = self.max_covariance {
            destroyed.extend(
                ranked
                    .iter()
                    .take(self.max_tracked_objects)
                    .filter(|id| {
                        self.tracks
                            .get(id)
                            .map(|t| t.covariance_figure() > max_cov)
                            .unwrap_or(false)
                    })
                    .copied(),
            );
        }

        for id in &destroyed {
            if let Some(track) = self.tracks.remove(id) {
                debug!(track = %id, persistence = track.persistence(), "track destroyed");
            }
        }

        destroyed
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    /// Ordered snapshot of every live track.
    pub fn snapshot(&self, header: FrameHeader) -> FrameSnapshot {
        FrameSnapshot {
            seq: header.seq,
            stamp: header.stamp,
            tracks: self.ranked().into_iter().map(Track::to_estimate).collect(),
        }
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    /// Iterates tracks in id order.
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// The id the next spawned track will receive.
    pub fn next_id(&self) -> TrackId {
        TrackId(self.next_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::measurement_vector;
    use blobtrack_env::Detection;
    use proptest::prelude::*;

    fn header(seq: u64) -> FrameHeader {
        FrameHeader {
            seq,
            stamp: seq as f64,
        }
    }

    fn z(x: f64, y: f64) -> DVector<f64> {
        measurement_vector(&Detection::new(x, y, 5.0, 0.0))
    }

    fn registry(max_tracked_objects: usize) -> TrackRegistry {
        TrackRegistry::new(&TrackerConfig {
            max_tracked_objects,
            ..Default::default()
        })
    }

    /// Spawns a track and propagates it until it reaches `persistence`.
    fn grow(reg: &mut TrackRegistry, x: f64, persistence: u64) -> TrackId {
        let id = reg.spawn(z(x, 0.0), header(0)).unwrap();
        for seq in 1..persistence {
            let association = Association {
                unmatched_tracks: vec![id],
                ..Default::default()
            };
            reg.apply_frame(&association, &[], header(seq));
        }
        id
    }

    #[test]
    fn test_spawn_assigns_sequential_ids() {
        let mut reg = registry(10);
        let a = reg.spawn(z(0.0, 0.0), header(0)).unwrap();
        let b = reg.spawn(z(5.0, 0.0), header(0)).unwrap();
        assert_eq!((a, b), (TrackId(0), TrackId(1)));
        assert_eq!(reg.next_id(), TrackId(2));
    }

    #[test]
    fn test_apply_frame_births_and_propagation() {
        let mut reg = registry(10);
        let existing = reg.spawn(z(0.0, 0.0), header(0)).unwrap();

        let association = Association {
            matched: vec![],
            unmatched_tracks: vec![existing],
            births: vec![0],
        };
        let report = reg.apply_frame(&association, &[z(50.0, 50.0)], header(1));

        assert_eq!(report.propagated, vec![existing]);
        assert_eq!(report.born, vec![TrackId(1)]);
        assert_eq!(reg.len(), 2);

        let track = reg.get(existing).unwrap();
        assert_eq!(track.persistence(), 2);
        assert_eq!(track.measurement_history().len(), 1);
        assert_eq!(track.frame_stamps().iter().copied().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_apply_frame_correction() {
        let mut reg = registry(10);
        let id = reg.spawn(z(0.0, 0.0), header(0)).unwrap();

        let association = Association {
            matched: vec![(id, 0)],
            ..Default::default()
        };
        let report = reg.apply_frame(&association, &[z(0.5, 0.0)], header(1));

        assert_eq!(report.corrected, vec![id]);
        assert_eq!(reg.get(id).unwrap().measurement_history().len(), 2);
    }

    #[test]
    fn test_capacity_keeps_most_persistent() {
        let mut reg = registry(1);
        let old = grow(&mut reg, 0.0, 5);
        let young = grow(&mut reg, 100.0, 3);

        let destroyed = reg.enforce_limits();

        assert_eq!(destroyed, vec![young]);
        assert_eq!(reg.len(), 1);
        assert!(reg.get(old).is_some());
    }

    #[test]
    fn test_capacity_ties_break_on_lower_id() {
        let mut reg = registry(2);
        let a = reg.spawn(z(0.0, 0.0), header(0)).unwrap();
        let b = reg.spawn(z(10.0, 0.0), header(0)).unwrap();
        let c = reg.spawn(z(20.0, 0.0), header(0)).unwrap();

        let destroyed = reg.enforce_limits();

        assert_eq!(destroyed, vec![c]);
        assert_eq!(reg.ranked_ids(), vec![a, b]);
    }

    #[test]
    fn test_max_covariance_destroys_uncertain_tracks() {
        let mut reg = TrackRegistry::new(&TrackerConfig {
            max_covariance: Some(15.0),
            ..Default::default()
        });
        // Figure-of-merit starts at 10 and grows with every predict-only step.
        let stale = grow(&mut reg, 0.0, 4);
        let fresh = reg.spawn(z(100.0, 0.0), header(3)).unwrap();

        let destroyed = reg.enforce_limits();

        assert_eq!(destroyed, vec![stale]);
        assert!(reg.get(fresh).is_some());
    }

    #[test]
    fn test_newborns_exempt_until_next_frame() {
        let mut reg = registry(1);
        let old = grow(&mut reg, 0.0, 3);

        let association = Association {
            unmatched_tracks: vec![old],
            births: vec![0],
            ..Default::default()
        };
        let report = reg.apply_frame(&association, &[z(200.0, 0.0)], header(3));
        let newcomer = report.born[0];

        assert!(reg.enforce_limits().is_empty());
        assert_eq!(reg.ranked_ids(), vec![old, newcomer]);

        let association = Association {
            unmatched_tracks: vec![old, newcomer],
            ..Default::default()
        };
        reg.apply_frame(&association, &[], header(4));
        assert_eq!(reg.enforce_limits(), vec![newcomer]);
        assert_eq!(reg.ranked_ids(), vec![old]);
    }

    #[test]
    fn test_track_advanced_once_per_frame() {
        let mut reg = registry(10);
        let id = reg.spawn(z(0.0, 0.0), header(0)).unwrap();

        let association = Association {
            matched: vec![(id, 0), (id, 1)],
            unmatched_tracks: vec![id],
            births: vec![],
        };
        let report = reg.apply_frame(&association, &[z(0.5, 0.0), z(0.6, 0.0)], header(1));

        assert_eq!(report.corrected, vec![id]);
        assert!(report.propagated.is_empty());
        let track = reg.get(id).unwrap();
        assert_eq!(track.persistence(), 2);
        assert_eq!(track.state_history().len(), 2);
        assert_eq!(track.measurement_history().len(), 2);
    }

    #[test]
    fn test_snapshot_order_and_header() {
        let mut reg = registry(10);
        let young = reg.spawn(z(0.0, 0.0), header(0)).unwrap();
        let old = grow(&mut reg, 50.0, 3);

        let snapshot = reg.snapshot(header(2));

        assert_eq!(snapshot.seq, 2);
        let ids: Vec<u64> = snapshot.tracks.iter().map(|t| t.objid).collect();
        assert_eq!(ids, vec![old.0, young.0]);
    }

    proptest! {
        #[test]
        fn prop_ids_never_reused(spawns in proptest::collection::vec(1usize..4, 1..12), cap in 1usize..4) {
            let mut reg = registry(cap);
            let mut seen = std::collections::HashSet::new();

            for (seq, count) in spawns.into_iter().enumerate() {
                let seq = seq as u64;
                let association = Association {
                    unmatched_tracks: reg.ranked_ids(),
                    births: (0..count).collect(),
                    ..Default::default()
                };
                let measurements: Vec<_> = (0..count).map(|i| z(i as f64 * 100.0, seq as f64)).collect();
                let report = reg.apply_frame(&association, &measurements, header(seq));
                for id in &report.born {
                    prop_assert!(seen.insert(*id), "id {} handed out twice", id);
                }
                let destroyed = reg.enforce_limits();
                for id in &report.born {
                    prop_assert!(!destroyed.contains(id));
                }
                prop_assert!(reg.len() <= cap + report.born.len());
            }
        }

        #[test]
        fn prop_history_lengths_match(frames in 1u64..40, history_len in 1usize..8) {
            let mut reg = TrackRegistry::new(&TrackerConfig {
                history_len,
                ..Default::default()
            });
            let id = reg.spawn(z(0.0, 0.0), header(0)).unwrap();
            for seq in 1..frames {
                let association = if seq % 2 == 0 {
                    Association { matched: vec![(id, 0)], ..Default::default() }
                } else {
                    Association { unmatched_tracks: vec![id], ..Default::default() }
                };
                reg.apply_frame(&association, &[z(0.1 * seq as f64, 0.0)], header(seq));

                let track = reg.get(id).unwrap();
                prop_assert_eq!(track.state_history().len(), track.frame_stamps().len());
                prop_assert_eq!(track.frame_stamps().len(), track.timestamps().len());
                prop_assert_eq!(track.persistence(), seq + 1);
            }
        }

        #[test]
        fn prop_ranking_is_ordered(persistences in proptest::collection::vec(1u64..6, 1..8)) {
            let mut reg = registry(100);
            for (i, p) in persistences.iter().enumerate() {
                grow(&mut reg, i as f64 * 100.0, *p);
            }

            let ranked = reg.ranked();
            for pair in ranked.windows(2) {
                prop_assert!(pair[0].persistence() >= pair[1].persistence());
                if pair[0].persistence() == pair[1].persistence() {
                    prop_assert!(pair[0].id() < pair[1].id());
                }
            }
        }
    }
}
