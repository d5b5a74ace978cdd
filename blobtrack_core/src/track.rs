//! A single persistent track: identity, filter and bounded history.

use crate::kalman::{DiscreteKalmanFilter, StepOutcome};
use crate::layout::{self, MeasurementLayout, StateLayout};
use blobtrack_env::TrackEstimate;
use nalgebra::{DVector, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Track identifier, assigned sequentially and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Sequence number and timestamp of the frame being processed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameHeader {
    pub seq: u64,
    pub stamp: f64,
}

/// One tracked object.
///
/// Histories are ring buffers of at most `history_len` entries, most recent
/// last. State history and frame stamps are pushed together every frame, so
/// their lengths are always equal. Persistence counts every frame the track
/// has existed, independently of the buffer length.
#[derive(Debug, Clone)]
pub struct Track {
    id: TrackId,
    filter: DiscreteKalmanFilter,
    states: VecDeque<DVector<f64>>,
    measurements: VecDeque<DVector<f64>>,
    frames: VecDeque<u64>,
    timestamps: VecDeque<f64>,
    persistence: u64,
    history_len: usize,
}

impl Track {
    /// Creates a track from its birth measurement.
    ///
    /// The filter must already be initialized at the state built from that
    /// measurement; no filter step runs in the birth frame.
    pub fn new(
        id: TrackId,
        filter: DiscreteKalmanFilter,
        measurement: DVector<f64>,
        header: FrameHeader,
        history_len: usize,
    ) -> Self {
        let history_len = history_len.max(1);
        let mut track = Self {
            id,
            states: VecDeque::with_capacity(history_len.min(64)),
            measurements: VecDeque::with_capacity(history_len.min(64)),
            frames: VecDeque::with_capacity(history_len.min(64)),
            timestamps: VecDeque::with_capacity(history_len.min(64)),
            persistence: 0,
            history_len,
            filter,
        };
        let state = track.filter.state().clone();
        track.record_frame(state, header);
        push_bounded(&mut track.measurements, measurement, history_len);
        track
    }

    /// Advances the track by exactly one frame.
    ///
    /// With a measurement the filter predicts and corrects; without one it
    /// only predicts. The measurement is recorded only if it was actually
    /// applied (a degraded step leaves the measurement history untouched).
    pub fn advance(&mut self, measurement: Option<DVector<f64>>, header: FrameHeader) -> StepOutcome {
        let step = self.filter.predict_and_update(measurement.as_ref());

        if step.outcome.is_corrected() {
            if let Some(z) = measurement {
                push_bounded(&mut self.measurements, z, self.history_len);
            }
        }
        self.record_frame(step.state, header);

        step.outcome
    }

    fn record_frame(&mut self, state: DVector<f64>, header: FrameHeader) {
        push_bounded(&mut self.states, state, self.history_len);
        push_bounded(&mut self.frames, header.seq, self.history_len);
        push_bounded(&mut self.timestamps, header.stamp, self.history_len);
        self.persistence += 1;
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    /// Number of frames this track has existed.
    pub fn persistence(&self) -> u64 {
        self.persistence
    }

    pub fn filter(&self) -> &DiscreteKalmanFilter {
        &self.filter
    }

    /// Current state estimate.
    pub fn state(&self) -> &DVector<f64> {
        self.filter.state()
    }

    pub fn position(&self) -> Vector3<f64> {
        layout::position(self.state())
    }

    pub fn velocity(&self) -> Vector3<f64> {
        layout::velocity(self.state())
    }

    pub fn size(&self) -> f64 {
        self.state()[StateLayout::SIZE]
    }

    pub fn angle(&self) -> f64 {
        self.state()[StateLayout::ANGLE]
    }

    /// Most recently applied measurement.
    pub fn last_measurement(&self) -> Option<&DVector<f64>> {
        self.measurements.back()
    }

    /// Sequence number of the last frame this track was advanced in.
    pub fn last_frame(&self) -> Option<u64> {
        self.frames.back().copied()
    }

    pub fn state_history(&self) -> &VecDeque<DVector<f64>> {
        &self.states
    }

    pub fn measurement_history(&self) -> &VecDeque<DVector<f64>> {
        &self.measurements
    }

    pub fn frame_stamps(&self) -> &VecDeque<u64> {
        &self.frames
    }

    pub fn timestamps(&self) -> &VecDeque<f64> {
        &self.timestamps
    }

    /// Measurement-space covariance figure-of-merit.
    pub fn covariance_figure(&self) -> f64 {
        self.filter.covariance_figure()
    }

    /// Renders the published estimate of this track.
    pub fn to_estimate(&self) -> TrackEstimate {
        let p = self.position();
        let v = self.velocity();
        let measurement = self
            .last_measurement()
            .map(|z| [z[MeasurementLayout::X], z[MeasurementLayout::Y], 0.0])
            .unwrap_or([0.0; 3]);

        TrackEstimate {
            objid: self.id.0,
            position: [p.x, p.y, p.z],
            velocity: [v.x, v.y, v.z],
            angle: self.angle(),
            size: self.size(),
            measurement,
            covariance: self.covariance_figure(),
            persistence: self.persistence,
        }
    }
}

fn push_bounded<T>(buf: &mut VecDeque<T>, item: T, cap: usize) {
    if buf.len() >= cap {
        buf.pop_front();
    }
    buf.push_back(item);
}
