//! The filter engine - discrete linear Kalman filter
//!
//! Every track owns one `DiscreteKalmanFilter`. All filters share a single
//! immutable `KalmanModel` (Φ, Γ, H, Γw, Q, R, P0 and the association
//! weighting vector) loaded once at startup.

use crate::config::ConfigError;
use crate::layout::{MEASUREMENT_DIM, STATE_DIM};
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;

/// Validated, immutable model matrices shared by every track's filter.
#[derive(Debug, Clone)]
pub struct KalmanModel {
    /// State transition Φ (n×n)
    phi: DMatrix<f64>,

    /// Control input matrix Γ (n×k). No control input is applied by the tracker.
    gamma: DMatrix<f64>,

    /// Measurement matrix H (m×n)
    h: DMatrix<f64>,

    /// Process noise shaping Γw (n×q)
    gamma_w: DMatrix<f64>,

    /// Process noise covariance Q (q×q)
    q: DMatrix<f64>,

    /// Measurement noise covariance R (m×m)
    r: DMatrix<f64>,

    /// Initial covariance for newborn tracks P0 (n×n)
    p0: DMatrix<f64>,

    /// Association weighting vector (length m), unit L2 norm
    association: DVector<f64>,

    /// Cached Γw Q Γwᵀ
    process_noise: DMatrix<f64>,
}

impl KalmanModel {
    /// Validates shapes and values, normalizes the association vector and
    /// precomputes the shaped process noise.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        phi: DMatrix<f64>,
        gamma: DMatrix<f64>,
        h: DMatrix<f64>,
        gamma_w: DMatrix<f64>,
        q: DMatrix<f64>,
        r: DMatrix<f64>,
        p0: DMatrix<f64>,
        association: DVector<f64>,
    ) -> Result<Self, ConfigError> {
        expect_shape("phi", &phi, STATE_DIM, STATE_DIM)?;
        expect_shape("gamma", &gamma, STATE_DIM, gamma.ncols())?;
        expect_shape("h", &h, MEASUREMENT_DIM, STATE_DIM)?;
        expect_shape("gamma_w", &gamma_w, STATE_DIM, gamma_w.ncols())?;
        expect_shape("q", &q, gamma_w.ncols(), gamma_w.ncols())?;
        expect_shape("r", &r, MEASUREMENT_DIM, MEASUREMENT_DIM)?;
        expect_shape("p0", &p0, STATE_DIM, STATE_DIM)?;

        for (name, m) in [
            ("phi", &phi),
            ("gamma", &gamma),
            ("h", &h),
            ("gamma_w", &gamma_w),
            ("q", &q),
            ("r", &r),
            ("p0", &p0),
        ] {
            if !m.iter().all(|v| v.is_finite()) {
                return Err(ConfigError::NonFinite(name));
            }
        }

        if association.len() != MEASUREMENT_DIM {
            return Err(ConfigError::Shape {
                name: "association_matrix",
                expected: (MEASUREMENT_DIM, 1),
                actual: (association.len(), 1),
            });
        }
        if !association.iter().all(|v| v.is_finite()) {
            return Err(ConfigError::NonFinite("association_matrix"));
        }
        let norm = association.norm();
        if norm < 1e-12 {
            return Err(ConfigError::ZeroAssociation);
        }
        let association = association / norm;

        let process_noise = &gamma_w * &q * gamma_w.transpose();

        Ok(Self {
            phi,
            gamma,
            h,
            gamma_w,
            q,
            r,
            p0,
            association,
            process_noise,
        })
    }

    /// Constant-velocity model for every state pair (x, y, z, size, angle).
    ///
    /// P0 = `p0_scale`·I, Q = `q_scale`·I (Γw = I), R = `r_scale`·I and the
    /// association weights select x and y only.
    pub fn constant_velocity(dt: f64, q_scale: f64, r_scale: f64, p0_scale: f64) -> Result<Self, ConfigError> {
        let mut phi = DMatrix::identity(STATE_DIM, STATE_DIM);
        for pair in 0..STATE_DIM / 2 {
            phi[(2 * pair, 2 * pair + 1)] = dt;
        }

        let mut h = DMatrix::zeros(MEASUREMENT_DIM, STATE_DIM);
        for row in 0..MEASUREMENT_DIM {
            h[(row, 2 * row)] = 1.0;
        }

        Self::new(
            phi,
            DMatrix::zeros(STATE_DIM, 1),
            h,
            DMatrix::identity(STATE_DIM, STATE_DIM),
            DMatrix::identity(STATE_DIM, STATE_DIM) * q_scale,
            DMatrix::identity(MEASUREMENT_DIM, MEASUREMENT_DIM) * r_scale,
            DMatrix::identity(STATE_DIM, STATE_DIM) * p0_scale,
            DVector::from_vec(vec![1.0, 1.0, 0.0, 0.0, 0.0]),
        )
    }

    pub fn phi(&self) -> &DMatrix<f64> {
        &self.phi
    }

    pub fn gamma(&self) -> &DMatrix<f64> {
        &self.gamma
    }

    pub fn h(&self) -> &DMatrix<f64> {
        &self.h
    }

    pub fn gamma_w(&self) -> &DMatrix<f64> {
        &self.gamma_w
    }

    pub fn q(&self) -> &DMatrix<f64> {
        &self.q
    }

    pub fn r(&self) -> &DMatrix<f64> {
        &self.r
    }

    pub fn p0(&self) -> &DMatrix<f64> {
        &self.p0
    }

    /// Normalized association weighting vector.
    pub fn association(&self) -> &DVector<f64> {
        &self.association
    }

    /// Γw Q Γwᵀ
    pub fn process_noise(&self) -> &DMatrix<f64> {
        &self.process_noise
    }
}

fn expect_shape(name: &'static str, m: &DMatrix<f64>, rows: usize, cols: usize) -> Result<(), ConfigError> {
    if m.nrows() != rows || m.ncols() != cols || m.is_empty() {
        return Err(ConfigError::Shape {
            name,
            expected: (rows, cols),
            actual: (m.nrows(), m.ncols()),
        });
    }
    Ok(())
}

/// Numeric failures inside a single filter step.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterError {
    #[error("Innovation covariance is singular or not positive definite")]
    SingularInnovation,

    #[error("Measurement has {actual} components, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Correction produced a non-finite state or covariance")]
    NonFinite,
}

/// How a filter step ended.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Predict followed by a measurement correction
    Corrected,

    /// Predict only, no measurement was offered
    Predicted,

    /// A measurement was offered but the correction failed; predict only
    Degraded(FilterError),
}

impl StepOutcome {
    /// True if a measurement was folded into the estimate.
    pub fn is_corrected(&self) -> bool {
        matches!(self, StepOutcome::Corrected)
    }

    /// True if the correction was skipped because of a numeric failure.
    pub fn is_degraded(&self) -> bool {
        matches!(self, StepOutcome::Degraded(_))
    }
}

/// Result of one `predict_and_update` call.
#[derive(Debug, Clone)]
pub struct FilterStep {
    /// Posterior (or propagated) state
    pub state: DVector<f64>,

    /// Posterior (or propagated) covariance
    pub covariance: DMatrix<f64>,

    /// Kalman gain, present only for corrected steps
    pub gain: Option<DMatrix<f64>>,

    pub outcome: StepOutcome,
}

/// Discrete linear Kalman filter for a single object.
///
/// Keeps only the current state and covariance; history lives in the track.
#[derive(Debug, Clone)]
pub struct DiscreteKalmanFilter {
    model: Arc<KalmanModel>,
    state: DVector<f64>,
    covariance: DMatrix<f64>,
}

impl DiscreteKalmanFilter {
    /// Creates a filter at `x0` with the model's P0.
    pub fn new(model: Arc<KalmanModel>, x0: DVector<f64>) -> Result<Self, FilterError> {
        let covariance = model.p0().clone();
        Self::with_covariance(model, x0, covariance)
    }

    /// Creates a filter with an explicit initial covariance.
    pub fn with_covariance(
        model: Arc<KalmanModel>,
        x0: DVector<f64>,
        p0: DMatrix<f64>,
    ) -> Result<Self, FilterError> {
        if x0.len() != STATE_DIM {
            return Err(FilterError::DimensionMismatch {
                expected: STATE_DIM,
                actual: x0.len(),
            });
        }
        if p0.nrows() != STATE_DIM || p0.ncols() != STATE_DIM {
            return Err(FilterError::DimensionMismatch {
                expected: STATE_DIM,
                actual: p0.nrows(),
            });
        }
        Ok(Self {
            model,
            state: x0,
            covariance: p0,
        })
    }

    /// Runs one filter cycle.
    ///
    /// With a measurement: predict, then correct using
    /// K = P̄Hᵀ(HP̄Hᵀ + R)⁻¹ and the Joseph-form covariance update.
    /// Without one: predict only.
    ///
    /// If the correction fails numerically the predicted estimate is kept
    /// and the step is reported as `Degraded`; the filter stays usable.
    pub fn predict_and_update(&mut self, measurement: Option<&DVector<f64>>) -> FilterStep {
        let (x_bar, p_bar) = self.predict();

        let (gain, outcome) = match measurement {
            None => {
                self.state = x_bar;
                self.covariance = p_bar;
                (None, StepOutcome::Predicted)
            }
            Some(z) => match self.correct(&x_bar, &p_bar, z) {
                Ok((x, p, k)) => {
                    self.state = x;
                    self.covariance = p;
                    (Some(k), StepOutcome::Corrected)
                }
                Err(e) => {
                    self.state = x_bar;
                    self.covariance = p_bar;
                    (None, StepOutcome::Degraded(e))
                }
            },
        };

        FilterStep {
            state: self.state.clone(),
            covariance: self.covariance.clone(),
            gain,
            outcome,
        }
    }

    /// Predicted measurement H Φ x, without advancing the filter.
    pub fn predicted_measurement(&self) -> DVector<f64> {
        self.model.h() * (self.model.phi() * &self.state)
    }

    /// Predicted innovation covariance H P̄ Hᵀ + R, without advancing the filter.
    pub fn innovation_covariance(&self) -> DMatrix<f64> {
        let (_, p_bar) = self.predict();
        self.model.h() * p_bar * self.model.h().transpose() + self.model.r()
    }

    /// Scalar summary of measurement-space uncertainty: ‖(H P)ᵀ a‖.
    pub fn covariance_figure(&self) -> f64 {
        ((self.model.h() * &self.covariance).transpose() * self.model.association()).norm()
    }

    /// Current state estimate.
    pub fn state(&self) -> &DVector<f64> {
        &self.state
    }

    /// Current covariance estimate.
    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    pub fn model(&self) -> &KalmanModel {
        &self.model
    }

    // ========== Private Helper Methods ==========

    /// x̄ = Φx, P̄ = ΦPΦᵀ + ΓwQΓwᵀ
    fn predict(&self) -> (DVector<f64>, DMatrix<f64>) {
        let phi = self.model.phi();
        let x_bar = phi * &self.state;
        let p_bar = phi * &self.covariance * phi.transpose() + self.model.process_noise();
        (x_bar, p_bar)
    }

    fn correct(
        &self,
        x_bar: &DVector<f64>,
        p_bar: &DMatrix<f64>,
        z: &DVector<f64>,
    ) -> Result<(DVector<f64>, DMatrix<f64>, DMatrix<f64>), FilterError> {
        let h = self.model.h();
        let r = self.model.r();

        if z.len() != h.nrows() {
            return Err(FilterError::DimensionMismatch {
                expected: h.nrows(),
                actual: z.len(),
            });
        }

        let innovation = z - h * x_bar;
        let s = h * p_bar * h.transpose() + r;
        let s_chol = s.cholesky().ok_or(FilterError::SingularInnovation)?;
        let k = p_bar * h.transpose() * s_chol.inverse();

        let x = x_bar + &k * innovation;

        // Joseph form: (I - KH) P̄ (I - KH)ᵀ + K R Kᵀ
        let ikh = DMatrix::identity(STATE_DIM, STATE_DIM) - &k * h;
        let p = &ikh * p_bar * ikh.transpose() + &k * r * k.transpose();

        if !x.iter().all(|v| v.is_finite()) || !p.iter().all(|v| v.is_finite()) {
            return Err(FilterError::NonFinite);
        }

        Ok((x, p, k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::StateLayout;
    use approx::assert_relative_eq;

    fn default_model() -> Arc<KalmanModel> {
        Arc::new(KalmanModel::constant_velocity(1.0, 0.2, 50.0, 10.0).unwrap())
    }

    fn state_at(x: f64, y: f64) -> DVector<f64> {
        let mut s = DVector::zeros(STATE_DIM);
        s[StateLayout::POSITION[0]] = x;
        s[StateLayout::POSITION[1]] = y;
        s
    }

    fn measurement_at(x: f64, y: f64) -> DVector<f64> {
        DVector::from_vec(vec![x, y, 0.0, 0.0, 0.0])
    }

    #[test]
    fn test_model_normalizes_association() {
        let model = default_model();
        assert_relative_eq!(model.association().norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(model.association()[0], 1.0 / 2f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_model_rejects_bad_shapes() {
        let result = KalmanModel::new(
            DMatrix::identity(9, 9),
            DMatrix::zeros(STATE_DIM, 1),
            DMatrix::zeros(MEASUREMENT_DIM, STATE_DIM),
            DMatrix::identity(STATE_DIM, STATE_DIM),
            DMatrix::identity(STATE_DIM, STATE_DIM),
            DMatrix::identity(MEASUREMENT_DIM, MEASUREMENT_DIM),
            DMatrix::identity(STATE_DIM, STATE_DIM),
            DVector::from_vec(vec![1.0, 1.0, 0.0, 0.0, 0.0]),
        );
        assert!(matches!(result, Err(ConfigError::Shape { name: "phi", .. })));
    }

    #[test]
    fn test_model_rejects_zero_association() {
        let model = KalmanModel::constant_velocity(1.0, 0.2, 50.0, 10.0).unwrap();
        let result = KalmanModel::new(
            model.phi().clone(),
            model.gamma().clone(),
            model.h().clone(),
            model.gamma_w().clone(),
            model.q().clone(),
            model.r().clone(),
            model.p0().clone(),
            DVector::zeros(MEASUREMENT_DIM),
        );
        assert!(matches!(result, Err(ConfigError::ZeroAssociation)));
    }

    #[test]
    fn test_predict_only_propagates_velocity() {
        let mut x0 = state_at(1.0, 2.0);
        x0[StateLayout::VELOCITY[0]] = 0.5;
        let mut filter = DiscreteKalmanFilter::new(default_model(), x0).unwrap();
        let before = filter.covariance().trace();

        let step = filter.predict_and_update(None);

        assert_eq!(step.outcome, StepOutcome::Predicted);
        assert!(step.gain.is_none());
        assert_relative_eq!(step.state[StateLayout::POSITION[0]], 1.5, epsilon = 1e-12);
        assert_relative_eq!(step.state[StateLayout::POSITION[1]], 2.0, epsilon = 1e-12);
        assert!(filter.covariance().trace() > before, "Prediction should grow uncertainty");
    }

    #[test]
    fn test_correction_pulls_toward_measurement() {
        let mut filter = DiscreteKalmanFilter::new(default_model(), state_at(0.0, 0.0)).unwrap();
        let predicted_trace = {
            let mut probe = filter.clone();
            probe.predict_and_update(None);
            probe.covariance().trace()
        };

        let step = filter.predict_and_update(Some(&measurement_at(10.0, 0.0)));

        assert!(step.outcome.is_corrected());
        let gain = step.gain.expect("corrected step carries a gain");
        assert_eq!(gain.shape(), (STATE_DIM, MEASUREMENT_DIM));

        let x = step.state[StateLayout::POSITION[0]];
        assert!(x > 0.0 && x < 10.0, "posterior x = {}", x);
        assert!(filter.covariance().trace() < predicted_trace);
    }

    #[test]
    fn test_singular_innovation_degrades_to_predict() {
        let zeros_model = KalmanModel::new(
            KalmanModel::constant_velocity(1.0, 0.0, 0.0, 0.0).unwrap().phi().clone(),
            DMatrix::zeros(STATE_DIM, 1),
            KalmanModel::constant_velocity(1.0, 0.0, 0.0, 0.0).unwrap().h().clone(),
            DMatrix::identity(STATE_DIM, STATE_DIM),
            DMatrix::zeros(STATE_DIM, STATE_DIM),
            DMatrix::zeros(MEASUREMENT_DIM, MEASUREMENT_DIM),
            DMatrix::zeros(STATE_DIM, STATE_DIM),
            DVector::from_vec(vec![1.0, 1.0, 0.0, 0.0, 0.0]),
        )
        .unwrap();
        let mut filter = DiscreteKalmanFilter::new(Arc::new(zeros_model), state_at(1.0, 1.0)).unwrap();

        let step = filter.predict_and_update(Some(&measurement_at(5.0, 5.0)));

        assert_eq!(step.outcome, StepOutcome::Degraded(FilterError::SingularInnovation));
        assert!(step.gain.is_none());
        assert_relative_eq!(filter.state()[StateLayout::POSITION[0]], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_wrong_measurement_length_degrades() {
        let mut filter = DiscreteKalmanFilter::new(default_model(), state_at(0.0, 0.0)).unwrap();
        let step = filter.predict_and_update(Some(&DVector::from_vec(vec![1.0, 2.0])));
        assert!(matches!(
            step.outcome,
            StepOutcome::Degraded(FilterError::DimensionMismatch { expected: 5, actual: 2 })
        ));
    }

    #[test]
    fn test_covariance_figure_initial_value() {
        // ‖(H · 10I)ᵀ a‖ = 10 ‖Hᵀ a‖ = 10 for a unit vector on the x/y rows
        let filter = DiscreteKalmanFilter::new(default_model(), state_at(0.0, 0.0)).unwrap();
        assert_relative_eq!(filter.covariance_figure(), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_queries_do_not_advance_filter() {
        let mut x0 = state_at(2.0, 3.0);
        x0[StateLayout::VELOCITY[1]] = 1.0;
        let filter = DiscreteKalmanFilter::new(default_model(), x0.clone()).unwrap();

        let z_hat = filter.predicted_measurement();
        let s = filter.innovation_covariance();

        assert_relative_eq!(z_hat[1], 4.0, epsilon = 1e-12);
        assert_eq!(s.shape(), (MEASUREMENT_DIM, MEASUREMENT_DIM));
        assert_eq!(filter.state(), &x0);
    }

    #[test]
    fn test_rejects_wrong_initial_state_length() {
        let result = DiscreteKalmanFilter::new(default_model(), DVector::zeros(4));
        assert!(matches!(result, Err(FilterError::DimensionMismatch { expected: 10, actual: 4 })));
    }
}
