//! Tracker configuration: model matrices and association/lifecycle limits.
//!
//! Loaded once at startup and immutable afterwards. Matrices are written in
//! JSON as arrays of rows:
//!
//! ```json
//! {
//!   "kalman": {
//!     "phi": [[1, 1, 0, ...], ...],
//!     "gamma": [[0], ...],
//!     "h": [[1, 0, ...], ...],
//!     "gamma_w": [[1, 0, ...], ...],
//!     "q": [[0.2, 0, ...], ...],
//!     "r": [[50, 0, ...], ...],
//!     "p0": [[10, 0, ...], ...],
//!     "association_matrix": [1, 1, 0, 0, 0]
//!   },
//!   "max_tracked_objects": 10,
//!   "n_covariances_to_reject_data": 3.0
//! }
//! ```

use crate::association::AssociationMetric;
use crate::kalman::KalmanModel;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default number of frames of state/measurement history kept per track.
pub const DEFAULT_HISTORY_LEN: usize = 100;

/// Raw model matrices as they appear in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KalmanParameters {
    pub phi: Vec<Vec<f64>>,
    pub gamma: Vec<Vec<f64>>,
    pub h: Vec<Vec<f64>>,
    pub gamma_w: Vec<Vec<f64>>,
    pub q: Vec<Vec<f64>>,
    pub r: Vec<Vec<f64>>,
    pub p0: Vec<Vec<f64>>,
    pub association_matrix: Vec<f64>,
}

impl KalmanParameters {
    /// Converts the row arrays into a validated model.
    pub fn into_model(self) -> Result<KalmanModel, ConfigError> {
        KalmanModel::new(
            matrix_from_rows("phi", &self.phi)?,
            matrix_from_rows("gamma", &self.gamma)?,
            matrix_from_rows("h", &self.h)?,
            matrix_from_rows("gamma_w", &self.gamma_w)?,
            matrix_from_rows("q", &self.q)?,
            matrix_from_rows("r", &self.r)?,
            matrix_from_rows("p0", &self.p0)?,
            DVector::from_vec(self.association_matrix),
        )
    }

    /// Writes a model back out as row arrays.
    pub fn from_model(model: &KalmanModel) -> Self {
        Self {
            phi: rows_of(model.phi()),
            gamma: rows_of(model.gamma()),
            h: rows_of(model.h()),
            gamma_w: rows_of(model.gamma_w()),
            q: rows_of(model.q()),
            r: rows_of(model.r()),
            p0: rows_of(model.p0()),
            association_matrix: model.association().iter().copied().collect(),
        }
    }
}

/// On-disk form of the full configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackerSettings {
    pub kalman: KalmanParameters,
    pub max_tracked_objects: usize,
    pub n_covariances_to_reject_data: f64,
    #[serde(default)]
    pub association_metric: AssociationMetric,
    #[serde(default = "default_history_len")]
    pub history_len: usize,
    #[serde(default)]
    pub max_covariance: Option<f64>,
}

fn default_history_len() -> usize {
    DEFAULT_HISTORY_LEN
}

/// Validated tracker configuration.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Shared model matrices (also carries the association weights)
    pub model: Arc<KalmanModel>,

    /// Tracks ranked beyond this many are destroyed every frame
    pub max_tracked_objects: usize,

    /// Gate multiplier applied to the track's covariance
    pub n_covariances_to_reject_data: f64,

    /// Distance used to score detection/track pairs
    pub association_metric: AssociationMetric,

    /// Ring buffer length for per-track histories
    pub history_len: usize,

    /// Optional figure-of-merit ceiling; tracks above it are destroyed
    pub max_covariance: Option<f64>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        let model = KalmanModel::constant_velocity(1.0, 0.2, 50.0, 10.0)
            .unwrap_or_else(|e| unreachable!("built-in model is well formed: {}", e));
        Self {
            model: Arc::new(model),
            max_tracked_objects: 10,
            n_covariances_to_reject_data: 3.0,
            association_metric: AssociationMetric::default(),
            history_len: DEFAULT_HISTORY_LEN,
            max_covariance: None,
        }
    }
}

impl TrackerConfig {
    /// Builds and validates a configuration from its on-disk form.
    pub fn from_settings(settings: TrackerSettings) -> Result<Self, ConfigError> {
        let config = Self {
            model: Arc::new(settings.kalman.into_model()?),
            max_tracked_objects: settings.max_tracked_objects,
            n_covariances_to_reject_data: settings.n_covariances_to_reject_data,
            association_metric: settings.association_metric,
            history_len: settings.history_len,
            max_covariance: settings.max_covariance,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let settings: TrackerSettings = serde_json::from_str(json)?;
        Self::from_settings(settings)
    }

    /// Loads a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Converts back to the on-disk form.
    pub fn to_settings(&self) -> TrackerSettings {
        TrackerSettings {
            kalman: KalmanParameters::from_model(&self.model),
            max_tracked_objects: self.max_tracked_objects,
            n_covariances_to_reject_data: self.n_covariances_to_reject_data,
            association_metric: self.association_metric,
            history_len: self.history_len,
            max_covariance: self.max_covariance,
        }
    }

    /// Checks the scalar limits. Model matrices are validated on construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tracked_objects == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_tracked_objects must be positive".to_string(),
            ));
        }
        if !(self.n_covariances_to_reject_data.is_finite() && self.n_covariances_to_reject_data > 0.0) {
            return Err(ConfigError::InvalidLimit(format!(
                "n_covariances_to_reject_data must be a positive number, got {}",
                self.n_covariances_to_reject_data
            )));
        }
        if self.history_len == 0 {
            return Err(ConfigError::InvalidLimit("history_len must be positive".to_string()));
        }
        if let Some(max_cov) = self.max_covariance {
            if !(max_cov.is_finite() && max_cov > 0.0) {
                return Err(ConfigError::InvalidLimit(format!(
                    "max_covariance must be a positive number, got {}",
                    max_cov
                )));
            }
        }
        Ok(())
    }
}

fn matrix_from_rows(name: &'static str, rows: &[Vec<f64>]) -> Result<DMatrix<f64>, ConfigError> {
    let ncols = rows.first().map(|r| r.len()).unwrap_or(0);
    if rows.is_empty() || ncols == 0 {
        return Err(ConfigError::Shape {
            name,
            expected: (1, 1),
            actual: (rows.len(), ncols),
        });
    }
    if rows.iter().any(|r| r.len() != ncols) {
        return Err(ConfigError::Ragged(name));
    }
    Ok(DMatrix::from_row_iterator(
        rows.len(),
        ncols,
        rows.iter().flat_map(|r| r.iter().copied()),
    ))
}

fn rows_of(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    m.row_iter().map(|row| row.iter().copied().collect()).collect()
}

/// Errors raised while loading the configuration. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Matrix `{name}` has shape {actual:?}, expected {expected:?}")]
    Shape {
        name: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Matrix `{0}` has rows of different lengths")]
    Ragged(&'static str),

    #[error("Matrix `{0}` contains non-finite values")]
    NonFinite(&'static str),

    #[error("Association weighting vector has zero norm")]
    ZeroAssociation,

    #[error("Invalid limit: {0}")]
    InvalidLimit(String),
}
