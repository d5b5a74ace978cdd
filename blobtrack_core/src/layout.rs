//! Named slots of the state and measurement vectors.
//!
//! The model matrices supplied in the configuration must agree with this
//! layout: Φ and P0 are 10×10, H maps the 10-slot state onto the 5-slot
//! measurement.
//!
//! ```text
//! state:       [x, vx, y, vy, z, vz, size, d_size, angle, d_angle]
//! measurement: [x, y, z, area, angle]          (z is always 0)
//! ```

use blobtrack_env::Detection;
use nalgebra::{DVector, Vector3};

/// Dimension of the track state vector.
pub const STATE_DIM: usize = 10;

/// Dimension of the measurement vector.
pub const MEASUREMENT_DIM: usize = 5;

/// Indices into the state vector.
pub struct StateLayout;

impl StateLayout {
    pub const POSITION: [usize; 3] = [0, 2, 4];
    pub const VELOCITY: [usize; 3] = [1, 3, 5];
    pub const SIZE: usize = 6;
    pub const D_SIZE: usize = 7;
    pub const ANGLE: usize = 8;
    pub const D_ANGLE: usize = 9;
}

/// Indices into the measurement vector.
pub struct MeasurementLayout;

impl MeasurementLayout {
    pub const X: usize = 0;
    pub const Y: usize = 1;
    pub const Z: usize = 2;
    pub const AREA: usize = 3;
    pub const ANGLE: usize = 4;
}

/// Builds the measurement vector `[x, y, 0, area, angle]` for a detection.
pub fn measurement_vector(detection: &Detection) -> DVector<f64> {
    let mut z = DVector::zeros(MEASUREMENT_DIM);
    z[MeasurementLayout::X] = detection.x;
    z[MeasurementLayout::Y] = detection.y;
    z[MeasurementLayout::AREA] = detection.area;
    z[MeasurementLayout::ANGLE] = detection.angle;
    z
}

/// Builds the initial state of a newborn track from its first measurement.
///
/// Position, size and angle are copied into their slots; every rate is zero.
pub fn initial_state(measurement: &DVector<f64>) -> DVector<f64> {
    let mut x = DVector::zeros(STATE_DIM);
    x[StateLayout::POSITION[0]] = measurement[MeasurementLayout::X];
    x[StateLayout::POSITION[1]] = measurement[MeasurementLayout::Y];
    x[StateLayout::POSITION[2]] = measurement[MeasurementLayout::Z];
    x[StateLayout::SIZE] = measurement[MeasurementLayout::AREA];
    x[StateLayout::ANGLE] = measurement[MeasurementLayout::ANGLE];
    x
}

/// Extracts the position block of a state vector.
#[inline]
pub fn position(state: &DVector<f64>) -> Vector3<f64> {
    let [i, j, k] = StateLayout::POSITION;
    Vector3::new(state[i], state[j], state[k])
}

/// Extracts the velocity block of a state vector.
#[inline]
pub fn velocity(state: &DVector<f64>) -> Vector3<f64> {
    let [i, j, k] = StateLayout::VELOCITY;
    Vector3::new(state[i], state[j], state[k])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measurement_vector_slots() {
        let z = measurement_vector(&Detection::new(3.0, 4.0, 12.0, 0.5));
        assert_eq!(z.as_slice(), &[3.0, 4.0, 0.0, 12.0, 0.5]);
    }

    #[test]
    fn test_initial_state_places_named_slots() {
        let z = measurement_vector(&Detection::new(3.0, 4.0, 12.0, 0.5));
        let x = initial_state(&z);

        assert_eq!(x.len(), STATE_DIM);
        assert_eq!(position(&x), Vector3::new(3.0, 4.0, 0.0));
        assert_eq!(velocity(&x), Vector3::zeros());
        assert_eq!(x[StateLayout::SIZE], 12.0);
        assert_eq!(x[StateLayout::D_SIZE], 0.0);
        assert_eq!(x[StateLayout::ANGLE], 0.5);
        assert_eq!(x[StateLayout::D_ANGLE], 0.0);
    }
}
