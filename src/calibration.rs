//! Calibration application for raw field measurements

use nalgebra::{Matrix3, Vector3};

use crate::error::ValidationError;

/// Applies a bias and scale correction to a raw measurement
///
/// Computes `scale * (raw - bias)`. This is a pure function: it neither reads
/// nor changes any estimator state.
///
/// # Arguments
/// * `raw` - Uncalibrated sensor reading
/// * `scale` - 3x3 scale/misalignment correction matrix
/// * `bias` - Offset to subtract from the raw reading
///
/// # Returns
/// Calibrated sensor reading
///
/// # Example
/// ```
/// use nalgebra::{Matrix3, Vector3};
/// use trical::calibration::apply_calibration;
///
/// let raw = Vector3::new(100.0, 200.0, 300.0);
/// let scale = Matrix3::identity() * 0.5;
/// let bias = Vector3::new(10.0, 20.0, 30.0);
///
/// let calibrated = apply_calibration(raw, &scale, &bias);
/// assert_eq!(calibrated, Vector3::new(45.0, 90.0, 135.0));
/// ```
pub fn apply_calibration(
    raw: Vector3<f64>,
    scale: &Matrix3<f64>,
    bias: &Vector3<f64>,
) -> Vector3<f64> {
    scale * (raw - bias)
}

/// Converts a measurement slice into a vector
///
/// Fails unless the slice holds exactly three components.
///
/// # Example
/// ```
/// use trical::calibration::measurement_from_slice;
///
/// assert!(measurement_from_slice(&[1.0, 2.0, 3.0]).is_ok());
/// assert!(measurement_from_slice(&[1.0, 2.0]).is_err());
/// ```
pub fn measurement_from_slice(measurement: &[f64]) -> Result<Vector3<f64>, ValidationError> {
    match measurement {
        [x, y, z] => Ok(Vector3::new(*x, *y, *z)),
        _ => Err(ValidationError::MeasurementLength(measurement.len())),
    }
}
