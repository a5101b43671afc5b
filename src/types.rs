//! Core types and settings for the TRICAL library

use nalgebra::{Matrix3, Vector3};

use crate::calibration::apply_calibration;
use crate::error::ValidationError;

/// Calibrator settings
///
/// Configuration parameters for one calibration instance. The field norm and
/// measurement noise describe the sensor environment; the remaining fields tune
/// the recursive filter.
///
/// # Example
/// ```
/// use trical::{Calibrator, CalibratorSettings};
///
/// let settings = CalibratorSettings {
///     field_norm: 48.5,        // local field strength in uT
///     measurement_noise: 0.2,  // per-axis standard deviation in uT
///     iterations: 5,           // relinearise up to 5 times per sample
///     ..Default::default()
/// };
/// let calibrator = Calibrator::with_settings(settings).unwrap();
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibratorSettings {
    /// Expected magnitude of the field at the sensor
    ///
    /// Calibrated readings are driven towards this norm. Same unit as the raw
    /// measurements.
    pub field_norm: f64,
    /// Standard deviation of the per-axis measurement error
    ///
    /// Assumed independent, zero-mean Gaussian on every axis.
    pub measurement_noise: f64,
    /// Prior variance of every state term
    ///
    /// Sets the diagonal of the initial state covariance. Larger values let the
    /// first samples move the estimate further.
    pub initial_variance: f64,
    /// Maximum number of linearisations per sample
    ///
    /// One iteration is a plain extended Kalman step; more iterations refine
    /// the linearisation point for strongly distorted sensors.
    pub iterations: usize,
    /// Early-exit threshold for the iteration
    ///
    /// Iteration stops once the largest state change drops to this value.
    pub convergence_threshold: f64,
}

impl Default for CalibratorSettings {
    fn default() -> Self {
        Self {
            field_norm: 1.0,
            measurement_noise: 1e-6,
            initial_variance: 1.0,
            iterations: 3,
            convergence_threshold: 1e-12,
        }
    }
}

impl CalibratorSettings {
    /// Check every parameter, returning the first invalid one
    pub fn validate(&self) -> Result<(), ValidationError> {
        ensure_positive(self.field_norm, ValidationError::FieldNorm)?;
        ensure_positive(self.measurement_noise, ValidationError::MeasurementNoise)?;
        ensure_positive(self.initial_variance, ValidationError::InitialVariance)?;
        if self.iterations == 0 {
            return Err(ValidationError::Iterations(self.iterations));
        }
        Ok(())
    }
}

/// Reject zero, negative, NaN and infinite values
pub(crate) fn ensure_positive(
    value: f64,
    error: fn(f64) -> ValidationError,
) -> Result<f64, ValidationError> {
    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(error(value))
    }
}

/// Result of feeding one measurement to the estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The filter step was applied and the measurement counted
    Accepted,
    /// The sample carried no usable information and was skipped
    ///
    /// Happens when the sample is not finite, coincides with the bias
    /// estimate, or its innovation variance is numerically singular.
    Degenerate,
}

impl UpdateOutcome {
    pub fn is_accepted(self) -> bool {
        self == UpdateOutcome::Accepted
    }
}

/// Snapshot of the calibration estimate
///
/// # Example
/// ```
/// use trical::Calibrator;
///
/// let calibrator = Calibrator::new(1.0, 1e-6).unwrap();
/// let estimate = calibrator.estimate();
///
/// assert_eq!(estimate.bias_array(), [0.0; 3]);
/// assert_eq!(estimate.scale_array(), [0.0; 9]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    /// Offset added to the true field by the sensor
    pub bias: Vector3<f64>,
    /// Correction matrix mapping bias-free readings onto the field sphere
    pub scale: Matrix3<f64>,
}

impl Estimate {
    pub fn bias_array(&self) -> [f64; 3] {
        [self.bias.x, self.bias.y, self.bias.z]
    }

    /// Scale matrix flattened in row-major order
    pub fn scale_array(&self) -> [f64; 9] {
        row_major(&self.scale)
    }

    /// Apply this snapshot to a raw measurement
    pub fn calibrate(&self, raw: Vector3<f64>) -> Vector3<f64> {
        apply_calibration(raw, &self.scale, &self.bias)
    }
}

/// Calibration estimate together with its per-term variance
///
/// Variances come from the diagonal of the state covariance. Off-diagonal
/// scale terms share one state entry, so their variances are mirrored the same
/// way the scale matrix is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtendedEstimate {
    pub estimate: Estimate,
    pub bias_variance: Vector3<f64>,
    pub scale_variance: Matrix3<f64>,
}

impl ExtendedEstimate {
    pub fn bias_variance_array(&self) -> [f64; 3] {
        [self.bias_variance.x, self.bias_variance.y, self.bias_variance.z]
    }

    /// Scale variances flattened in row-major order
    pub fn scale_variance_array(&self) -> [f64; 9] {
        row_major(&self.scale_variance)
    }
}

fn row_major(matrix: &Matrix3<f64>) -> [f64; 9] {
    core::array::from_fn(|k| matrix[(k / 3, k % 3)])
}
