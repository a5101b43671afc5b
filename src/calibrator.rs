//! Recursive calibration estimator for one sensor

use log::{debug, info, trace};
use nalgebra::Vector3;

use crate::acquisition::Acquisition;
use crate::calibration::{apply_calibration, measurement_from_slice};
use crate::error::ValidationError;
use crate::filter;
use crate::state::EstimatorState;
use crate::types::{
    CalibratorSettings, Estimate, ExtendedEstimate, UpdateOutcome, ensure_positive,
};

/// Online calibration estimator
///
/// Owns the complete calibration progress of one sensor: settings, filter
/// state and the number of accepted measurements. Feed every raw reading to
/// [`update`](Self::update) in the order it was taken; the filter is
/// sequential, so reordering or batching samples changes the result.
///
/// The estimator starts with a zero bias and a zero scale matrix, so
/// [`calibrate`](Self::calibrate) returns the zero vector until the first
/// sample has been accepted.
///
/// While acquiring, every accepted sample also feeds a linear ellipsoid fit
/// (see [`acquisition`](crate::acquisition)). As soon as that fit is well
/// determined the filter restarts from it with the prior covariance, which
/// keeps it away from the false solutions a zero-bias start can settle on.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use trical::{Calibrator, UpdateOutcome};
///
/// let mut calibrator = Calibrator::new(1.0, 1e-6).unwrap();
/// assert_eq!(calibrator.calibrate(Vector3::x()), Vector3::zeros());
///
/// assert_eq!(calibrator.update(Vector3::x()), UpdateOutcome::Accepted);
/// assert_eq!(calibrator.measurement_count(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Calibrator {
    settings: CalibratorSettings,
    state: EstimatorState,
    measurement_count: u64,
    /// Present until the filter has been seeded from the ellipsoid fit
    acquisition: Option<Acquisition>,
}

impl Calibrator {
    /// Create an estimator for the given field norm and measurement noise
    ///
    /// Both parameters must be finite and strictly positive. The remaining
    /// settings take their defaults.
    ///
    /// # Example
    /// ```
    /// use trical::{Calibrator, ValidationError};
    ///
    /// assert!(Calibrator::new(50.0, 0.1).is_ok());
    /// assert_eq!(
    ///     Calibrator::new(0.0, 0.1).unwrap_err(),
    ///     ValidationError::FieldNorm(0.0)
    /// );
    /// ```
    pub fn new(field_norm: f64, measurement_noise: f64) -> Result<Self, ValidationError> {
        Self::with_settings(CalibratorSettings {
            field_norm,
            measurement_noise,
            ..Default::default()
        })
    }

    /// Create an estimator with custom filter settings
    pub fn with_settings(settings: CalibratorSettings) -> Result<Self, ValidationError> {
        settings.validate()?;
        Ok(Self {
            settings,
            state: EstimatorState::new(settings.initial_variance),
            measurement_count: 0,
            acquisition: Some(Acquisition::new()),
        })
    }

    pub fn settings(&self) -> &CalibratorSettings {
        &self.settings
    }

    pub fn state(&self) -> &EstimatorState {
        &self.state
    }

    pub fn field_norm(&self) -> f64 {
        self.settings.field_norm
    }

    /// Change the expected field norm
    ///
    /// Takes effect from the next update; the current estimate is kept as is.
    pub fn set_field_norm(&mut self, field_norm: f64) -> Result<(), ValidationError> {
        self.settings.field_norm = ensure_positive(field_norm, ValidationError::FieldNorm)?;
        debug!("field norm set to {}", field_norm);
        Ok(())
    }

    pub fn measurement_noise(&self) -> f64 {
        self.settings.measurement_noise
    }

    /// Change the measurement noise standard deviation
    ///
    /// Takes effect from the next update.
    pub fn set_measurement_noise(&mut self, measurement_noise: f64) -> Result<(), ValidationError> {
        self.settings.measurement_noise =
            ensure_positive(measurement_noise, ValidationError::MeasurementNoise)?;
        debug!("measurement noise set to {}", measurement_noise);
        Ok(())
    }

    /// Whether the filter is still waiting for a well-determined ellipsoid fit
    pub fn is_acquiring(&self) -> bool {
        self.acquisition.is_some()
    }

    /// Number of measurements accepted so far
    ///
    /// Degenerate samples are not counted.
    pub fn measurement_count(&self) -> u64 {
        self.measurement_count
    }

    /// Refine the estimate with one raw measurement
    ///
    /// Runs a single filter step. Samples carrying no usable information leave
    /// the estimate and the measurement count untouched and report
    /// [`UpdateOutcome::Degenerate`].
    ///
    /// Always pass raw readings here, never calibrated ones.
    pub fn update(&mut self, measurement: Vector3<f64>) -> UpdateOutcome {
        // Work on a copy so a degenerate sample leaves the fit untouched as well
        let mut acquisition = self.acquisition.clone();
        let seed = acquisition.as_mut().and_then(|acquisition| {
            acquisition.add(&measurement, self.settings.field_norm);
            acquisition.solve(self.settings.field_norm, self.settings.measurement_noise)
        });
        let seeded = seed
            .as_ref()
            .map(|estimate| EstimatorState::from_estimate(estimate, self.settings.initial_variance));
        let prior = seeded.as_ref().unwrap_or(&self.state);

        match filter::correct(prior, &measurement, &self.settings) {
            Some(correction) => {
                self.state = correction.state;
                self.measurement_count += 1;
                if seed.is_some() {
                    info!(
                        "filter initialised from ellipsoid fit after {} samples",
                        self.measurement_count
                    );
                    self.acquisition = None;
                } else {
                    self.acquisition = acquisition;
                }
                trace!(
                    "accepted sample {} after {} iteration(s)",
                    self.measurement_count,
                    correction.iterations
                );
                UpdateOutcome::Accepted
            }
            None => {
                debug!(
                    "skipping degenerate sample ({}, {}, {})",
                    measurement.x, measurement.y, measurement.z
                );
                UpdateOutcome::Degenerate
            }
        }
    }

    /// [`update`](Self::update) for a measurement given as a slice
    ///
    /// Fails without touching the estimate unless the slice has 3 components.
    pub fn update_slice(&mut self, measurement: &[f64]) -> Result<UpdateOutcome, ValidationError> {
        let measurement = measurement_from_slice(measurement)?;
        Ok(self.update(measurement))
    }

    /// Calibrate a raw measurement with the current estimate
    ///
    /// Computes `scale * (measurement - bias)`. Does not affect the estimate.
    pub fn calibrate(&self, measurement: Vector3<f64>) -> Vector3<f64> {
        apply_calibration(measurement, &self.state.scale(), &self.state.bias())
    }

    /// [`calibrate`](Self::calibrate) for a measurement given as a slice
    pub fn calibrate_slice(&self, measurement: &[f64]) -> Result<Vector3<f64>, ValidationError> {
        let measurement = measurement_from_slice(measurement)?;
        Ok(self.calibrate(measurement))
    }

    /// Current bias and scale estimate
    pub fn estimate(&self) -> Estimate {
        Estimate {
            bias: self.state.bias(),
            scale: self.state.scale(),
        }
    }

    /// Current estimate with the variance of every term
    pub fn estimate_extended(&self) -> ExtendedEstimate {
        ExtendedEstimate {
            estimate: self.estimate(),
            bias_variance: self.state.bias_variance(),
            scale_variance: self.state.scale_variance(),
        }
    }

    /// Discard all calibration progress
    ///
    /// Restores the freshly constructed state while keeping the current
    /// settings.
    pub fn reset(&mut self) {
        self.state = EstimatorState::new(self.settings.initial_variance);
        self.measurement_count = 0;
        self.acquisition = Some(Acquisition::new());
    }
}

impl Default for Calibrator {
    fn default() -> Self {
        let settings = CalibratorSettings::default();
        Self {
            settings,
            state: EstimatorState::new(settings.initial_variance),
            measurement_count: 0,
            acquisition: Some(Acquisition::new()),
        }
    }
}
