//! Initial acquisition of the calibration
//!
//! The filter linearises `|S (z - b)|^2` about its current estimate and, like
//! any extended Kalman filter, only converges from inside the basin of the true
//! solution. Starting from a zero bias it can settle on a large sphere with a
//! small scale far away from the real one.
//!
//! Until the filter is initialised every sample also feeds a linear
//! least-squares fit of the general quadric
//!
//! ```text
//! u^T A u + g^T u + h = 0        trace(A) = 1
//! ```
//!
//! through the readings, shifted to the first sample and divided by the field
//! norm. The fit is linear in its nine coefficients, so it has a single
//! solution and needs no starting point. Once the coefficients are known well
//! enough it is converted into a bias and a symmetric scale that seed the
//! filter.

use log::debug;
use nalgebra::{Matrix3, SMatrix, SVector, Vector3};

use crate::types::Estimate;

/// Number of free quadric coefficients
pub const QUADRIC_TERMS: usize = 9;

pub type QuadricVector = SVector<f64, QUADRIC_TERMS>;
pub type QuadricInformation = SMatrix<f64, QUADRIC_TERMS, QUADRIC_TERMS>;

/// Fewest samples before the fit may seed the filter
pub const MIN_ACQUISITION_SAMPLES: u64 = 12;

/// Largest standard deviation of any fitted coefficient accepted for seeding
pub const ACQUISITION_TOLERANCE: f64 = 0.01;

/// Regressors and target of one normalised reading
///
/// With `a22 = 1 - a00 - a11` substituted, the quadric becomes
/// `phi(u) . theta = -u_z^2` for
/// `theta = [a00, a11, a01, a02, a12, g_x, g_y, g_z, h]`.
pub fn quadric_terms(u: &Vector3<f64>) -> (QuadricVector, f64) {
    let (x, y, z) = (u.x, u.y, u.z);
    let regressors = QuadricVector::from_column_slice(&[
        x * x - z * z,
        y * y - z * z,
        2.0 * x * y,
        2.0 * x * z,
        2.0 * y * z,
        x,
        y,
        z,
        1.0,
    ]);
    (regressors, -z * z)
}

/// Recursive least-squares quadric fit
#[derive(Debug, Clone, PartialEq)]
pub struct Acquisition {
    /// First reading and length unit of the normalised frame
    frame: Option<(Vector3<f64>, f64)>,
    information: QuadricInformation,
    moment: QuadricVector,
    samples: u64,
}

impl Acquisition {
    pub fn new() -> Self {
        Self {
            frame: None,
            information: QuadricInformation::zeros(),
            moment: QuadricVector::zeros(),
            samples: 0,
        }
    }

    /// Number of readings accumulated
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Accumulate one raw reading
    ///
    /// The first reading fixes the normalised frame. Non-finite readings are
    /// ignored.
    pub fn add(&mut self, raw: &Vector3<f64>, field_norm: f64) {
        if raw.iter().any(|value| !value.is_finite()) {
            return;
        }
        let (origin, unit) = *self.frame.get_or_insert((*raw, field_norm));

        let (regressors, target) = quadric_terms(&((raw - origin) / unit));
        self.information += regressors * regressors.transpose();
        self.moment += regressors * target;
        self.samples += 1;
    }

    /// Bias and scale of the fitted ellipsoid
    ///
    /// Returns `None` until at least [`MIN_ACQUISITION_SAMPLES`] readings were
    /// added and every coefficient is known to within
    /// [`ACQUISITION_TOLERANCE`] for the given per-axis noise, or when the
    /// fitted quadric is not an ellipsoid.
    pub fn solve(&self, field_norm: f64, noise: f64) -> Option<Estimate> {
        let (origin, unit) = self.frame?;
        if self.samples < MIN_ACQUISITION_SAMPLES {
            return None;
        }

        let cholesky = self.information.cholesky()?;
        // Residual noise of the quadric equation in the normalised frame
        let equation_noise = 2.0 * noise / unit;
        let worst_variance = cholesky.inverse().diagonal().max() * equation_noise * equation_noise;
        if !(worst_variance <= ACQUISITION_TOLERANCE * ACQUISITION_TOLERANCE) {
            return None;
        }

        let theta = cholesky.solve(&self.moment);
        let shape = Matrix3::new(
            theta[0],
            theta[2],
            theta[3],
            theta[2],
            theta[1],
            theta[4],
            theta[3],
            theta[4],
            1.0 - theta[0] - theta[1],
        );
        let linear = Vector3::new(theta[5], theta[6], theta[7]);

        let eigen = shape.symmetric_eigen();
        if !(eigen.eigenvalues.min() > 0.0) {
            return None;
        }
        let inverse = eigen.eigenvectors
            * Matrix3::from_diagonal(&eigen.eigenvalues.map(|value| 1.0 / value))
            * eigen.eigenvectors.transpose();

        // (u - c)^T A (u - c) = c^T A c - h
        let center = inverse * linear * -0.5;
        let radius_squared = center.dot(&(shape * center)) - theta[8];
        if !(radius_squared > 0.0) {
            return None;
        }

        let gain = field_norm * field_norm / (radius_squared * unit * unit);
        let root = eigen.eigenvalues.map(|value| (gain * value).sqrt());
        let estimate = Estimate {
            bias: origin + center * unit,
            scale: eigen.eigenvectors * Matrix3::from_diagonal(&root) * eigen.eigenvectors.transpose(),
        };

        let finite = estimate.bias.iter().chain(estimate.scale.iter()).all(|v| v.is_finite());
        if !finite {
            return None;
        }
        debug!(
            "acquired ellipsoid after {} samples, bias ({}, {}, {})",
            self.samples, estimate.bias.x, estimate.bias.y, estimate.bias.z
        );
        Some(estimate)
    }
}

impl Default for Acquisition {
    fn default() -> Self {
        Self::new()
    }
}
