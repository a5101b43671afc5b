//! Iterated extended Kalman step for attitude-independent calibration
//!
//! The only quantity observable without knowing the sensor orientation is the
//! field magnitude. Each sample therefore contributes one scalar measurement,
//!
//! ```text
//! h(x) = |S (z - b)|^2        expected value: field_norm^2
//! ```
//!
//! where `b` is the bias and `S` the symmetric scale matrix held in the state
//! vector `x`. The step is split into pure stages so every one can be checked
//! on its own:
//!
//! 1. [`linearization_point`] seeds an isotropic scale before the first sample
//! 2. [`predict`] / [`residual`] evaluate the measurement function
//! 3. [`jacobian`] linearises it with respect to the nine state terms
//! 4. [`measurement_variance`] / [`innovation_variance`] propagate the noise,
//!    and [`is_informative`] rejects samples that cannot move the estimate
//! 5. [`gain`] / [`update_covariance`] apply the Kalman correction
//!
//! [`correct`] chains the stages, relinearising up to
//! [`CalibratorSettings::iterations`] times about the refined estimate.

use nalgebra::Vector3;

use crate::calibration::apply_calibration;
use crate::state::{
    EstimatorState, SCALE_OFFSET, SCALE_TERMS, StateCovariance, StateVector, bias_of, scale_of,
};
use crate::types::CalibratorSettings;

/// Innovation variances at or below this value are numerically singular
pub const MIN_INNOVATION_VARIANCE: f64 = f64::MIN_POSITIVE;

/// Smallest ratio of state-induced to noise-induced measurement variance
///
/// Below it the sample cannot move the estimate, e.g. a reading exactly at the
/// bias estimate where the Jacobian vanishes.
pub const MIN_INFORMATION_RATIO: f64 = f64::EPSILON;

/// Accepted filter step
#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    /// Corrected state and covariance
    pub state: EstimatorState,
    /// Number of linearisations performed
    pub iterations: usize,
}

/// State about which the measurement function is linearised
///
/// While every scale term is still zero the measurement function is flat
/// (its Jacobian vanishes), so the scale block is replaced by the isotropic
/// matrix `field_norm / |z - b| * I` that maps this sample exactly onto the
/// field sphere. Returns `None` when that seed does not exist, i.e. when the
/// sample coincides with the bias estimate or is not finite.
pub fn linearization_point(
    state: &EstimatorState,
    raw: &Vector3<f64>,
    field_norm: f64,
) -> Option<StateVector> {
    if state.has_scale() {
        return Some(state.vector);
    }

    let distance = (raw - state.bias()).norm();
    if !(distance > f64::EPSILON) || !distance.is_finite() {
        return None;
    }

    let mut seeded = state.vector;
    let gain = field_norm / distance;
    for (k, &(row, col)) in SCALE_TERMS.iter().enumerate() {
        if row == col {
            seeded[SCALE_OFFSET + k] = gain;
        }
    }
    Some(seeded)
}

/// Calibrated measurement predicted by `vector`
pub fn predict(vector: &StateVector, raw: &Vector3<f64>) -> Vector3<f64> {
    apply_calibration(*raw, &scale_of(vector), &bias_of(vector))
}

/// Expected minus predicted squared magnitude
pub fn residual(field_norm: f64, calibrated: &Vector3<f64>) -> f64 {
    field_norm * field_norm - calibrated.norm_squared()
}

/// Gradient of `|S (z - b)|^2` with respect to the state vector
///
/// With `v = z - b` and `c = S v`:
/// * bias terms: `-2 S^T c`
/// * diagonal scale terms `s_ii`: `2 c_i v_i`
/// * off-diagonal terms `s_ij`, which appear twice in `S`: `2 (c_i v_j + c_j v_i)`
pub fn jacobian(vector: &StateVector, raw: &Vector3<f64>) -> StateVector {
    let scale = scale_of(vector);
    let offset = raw - bias_of(vector);
    let calibrated = scale * offset;

    let mut gradient = StateVector::zeros();
    gradient
        .fixed_rows_mut::<3>(0)
        .copy_from(&(scale.transpose() * calibrated * -2.0));

    for (k, &(row, col)) in SCALE_TERMS.iter().enumerate() {
        gradient[SCALE_OFFSET + k] = if row == col {
            2.0 * calibrated[row] * offset[row]
        } else {
            2.0 * (calibrated[row] * offset[col] + calibrated[col] * offset[row])
        };
    }

    gradient
}

/// Variance of the squared-magnitude measurement due to sensor noise
///
/// For `h = |S (z + e)|^2` with `e ~ N(0, noise^2 I)` the variance is
/// `4 noise^2 |S^T c|^2 + 2 noise^4 |S^T S|_F^2`; the second term keeps it
/// positive when the first-order sensitivity vanishes.
pub fn measurement_variance(vector: &StateVector, raw: &Vector3<f64>, noise: f64) -> f64 {
    let scale = scale_of(vector);
    let calibrated = scale * (raw - bias_of(vector));
    let sensitivity = scale.transpose() * calibrated * 2.0;
    let metric = scale.transpose() * scale;

    let variance = noise * noise;
    variance * sensitivity.norm_squared() + 2.0 * variance * variance * metric.norm_squared()
}

/// Scalar innovation variance `H P H^T + R`
pub fn innovation_variance(
    covariance: &StateCovariance,
    gradient: &StateVector,
    measurement_variance: f64,
) -> f64 {
    gradient.dot(&(covariance * gradient)) + measurement_variance
}

/// Whether a sample linearised with `gradient` can change the estimate
///
/// Requires the variance the state uncertainty induces in the measurement,
/// `H P H^T`, to stand out from the measurement noise, and the innovation
/// variance to be finite and non-singular.
pub fn is_informative(
    covariance: &StateCovariance,
    gradient: &StateVector,
    measurement_variance: f64,
) -> bool {
    let predicted = gradient.dot(&(covariance * gradient));
    let innovation = predicted + measurement_variance;
    predicted > MIN_INFORMATION_RATIO * measurement_variance
        && innovation > MIN_INNOVATION_VARIANCE
        && innovation.is_finite()
}

/// Kalman gain `P H^T / S`
pub fn gain(
    covariance: &StateCovariance,
    gradient: &StateVector,
    innovation_variance: f64,
) -> StateVector {
    covariance * gradient / innovation_variance
}

/// Joseph-form covariance update
///
/// `(I - K H) P (I - K H)^T + K R K^T`, re-symmetrised to absorb rounding.
pub fn update_covariance(
    covariance: &StateCovariance,
    gain: &StateVector,
    gradient: &StateVector,
    measurement_variance: f64,
) -> StateCovariance {
    let reduction = StateCovariance::identity() - gain * gradient.transpose();
    let updated = reduction * covariance * reduction.transpose()
        + gain * gain.transpose() * measurement_variance;
    (updated + updated.transpose()) * 0.5
}

/// Run one filter step for a raw sample
///
/// Returns `None` for degenerate samples; the caller keeps its previous state.
pub fn correct(
    state: &EstimatorState,
    raw: &Vector3<f64>,
    settings: &CalibratorSettings,
) -> Option<Correction> {
    let prior = linearization_point(state, raw, settings.field_norm)?;
    let covariance = &state.covariance;

    let mut estimate = prior;
    let mut last_step = None;
    let mut iterations = 0;

    while iterations < settings.iterations.max(1) {
        iterations += 1;

        let calibrated = predict(&estimate, raw);
        let gradient = jacobian(&estimate, raw);
        let noise_variance = measurement_variance(&estimate, raw, settings.measurement_noise);
        if !is_informative(covariance, &gradient, noise_variance) {
            return None;
        }
        let innovation_var = innovation_variance(covariance, &gradient, noise_variance);

        let kalman_gain = gain(covariance, &gradient, innovation_var);
        // Innovation of the measurement linearised at `estimate`, referred to the prior
        let innovation = residual(settings.field_norm, &calibrated) - gradient.dot(&(prior - estimate));
        let next = prior + kalman_gain * innovation;

        let change = (next - estimate).amax();
        estimate = next;
        last_step = Some((kalman_gain, gradient, noise_variance));

        if change <= settings.convergence_threshold {
            break;
        }
    }

    let (kalman_gain, gradient, noise_variance) = last_step?;
    if estimate.iter().any(|term| !term.is_finite()) {
        return None;
    }

    Some(Correction {
        state: EstimatorState {
            vector: estimate,
            covariance: update_covariance(covariance, &kalman_gain, &gradient, noise_variance),
        },
        iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Matrix3;

    const EPSILON: f64 = 1e-9;

    fn sample_state() -> StateVector {
        StateVector::from_column_slice(&[
            0.1, -0.2, 0.05, // bias
            1.1, 0.05, -0.02, 0.9, 0.03, 1.05, // scale upper triangle
        ])
    }

    #[test]
    fn test_seed_maps_first_sample_onto_field_sphere() {
        let state = EstimatorState::new(1.0);
        let raw = Vector3::new(3.0, 4.0, 0.0);

        let seeded = linearization_point(&state, &raw, 2.0).unwrap();
        let scale = scale_of(&seeded);

        assert_eq!(scale, Matrix3::identity() * 0.4);
        assert!((predict(&seeded, &raw).norm() - 2.0).abs() < EPSILON);
    }

    #[test]
    fn test_seed_fails_for_sample_at_bias() {
        let state = EstimatorState::new(1.0);
        assert!(linearization_point(&state, &Vector3::zeros(), 1.0).is_none());

        let nan = Vector3::new(f64::NAN, 0.0, 0.0);
        assert!(linearization_point(&state, &nan, 1.0).is_none());
    }

    #[test]
    fn test_existing_scale_is_used_as_is() {
        let state = EstimatorState {
            vector: sample_state(),
            covariance: StateCovariance::identity(),
        };
        let raw = Vector3::new(0.3, 0.1, -0.8);

        assert_eq!(linearization_point(&state, &raw, 1.0), Some(sample_state()));
    }

    #[test]
    fn test_jacobian_matches_finite_differences() {
        let vector = sample_state();
        let raw = Vector3::new(0.7, -0.4, 0.6);
        let h = |x: &StateVector| predict(x, &raw).norm_squared();

        let analytic = jacobian(&vector, &raw);
        let step = 1e-6;
        for i in 0..vector.len() {
            let mut plus = vector;
            let mut minus = vector;
            plus[i] += step;
            minus[i] -= step;
            let numeric = (h(&plus) - h(&minus)) / (2.0 * step);
            assert!(
                (analytic[i] - numeric).abs() < 1e-6,
                "term {}: analytic {} numeric {}",
                i,
                analytic[i],
                numeric
            );
        }
    }

    #[test]
    fn test_jacobian_vanishes_at_zero_scale() {
        let raw = Vector3::new(1.0, 0.0, 0.0);
        assert_eq!(jacobian(&StateVector::zeros(), &raw), StateVector::zeros());
    }

    #[test]
    fn test_residual_sign() {
        assert_eq!(residual(2.0, &Vector3::new(1.0, 0.0, 0.0)), 3.0);
        assert_eq!(residual(1.0, &Vector3::new(0.0, 2.0, 0.0)), -3.0);
    }

    #[test]
    fn test_measurement_variance_for_identity_scale() {
        let mut vector = StateVector::zeros();
        vector[3] = 1.0;
        vector[6] = 1.0;
        vector[8] = 1.0;
        let raw = Vector3::new(1.0, 0.0, 0.0);
        let noise = 0.1;

        // 4 noise^2 |z|^2 + 2 noise^4 * 3
        let expected = 4.0 * 0.01 + 2.0 * 0.0001 * 3.0;
        assert!((measurement_variance(&vector, &raw, noise) - expected).abs() < 1e-15);
    }

    #[test]
    fn test_gain_and_innovation_variance() {
        let covariance = StateCovariance::identity() * 2.0;
        let mut gradient = StateVector::zeros();
        gradient[0] = 1.0;
        gradient[4] = 2.0;

        let s = innovation_variance(&covariance, &gradient, 0.5);
        assert!((s - (2.0 * 5.0 + 0.5)).abs() < EPSILON);

        let k = gain(&covariance, &gradient, s);
        assert!((k[0] - 2.0 / s).abs() < EPSILON);
        assert!((k[4] - 4.0 / s).abs() < EPSILON);
        assert_eq!(k[1], 0.0);
    }

    #[test]
    fn test_covariance_update_shrinks_and_stays_symmetric() {
        let covariance = StateCovariance::identity();
        let gradient = jacobian(&sample_state(), &Vector3::new(0.2, 0.9, -0.3));
        let r = 1e-4;
        let s = innovation_variance(&covariance, &gradient, r);
        let k = gain(&covariance, &gradient, s);

        let updated = update_covariance(&covariance, &k, &gradient, r);

        assert_eq!(updated, updated.transpose());
        assert!(updated.trace() < covariance.trace());
        let eigen = updated.symmetric_eigen();
        assert!(eigen.eigenvalues.iter().all(|&value| value > -1e-12));
    }

    #[test]
    fn test_correct_reduces_residual() {
        let state = EstimatorState {
            vector: sample_state(),
            covariance: StateCovariance::identity() * 0.01,
        };
        let settings = CalibratorSettings::default();
        let raw = Vector3::new(0.5, 0.5, 0.5);

        let before = residual(settings.field_norm, &predict(&state.vector, &raw)).abs();
        let correction = correct(&state, &raw, &settings).unwrap();
        let after = residual(settings.field_norm, &predict(&correction.state.vector, &raw)).abs();

        assert!(after < before);
        assert!(correction.iterations >= 1);
        assert!(correction.iterations <= settings.iterations);
    }

    #[test]
    fn test_correct_skips_degenerate_samples() {
        let state = EstimatorState::new(1.0);
        let settings = CalibratorSettings::default();

        assert!(correct(&state, &Vector3::zeros(), &settings).is_none());
    }

    #[test]
    fn test_sample_at_bias_is_not_informative() {
        let state = EstimatorState {
            vector: sample_state(),
            covariance: StateCovariance::identity(),
        };
        let at_bias = bias_of(&state.vector);
        let gradient = jacobian(&state.vector, &at_bias);
        let noise_variance = measurement_variance(&state.vector, &at_bias, 1e-6);

        // Only the second-order noise term is left
        assert_eq!(gradient, StateVector::zeros());
        assert!(noise_variance > MIN_INNOVATION_VARIANCE);
        assert!(!is_informative(&state.covariance, &gradient, noise_variance));
        assert!(correct(&state, &at_bias, &CalibratorSettings::default()).is_none());

        let away = at_bias + Vector3::new(0.5, 0.0, 0.0);
        let gradient = jacobian(&state.vector, &away);
        let noise_variance = measurement_variance(&state.vector, &away, 1e-6);
        assert!(is_informative(&state.covariance, &gradient, noise_variance));
    }
}
