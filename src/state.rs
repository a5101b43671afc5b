//! Estimator state for one sensor

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};

use crate::types::Estimate;

/// Number of estimated terms: 3 bias components and 6 scale terms
pub const STATE_DIM: usize = 9;

pub type StateVector = SVector<f64, STATE_DIM>;
pub type StateCovariance = SMatrix<f64, STATE_DIM, STATE_DIM>;

/// Offset of the scale terms in the state vector
pub(crate) const SCALE_OFFSET: usize = 3;

/// Matrix position of each scale term, in state vector order
///
/// The scale matrix is symmetric, so only its upper triangle is estimated:
/// ```text
/// 3  4  5
///    6  7
///       8
/// ```
pub(crate) const SCALE_TERMS: [(usize, usize); 6] =
    [(0, 0), (0, 1), (0, 2), (1, 1), (1, 2), (2, 2)];

/// State vector index of the scale term at `(row, col)`
pub(crate) const fn scale_index(row: usize, col: usize) -> usize {
    let (row, col) = if row <= col { (row, col) } else { (col, row) };
    match (row, col) {
        (0, c) => SCALE_OFFSET + c,
        (1, c) => SCALE_OFFSET + 2 + c,
        _ => SCALE_OFFSET + 5,
    }
}

/// Bias view of a state vector
pub(crate) fn bias_of(vector: &StateVector) -> Vector3<f64> {
    vector.fixed_rows::<3>(0).into_owned()
}

/// Symmetric scale matrix view of a state vector
pub(crate) fn scale_of(vector: &StateVector) -> Matrix3<f64> {
    Matrix3::from_fn(|row, col| vector[scale_index(row, col)])
}

/// Fixed-size filter state
///
/// Holds the state vector (bias followed by the upper triangle of the scale
/// matrix) and its covariance. Bias and scale are derived views of the vector.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorState {
    pub(crate) vector: StateVector,
    pub(crate) covariance: StateCovariance,
}

impl EstimatorState {
    /// Zero state with a diagonal prior covariance
    pub fn new(initial_variance: f64) -> Self {
        Self {
            vector: StateVector::zeros(),
            covariance: StateCovariance::from_diagonal_element(initial_variance),
        }
    }

    /// State at a known estimate with a diagonal prior covariance
    pub fn from_estimate(estimate: &Estimate, initial_variance: f64) -> Self {
        let mut vector = StateVector::zeros();
        vector.fixed_rows_mut::<3>(0).copy_from(&estimate.bias);
        for (k, &(row, col)) in SCALE_TERMS.iter().enumerate() {
            vector[SCALE_OFFSET + k] = estimate.scale[(row, col)];
        }
        Self {
            vector,
            covariance: StateCovariance::from_diagonal_element(initial_variance),
        }
    }

    pub fn vector(&self) -> &StateVector {
        &self.vector
    }

    pub fn covariance(&self) -> &StateCovariance {
        &self.covariance
    }

    pub fn bias(&self) -> Vector3<f64> {
        bias_of(&self.vector)
    }

    pub fn scale(&self) -> Matrix3<f64> {
        scale_of(&self.vector)
    }

    /// Variance of each bias component
    pub fn bias_variance(&self) -> Vector3<f64> {
        Vector3::from_fn(|i, _| self.covariance[(i, i)])
    }

    /// Variance of each scale term, mirrored like the scale matrix
    pub fn scale_variance(&self) -> Matrix3<f64> {
        Matrix3::from_fn(|row, col| {
            let index = scale_index(row, col);
            self.covariance[(index, index)]
        })
    }

    /// Whether any scale term has left its zero initial value
    pub fn has_scale(&self) -> bool {
        self.vector
            .fixed_rows::<6>(SCALE_OFFSET)
            .iter()
            .any(|term| *term != 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_zero_with_diagonal_prior() {
        let state = EstimatorState::new(0.5);

        assert_eq!(state.bias(), Vector3::zeros());
        assert_eq!(state.scale(), Matrix3::zeros());
        assert!(!state.has_scale());
        for i in 0..STATE_DIM {
            for j in 0..STATE_DIM {
                let expected = if i == j { 0.5 } else { 0.0 };
                assert_eq!(state.covariance()[(i, j)], expected);
            }
        }
    }

    #[test]
    fn test_scale_index_matches_term_table() {
        for (k, &(row, col)) in SCALE_TERMS.iter().enumerate() {
            assert_eq!(scale_index(row, col), SCALE_OFFSET + k);
            assert_eq!(scale_index(col, row), SCALE_OFFSET + k);
        }
    }

    #[test]
    fn test_scale_view_is_symmetric() {
        let vector = StateVector::from_column_slice(&[
            0.1, 0.2, 0.3, // bias
            1.0, 0.4, 0.5, 2.0, 0.6, 3.0, // scale upper triangle
        ]);

        let bias = bias_of(&vector);
        let scale = scale_of(&vector);

        assert_eq!(bias, Vector3::new(0.1, 0.2, 0.3));
        assert_eq!(
            scale,
            Matrix3::new(1.0, 0.4, 0.5, 0.4, 2.0, 0.6, 0.5, 0.6, 3.0)
        );
        assert_eq!(scale, scale.transpose());
    }

    #[test]
    fn test_variance_views_follow_covariance_diagonal() {
        let mut state = EstimatorState::new(1.0);
        for i in 0..STATE_DIM {
            state.covariance[(i, i)] = i as f64;
        }

        assert_eq!(state.bias_variance(), Vector3::new(0.0, 1.0, 2.0));
        assert_eq!(
            state.scale_variance(),
            Matrix3::new(3.0, 4.0, 5.0, 4.0, 6.0, 7.0, 5.0, 7.0, 8.0)
        );
    }

    #[test]
    fn test_from_estimate_packs_upper_triangle() {
        let estimate = Estimate {
            bias: Vector3::new(30.0, -20.0, 10.0),
            scale: Matrix3::new(1.0, 0.4, 0.5, 0.4, 2.0, 0.6, 0.5, 0.6, 3.0),
        };
        let state = EstimatorState::from_estimate(&estimate, 0.25);

        assert_eq!(state.bias(), estimate.bias);
        assert_eq!(state.scale(), estimate.scale);
        assert_eq!(state.covariance(), &StateCovariance::from_diagonal_element(0.25));
    }
}
