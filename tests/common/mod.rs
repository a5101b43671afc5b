//! Synthetic sensor shared by the integration tests

#![allow(dead_code)]

use nalgebra::{Matrix3, Vector3};
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, StandardNormal};
use rand_pcg::Pcg64;

/// Sensor producing `distortion * (direction * field_norm) + bias + noise`
pub struct SyntheticSensor {
    pub field_norm: f64,
    pub bias: Vector3<f64>,
    pub distortion: Matrix3<f64>,
    noise: Normal<f64>,
    rng: Pcg64,
}

impl SyntheticSensor {
    pub fn new(
        field_norm: f64,
        bias: Vector3<f64>,
        distortion: Matrix3<f64>,
        noise_std: f64,
        seed: u64,
    ) -> Self {
        Self {
            field_norm,
            bias,
            distortion,
            noise: Normal::new(0.0, noise_std).unwrap(),
            rng: Pcg64::seed_from_u64(seed),
        }
    }

    /// Uniformly distributed direction on the unit sphere
    pub fn direction(&mut self) -> Vector3<f64> {
        loop {
            let v = Vector3::new(
                self.rng.sample::<f64, _>(StandardNormal),
                self.rng.sample::<f64, _>(StandardNormal),
                self.rng.sample::<f64, _>(StandardNormal),
            );
            let norm = v.norm();
            if norm > 1e-6 {
                return v / norm;
            }
        }
    }

    /// Raw reading for a random orientation
    pub fn sample(&mut self) -> Vector3<f64> {
        let field = self.direction() * self.field_norm;
        let noise = Vector3::new(
            self.noise.sample(&mut self.rng),
            self.noise.sample(&mut self.rng),
            self.noise.sample(&mut self.rng),
        );
        self.distortion * field + self.bias + noise
    }

    /// Symmetric correction that maps readings back onto the field sphere
    ///
    /// `(T T^T)^(-1/2)`, which is `T^-1` for a symmetric distortion `T`.
    pub fn expected_scale(&self) -> Matrix3<f64> {
        let eigen = (self.distortion * self.distortion.transpose()).symmetric_eigen();
        let inverse_root = eigen.eigenvalues.map(|value| 1.0 / value.sqrt());
        eigen.eigenvectors * Matrix3::from_diagonal(&inverse_root) * eigen.eigenvectors.transpose()
    }
}

/// Mildly distorted, symmetric soft-iron matrix
pub fn symmetric_distortion() -> Matrix3<f64> {
    Matrix3::new(1.05, 0.02, -0.01, 0.02, 0.97, 0.03, -0.01, 0.03, 1.02)
}

/// Largest absolute element of a matrix difference
pub fn max_abs_diff(a: &Matrix3<f64>, b: &Matrix3<f64>) -> f64 {
    (a - b).amax()
}
