#![no_std]

//! TRICAL - online calibration of tri-axial field sensors
//!
//! Estimates the bias and scale/misalignment of a three-axis sensor (typically a
//! magnetometer) from a stream of raw readings, given only the magnitude of the
//! field the sensor sits in. Every reading refines the estimate with one step of
//! an iterated extended Kalman filter driven by the magnitude residual, so no
//! sample history is kept and the sensor orientation never needs to be known.
//!
//! # Features
//!
//! - Recursive bias and symmetric scale estimation, one sample at a time
//! - Linear ellipsoid fit to initialise the filter, whatever the hard-iron offset
//! - Per-term variance of the estimate from the filter covariance
//! - Degenerate samples are skipped instead of corrupting the estimate
//! - Line protocol helpers for the `x,y,z` batch format
//! - `#![no_std]` compatible for embedded systems
//!
//! # Quick Start
//!
//! ```rust
//! use nalgebra::Vector3;
//! use trical::Calibrator;
//!
//! // Earth field of roughly 50 uT, sensor noise of 0.1 uT per axis
//! let mut calibrator = Calibrator::new(50.0, 0.1).unwrap();
//!
//! // Feed every raw reading into the estimator
//! let raw = Vector3::new(12.0, -31.5, 40.2);
//! calibrator.update(raw);
//!
//! // Correct readings with the latest estimate
//! let calibrated = calibrator.calibrate(raw);
//! let estimate = calibrator.estimate();
//! println!("bias = {:?}, |m| = {}", estimate.bias, calibrated.norm());
//! ```

pub mod acquisition;
pub mod calibration;
mod calibrator;
mod error;
pub mod filter;
pub mod protocol;
mod state;
mod types;

// Re-export all public types and functions
pub use calibration::apply_calibration;
pub use calibrator::Calibrator;
pub use error::{ProtocolError, ValidationError};
pub use state::{EstimatorState, STATE_DIM, StateCovariance, StateVector};
pub use types::*;
