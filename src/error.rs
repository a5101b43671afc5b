//! Error types for the TRICAL library

use core::num::ParseFloatError;

/// Rejected parameter or measurement
///
/// Returned synchronously at the call boundary. Each variant carries the
/// offending value so callers can report it.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("field norm must be a finite value > 0.0 (got {0})")]
    FieldNorm(f64),

    #[error("measurement noise must be a finite value > 0.0 (got {0})")]
    MeasurementNoise(f64),

    #[error("initial variance must be a finite value > 0.0 (got {0})")]
    InitialVariance(f64),

    #[error("filter must run at least one iteration per sample (got {0})")]
    Iterations(usize),

    #[error("measurement must have 3 components (got {0})")]
    MeasurementLength(usize),
}

/// Malformed record in the `x,y,z` line protocol
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("expected 3 comma-separated values, got {0}")]
    FieldCount(usize),

    #[error("field {index} is not a number")]
    InvalidNumber {
        index: usize,
        #[source]
        source: ParseFloatError,
    },
}
