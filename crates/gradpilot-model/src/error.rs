//! Error types for gradpilot-model.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("{what} has dimension {got}, expected {expected}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("invalid timestep: {0}")]
    InvalidTimestep(f64),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
