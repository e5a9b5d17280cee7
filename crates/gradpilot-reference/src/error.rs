//! Error types for gradpilot-reference.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown trajectory: {0}")]
    UnknownTrajectory(String),

    #[error("invalid trajectory '{id}': {reason}")]
    InvalidTrajectory { id: String, reason: String },

    #[error("corpus is for '{found}', expected '{expected}'")]
    VehicleMismatch { expected: String, found: String },
}

pub type Result<T> = std::result::Result<T, ReferenceError>;
