//! Error types for gradpilot-control.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("architecture mismatch: {0}")]
    ArchitectureMismatch(String),

    #[error("{what} has dimension {got}, expected {expected}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("unknown tensor: {0}")]
    UnknownTensor(String),

    #[error("invalid controller configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ControlError>;
