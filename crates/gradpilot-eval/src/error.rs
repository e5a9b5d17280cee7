//! Error types for gradpilot-eval.

use gradpilot_control::ControlError;
use gradpilot_model::ModelError;
use gradpilot_reference::ReferenceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("controller error: {0}")]
    Control(#[from] ControlError),

    #[error("reference error: {0}")]
    Reference(#[from] ReferenceError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, EvalError>;
