//! Error types for gradpilot-train.

use gradpilot_control::ControlError;
use gradpilot_eval::EvalError;
use gradpilot_reference::ReferenceError;
use thiserror::Error;

/// Why a rollout could not produce a loss.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RolloutError {
    /// A state, control or the loss became NaN or infinite.
    #[error("numeric divergence at step {step}")]
    NumericDivergence { step: usize },

    /// Mismatched dimensions or invalid difficulty knobs.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl RolloutError {
    pub fn is_divergence(&self) -> bool {
        matches!(self, RolloutError::NumericDivergence { .. })
    }
}

#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Rollout(#[from] RolloutError),

    #[error("controller error: {0}")]
    Control(#[from] ControlError),

    #[error("reference error: {0}")]
    Reference(#[from] ReferenceError),

    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl TrainError {
    /// Everything except a numeric divergence stops training.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TrainError::Rollout(e) if e.is_divergence())
    }
}

pub type Result<T> = std::result::Result<T, TrainError>;
