//! Evaluation of trained controllers.
//!
//! Episodes run the closed loop in plain `f64` on held-out trajectories.
//! Individual diverging episodes are recorded as failed in the
//! [`MetricsReport`]; configuration problems (wrong vehicle, wrong
//! architecture) abort the evaluation.

pub mod error;
pub mod evaluator;
pub mod recorder;
pub mod report;

pub use error::{EvalError, Result};
pub use evaluator::{EvalConfig, Evaluator};
pub use recorder::RolloutRecorder;
pub use report::{EpisodeResult, FailureKind, MetricsReport};
