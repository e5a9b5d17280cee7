//! gradpilot: controllers trained by differentiating a tracking loss
//! through vehicle dynamics.
//!
//! This is the umbrella crate. It re-exports the sub-crates and provides the
//! entry points used by the command line: [`train`], [`train_on_learnt_model`]
//! and [`evaluate`], each parameterized by [`VehicleKind`] and a [`RunConfig`].

pub mod config;
pub mod learnt;

pub use gradpilot_control::{self, Checkpoint, CheckpointMeta, ControllerConfig, ParamStore, Policy};
pub use gradpilot_diff::{self, Scalar, Tape, Var};
pub use gradpilot_eval::{self, EvalConfig, Evaluator, MetricsReport, RolloutRecorder};
pub use gradpilot_math::{self};
pub use gradpilot_model::{self, Bounds, Dynamics};
pub use gradpilot_reference::{
    self, ReferenceProvider, Split, Trajectory, TrajectoryCorpus, TrajectoryGenerator,
};
pub use gradpilot_train::{
    self, CurriculumConfig, CurriculumScheduler, DifficultyLevel, EventSink, RolloutEngine, Trainer,
    TrainingEvent, TrainingSummary,
};
pub use gradpilot_vehicles::{
    self, Observation, ResidualDynamics, ResidualFit, Vehicle, VehicleConfig, VehicleKind,
};

pub use config::{ResidualConfig, RunConfig};
pub use learnt::{observe_transitions, train_on_learnt_model};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("model error: {0}")]
    Model(#[from] gradpilot_model::ModelError),

    #[error("controller error: {0}")]
    Control(#[from] gradpilot_control::ControlError),

    #[error("reference error: {0}")]
    Reference(#[from] gradpilot_reference::ReferenceError),

    #[error("evaluation error: {0}")]
    Eval(#[from] gradpilot_eval::EvalError),

    #[error("training error: {0}")]
    Train(#[from] gradpilot_train::TrainError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Result of [`train`].
#[derive(Debug, Clone)]
pub struct TrainOutput {
    pub summary: TrainingSummary,
    /// Parameters at the end of training.
    pub checkpoint: Checkpoint,
    /// Best parameters found by periodic evaluation on the test split.
    pub best: Option<Checkpoint>,
    /// Fit of the learnt model trained through, if any.
    pub residual_fit: Option<ResidualFit>,
}

pub(crate) fn finish<D: Dynamics, E: Dynamics>(
    mut trainer: Trainer<'_, D, E>,
    sink: &mut dyn EventSink,
) -> Result<TrainOutput> {
    let summary = trainer.run(sink)?;
    Ok(TrainOutput {
        summary,
        checkpoint: trainer.checkpoint()?,
        best: trainer.best_checkpoint(),
        residual_fit: None,
    })
}

/// Train a controller for `kind` on the corpus's train split, evaluating
/// periodically on its test split (with `eval_vehicle` parameters when set).
pub fn train(
    kind: VehicleKind,
    config: &RunConfig,
    corpus: &TrajectoryCorpus,
    sink: &mut dyn EventSink,
) -> Result<TrainOutput> {
    let vehicle = config.vehicle.build(kind)?;
    let eval_vehicle = config.evaluation_vehicle().build(kind)?;
    corpus.validate(vehicle.name(), vehicle.state_dim())?;

    let mut trainer = Trainer::new(
        &vehicle,
        config.controller.clone(),
        corpus.split(Split::Train),
        config.training_settings(),
    )?;
    if !corpus.test.is_empty() {
        trainer =
            trainer.with_evaluation(&eval_vehicle, corpus.split(Split::Test), config.eval.clone())?;
    }
    finish(trainer, sink)
}

/// Evaluate a checkpoint on `trajectories`, optionally recording traces.
///
/// Fails when the checkpoint was trained for a different vehicle or
/// architecture; diverging episodes are reported in the metrics.
pub fn evaluate(
    kind: VehicleKind,
    config: &RunConfig,
    checkpoint: &Checkpoint,
    trajectories: &[Trajectory],
    record_traces: bool,
) -> Result<(MetricsReport, Vec<RolloutRecorder>)> {
    let vehicle = config.evaluation_vehicle().build(kind)?;
    let (policy, params) = checkpoint.restore(&vehicle)?;
    let evaluator = Evaluator::new(&vehicle, &policy, config.eval.clone())?;
    if record_traces {
        Ok(evaluator.evaluate_with_traces(&params, trajectories)?)
    } else {
        Ok((evaluator.evaluate(&params, trajectories)?, Vec::new()))
    }
}

/// Generate a seeded train/test corpus for `kind`.
pub fn generate_corpus(
    kind: VehicleKind,
    vehicle: &VehicleConfig,
    seed: u64,
    n_train: usize,
    n_test: usize,
    steps: usize,
    dt: f64,
) -> Result<TrajectoryCorpus> {
    let vehicle = vehicle.build(kind)?;
    Ok(TrajectoryGenerator::new(seed).corpus(&vehicle, n_train, n_test, steps, dt)?)
}
