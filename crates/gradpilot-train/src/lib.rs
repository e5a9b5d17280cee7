//! Analytic policy gradient training.
//!
//! The [`RolloutEngine`] unrolls controller and dynamics over a horizon on a
//! fresh tape and differentiates the tracking loss with respect to every
//! controller parameter. The [`CurriculumScheduler`] decides which
//! [`DifficultyLevel`] each iteration runs at, and the [`Trainer`] ties
//! sampling, batched gradients, step rules and evaluation together.

pub mod curriculum;
pub mod difficulty;
pub mod error;
pub mod events;
pub mod optimizer;
pub mod rollout;
pub mod sampler;
pub mod trainer;

pub use curriculum::{CurriculumConfig, CurriculumScheduler, Outcome, Transition};
pub use difficulty::{DifficultyLevel, LossWeights};
pub use error::{Result, RolloutError, TrainError};
pub use events::{
    ConsoleSink, EventSink, FanoutSink, JsonlSink, MemorySink, NoopSink, TrainingEvent,
};
pub use optimizer::{Adam, Momentum, Optimizer, OptimizerConfig, Sgd, StepRule, StepRuleKind};
pub use rollout::{BatchGradient, Rollout, RolloutEngine, RolloutGradient, StepRecord};
pub use sampler::{BatchSampler, RolloutTask, SamplerConfig, SegmentOrigin};
pub use trainer::{Trainer, TrainerConfig, TrainingSettings, TrainingSummary};
