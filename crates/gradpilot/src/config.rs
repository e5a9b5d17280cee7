//! Run configuration: everything a train or eval command needs besides data.

use std::fs;
use std::path::Path;

use gradpilot_control::ControllerConfig;
use gradpilot_eval::EvalConfig;
use gradpilot_train::{
    CurriculumConfig, DifficultyLevel, LossWeights, OptimizerConfig, SamplerConfig, TrainError,
    TrainerConfig, TrainingSettings,
};
use gradpilot_vehicles::{VehicleConfig, VehicleKind};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// All configuration of one run, loaded from JSON.
///
/// Every section is optional in the file; missing fields take their
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub vehicle: VehicleConfig,
    pub controller: ControllerConfig,
    pub trainer: TrainerConfig,
    pub optimizer: OptimizerConfig,
    pub curriculum: CurriculumConfig,
    pub sampler: SamplerConfig,
    pub eval: EvalConfig,
    /// Vehicle parameters for evaluation, when they should differ from
    /// training (model mismatch).
    pub eval_vehicle: Option<VehicleConfig>,
    /// Data collection and fitting for training on a learnt model.
    pub residual: ResidualConfig,
}

/// How transitions are observed on the true vehicle and fitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResidualConfig {
    /// Transitions observed around the train split's references.
    pub samples: usize,
    /// State noise around the reference, in units of the vehicle's
    /// perturbation scale.
    pub state_noise: f64,
    /// Control noise around nominal, in half-ranges of the bounds.
    pub control_noise: f64,
    /// Ridge regularization of the least-squares fit.
    pub ridge: f64,
    pub seed: u64,
}

impl Default for ResidualConfig {
    fn default() -> Self {
        Self {
            samples: 2000,
            state_noise: 0.1,
            control_noise: 0.3,
            ridge: 1e-6,
            seed: 0,
        }
    }
}

impl ResidualConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::Train(TrainError::Configuration(msg)));
        if self.samples == 0 {
            return invalid("residual samples must be positive".into());
        }
        for (name, value) in [
            ("state_noise", self.state_noise),
            ("control_noise", self.control_noise),
            ("ridge", self.ridge),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                return invalid(format!("residual {name} must be non-negative, got {value}"));
            }
        }
        Ok(())
    }
}

impl RunConfig {
    /// Tuned hyperparameters for each vehicle.
    pub fn preset(kind: VehicleKind) -> Self {
        let base = Self::default();
        match kind {
            VehicleKind::CartPole => {
                let easy = DifficultyLevel {
                    horizon: 50,
                    perturbation: 0.05,
                    aggressiveness: 1.0,
                    window: 1,
                    weights: LossWeights {
                        tracking: 1.0,
                        effort: 1e-3,
                        smoothness: 1e-3,
                        terminal: 0.0,
                    },
                    eval_threshold: None,
                };
                let target = DifficultyLevel {
                    horizon: 150,
                    perturbation: 0.2,
                    window: 3,
                    ..easy.clone()
                };
                Self {
                    controller: ControllerConfig {
                        max_window: 3,
                        ..base.controller
                    },
                    curriculum: CurriculumConfig {
                        advance_loss: 0.02,
                        ..CurriculumConfig::linear(easy, target, 4)
                    },
                    eval: EvalConfig {
                        divergence_threshold: 1.0,
                        ..base.eval
                    },
                    ..base
                }
            }
            VehicleKind::Quadrotor => {
                let easy = DifficultyLevel {
                    horizon: 10,
                    perturbation: 0.02,
                    aggressiveness: 0.3,
                    window: 1,
                    weights: LossWeights {
                        tracking: 1.0,
                        effort: 1e-3,
                        smoothness: 1e-2,
                        terminal: 0.5,
                    },
                    eval_threshold: Some(0.5),
                };
                let target = DifficultyLevel {
                    horizon: 100,
                    perturbation: 0.1,
                    aggressiveness: 1.0,
                    window: 5,
                    eval_threshold: Some(1.0),
                    ..easy.clone()
                };
                Self {
                    curriculum: CurriculumConfig {
                        advance_loss: 0.05,
                        ..CurriculumConfig::linear(easy, target, 6)
                    },
                    sampler: SamplerConfig {
                        self_play: 0.25,
                        ..base.sampler
                    },
                    ..base
                }
            }
            VehicleKind::FixedWing => {
                let easy = DifficultyLevel {
                    horizon: 10,
                    perturbation: 0.01,
                    aggressiveness: 0.5,
                    window: 1,
                    weights: LossWeights {
                        tracking: 1.0,
                        effort: 1e-2,
                        smoothness: 1e-2,
                        terminal: 0.0,
                    },
                    eval_threshold: None,
                };
                let target = DifficultyLevel {
                    horizon: 80,
                    perturbation: 0.05,
                    aggressiveness: 1.0,
                    window: 5,
                    ..easy.clone()
                };
                Self {
                    curriculum: CurriculumConfig {
                        advance_loss: 0.1,
                        ..CurriculumConfig::linear(easy, target, 5)
                    },
                    eval: EvalConfig {
                        divergence_threshold: 2.0,
                        ..base.eval
                    },
                    ..base
                }
            }
        }
    }

    pub fn training_settings(&self) -> TrainingSettings {
        TrainingSettings {
            trainer: self.trainer.clone(),
            optimizer: self.optimizer.clone(),
            curriculum: self.curriculum.clone(),
            sampler: self.sampler.clone(),
        }
    }

    /// Vehicle parameters used for evaluation.
    pub fn evaluation_vehicle(&self) -> &VehicleConfig {
        self.eval_vehicle.as_ref().unwrap_or(&self.vehicle)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
