//! The optimizer loop.
//!
//! Each iteration reads the scheduler's current level, samples a batch,
//! computes the averaged analytic gradient, applies one step and reports the
//! outcome back to the scheduler. A diverged batch leaves the parameters
//! untouched.

use gradpilot_control::{
    Checkpoint, CheckpointMeta, ControllerConfig, Normalizer, ParamStore, Policy,
};
use gradpilot_eval::{EvalConfig, Evaluator, MetricsReport};
use gradpilot_model::Dynamics;
use gradpilot_reference::Trajectory;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::curriculum::{CurriculumConfig, CurriculumScheduler, Outcome, Transition};
use crate::difficulty::DifficultyLevel;
use crate::error::{Result, RolloutError, TrainError};
use crate::events::{EventSink, TrainingEvent};
use crate::optimizer::{Optimizer, OptimizerConfig};
use crate::rollout::RolloutEngine;
use crate::sampler::{BatchSampler, SamplerConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Iteration budget.
    pub iterations: usize,
    pub seed: u64,
    /// Evaluate on the test split every N iterations (0 disables).
    pub eval_every: usize,
    /// Print progress every N iterations.
    pub print_every: usize,
    /// Stop early once the curriculum is complete.
    pub stop_when_complete: bool,
    /// Controller inputs sampled to fit the normalizer.
    pub normalizer_samples: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            iterations: 2000,
            seed: 0,
            eval_every: 100,
            print_every: 10,
            stop_when_complete: true,
            normalizer_samples: 512,
        }
    }
}

/// Trainer, optimizer, curriculum and sampler configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    pub trainer: TrainerConfig,
    pub optimizer: OptimizerConfig,
    pub curriculum: CurriculumConfig,
    pub sampler: SamplerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub iterations: usize,
    pub final_level: usize,
    pub num_levels: usize,
    /// Terminal level reached with the advance criterion satisfied.
    pub completed: bool,
    pub diverged_iterations: usize,
    /// Mean tracking loss of every non-diverged iteration.
    pub loss_history: Vec<f64>,
    pub best_eval: Option<MetricsReport>,
}

impl TrainingSummary {
    pub fn final_loss(&self) -> Option<f64> {
        self.loss_history.last().copied()
    }
}

struct EvalSetup<'a, D> {
    dynamics: &'a D,
    trajectories: &'a [Trajectory],
    config: EvalConfig,
}

/// Trains on `D`; evaluates on `E`, which defaults to the training dynamics
/// and may be a different model (e.g. the true vehicle behind a learnt one).
pub struct Trainer<'a, D: Dynamics, E: Dynamics = D> {
    dynamics: &'a D,
    policy: Policy,
    template: ParamStore,
    flat: Vec<f64>,
    optimizer: Optimizer,
    scheduler: CurriculumScheduler,
    sampler: BatchSampler<'a, D>,
    config: TrainerConfig,
    evaluation: Option<EvalSetup<'a, E>>,
    best: Option<(ParamStore, MetricsReport)>,
    iteration: usize,
    diverged_iterations: usize,
    loss_history: Vec<f64>,
}

/// Controller inputs at sampled initial states and along the sampled
/// reference segments.
fn normalizer_samples<D: Dynamics>(
    policy: &Policy,
    sampler: &mut BatchSampler<'_, D>,
    level: &DifficultyLevel,
    n: usize,
) -> Vec<Vec<f64>> {
    let w = policy.max_window();
    let mut samples = Vec::with_capacity(n);
    while samples.len() < n {
        for task in sampler.sample(level) {
            samples.push(policy.features(&task.initial_state, &task.segment.window(1, w)));
            let stride = (task.segment.len() / 4).max(1);
            for t in (stride..task.segment.len()).step_by(stride) {
                let state = sampler.perturb(task.segment.state(t), level.perturbation);
                samples.push(policy.features(&state, &task.segment.window(t + 1, w)));
            }
        }
    }
    samples.truncate(n);
    samples
}

impl<'a, D: Dynamics> Trainer<'a, D> {
    /// Build a fresh policy, fit its input normalizer on the training split
    /// at the hardest level, and initialize the parameters from the seed.
    pub fn new(
        dynamics: &'a D,
        controller: ControllerConfig,
        trajectories: &'a [Trajectory],
        settings: TrainingSettings,
    ) -> Result<Self> {
        let mut policy = Policy::new(controller, dynamics)?;
        let seed = settings.trainer.seed;

        if policy.config().normalize_inputs && settings.trainer.normalizer_samples > 0 {
            let levels = settings.curriculum.resolve_levels();
            let hardest = levels
                .last()
                .ok_or_else(|| TrainError::Configuration("curriculum has no levels".into()))?;
            hardest.validate(policy.max_window())?;
            let mut sampler = BatchSampler::new(
                dynamics,
                trajectories,
                settings.sampler.clone(),
                seed.wrapping_add(2),
            )?;
            let samples = normalizer_samples(
                &policy,
                &mut sampler,
                hardest,
                settings.trainer.normalizer_samples,
            );
            let normalizer = Normalizer::fit(&samples, policy.config().min_std)?;
            policy.set_normalizer(normalizer)?;
        }

        let params = policy.initialize(&mut StdRng::seed_from_u64(seed))?;
        Self::from_parts(dynamics, policy, params, trajectories, settings)
    }

    /// Continue from an existing policy and parameters (e.g. a checkpoint).
    pub fn from_parts(
        dynamics: &'a D,
        policy: Policy,
        params: ParamStore,
        trajectories: &'a [Trajectory],
        settings: TrainingSettings,
    ) -> Result<Self> {
        RolloutEngine::new(dynamics, &policy)?;
        policy.check_params(&params)?;
        let scheduler = CurriculumScheduler::new(settings.curriculum, policy.max_window())?;
        let sampler = BatchSampler::new(
            dynamics,
            trajectories,
            settings.sampler,
            settings.trainer.seed.wrapping_add(1),
        )?;
        let optimizer = Optimizer::new(&settings.optimizer)?;
        Ok(Self {
            dynamics,
            flat: params.to_flat(),
            template: params,
            policy,
            optimizer,
            scheduler,
            sampler,
            config: settings.trainer,
            evaluation: None,
            best: None,
            iteration: 0,
            diverged_iterations: 0,
            loss_history: Vec::new(),
        })
    }

}

impl<'a, D: Dynamics, E: Dynamics> Trainer<'a, D, E> {
    /// Periodically evaluate on `trajectories`, keeping the best parameters.
    ///
    /// `dynamics` may carry different physical parameters than training, or
    /// be another model of the same vehicle altogether. Replacing the
    /// evaluation forgets the best parameters found so far.
    pub fn with_evaluation<F: Dynamics>(
        self,
        dynamics: &'a F,
        trajectories: &'a [Trajectory],
        config: EvalConfig,
    ) -> Result<Trainer<'a, D, F>> {
        Evaluator::new(dynamics, &self.policy, config.clone())?;
        if trajectories.is_empty() {
            return Err(TrainError::Configuration("no evaluation trajectories".into()));
        }
        Ok(Trainer {
            dynamics: self.dynamics,
            policy: self.policy,
            template: self.template,
            flat: self.flat,
            optimizer: self.optimizer,
            scheduler: self.scheduler,
            sampler: self.sampler,
            config: self.config,
            evaluation: Some(EvalSetup {
                dynamics,
                trajectories,
                config,
            }),
            best: None,
            iteration: self.iteration,
            diverged_iterations: self.diverged_iterations,
            loss_history: self.loss_history,
        })
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn scheduler(&self) -> &CurriculumScheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn flat_params(&self) -> &[f64] {
        &self.flat
    }

    /// Current parameters as named tensors.
    pub fn params(&self) -> Result<ParamStore> {
        let mut params = self.template.clone();
        params.set_flat(&self.flat)?;
        Ok(params)
    }

    pub fn best(&self) -> Option<(&ParamStore, &MetricsReport)> {
        self.best.as_ref().map(|(p, r)| (p, r))
    }

    pub fn loss_history(&self) -> &[f64] {
        &self.loss_history
    }

    /// Run one iteration.
    pub fn step(&mut self, sink: &mut dyn EventSink) -> Result<Transition> {
        let level = self.scheduler.current_level().clone();
        let level_index = self.scheduler.level_index();
        let tasks = self.sampler.sample(&level);
        let engine = RolloutEngine::new(self.dynamics, &self.policy)?;

        let outcome = match engine.batch_gradient(&self.flat, &tasks, &level) {
            Ok(batch) => {
                let grad_norm = self.optimizer.apply(&mut self.flat, &batch.gradient)?;
                self.loss_history.push(batch.tracking_loss);
                sink.emit(&TrainingEvent::Iteration {
                    iteration: self.iteration,
                    level: level_index,
                    horizon: level.horizon,
                    loss: batch.loss,
                    tracking_loss: batch.tracking_loss,
                    grad_norm,
                })?;
                let sampler = self.sampler.config();
                if sampler.self_play > 0.0 && self.iteration % sampler.collect_every == 0 {
                    self.sampler.collect(&tasks, &batch.rollouts);
                }
                Outcome::stable(batch.tracking_loss)
            }
            Err(RolloutError::NumericDivergence { step }) => {
                self.diverged_iterations += 1;
                sink.emit(&TrainingEvent::Diverged {
                    iteration: self.iteration,
                    level: level_index,
                    step,
                })?;
                Outcome::diverged()
            }
            Err(e) => return Err(e.into()),
        };

        let transition = self.scheduler.report(outcome);
        match transition {
            Transition::Advance { from, to } | Transition::Regress { from, to } => {
                sink.emit(&TrainingEvent::LevelChanged {
                    iteration: self.iteration,
                    from,
                    to,
                })?;
            }
            Transition::Stagnated { level, iterations } => {
                sink.emit(&TrainingEvent::Stagnation {
                    iteration: self.iteration,
                    level,
                    iterations_at_level: iterations,
                })?;
            }
            Transition::Hold => {}
        }

        self.iteration += 1;
        if self.config.eval_every > 0 && self.iteration % self.config.eval_every == 0 {
            self.evaluate(sink)?;
        }
        Ok(transition)
    }

    /// Evaluate the current parameters if an evaluation set is configured,
    /// and keep them if they are the best so far.
    pub fn evaluate(&mut self, sink: &mut dyn EventSink) -> Result<Option<MetricsReport>> {
        let Some(setup) = &self.evaluation else {
            return Ok(None);
        };
        let mut config = setup.config.clone();
        if let Some(threshold) = self.scheduler.current_level().eval_threshold {
            config.divergence_threshold = threshold;
        }
        let params = self.params()?;
        let evaluator = Evaluator::new(setup.dynamics, &self.policy, config)?;
        let report = evaluator.evaluate(&params, setup.trajectories)?;

        let best = self
            .best
            .as_ref()
            .map_or(true, |(_, b)| report.is_better_than(b));
        sink.emit(&TrainingEvent::Evaluation {
            iteration: self.iteration,
            level: self.scheduler.level_index(),
            n_episodes: report.n_episodes,
            n_failed: report.n_failed,
            mean_position_rmse: report.mean_position_rmse,
            mean_steps_survived: report.mean_steps_survived,
            best,
        })?;
        if best {
            self.best = Some((params, report.clone()));
        }
        Ok(Some(report))
    }

    /// Iterate until the budget is spent or, if configured, the curriculum
    /// is complete. Ends with an evaluation when one is configured.
    pub fn run(&mut self, sink: &mut dyn EventSink) -> Result<TrainingSummary> {
        while self.iteration < self.config.iterations {
            if self.config.stop_when_complete && self.scheduler.is_complete() {
                break;
            }
            self.step(sink)?;
        }

        let every = self.config.eval_every;
        let evaluated_last = every > 0 && self.iteration > 0 && self.iteration % every == 0;
        if !evaluated_last {
            self.evaluate(sink)?;
        }
        sink.emit(&TrainingEvent::Finished {
            iterations: self.iteration,
            level: self.scheduler.level_index(),
            completed: self.scheduler.is_complete(),
            diverged_iterations: self.diverged_iterations,
        })?;
        sink.flush()?;
        Ok(self.summary())
    }

    pub fn summary(&self) -> TrainingSummary {
        TrainingSummary {
            iterations: self.iteration,
            final_level: self.scheduler.level_index(),
            num_levels: self.scheduler.num_levels(),
            completed: self.scheduler.is_complete(),
            diverged_iterations: self.diverged_iterations,
            loss_history: self.loss_history.clone(),
            best_eval: self.best.as_ref().map(|(_, r)| r.clone()),
        }
    }

    fn meta(&self, report: Option<&MetricsReport>) -> CheckpointMeta {
        CheckpointMeta {
            iterations: self.iteration,
            level: self.scheduler.level_index(),
            train_loss: self.loss_history.last().copied(),
            eval_rmse: report.map(|r| r.mean_position_rmse),
            eval_failures: report.map(|r| r.n_failed),
        }
    }

    /// Checkpoint of the current parameters.
    pub fn checkpoint(&self) -> Result<Checkpoint> {
        Ok(Checkpoint::new(&self.policy, &self.params()?, self.meta(None)))
    }

    /// Checkpoint of the best evaluated parameters, if any evaluation ran.
    pub fn best_checkpoint(&self) -> Option<Checkpoint> {
        self.best
            .as_ref()
            .map(|(params, report)| Checkpoint::new(&self.policy, params, self.meta(Some(report))))
    }
}
