//! Batch sampling of initial states and reference segments.
//!
//! Most tasks start near the first state of a random corpus segment, with a
//! Gaussian perturbation of the current level's σ. A configurable fraction
//! starts from states the controller itself reached in earlier rollouts
//! (the self-play pool), paired with the reference they were tracking when
//! reached: same corpus step, same anchor, same aggressiveness.

use std::collections::VecDeque;

use gradpilot_model::Dynamics;
use gradpilot_reference::Trajectory;
use rand::prelude::*;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::difficulty::DifficultyLevel;
use crate::error::{Result, TrainError};
use crate::rollout::Rollout;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Rollouts per iteration.
    pub batch_size: usize,
    /// Fraction of each batch drawn from the self-play pool, in [0, 1].
    pub self_play: f64,
    /// Add reached states to the pool every N iterations.
    pub collect_every: usize,
    /// Oldest pool entries are dropped beyond this size.
    pub pool_capacity: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            batch_size: 16,
            self_play: 0.0,
            collect_every: 10,
            pool_capacity: 2048,
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(TrainError::Configuration("batch_size must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.self_play) {
            return Err(TrainError::Configuration(format!(
                "self_play must be in [0, 1], got {}",
                self.self_play
            )));
        }
        if self.collect_every == 0 || self.pool_capacity == 0 {
            return Err(TrainError::Configuration(
                "collect_every and pool_capacity must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Input of one rollout.
#[derive(Debug, Clone, PartialEq)]
pub struct RolloutTask {
    pub initial_state: Vec<f64>,
    pub segment: Trajectory,
    /// Where the segment was cut from the corpus.
    pub origin: Option<SegmentOrigin>,
    pub self_play: bool,
}

impl RolloutTask {
    pub fn new(initial_state: Vec<f64>, segment: Trajectory) -> Self {
        Self {
            initial_state,
            segment,
            origin: None,
            self_play: false,
        }
    }
}

/// Position of a reference segment in the training corpus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentOrigin {
    pub trajectory: usize,
    /// Corpus step the segment's scaling is anchored at.
    pub anchor: usize,
    /// Corpus step of the segment's first state, at or after `anchor`.
    pub start: usize,
    pub aggressiveness: f64,
}

impl SegmentOrigin {
    /// The same scaled reference, resumed `k` steps later.
    fn advanced(self, k: usize) -> Self {
        Self {
            start: self.start + k,
            ..self
        }
    }
}

#[derive(Debug, Clone)]
struct PoolEntry {
    origin: SegmentOrigin,
    state: Vec<f64>,
}

/// Seeded sampler over the training split.
pub struct BatchSampler<'a, D: Dynamics> {
    dynamics: &'a D,
    trajectories: &'a [Trajectory],
    config: SamplerConfig,
    scale: Vec<f64>,
    rng: StdRng,
    pool: VecDeque<PoolEntry>,
}

impl<'a, D: Dynamics> BatchSampler<'a, D> {
    pub fn new(
        dynamics: &'a D,
        trajectories: &'a [Trajectory],
        config: SamplerConfig,
        seed: u64,
    ) -> Result<Self> {
        config.validate()?;
        if trajectories.is_empty() {
            return Err(TrainError::Configuration("no training trajectories".into()));
        }
        if let Some(bad) = trajectories
            .iter()
            .find(|t| t.state_dim() != dynamics.state_dim())
        {
            return Err(TrainError::Configuration(format!(
                "trajectory '{}' has state dimension {}, {} expects {}",
                bad.id,
                bad.state_dim(),
                dynamics.name(),
                dynamics.state_dim()
            )));
        }
        Ok(Self {
            dynamics,
            trajectories,
            scale: dynamics.perturbation_scale(),
            config,
            rng: StdRng::seed_from_u64(seed),
            pool: VecDeque::new(),
        })
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    /// `state + σ·scale·n`, `n ~ N(0, I)`, projected back onto the state
    /// manifold.
    pub fn perturb(&mut self, state: &[f64], sigma: f64) -> Vec<f64> {
        let mut x: Vec<f64> = state
            .iter()
            .zip(&self.scale)
            .map(|(&s, &k)| {
                let n: f64 = self.rng.sample(StandardNormal);
                s + sigma * k * n
            })
            .collect();
        self.dynamics.normalize_state(&mut x);
        x
    }

    fn segment(&self, origin: &SegmentOrigin, horizon: usize) -> Trajectory {
        self.trajectories[origin.trajectory].anchored_segment(
            origin.anchor,
            origin.start,
            horizon,
            origin.aggressiveness,
            self.dynamics.quaternion_offset(),
        )
    }

    /// Draw one batch for `level`.
    pub fn sample(&mut self, level: &DifficultyLevel) -> Vec<RolloutTask> {
        let batch = self.config.batch_size;
        let n_self = ((batch as f64 * self.config.self_play).round() as usize).min(self.pool.len());
        let mut tasks = Vec::with_capacity(batch);

        for _ in 0..n_self {
            let idx = self.rng.gen_range(0..self.pool.len());
            let PoolEntry { origin, state } = self.pool[idx].clone();
            tasks.push(RolloutTask {
                initial_state: state,
                segment: self.segment(&origin, level.horizon),
                origin: Some(origin),
                self_play: true,
            });
        }
        for _ in n_self..batch {
            let trajectory = self.rng.gen_range(0..self.trajectories.len());
            let last_start = self.trajectories[trajectory]
                .len()
                .saturating_sub(level.horizon + 1);
            let start = self.rng.gen_range(0..=last_start);
            let origin = SegmentOrigin {
                trajectory,
                anchor: start,
                start,
                aggressiveness: level.aggressiveness,
            };
            let segment = self.segment(&origin, level.horizon);
            let initial_state = self.perturb(segment.state(0), level.perturbation);
            tasks.push(RolloutTask {
                initial_state,
                segment,
                origin: Some(origin),
                self_play: false,
            });
        }
        tasks
    }

    /// Add one reached state per rollout to the self-play pool.
    ///
    /// Step `k`'s state was reached while tracking the task's segment at
    /// step `k`; the entry keeps that segment's anchor and aggressiveness so
    /// replays resume the same scaled reference.
    pub fn collect(&mut self, tasks: &[RolloutTask], rollouts: &[Rollout]) {
        for (task, rollout) in tasks.iter().zip(rollouts) {
            let Some(origin) = task.origin else {
                continue;
            };
            if rollout.steps.is_empty() {
                continue;
            }
            let k = self.rng.gen_range(0..rollout.steps.len());
            self.pool.push_back(PoolEntry {
                origin: origin.advanced(k),
                state: rollout.steps[k].state.clone(),
            });
        }
        while self.pool.len() > self.config.pool_capacity {
            self.pool.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rollout::StepRecord;
    use approx::assert_relative_eq;
    use gradpilot_reference::TrajectoryGenerator;
    use gradpilot_vehicles::{CartPole, Quadrotor};

    fn cartpole_corpus() -> Vec<Trajectory> {
        let mut generator = TrajectoryGenerator::new(5);
        (0..3)
            .map(|i| generator.cartpole_sweep(&format!("c{i}"), 100, 0.02).unwrap())
            .collect()
    }

    #[test]
    fn test_sampling_is_seeded() {
        let cartpole = CartPole::default();
        let corpus = cartpole_corpus();
        let level = DifficultyLevel::default();
        let mut a = BatchSampler::new(&cartpole, &corpus, SamplerConfig::default(), 9).unwrap();
        let mut b = BatchSampler::new(&cartpole, &corpus, SamplerConfig::default(), 9).unwrap();
        let ta = a.sample(&level);
        assert_eq!(ta, b.sample(&level));
        assert_eq!(ta.len(), 16);
        assert!(ta.iter().all(|t| t.segment.len() == level.horizon + 1));
    }

    #[test]
    fn test_zero_perturbation_starts_on_reference() {
        let cartpole = CartPole::default();
        let corpus = cartpole_corpus();
        let level = DifficultyLevel {
            perturbation: 0.0,
            ..Default::default()
        };
        let mut sampler =
            BatchSampler::new(&cartpole, &corpus, SamplerConfig::default(), 1).unwrap();
        for task in sampler.sample(&level) {
            assert_eq!(task.initial_state, task.segment.state(0).to_vec());
        }
    }

    #[test]
    fn test_quadrotor_perturbation_keeps_unit_quaternion() {
        let quad = Quadrotor::default();
        let mut generator = TrajectoryGenerator::new(2);
        let corpus = vec![generator.figure_eight("f", 200, 0.02).unwrap()];
        let level = DifficultyLevel {
            perturbation: 0.3,
            ..Default::default()
        };
        let mut sampler = BatchSampler::new(&quad, &corpus, SamplerConfig::default(), 4).unwrap();
        for task in sampler.sample(&level) {
            let q = &task.initial_state[3..7];
            assert_relative_eq!(q.iter().map(|c| c * c).sum::<f64>(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_self_play_fraction() {
        let cartpole = CartPole::default();
        let corpus = cartpole_corpus();
        let level = DifficultyLevel::default();
        let config = SamplerConfig {
            batch_size: 8,
            self_play: 0.25,
            ..Default::default()
        };
        let mut sampler = BatchSampler::new(&cartpole, &corpus, config, 3).unwrap();

        // Empty pool: all tasks come from the corpus.
        let tasks = sampler.sample(&level);
        assert!(tasks.iter().all(|t| !t.self_play));

        let rollouts: Vec<Rollout> = tasks
            .iter()
            .map(|t| Rollout {
                steps: vec![StepRecord {
                    state: vec![9.0, 0.0, 0.0, 0.0],
                    control: vec![0.0],
                    reference: t.segment.state(1).to_vec(),
                }],
                final_state: vec![0.0; 4],
                loss: 0.0,
                tracking_loss: 0.0,
            })
            .collect();
        sampler.collect(&tasks, &rollouts);
        assert_eq!(sampler.pool_len(), 8);

        let tasks = sampler.sample(&level);
        let from_pool: Vec<_> = tasks.iter().filter(|t| t.self_play).collect();
        assert_eq!(from_pool.len(), 2);
        assert!(from_pool.iter().all(|t| t.initial_state[0] == 9.0));
    }

    #[test]
    fn test_self_play_resumes_scaled_reference() {
        let quad = Quadrotor::default();
        let mut generator = TrajectoryGenerator::new(2);
        let corpus = vec![generator.figure_eight("f", 200, 0.02).unwrap()];
        let level = DifficultyLevel {
            horizon: 20,
            perturbation: 0.0,
            aggressiveness: 0.3,
            ..Default::default()
        };
        let config = SamplerConfig {
            batch_size: 8,
            self_play: 1.0,
            ..Default::default()
        };
        let mut sampler = BatchSampler::new(&quad, &corpus, config, 11).unwrap();

        // A perfect tracker sits on its scaled reference at every step.
        let track = |tasks: &[RolloutTask]| -> Vec<Rollout> {
            tasks
                .iter()
                .map(|t| Rollout {
                    steps: (0..level.horizon)
                        .map(|k| StepRecord {
                            state: t.segment.state(k).to_vec(),
                            control: vec![0.0; 4],
                            reference: t.segment.state(k + 1).to_vec(),
                        })
                        .collect(),
                    final_state: t.segment.state(level.horizon).to_vec(),
                    loss: 0.0,
                    tracking_loss: 0.0,
                })
                .collect()
        };

        let tasks = sampler.sample(&level);
        sampler.collect(&tasks, &track(&tasks));
        // Replayed twice so offsets accumulate on resumed segments.
        for _ in 0..2 {
            let tasks = sampler.sample(&level);
            assert!(tasks.iter().all(|t| t.self_play));
            for task in &tasks {
                let origin = task.origin.unwrap();
                assert!(origin.start >= origin.anchor);
                for (x, r) in task.initial_state[..3].iter().zip(&task.segment.state(0)[..3]) {
                    assert_relative_eq!(*x, *r, epsilon = 1e-12);
                }
            }
            sampler.collect(&tasks, &track(&tasks));
        }
    }

    #[test]
    fn test_pool_capacity() {
        let cartpole = CartPole::default();
        let corpus = cartpole_corpus();
        let config = SamplerConfig {
            batch_size: 4,
            pool_capacity: 3,
            ..Default::default()
        };
        let mut sampler = BatchSampler::new(&cartpole, &corpus, config, 3).unwrap();
        let tasks = sampler.sample(&DifficultyLevel::default());
        let rollouts: Vec<Rollout> = tasks
            .iter()
            .map(|t| Rollout {
                steps: vec![StepRecord {
                    state: t.initial_state.clone(),
                    control: vec![0.0],
                    reference: t.initial_state.clone(),
                }],
                final_state: t.initial_state.clone(),
                loss: 0.0,
                tracking_loss: 0.0,
            })
            .collect();
        sampler.collect(&tasks, &rollouts);
        assert_eq!(sampler.pool_len(), 3);
    }

    #[test]
    fn test_rejects_mismatched_corpus() {
        let quad = Quadrotor::default();
        let corpus = cartpole_corpus();
        assert!(BatchSampler::new(&quad, &corpus, SamplerConfig::default(), 0).is_err());
    }
}
