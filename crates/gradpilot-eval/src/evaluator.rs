//! Closed-loop evaluation episodes.

use gradpilot_control::{ParamStore, Policy};
use gradpilot_diff::all_finite;
use gradpilot_model::Dynamics;
use gradpilot_reference::Trajectory;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};
use crate::recorder::RolloutRecorder;
use crate::report::{EpisodeResult, FailureKind, MetricsReport};

/// Evaluation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Steps per episode. `None` runs each trajectory to its end.
    pub horizon: Option<usize>,
    /// Reference window length. `None` uses the controller's maximum window.
    pub window: Option<usize>,
    /// Position error (m) above which an episode counts as failed.
    pub divergence_threshold: f64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            horizon: None,
            window: None,
            divergence_threshold: 1.0,
        }
    }
}

impl EvalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.horizon == Some(0) {
            return Err(EvalError::Configuration("horizon must be positive".into()));
        }
        if self.window == Some(0) {
            return Err(EvalError::Configuration("window must be positive".into()));
        }
        if !(self.divergence_threshold > 0.0) {
            return Err(EvalError::Configuration(format!(
                "divergence_threshold must be positive, got {}",
                self.divergence_threshold
            )));
        }
        Ok(())
    }
}

/// Runs a policy against a dynamics model on held-out trajectories.
///
/// The dynamics may differ from the training model in its parameters (model
/// mismatch), but must agree in vehicle and dimensions.
pub struct Evaluator<'a, D: Dynamics> {
    dynamics: &'a D,
    policy: &'a Policy,
    config: EvalConfig,
}

impl<'a, D: Dynamics> Evaluator<'a, D> {
    pub fn new(dynamics: &'a D, policy: &'a Policy, config: EvalConfig) -> Result<Self> {
        config.validate()?;
        if policy.vehicle() != dynamics.name() {
            return Err(EvalError::Configuration(format!(
                "controller was built for '{}', evaluating on '{}'",
                policy.vehicle(),
                dynamics.name()
            )));
        }
        if policy.state_dim() != dynamics.state_dim()
            || policy.control_dim() != dynamics.control_dim()
        {
            return Err(EvalError::Configuration(format!(
                "controller dimensions {}x{} do not match dynamics {}x{}",
                policy.state_dim(),
                policy.control_dim(),
                dynamics.state_dim(),
                dynamics.control_dim()
            )));
        }
        if let Some(w) = config.window {
            if w > policy.max_window() {
                return Err(EvalError::Configuration(format!(
                    "window {w} exceeds the controller's maximum window {}",
                    policy.max_window()
                )));
            }
        }
        Ok(Self {
            dynamics,
            policy,
            config,
        })
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    fn window(&self) -> usize {
        self.config.window.unwrap_or(self.policy.max_window())
    }

    fn horizon(&self, trajectory: &Trajectory) -> usize {
        self.config
            .horizon
            .unwrap_or_else(|| trajectory.len().saturating_sub(1).max(1))
    }

    fn check_trajectory(&self, trajectory: &Trajectory) -> Result<()> {
        if trajectory.state_dim() != self.dynamics.state_dim() {
            return Err(EvalError::Configuration(format!(
                "trajectory '{}' has state dimension {}, expected {}",
                trajectory.id,
                trajectory.state_dim(),
                self.dynamics.state_dim()
            )));
        }
        Ok(())
    }

    /// Run one episode from the trajectory's first state.
    ///
    /// Divergence is reported in the result, not as an error.
    pub fn run_episode(
        &self,
        params: &[f64],
        trajectory: &Trajectory,
        mut recorder: Option<&mut RolloutRecorder>,
    ) -> Result<EpisodeResult> {
        self.check_trajectory(trajectory)?;
        let horizon = self.horizon(trajectory);
        let window_len = self.window();
        let dt = trajectory.dt;

        let mut state = trajectory.state(0).to_vec();
        let mut failure = None;
        let mut steps_survived = 0;
        let mut simulated = 0;
        let mut position_sq = 0.0;
        let mut tracking = 0.0;

        for t in 0..horizon {
            let window = trajectory.window(t + 1, window_len);
            let control = self.policy.act_with(params, &state, &window);
            if !all_finite(&control) {
                failure = Some(FailureKind::NonFinite);
                break;
            }
            let next = self.dynamics.advance(&state, &control, dt);
            if !all_finite(&next) {
                failure = Some(FailureKind::NonFinite);
                break;
            }
            let reference = trajectory.state(t + 1);
            if let Some(rec) = recorder.as_deref_mut() {
                rec.record(t as f64 * dt, &state, &control, reference);
            }

            let err_sq = self.dynamics.position_error_sq(&next, reference);
            position_sq += err_sq;
            tracking += self.dynamics.tracking_error(&next, reference);
            simulated += 1;
            state = next;

            if err_sq.sqrt() > self.config.divergence_threshold {
                failure = Some(FailureKind::ThresholdExceeded);
                break;
            }
            steps_survived += 1;
        }

        let n = simulated.max(1) as f64;
        Ok(EpisodeResult {
            trajectory_id: trajectory.id.clone(),
            horizon,
            steps_survived,
            failure,
            position_rmse: (position_sq / n).sqrt(),
            mean_tracking_error: tracking / n,
        })
    }

    fn check_params(&self, params: &ParamStore) -> Result<Vec<f64>> {
        self.policy.check_params(params)?;
        Ok(params.to_flat())
    }

    /// Evaluate every trajectory in parallel.
    pub fn evaluate(
        &self,
        params: &ParamStore,
        trajectories: &[Trajectory],
    ) -> Result<MetricsReport> {
        let flat = self.check_params(params)?;
        let episodes = trajectories
            .par_iter()
            .map(|traj| self.run_episode(&flat, traj, None))
            .collect::<Result<Vec<_>>>()?;
        Ok(MetricsReport::from_episodes(self.dynamics.name(), episodes))
    }

    /// Like [`Evaluator::evaluate`], also returning one trace per trajectory.
    pub fn evaluate_with_traces(
        &self,
        params: &ParamStore,
        trajectories: &[Trajectory],
    ) -> Result<(MetricsReport, Vec<RolloutRecorder>)> {
        let flat = self.check_params(params)?;
        let (episodes, traces): (Vec<_>, Vec<_>) = trajectories
            .par_iter()
            .map(|traj| {
                let mut rec = RolloutRecorder::new(traj.id.clone());
                self.run_episode(&flat, traj, Some(&mut rec)).map(|e| (e, rec))
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .unzip();
        Ok((MetricsReport::from_episodes(self.dynamics.name(), episodes), traces))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gradpilot_control::ControllerConfig;
    use gradpilot_reference::TrajectoryGenerator;
    use gradpilot_vehicles::{CartPole, CartPoleParams, Quadrotor};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn cartpole_policy(cartpole: &CartPole) -> (Policy, ParamStore) {
        let policy = Policy::new(ControllerConfig::default(), cartpole).unwrap();
        let params = policy.initialize(&mut StdRng::seed_from_u64(7)).unwrap();
        (policy, params)
    }

    fn upright(steps: usize) -> Trajectory {
        TrajectoryGenerator::constant("upright", vec![0.0; 4], steps, 0.02).unwrap()
    }

    #[test]
    fn test_episode_runs_full_horizon() {
        let cartpole = CartPole::default();
        let (policy, params) = cartpole_policy(&cartpole);
        let eval = Evaluator::new(&cartpole, &policy, EvalConfig::default()).unwrap();
        let result = eval.run_episode(&params.to_flat(), &upright(20), None).unwrap();
        assert_eq!(result.horizon, 20);
        assert_eq!(result.steps_survived, 20);
        assert!(result.failure.is_none());
        assert!(result.position_rmse.is_finite());
    }

    #[test]
    fn test_threshold_failure_is_recorded() {
        let cartpole = CartPole::default();
        let (policy, params) = cartpole_policy(&cartpole);
        let config = EvalConfig {
            divergence_threshold: 0.5,
            ..Default::default()
        };
        let eval = Evaluator::new(&cartpole, &policy, config).unwrap();
        // Reference jumps 10 m down the rail.
        let far =
            Trajectory::new("far", 0.02, vec![vec![0.0; 4], vec![10.0, 0.0, 0.0, 0.0]]).unwrap();
        let result = eval.run_episode(&params.to_flat(), &far, None).unwrap();
        assert_eq!(result.failure, Some(FailureKind::ThresholdExceeded));
        assert_eq!(result.steps_survived, 0);
    }

    #[test]
    fn test_nonfinite_parameters_fail_episode() {
        let cartpole = CartPole::default();
        let (policy, params) = cartpole_policy(&cartpole);
        let flat = vec![f64::NAN; params.len()];
        let eval = Evaluator::new(&cartpole, &policy, EvalConfig::default()).unwrap();
        let result = eval.run_episode(&flat, &upright(5), None).unwrap();
        assert_eq!(result.failure, Some(FailureKind::NonFinite));
        assert_eq!(result.position_rmse, 0.0);
    }

    #[test]
    fn test_evaluate_collects_traces() {
        let cartpole = CartPole::default();
        let (policy, params) = cartpole_policy(&cartpole);
        let config = EvalConfig {
            horizon: Some(10),
            ..Default::default()
        };
        let eval = Evaluator::new(&cartpole, &policy, config).unwrap();
        let mut generator = TrajectoryGenerator::new(3);
        let trajs: Vec<_> = (0..4)
            .map(|i| generator.cartpole_sweep(&format!("t{i}"), 30, 0.02).unwrap())
            .collect();
        let (report, traces) = eval.evaluate_with_traces(&params, &trajs).unwrap();
        assert_eq!(report.n_episodes, 4);
        assert_eq!(traces.len(), 4);
        assert_eq!(traces[1].trajectory_id, "t1");
        for (trace, episode) in traces.iter().zip(&report.episodes) {
            assert!(trace.len() >= episode.steps_survived);
        }

        let plain = eval.evaluate(&params, &trajs).unwrap();
        assert_eq!(plain, report);
    }

    #[test]
    fn test_model_mismatch_same_vehicle_allowed() {
        let train = CartPole::default();
        let (policy, params) = cartpole_policy(&train);
        let heavier = CartPole::new(CartPoleParams {
            pole_mass: 0.2,
            ..Default::default()
        })
        .unwrap();
        let eval = Evaluator::new(&heavier, &policy, EvalConfig::default()).unwrap();
        assert!(eval.evaluate(&params, &[upright(10)]).is_ok());
    }

    #[test]
    fn test_vehicle_mismatch_is_fatal() {
        let cartpole = CartPole::default();
        let (policy, _) = cartpole_policy(&cartpole);
        let quad = Quadrotor::default();
        assert!(matches!(
            Evaluator::new(&quad, &policy, EvalConfig::default()),
            Err(EvalError::Configuration(_))
        ));
    }

    #[test]
    fn test_wrong_trajectory_dimension_is_fatal() {
        let cartpole = CartPole::default();
        let (policy, params) = cartpole_policy(&cartpole);
        let eval = Evaluator::new(&cartpole, &policy, EvalConfig::default()).unwrap();
        let bad = Trajectory::new("bad", 0.02, vec![vec![0.0; 3]; 3]).unwrap();
        assert!(matches!(
            eval.evaluate(&params, &[bad]),
            Err(EvalError::Configuration(_))
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let cartpole = CartPole::default();
        let (policy, _) = cartpole_policy(&cartpole);
        let config = EvalConfig {
            window: Some(policy.max_window() + 1),
            ..Default::default()
        };
        assert!(Evaluator::new(&cartpole, &policy, config).is_err());
    }
}
