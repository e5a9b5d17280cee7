//! The differentiable closed-loop rollout.
//!
//! One rollout starts from an initial state and, for each of H steps, asks
//! the policy for a control given the state and a window of upcoming
//! reference states, advances the dynamics and accumulates the loss. The same
//! code runs on `f64` for plain simulation and on tape variables for
//! gradients; a gradient rollout owns a fresh [`Tape`].

use gradpilot_control::{Controller, Policy};
use gradpilot_diff::{Scalar, Tape, all_finite};
use gradpilot_model::Dynamics;
use gradpilot_reference::Trajectory;
use rayon::prelude::*;

use crate::difficulty::DifficultyLevel;
use crate::error::RolloutError;
use crate::sampler::RolloutTask;

/// Plain values of one rollout step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    /// State the control was computed from.
    pub state: Vec<f64>,
    pub control: Vec<f64>,
    /// Reference the next state is scored against.
    pub reference: Vec<f64>,
}

/// The immutable record of one rollout.
#[derive(Debug, Clone, PartialEq)]
pub struct Rollout {
    pub steps: Vec<StepRecord>,
    pub final_state: Vec<f64>,
    /// Weighted total loss.
    pub loss: f64,
    /// Mean per-step tracking error, unweighted.
    pub tracking_loss: f64,
}

impl Rollout {
    pub fn horizon(&self) -> usize {
        self.steps.len()
    }
}

/// A rollout with `∂loss/∂params`.
#[derive(Debug, Clone)]
pub struct RolloutGradient {
    pub rollout: Rollout,
    pub gradient: Vec<f64>,
}

/// Averaged result of a batch of rollouts.
#[derive(Debug, Clone)]
pub struct BatchGradient {
    pub loss: f64,
    pub tracking_loss: f64,
    pub gradient: Vec<f64>,
    pub rollouts: Vec<Rollout>,
}

struct Unrolled<S> {
    total: S,
    tracking: S,
    final_state: Vec<S>,
}

/// Composes a policy and a dynamics model over a horizon.
pub struct RolloutEngine<'a, D: Dynamics> {
    dynamics: &'a D,
    policy: &'a Policy,
    nominal: Vec<f64>,
    inv_half_range: Vec<f64>,
    num_params: usize,
}

impl<'a, D: Dynamics> RolloutEngine<'a, D> {
    pub fn new(dynamics: &'a D, policy: &'a Policy) -> Result<Self, RolloutError> {
        if policy.state_dim() != dynamics.state_dim()
            || policy.control_dim() != dynamics.control_dim()
        {
            return Err(RolloutError::Configuration(format!(
                "controller dimensions {}x{} do not match {} dynamics {}x{}",
                policy.state_dim(),
                policy.control_dim(),
                dynamics.name(),
                dynamics.state_dim(),
                dynamics.control_dim()
            )));
        }
        Ok(Self {
            dynamics,
            policy,
            nominal: dynamics.nominal_control(),
            inv_half_range: dynamics
                .control_bounds()
                .iter()
                .map(|b| 1.0 / b.half_range())
                .collect(),
            num_params: policy.network().template().len(),
        })
    }

    pub fn dynamics(&self) -> &D {
        self.dynamics
    }

    pub fn policy(&self) -> &Policy {
        self.policy
    }

    pub fn num_params(&self) -> usize {
        self.num_params
    }

    /// Validate everything a rollout needs before any arithmetic happens.
    pub fn check(
        &self,
        params: &[f64],
        initial: &[f64],
        segment: &Trajectory,
        level: &DifficultyLevel,
    ) -> Result<(), RolloutError> {
        level.validate(self.policy.max_window())?;
        let dim = self.dynamics.state_dim();
        if params.len() != self.num_params {
            return Err(RolloutError::Configuration(format!(
                "expected {} parameters, got {}",
                self.num_params,
                params.len()
            )));
        }
        if initial.len() != dim {
            return Err(RolloutError::Configuration(format!(
                "initial state has dimension {}, expected {dim}",
                initial.len()
            )));
        }
        if segment.is_empty() || segment.state_dim() != dim {
            return Err(RolloutError::Configuration(format!(
                "reference '{}' has state dimension {}, expected {dim}",
                segment.id,
                segment.state_dim()
            )));
        }
        if !all_finite(initial) || !all_finite(params) {
            return Err(RolloutError::NumericDivergence { step: 0 });
        }
        Ok(())
    }

    fn effort<S: Scalar>(&self, control: &[S]) -> S {
        control
            .iter()
            .zip(&self.nominal)
            .zip(&self.inv_half_range)
            .fold(control[0].constant_like(0.0), |acc, ((&u, &n), &k)| {
                acc + ((u - n) * k).square()
            })
    }

    fn smoothness<S: Scalar>(&self, control: &[S], previous: &[S]) -> S {
        control
            .iter()
            .zip(previous)
            .zip(&self.inv_half_range)
            .fold(control[0].constant_like(0.0), |acc, ((&u, &p), &k)| {
                acc + ((u - p) * k).square()
            })
    }

    fn unroll<S: Scalar>(
        &self,
        params: &[S],
        initial: Vec<S>,
        segment: &Trajectory,
        level: &DifficultyLevel,
        mut trace: Option<&mut Vec<StepRecord>>,
    ) -> Result<Unrolled<S>, RolloutError> {
        let horizon = level.horizon;
        let weights = level.weights;
        let dt = segment.dt;

        let mut state = initial;
        let zero = state[0].constant_like(0.0);
        let (mut tracking, mut effort, mut smoothness) = (zero, zero, zero);
        let mut previous: Option<Vec<S>> = None;

        for t in 0..horizon {
            let window = segment.window(t + 1, level.window);
            let control = self.policy.act_with(params, &state, &window);
            if !all_finite(&control) {
                return Err(RolloutError::NumericDivergence { step: t });
            }
            let next = self.dynamics.advance(&state, &control, dt);
            if !all_finite(&next) {
                return Err(RolloutError::NumericDivergence { step: t });
            }

            let reference = &window[0];
            tracking = tracking + self.dynamics.tracking_error(&next, reference);
            if weights.effort > 0.0 {
                effort = effort + self.effort(&control);
            }
            if let (Some(prev), true) = (&previous, weights.smoothness > 0.0) {
                smoothness = smoothness + self.smoothness(&control, prev);
            }
            if let Some(trace) = trace.as_deref_mut() {
                trace.push(StepRecord {
                    state: state.iter().map(|x| x.value()).collect(),
                    control: control.iter().map(|u| u.value()).collect(),
                    reference: reference.clone(),
                });
            }
            previous = Some(control);
            state = next;
        }

        let n = horizon as f64;
        let mut total = tracking * (weights.tracking / n)
            + effort * (weights.effort / n)
            + smoothness * (weights.smoothness / (n - 1.0).max(1.0));
        if weights.terminal > 0.0 {
            let terminal = self.dynamics.tracking_error(&state, segment.state(horizon));
            total = total + terminal * weights.terminal;
        }
        if !total.is_finite() {
            return Err(RolloutError::NumericDivergence { step: horizon });
        }
        Ok(Unrolled {
            total,
            tracking: tracking / n,
            final_state: state,
        })
    }

    /// Plain-value rollout with its trace.
    pub fn rollout(
        &self,
        params: &[f64],
        initial: &[f64],
        segment: &Trajectory,
        level: &DifficultyLevel,
    ) -> Result<Rollout, RolloutError> {
        self.check(params, initial, segment, level)?;
        let mut steps = Vec::with_capacity(level.horizon);
        let out = self.unroll(params, initial.to_vec(), segment, level, Some(&mut steps))?;
        Ok(Rollout {
            steps,
            final_state: out.final_state,
            loss: out.total,
            tracking_loss: out.tracking,
        })
    }

    /// Total loss only, as a plain function of the parameters.
    pub fn loss(
        &self,
        params: &[f64],
        initial: &[f64],
        segment: &Trajectory,
        level: &DifficultyLevel,
    ) -> Result<f64, RolloutError> {
        self.check(params, initial, segment, level)?;
        Ok(self.unroll(params, initial.to_vec(), segment, level, None)?.total)
    }

    /// Rollout on a fresh tape and the exact gradient of its loss.
    pub fn gradient(
        &self,
        params: &[f64],
        initial: &[f64],
        segment: &Trajectory,
        level: &DifficultyLevel,
    ) -> Result<RolloutGradient, RolloutError> {
        self.check(params, initial, segment, level)?;
        let tape = Tape::new();
        let p = tape.vars(params);
        let x0 = initial.iter().map(|&x| tape.constant(x)).collect();
        let mut steps = Vec::with_capacity(level.horizon);
        let out = self.unroll(&p, x0, segment, level, Some(&mut steps))?;

        let gradient = tape.gradient(out.total).wrt_all(&p);
        if !all_finite(&gradient) {
            return Err(RolloutError::NumericDivergence { step: level.horizon });
        }
        Ok(RolloutGradient {
            rollout: Rollout {
                steps,
                final_state: out.final_state.iter().map(|x| x.value()).collect(),
                loss: out.total.value(),
                tracking_loss: out.tracking.value(),
            },
            gradient,
        })
    }

    /// Gradients of a batch, computed in parallel and averaged.
    ///
    /// Any diverging rollout discards the whole batch; the error carries the
    /// earliest divergence step. Configuration errors take precedence.
    pub fn batch_gradient(
        &self,
        params: &[f64],
        tasks: &[RolloutTask],
        level: &DifficultyLevel,
    ) -> Result<BatchGradient, RolloutError> {
        if tasks.is_empty() {
            return Err(RolloutError::Configuration("empty rollout batch".into()));
        }
        let results: Vec<_> = tasks
            .par_iter()
            .map(|task| self.gradient(params, &task.initial_state, &task.segment, level))
            .collect();

        let mut first_divergence: Option<usize> = None;
        let mut grads = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(g) => grads.push(g),
                Err(RolloutError::NumericDivergence { step }) => {
                    first_divergence = Some(first_divergence.map_or(step, |s| s.min(step)));
                }
                Err(e) => return Err(e),
            }
        }
        if let Some(step) = first_divergence {
            return Err(RolloutError::NumericDivergence { step });
        }

        let n = grads.len() as f64;
        let mut gradient = vec![0.0; self.num_params];
        let (mut loss, mut tracking_loss) = (0.0, 0.0);
        let mut rollouts = Vec::with_capacity(grads.len());
        for g in grads {
            for (acc, gi) in gradient.iter_mut().zip(&g.gradient) {
                *acc += gi / n;
            }
            loss += g.rollout.loss / n;
            tracking_loss += g.rollout.tracking_loss / n;
            rollouts.push(g.rollout);
        }
        Ok(BatchGradient {
            loss,
            tracking_loss,
            gradient,
            rollouts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::difficulty::LossWeights;
    use approx::assert_relative_eq;
    use gradpilot_control::{ControllerConfig, ParamStore};
    use gradpilot_diff::{central_gradient, max_relative_error};
    use gradpilot_reference::TrajectoryGenerator;
    use gradpilot_vehicles::CartPole;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn setup() -> (CartPole, Policy, ParamStore) {
        let cartpole = CartPole::default();
        let policy = Policy::new(ControllerConfig::default(), &cartpole).unwrap();
        let params = policy.initialize(&mut StdRng::seed_from_u64(11)).unwrap();
        (cartpole, policy, params)
    }

    fn upright() -> Trajectory {
        TrajectoryGenerator::constant("upright", vec![0.0; 4], 60, 0.02).unwrap()
    }

    fn level(horizon: usize) -> DifficultyLevel {
        DifficultyLevel {
            horizon,
            weights: LossWeights {
                terminal: 0.5,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_rollout_is_deterministic() {
        let (cartpole, policy, params) = setup();
        let engine = RolloutEngine::new(&cartpole, &policy).unwrap();
        let flat = params.to_flat();
        let x0 = [0.0, 0.0, 0.05, 0.0];
        let a = engine.rollout(&flat, &x0, &upright(), &level(30)).unwrap();
        let b = engine.rollout(&flat, &x0, &upright(), &level(30)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.horizon(), 30);
        assert!(a.loss.is_finite());
        assert_eq!(a.steps[0].state, x0.to_vec());
    }

    #[test]
    fn test_tape_rollout_matches_plain() {
        let (cartpole, policy, params) = setup();
        let engine = RolloutEngine::new(&cartpole, &policy).unwrap();
        let flat = params.to_flat();
        let x0 = [0.1, 0.0, -0.05, 0.2];
        let plain = engine.rollout(&flat, &x0, &upright(), &level(10)).unwrap();
        let taped = engine.gradient(&flat, &x0, &upright(), &level(10)).unwrap();
        assert_relative_eq!(plain.loss, taped.rollout.loss, max_relative = 1e-12);
        assert_eq!(taped.gradient.len(), engine.num_params());
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let (cartpole, policy, params) = setup();
        let engine = RolloutEngine::new(&cartpole, &policy).unwrap();
        let flat = params.to_flat();
        let x0 = [0.0, 0.1, 0.05, -0.1];
        let traj = upright();
        let lvl = level(5);

        let analytic = engine.gradient(&flat, &x0, &traj, &lvl).unwrap().gradient;
        let numeric = central_gradient(|p| engine.loss(p, &x0, &traj, &lvl).unwrap(), &flat, 1e-6);
        let err = max_relative_error(&analytic, &numeric, 1e-6);
        assert!(err < 1e-3, "relative error {err}");
    }

    #[test]
    fn test_zero_horizon_is_configuration_error() {
        let (cartpole, policy, params) = setup();
        let engine = RolloutEngine::new(&cartpole, &policy).unwrap();
        let result = engine.rollout(&params.to_flat(), &[0.0; 4], &upright(), &level(0));
        assert!(matches!(result, Err(RolloutError::Configuration(_))));
    }

    #[test]
    fn test_wrong_state_dimension_is_configuration_error() {
        let (cartpole, policy, params) = setup();
        let engine = RolloutEngine::new(&cartpole, &policy).unwrap();
        let result = engine.gradient(&params.to_flat(), &[0.0; 3], &upright(), &level(5));
        assert!(matches!(result, Err(RolloutError::Configuration(_))));
    }

    #[test]
    fn test_nan_parameters_diverge() {
        let (cartpole, policy, params) = setup();
        let engine = RolloutEngine::new(&cartpole, &policy).unwrap();
        let mut flat = params.to_flat();
        flat[0] = f64::NAN;
        let result = engine.gradient(&flat, &[0.0; 4], &upright(), &level(5));
        assert_eq!(result.unwrap_err(), RolloutError::NumericDivergence { step: 0 });
    }

    #[test]
    fn test_batch_averages_gradients() {
        let (cartpole, policy, params) = setup();
        let engine = RolloutEngine::new(&cartpole, &policy).unwrap();
        let flat = params.to_flat();
        let task = |theta: f64| RolloutTask::new(vec![0.0, 0.0, theta, 0.0], upright());
        let lvl = level(8);

        let a = engine.gradient(&flat, &[0.0, 0.0, 0.05, 0.0], &upright(), &lvl).unwrap();
        let b = engine.gradient(&flat, &[0.0, 0.0, -0.02, 0.0], &upright(), &lvl).unwrap();
        let batch = engine.batch_gradient(&flat, &[task(0.05), task(-0.02)], &lvl).unwrap();

        assert_eq!(batch.rollouts.len(), 2);
        assert_relative_eq!(
            batch.loss,
            0.5 * (a.rollout.loss + b.rollout.loss),
            max_relative = 1e-12
        );
        for i in 0..flat.len() {
            let expected = 0.5 * (a.gradient[i] + b.gradient[i]);
            assert_relative_eq!(batch.gradient[i], expected, epsilon = 1e-12, max_relative = 1e-10);
        }
    }

    #[test]
    fn test_batch_discards_on_divergence() {
        let (cartpole, policy, params) = setup();
        let engine = RolloutEngine::new(&cartpole, &policy).unwrap();
        let tasks = vec![
            RolloutTask::new(vec![0.0; 4], upright()),
            RolloutTask::new(vec![0.0, 0.0, f64::INFINITY, 0.0], upright()),
        ];
        let result = engine.batch_gradient(&params.to_flat(), &tasks, &level(5));
        assert_eq!(result.unwrap_err(), RolloutError::NumericDivergence { step: 0 });
    }
}
