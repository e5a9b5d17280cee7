//! Training on a learnt model of the vehicle.
//!
//! Transitions are observed on the true vehicle around the train split's
//! references, a residual over the nominal model is fitted to them, and the
//! controller is differentiated through the fitted model while periodic
//! evaluation runs on the true vehicle.

use gradpilot_model::Dynamics;
use gradpilot_reference::{Split, Trajectory, TrajectoryCorpus};
use gradpilot_train::{EventSink, Trainer};
use gradpilot_vehicles::{Observation, ResidualDynamics, VehicleKind};
use rand::prelude::*;
use rand_distr::StandardNormal;

use crate::config::{ResidualConfig, RunConfig};
use crate::{Result, TrainOutput, finish};

/// Observe `config.samples` one-step transitions of `truth`, starting from
/// noisy states along `trajectories` under noisy controls.
pub fn observe_transitions<D: Dynamics>(
    truth: &D,
    trajectories: &[Trajectory],
    config: &ResidualConfig,
) -> Result<Vec<Observation>> {
    config.validate()?;
    let usable: Vec<&Trajectory> = trajectories.iter().filter(|t| !t.is_empty()).collect();
    if usable.is_empty() {
        return Err(gradpilot_train::TrainError::Configuration(
            "no trajectories to observe transitions along".into(),
        )
        .into());
    }
    for trajectory in &usable {
        truth.check_dims(trajectory.state_dim(), truth.control_dim())?;
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let scale = truth.perturbation_scale();
    let nominal = truth.nominal_control();
    let bounds = truth.control_bounds();
    let mut observations = Vec::with_capacity(config.samples);
    for _ in 0..config.samples {
        let trajectory = usable[rng.gen_range(0..usable.len())];
        let t = rng.gen_range(0..trajectory.len());
        let mut state: Vec<f64> = trajectory
            .state(t)
            .iter()
            .zip(&scale)
            .map(|(x, s)| {
                let n: f64 = rng.sample(StandardNormal);
                x + config.state_noise * s * n
            })
            .collect();
        truth.normalize_state(&mut state);
        let control: Vec<f64> = nominal
            .iter()
            .zip(bounds)
            .map(|(u, b)| {
                let n: f64 = rng.sample(StandardNormal);
                b.clamp(u + config.control_noise * b.half_range() * n)
            })
            .collect();
        let next = truth.step(&state, &control, trajectory.dt)?;
        observations.push(Observation {
            state,
            control,
            next,
            dt: trajectory.dt,
        });
    }
    Ok(observations)
}

/// Train through a residual model of the evaluation vehicle.
///
/// `config.vehicle` is the nominal model; `config.evaluation_vehicle()` is
/// the vehicle transitions are observed on and evaluation runs on. The
/// returned checkpoints restore on either.
pub fn train_on_learnt_model(
    kind: VehicleKind,
    config: &RunConfig,
    corpus: &TrajectoryCorpus,
    sink: &mut dyn EventSink,
) -> Result<TrainOutput> {
    let nominal = config.vehicle.build(kind)?;
    let truth = config.evaluation_vehicle().build(kind)?;
    corpus.validate(truth.name(), truth.state_dim())?;

    let observations = observe_transitions(&truth, corpus.split(Split::Train), &config.residual)?;
    let learnt = ResidualDynamics::fit(nominal, &observations, config.residual.ridge)?;
    let fit = learnt.assess(&observations);

    let trainer = Trainer::new(
        &learnt,
        config.controller.clone(),
        corpus.split(Split::Train),
        config.training_settings(),
    )?;
    let mut output = if corpus.test.is_empty() {
        finish(trainer, sink)?
    } else {
        let trainer =
            trainer.with_evaluation(&truth, corpus.split(Split::Test), config.eval.clone())?;
        finish(trainer, sink)?
    };
    output.residual_fit = Some(fit);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gradpilot_vehicles::VehicleConfig;

    fn corpus(kind: VehicleKind) -> TrajectoryCorpus {
        crate::generate_corpus(kind, &VehicleConfig::default(), 5, 3, 1, 60, 0.02).unwrap()
    }

    #[test]
    fn test_observations_are_seeded_and_bounded() {
        let kind = VehicleKind::Quadrotor;
        let corpus = corpus(kind);
        let truth = VehicleConfig::default().build(kind).unwrap();
        let config = ResidualConfig {
            samples: 40,
            control_noise: 5.0,
            ..Default::default()
        };
        let a = observe_transitions(&truth, &corpus.train, &config).unwrap();
        let b = observe_transitions(&truth, &corpus.train, &config).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 40);
        for obs in &a {
            for (u, bound) in obs.control.iter().zip(truth.control_bounds()) {
                assert!(bound.contains(*u));
            }
            let q = &obs.state[3..7];
            let norm = q.iter().map(|c| c * c).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_observe_rejects_empty_corpus() {
        let truth = VehicleConfig::default().build(VehicleKind::CartPole).unwrap();
        assert!(observe_transitions(&truth, &[], &ResidualConfig::default()).is_err());
    }
}
