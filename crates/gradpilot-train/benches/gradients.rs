//! Criterion benchmarks comparing tape gradients against finite differences.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use gradpilot_control::{ControllerConfig, ParamStore, Policy};
use gradpilot_diff::central_gradient;
use gradpilot_model::Dynamics;
use gradpilot_reference::{Trajectory, TrajectoryGenerator};
use gradpilot_train::{DifficultyLevel, RolloutEngine};
use gradpilot_vehicles::{CartPole, Quadrotor};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn setup<D: Dynamics>(dynamics: &D) -> (Policy, ParamStore) {
    let policy = Policy::new(ControllerConfig::default(), dynamics).unwrap();
    let params = policy.initialize(&mut StdRng::seed_from_u64(0)).unwrap();
    (policy, params)
}

fn bench_vehicle<D: Dynamics>(c: &mut Criterion, name: &str, dynamics: &D, reference: Trajectory) {
    let mut group = c.benchmark_group(name);
    group.sample_size(10);
    let (policy, params) = setup(dynamics);
    let engine = RolloutEngine::new(dynamics, &policy).unwrap();
    let flat = params.to_flat();
    let x0 = reference.state(0).to_vec();

    for &horizon in &[5, 20] {
        let level = DifficultyLevel {
            horizon,
            ..Default::default()
        };

        group.bench_with_input(BenchmarkId::new("tape_gradient", horizon), &horizon, |b, _| {
            b.iter(|| engine.gradient(&flat, &x0, &reference, &level).unwrap());
        });

        // Central differences cost 2·P rollouts, so only the short horizon.
        if horizon == 5 {
            group.bench_with_input(BenchmarkId::new("fd_gradient", horizon), &horizon, |b, _| {
                b.iter(|| {
                    central_gradient(
                        |p| engine.loss(p, &x0, &reference, &level).unwrap(),
                        &flat,
                        1e-6,
                    )
                });
            });
        }

        group.bench_with_input(BenchmarkId::new("plain_rollout", horizon), &horizon, |b, _| {
            b.iter(|| engine.rollout(&flat, &x0, &reference, &level).unwrap());
        });
    }

    group.finish();
}

fn bench_cartpole(c: &mut Criterion) {
    let reference =
        TrajectoryGenerator::constant("upright", vec![0.0, 0.0, 0.05, 0.0], 40, 0.02).unwrap();
    bench_vehicle(c, "cartpole", &CartPole::default(), reference);
}

fn bench_quadrotor(c: &mut Criterion) {
    let reference = TrajectoryGenerator::new(0).figure_eight("fig8", 40, 0.02).unwrap();
    bench_vehicle(c, "quadrotor", &Quadrotor::default(), reference);
}

criterion_group!(benches, bench_cartpole, bench_quadrotor);
criterion_main!(benches);
