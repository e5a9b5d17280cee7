//! Seeded generators for reference trajectories.
//!
//! Rigid-body references carry a consistent attitude: multirotor references
//! tilt the thrust axis along the required acceleration, fixed-wing
//! references bank into turns and pitch up by the trim angle of attack.

use std::f64::consts::TAU;

use gradpilot_math::{GRAVITY, Quat, V3, Vec3};
use gradpilot_vehicles::Vehicle;
use gradpilot_vehicles::rigid::{POS, QUAT, RATE, STATE_DIM, VEL};
use rand::prelude::*;

use crate::corpus::TrajectoryCorpus;
use crate::error::Result;
use crate::trajectory::Trajectory;

/// Procedural trajectory generator with seeded randomness.
pub struct TrajectoryGenerator {
    seed: u64,
    rng: StdRng,
}

impl TrajectoryGenerator {
    /// Create a new generator with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The same state repeated for `steps + 1` samples.
    pub fn constant(id: &str, state: Vec<f64>, steps: usize, dt: f64) -> Result<Trajectory> {
        Trajectory::new(id, dt, vec![state; steps + 1])
    }

    /// Cart moving smoothly along the rail with the pole upright.
    pub fn cartpole_sweep(&mut self, id: &str, steps: usize, dt: f64) -> Result<Trajectory> {
        let terms: Vec<(f64, f64, f64)> = (0..3)
            .map(|_| {
                (
                    self.rng.gen_range(0.05..0.3),
                    self.rng.gen_range(0.5..2.0),
                    self.rng.gen_range(0.0..TAU),
                )
            })
            .collect();
        let states = (0..=steps)
            .map(|k| {
                let t = k as f64 * dt;
                let (mut x, mut v) = (0.0, 0.0);
                for &(a, w, phi) in &terms {
                    x += a * ((w * t + phi).sin() - phi.sin());
                    v += a * w * (w * t + phi).cos();
                }
                vec![x, v, 0.0, 0.0]
            })
            .collect();
        Trajectory::new(id, dt, states)
    }

    /// Upright cart-pole held at a random rail position.
    pub fn cartpole_hold(&mut self, id: &str, steps: usize, dt: f64) -> Result<Trajectory> {
        let x: f64 = self.rng.gen_range(-0.5..0.5);
        Self::constant(id, vec![x, 0.0, 0.0, 0.0], steps, dt)
    }

    /// Multirotor hovering at a random point.
    pub fn hover(&mut self, id: &str, steps: usize, dt: f64) -> Result<Trajectory> {
        let p = self.random_point();
        let zero = Vec3::zeros();
        Self::constant(id, multirotor_state(&p, &zero, &zero), steps, dt)
    }

    /// Horizontal figure-eight (lemniscate of Gerono) around a random centre.
    pub fn figure_eight(&mut self, id: &str, steps: usize, dt: f64) -> Result<Trajectory> {
        let centre = self.random_point();
        let radius: f64 = self.rng.gen_range(0.5..1.2);
        let period: f64 = self.rng.gen_range(5.0..10.0);
        let phase = self.rng.gen_range(0.0..TAU);
        let w = TAU / period;
        let states = (0..=steps)
            .map(|k| {
                let th = w * k as f64 * dt + phase;
                let p = centre
                    + Vec3::new(
                        radius * (th.sin() - phase.sin()),
                        0.5 * radius * ((2.0 * th).sin() - (2.0 * phase).sin()),
                        0.0,
                    );
                let v = Vec3::new(radius * w * th.cos(), radius * w * (2.0 * th).cos(), 0.0);
                let a = Vec3::new(
                    -radius * w * w * th.sin(),
                    -2.0 * radius * w * w * (2.0 * th).sin(),
                    0.0,
                );
                multirotor_state(&p, &v, &a)
            })
            .collect();
        Trajectory::new(id, dt, states)
    }

    /// Sum-of-sines motion on every axis, starting at a random point.
    pub fn random_smooth(&mut self, id: &str, steps: usize, dt: f64) -> Result<Trajectory> {
        let start = self.random_point();
        // (amplitude, angular frequency, phase) per axis and term.
        let terms: Vec<[(f64, f64, f64); 2]> = (0..3)
            .map(|axis| {
                let max_amp = if axis == 2 { 0.3 } else { 0.8 };
                [(); 2].map(|_| {
                    (
                        self.rng.gen_range(0.1..max_amp),
                        self.rng.gen_range(0.3..1.2),
                        self.rng.gen_range(0.0..TAU),
                    )
                })
            })
            .collect();
        let states = (0..=steps)
            .map(|k| {
                let t = k as f64 * dt;
                let (mut p, mut v, mut a) = (start, Vec3::zeros(), Vec3::zeros());
                for (axis, axis_terms) in terms.iter().enumerate() {
                    for &(amp, w, phi) in axis_terms {
                        p[axis] += amp * ((w * t + phi).sin() - phi.sin());
                        v[axis] += amp * w * (w * t + phi).cos();
                        a[axis] -= amp * w * w * (w * t + phi).sin();
                    }
                }
                multirotor_state(&p, &v, &a)
            })
            .collect();
        Trajectory::new(id, dt, states)
    }

    /// Fixed-wing cruise with gentle coordinated turns and altitude changes.
    pub fn cruise(
        &mut self,
        id: &str,
        steps: usize,
        dt: f64,
        speed: f64,
        alpha: f64,
    ) -> Result<Trajectory> {
        let turns: Vec<(f64, f64, f64)> = (0..2)
            .map(|_| {
                (
                    self.rng.gen_range(0.0..0.25),
                    self.rng.gen_range(0.1..0.6),
                    self.rng.gen_range(0.0..TAU),
                )
            })
            .collect();
        let climb_amp: f64 = self.rng.gen_range(0.0..1.5);
        let climb_w: f64 = self.rng.gen_range(0.1..0.4);
        let mut heading: f64 = self.rng.gen_range(-0.5..0.5);
        let mut p = Vec3::new(0.0, 0.0, self.rng.gen_range(30.0..60.0));

        let mut states = Vec::with_capacity(steps + 1);
        for k in 0..=steps {
            let t = k as f64 * dt;
            let turn_rate: f64 = turns
                .iter()
                .map(|&(b, w, phi)| b * (w * t + phi).sin())
                .sum();
            let climb_rate = climb_amp * climb_w * (climb_w * t).cos();
            let gamma = (climb_rate / speed).clamp(-0.3, 0.3).asin();
            let horizontal = speed * gamma.cos();
            let v = Vec3::new(horizontal * heading.cos(), horizontal * heading.sin(), climb_rate);

            // Left turns (positive rate) bank left-wing-down, a negative roll
            // with y pointing left; nose-up is a negative pitch.
            let roll = -(speed * turn_rate / GRAVITY).atan();
            let q = Quat::from_euler(roll, -(alpha + gamma), heading);
            let rate = q.inverse_rotate(V3::new(0.0, 0.0, turn_rate)).value();
            states.push(rigid_state(&p, &q, &v, &rate));

            p += v * dt;
            heading += turn_rate * dt;
        }
        Trajectory::new(id, dt, states)
    }

    /// A train/test corpus appropriate for `vehicle`.
    ///
    /// Multirotor test trajectories are all figure-eights.
    pub fn corpus(
        &mut self,
        vehicle: &Vehicle,
        n_train: usize,
        n_test: usize,
        steps: usize,
        dt: f64,
    ) -> Result<TrajectoryCorpus> {
        let kind = vehicle.kind();
        let mut make = |split: &str, i: usize| -> Result<Trajectory> {
            let id = format!("{kind}-{split}-{i:03}");
            match vehicle {
                Vehicle::CartPole(_) => {
                    if i % 2 == 0 {
                        self.cartpole_hold(&id, steps, dt)
                    } else {
                        self.cartpole_sweep(&id, steps, dt)
                    }
                }
                Vehicle::Quadrotor(_) if split == "test" => self.figure_eight(&id, steps, dt),
                Vehicle::Quadrotor(_) => match i % 3 {
                    0 => self.hover(&id, steps, dt),
                    1 => self.figure_eight(&id, steps, dt),
                    _ => self.random_smooth(&id, steps, dt),
                },
                Vehicle::FixedWing(fw) => {
                    let (_, _, alpha) = fw.trim();
                    self.cruise(&id, steps, dt, fw.params.cruise_speed, alpha)
                }
            }
        };
        let train = (0..n_train)
            .map(|i| make("train", i))
            .collect::<Result<Vec<_>>>()?;
        let test = (0..n_test)
            .map(|i| make("test", i))
            .collect::<Result<Vec<_>>>()?;
        Ok(TrajectoryCorpus {
            name: format!("{kind}-seed{}", self.seed),
            vehicle: kind.to_string(),
            train,
            test,
        })
    }

    fn random_point(&mut self) -> Vec3 {
        Vec3::new(
            self.rng.gen_range(-1.0..1.0),
            self.rng.gen_range(-1.0..1.0),
            self.rng.gen_range(1.0..2.0),
        )
    }
}

/// Pack a 13-dim rigid-body state.
pub fn rigid_state(p: &Vec3, q: &Quat<f64>, v: &Vec3, rate: &Vec3) -> Vec<f64> {
    let mut s = vec![0.0; STATE_DIM];
    s[POS..QUAT].copy_from_slice(p.as_slice());
    s[QUAT..VEL].copy_from_slice(&q.to_array());
    s[VEL..RATE].copy_from_slice(v.as_slice());
    s[RATE..].copy_from_slice(rate.as_slice());
    s
}

/// Multirotor reference: thrust axis along `a + g·ẑ`, zero yaw, zero rates.
pub fn multirotor_state(p: &Vec3, v: &Vec3, a: &Vec3) -> Vec<f64> {
    let n = (a + Vec3::new(0.0, 0.0, GRAVITY)).normalize();
    // Shortest rotation taking ẑ to n.
    let q = Quat::new(1.0 + n.z, -n.y, n.x, 0.0).normalize();
    rigid_state(p, &q, v, &Vec3::zeros())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use gradpilot_model::Dynamics;
    use gradpilot_vehicles::VehicleKind;

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let a = TrajectoryGenerator::new(5).figure_eight("f", 50, 0.02).unwrap();
        let b = TrajectoryGenerator::new(5).figure_eight("f", 50, 0.02).unwrap();
        let c = TrajectoryGenerator::new(6).figure_eight("f", 50, 0.02).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_multirotor_attitude_follows_acceleration() {
        let a = Vec3::new(2.0, -1.0, 0.5);
        let s = multirotor_state(&Vec3::zeros(), &Vec3::zeros(), &a);
        let q = Quat::from_slice(&s, QUAT);
        let thrust_axis = q.rotate(V3::new(0.0, 0.0, 1.0)).value();
        let expected = (a + Vec3::new(0.0, 0.0, GRAVITY)).normalize();
        assert!((thrust_axis - expected).norm() < 1e-12);
    }

    #[test]
    fn test_figure_eight_velocity_consistent() {
        let dt = 0.01;
        let t = TrajectoryGenerator::new(1).figure_eight("f", 200, dt).unwrap();
        for k in 1..199 {
            let fd = (t.states[k + 1][POS] - t.states[k - 1][POS]) / (2.0 * dt);
            assert_relative_eq!(fd, t.states[k][VEL], epsilon = 1e-3);
        }
    }

    #[test]
    fn test_cruise_is_level_and_unit() {
        let fw = gradpilot_vehicles::FixedWing::default();
        let (_, _, alpha) = fw.trim();
        let t = TrajectoryGenerator::new(3)
            .cruise("c", 100, 0.02, 12.0, alpha)
            .unwrap();
        for s in &t.states {
            let q = Quat::from_slice(s, QUAT);
            assert_relative_eq!(q.norm_sq(), 1.0, epsilon = 1e-12);
            let speed = Vec3::new(s[VEL], s[VEL + 1], s[VEL + 2]).norm();
            assert_relative_eq!(speed, 12.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_corpus_for_every_vehicle() {
        for kind in VehicleKind::ALL {
            let vehicle = Vehicle::default_for(kind);
            let corpus = TrajectoryGenerator::new(9)
                .corpus(&vehicle, 4, 2, 30, 0.02)
                .unwrap();
            assert_eq!(corpus.train.len(), 4);
            assert_eq!(corpus.test.len(), 2);
            corpus.validate(vehicle.name(), vehicle.state_dim()).unwrap();
        }
    }
}
