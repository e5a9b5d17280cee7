//! Shared 6-DOF rigid-body integrator for the quadrotor and the fixed-wing.
//!
//! State layout (13): `[p(3), q(4: w,x,y,z), v(3), ω(3)]`. Position and
//! linear velocity are in the world frame (z up), ω in the body frame.

use gradpilot_diff::Scalar;
use gradpilot_math::{Quat, V3, Vec3};
use serde::{Deserialize, Serialize};

pub const STATE_DIM: usize = 13;
pub const POS: usize = 0;
pub const QUAT: usize = 3;
pub const VEL: usize = 7;
pub const RATE: usize = 10;

/// Unpacked rigid-body state.
#[derive(Debug, Clone, Copy)]
pub struct RigidState<S> {
    pub position: V3<S>,
    pub attitude: Quat<S>,
    pub velocity: V3<S>,
    pub body_rate: V3<S>,
}

impl<S: Scalar> RigidState<S> {
    pub fn unpack(state: &[S]) -> Self {
        Self {
            position: V3::from_slice(state, POS),
            attitude: Quat::from_slice(state, QUAT),
            velocity: V3::from_slice(state, VEL),
            body_rate: V3::from_slice(state, RATE),
        }
    }

    pub fn pack(&self) -> Vec<S> {
        let mut out = Vec::with_capacity(STATE_DIM);
        out.extend(self.position.to_array());
        out.extend(self.attitude.to_array());
        out.extend(self.velocity.to_array());
        out.extend(self.body_rate.to_array());
        out
    }
}

/// Mass properties of a rigid body with diagonal inertia.
#[derive(Debug, Clone, Copy)]
pub struct MassProperties {
    pub mass: f64,
    pub inertia: Vec3,
}

impl MassProperties {
    /// One semi-implicit Euler step.
    ///
    /// `force` is the total world-frame force excluding gravity, `torque` the
    /// body-frame torque. Velocities are updated first; position and attitude
    /// use the updated velocities, and the attitude is renormalized.
    pub fn integrate<S: Scalar>(
        &self,
        s: &RigidState<S>,
        force: V3<S>,
        torque: V3<S>,
        gravity: f64,
        dt: f64,
    ) -> RigidState<S> {
        let mut accel = force.scale_f(1.0 / self.mass);
        accel.z = accel.z - gravity;
        let velocity = s.velocity + accel.scale_f(dt);
        let position = s.position + velocity.scale_f(dt);

        // Euler's equations: J ω̇ = τ - ω × Jω.
        let w = s.body_rate;
        let gyro = w.cross(w.mul_elem(&self.inertia));
        let inv_inertia = Vec3::new(
            1.0 / self.inertia.x,
            1.0 / self.inertia.y,
            1.0 / self.inertia.z,
        );
        let ang_acc = (torque - gyro).mul_elem(&inv_inertia);
        let body_rate = w + ang_acc.scale_f(dt);
        let attitude = s.attitude.integrate(body_rate, dt);

        RigidState {
            position,
            attitude,
            velocity,
            body_rate,
        }
    }
}

/// Tracking error weights for the four blocks of a rigid-body state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingWeights {
    pub position: f64,
    pub attitude: f64,
    pub velocity: f64,
    pub body_rate: f64,
}

impl Default for TrackingWeights {
    fn default() -> Self {
        Self {
            position: 1.0,
            attitude: 0.5,
            velocity: 0.1,
            body_rate: 0.01,
        }
    }
}

impl TrackingWeights {
    /// Expand to one weight per state component.
    pub fn expand(&self) -> [f64; STATE_DIM] {
        let mut w = [0.0; STATE_DIM];
        w[POS..QUAT].fill(self.position);
        w[QUAT..VEL].fill(self.attitude);
        w[VEL..RATE].fill(self.velocity);
        w[RATE..].fill(self.body_rate);
        w
    }
}

/// A level, motionless state at `position`.
pub fn hover_state(position: Vec3) -> Vec<f64> {
    let mut s = vec![0.0; STATE_DIM];
    s[POS] = position.x;
    s[POS + 1] = position.y;
    s[POS + 2] = position.z;
    s[QUAT] = 1.0;
    s
}

/// Perturbation scales shared by rigid vehicles.
pub(crate) fn rigid_perturbation_scale() -> Vec<f64> {
    let mut scale = vec![1.0; STATE_DIM];
    scale[QUAT..VEL].fill(0.3);
    scale[VEL..RATE].fill(0.5);
    scale[RATE..].fill(0.5);
    scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn body() -> MassProperties {
        MassProperties {
            mass: 2.0,
            inertia: Vec3::new(0.1, 0.2, 0.3),
        }
    }

    #[test]
    fn test_pack_unpack() {
        let s: Vec<f64> = (0..STATE_DIM).map(|i| i as f64).collect();
        assert_eq!(RigidState::unpack(&s).pack(), s);
    }

    #[test]
    fn test_free_fall() {
        let s = RigidState::unpack(&hover_state(Vec3::new(0.0, 0.0, 10.0)));
        let zero = V3::new(0.0, 0.0, 0.0);
        let next = body().integrate(&s, zero, zero, 9.81, 0.1);
        assert_relative_eq!(next.velocity.z, -0.981, epsilon = 1e-12);
        assert_relative_eq!(next.position.z, 10.0 - 0.0981, epsilon = 1e-12);
        assert_eq!(next.attitude.to_array(), [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_torque_free_spin_keeps_unit_attitude() {
        let mut s = RigidState::unpack(&hover_state(Vec3::zeros()));
        s.body_rate = V3::new(0.3, 2.0, -0.5);
        let zero = V3::new(0.0, 0.0, 0.0);
        for _ in 0..500 {
            s = body().integrate(&s, zero, zero, 0.0, 0.01);
        }
        assert_relative_eq!(s.attitude.norm_sq(), 1.0, epsilon = 1e-12);
        assert!(s.pack().iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_weights_expand() {
        let w = TrackingWeights::default().expand();
        assert_eq!(w[0], 1.0);
        assert_eq!(w[QUAT], 0.5);
        assert_eq!(w[VEL + 2], 0.1);
        assert_eq!(w[12], 0.01);
    }
}
