//! X-configuration quadrotor.
//!
//! Control: four rotor thrusts in `[0, max_rotor_thrust]`, ordered
//! front-right, back-left, front-left, back-right. The first two spin
//! counter-clockwise (positive yaw reaction), the last two clockwise.
//! Body frame: x forward, y left, z up.

use std::ops::Range;

use gradpilot_diff::Scalar;
use gradpilot_math::{GRAVITY, V3, Vec3};
use gradpilot_model::{Bounds, Dynamics, ModelError, Result};
use serde::{Deserialize, Serialize};

use crate::rigid::{
    self, MassProperties, RigidState, STATE_DIM, TrackingWeights, rigid_perturbation_scale,
};

/// Rotor x/y arm signs in the body frame and yaw reaction sign.
const ROTORS: [(f64, f64, f64); 4] = [
    (1.0, -1.0, 1.0),
    (-1.0, 1.0, 1.0),
    (1.0, 1.0, -1.0),
    (-1.0, -1.0, -1.0),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadrotorParams {
    pub mass: f64,
    /// Centre-to-rotor distance.
    pub arm_length: f64,
    /// Diagonal of the body inertia tensor.
    pub inertia: [f64; 3],
    pub max_rotor_thrust: f64,
    /// Yaw reaction torque per newton of thrust.
    pub torque_coefficient: f64,
    /// Linear drag per axis (N·s/m), applied against world velocity.
    pub translational_drag: [f64; 3],
    /// Linear damping of body rates (N·m·s).
    pub rotational_drag: f64,
    pub gravity: f64,
    pub weights: TrackingWeights,
}

impl Default for QuadrotorParams {
    fn default() -> Self {
        Self {
            mass: 0.5,
            arm_length: 0.17,
            inertia: [0.005, 0.005, 0.009],
            max_rotor_thrust: 4.0,
            torque_coefficient: 0.016,
            translational_drag: [0.02, 0.02, 0.02],
            rotational_drag: 0.0,
            gravity: GRAVITY,
            weights: TrackingWeights::default(),
        }
    }
}

impl QuadrotorParams {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("mass", self.mass),
            ("arm_length", self.arm_length),
            ("max_rotor_thrust", self.max_rotor_thrust),
            ("inertia[0]", self.inertia[0]),
            ("inertia[1]", self.inertia[1]),
            ("inertia[2]", self.inertia[2]),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ModelError::InvalidParameter(format!(
                    "quadrotor.{name} must be positive, got {value}"
                )));
            }
        }
        if self.translational_drag.iter().any(|d| *d < 0.0) || self.rotational_drag < 0.0 {
            return Err(ModelError::InvalidParameter(
                "quadrotor drag must be non-negative".into(),
            ));
        }
        let hover = self.mass * self.gravity / 4.0;
        if hover >= self.max_rotor_thrust {
            return Err(ModelError::InvalidParameter(format!(
                "quadrotor cannot hover: needs {hover:.3} N per rotor, max is {}",
                self.max_rotor_thrust
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Quadrotor {
    pub params: QuadrotorParams,
    body: MassProperties,
    bounds: [Bounds; 4],
    weights: [f64; STATE_DIM],
}

impl Quadrotor {
    pub fn new(params: QuadrotorParams) -> Result<Self> {
        params.validate()?;
        Ok(Self::build(params))
    }

    fn build(params: QuadrotorParams) -> Self {
        let body = MassProperties {
            mass: params.mass,
            inertia: Vec3::from(params.inertia),
        };
        let bounds = [Bounds::new(0.0, params.max_rotor_thrust); 4];
        let weights = params.weights.expand();
        Self {
            params,
            body,
            bounds,
            weights,
        }
    }

    /// Per-rotor thrust that balances gravity.
    pub fn hover_thrust(&self) -> f64 {
        self.params.mass * self.params.gravity / 4.0
    }

    /// Collective thrust and body torques from rotor thrusts.
    pub fn wrench<S: Scalar>(&self, thrusts: &[S]) -> (S, V3<S>) {
        let arm = self.params.arm_length / std::f64::consts::SQRT_2;
        let k = self.params.torque_coefficient;
        let mut total = thrusts[0];
        let mut torque = V3::new(
            thrusts[0] * (ROTORS[0].1 * arm),
            thrusts[0] * (-ROTORS[0].0 * arm),
            thrusts[0] * (ROTORS[0].2 * k),
        );
        for (f, &(sx, sy, spin)) in thrusts.iter().zip(&ROTORS).skip(1) {
            total = total + *f;
            torque = torque + V3::new(*f * (sy * arm), *f * (-sx * arm), *f * (spin * k));
        }
        (total, torque)
    }
}

impl Default for Quadrotor {
    fn default() -> Self {
        Self::build(QuadrotorParams::default())
    }
}

impl Dynamics for Quadrotor {
    fn name(&self) -> &'static str {
        "quadrotor"
    }

    fn state_dim(&self) -> usize {
        STATE_DIM
    }

    fn control_bounds(&self) -> &[Bounds] {
        &self.bounds
    }

    fn advance<S: Scalar>(&self, state: &[S], control: &[S], dt: f64) -> Vec<S> {
        let s = RigidState::unpack(state);
        let (thrust, mut torque) = self.wrench(control);

        let zero = thrust.constant_like(0.0);
        let body_thrust = V3::new(zero, zero, thrust);
        let drag = s.velocity.mul_elem(&Vec3::from(self.params.translational_drag));
        let force = s.attitude.rotate(body_thrust) - drag;
        if self.params.rotational_drag > 0.0 {
            torque = torque - s.body_rate.scale_f(self.params.rotational_drag);
        }

        self.body
            .integrate(&s, force, torque, self.params.gravity, dt)
            .pack()
    }

    fn nominal_control(&self) -> Vec<f64> {
        vec![self.hover_thrust(); 4]
    }

    fn error_weights(&self) -> &[f64] {
        &self.weights
    }

    fn position_indices(&self) -> Range<usize> {
        rigid::POS..rigid::POS + 3
    }

    fn quaternion_offset(&self) -> Option<usize> {
        Some(rigid::QUAT)
    }

    fn perturbation_scale(&self) -> Vec<f64> {
        rigid_perturbation_scale()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rigid::hover_state;
    use approx::assert_relative_eq;
    use gradpilot_model::{finite_diff_jacobians, tape_jacobians};

    #[test]
    fn test_hover_is_equilibrium() {
        let quad = Quadrotor::default();
        let s0 = hover_state(Vec3::new(0.0, 0.0, 2.0));
        let mut s = s0.clone();
        for _ in 0..100 {
            s = quad.advance(&s, &quad.nominal_control(), 0.01);
        }
        for (a, b) in s.iter().zip(&s0) {
            assert_relative_eq!(*a, *b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_extra_thrust_climbs() {
        let quad = Quadrotor::default();
        let u = vec![quad.hover_thrust() + 0.5; 4];
        let s = quad.advance(&hover_state(Vec3::zeros()), &u, 0.01);
        assert!(s[rigid::VEL + 2] > 0.0);
        assert!(s[rigid::POS + 2] > 0.0);
    }

    #[test]
    fn test_wrench_signs() {
        let quad = Quadrotor::default();
        let h = quad.hover_thrust();
        // More thrust on the left rotors rolls right-wing-down (positive x torque).
        let (_, tau) = quad.wrench(&[h, h + 0.1, h + 0.1, h]);
        assert!(tau.x > 0.0);
        assert_relative_eq!(tau.y, 0.0, epsilon = 1e-12);
        // Counter-clockwise pair produces positive yaw torque.
        let (total, tau) = quad.wrench(&[h + 0.1, h + 0.1, h, h]);
        assert!(tau.z > 0.0);
        assert_relative_eq!(total, 4.0 * h + 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_step_jacobians_match() {
        let quad = Quadrotor::default();
        let mut s = hover_state(Vec3::new(0.5, -0.2, 1.0));
        s[rigid::QUAT..rigid::VEL].copy_from_slice(&[0.98, 0.1, -0.15, 0.05]);
        quad.normalize_state(&mut s);
        s[rigid::VEL] = 0.4;
        s[rigid::RATE + 1] = -0.7;
        let u = [1.0, 1.5, 1.2, 0.9];

        let exact = tape_jacobians(&quad, &s, &u, 0.02).unwrap();
        let approx = finite_diff_jacobians(&quad, &s, &u, 0.02, 1e-6).unwrap();
        assert!((&exact.dx_dx - &approx.dx_dx).abs().max() < 1e-6);
        assert!((&exact.dx_du - &approx.dx_du).abs().max() < 1e-6);
    }

    #[test]
    fn test_rejects_underpowered() {
        let params = QuadrotorParams {
            max_rotor_thrust: 1.0,
            ..Default::default()
        };
        assert!(matches!(
            Quadrotor::new(params),
            Err(ModelError::InvalidParameter(_))
        ));
    }
}
