//! Cart-pole: a pole hinged on a cart moving along a rail.
//!
//! State `[x, ẋ, θ, θ̇]` with θ = 0 upright, control `[F]` (horizontal force on
//! the cart, clamped by the controller's saturation to `±force_limit`).

use std::ops::Range;

use gradpilot_diff::Scalar;
use gradpilot_model::{Bounds, Dynamics, ModelError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CartPoleParams {
    pub cart_mass: f64,
    pub pole_mass: f64,
    /// Distance from hinge to the pole's centre of mass.
    pub pole_half_length: f64,
    pub gravity: f64,
    pub force_limit: f64,
    /// Viscous friction on the cart (N·s/m).
    pub cart_damping: f64,
    /// Viscous friction at the hinge (N·m·s).
    pub pole_damping: f64,
    /// Tracking error weights for `[x, ẋ, θ, θ̇]`.
    pub error_weights: [f64; 4],
}

impl Default for CartPoleParams {
    fn default() -> Self {
        Self {
            cart_mass: 1.0,
            pole_mass: 0.1,
            pole_half_length: 0.5,
            gravity: 9.81,
            force_limit: 30.0,
            cart_damping: 0.0,
            pole_damping: 0.0,
            error_weights: [1.0, 0.1, 1.0, 0.1],
        }
    }
}

impl CartPoleParams {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("cart_mass", self.cart_mass),
            ("pole_mass", self.pole_mass),
            ("pole_half_length", self.pole_half_length),
            ("force_limit", self.force_limit),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ModelError::InvalidParameter(format!(
                    "cartpole.{name} must be positive, got {value}"
                )));
            }
        }
        if self.cart_damping < 0.0 || self.pole_damping < 0.0 {
            return Err(ModelError::InvalidParameter(
                "cartpole damping must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CartPole {
    pub params: CartPoleParams,
    bounds: [Bounds; 1],
}

impl CartPole {
    pub fn new(params: CartPoleParams) -> Result<Self> {
        params.validate()?;
        let bounds = [Bounds::symmetric(params.force_limit)];
        Ok(Self { params, bounds })
    }

    /// `(ẍ, θ̈)` for the given state and force.
    ///
    /// The denominator `l·(4/3 - m_p cos²θ / M)` is bounded below by
    /// `l·(4/3 - m_p / M) > 0`, so no state can make it vanish.
    pub fn accelerations<S: Scalar>(&self, state: &[S], force: S) -> (S, S) {
        let p = &self.params;
        let total = p.cart_mass + p.pole_mass;
        let ml = p.pole_mass * p.pole_half_length;
        let (x_dot, theta, theta_dot) = (state[1], state[2], state[3]);
        let (sin, cos) = (theta.sin(), theta.cos());

        let push = force - x_dot * p.cart_damping;
        let temp = (push + theta_dot.square() * sin * ml) / total;
        let denom = (cos.square() * (-p.pole_mass / total) + 4.0 / 3.0) * p.pole_half_length;
        let theta_acc = (sin * p.gravity - cos * temp - theta_dot * (p.pole_damping / ml)) / denom;
        let x_acc = temp - theta_acc * cos * (ml / total);
        (x_acc, theta_acc)
    }
}

impl Default for CartPole {
    fn default() -> Self {
        let params = CartPoleParams::default();
        let bounds = [Bounds::symmetric(params.force_limit)];
        Self { params, bounds }
    }
}

impl Dynamics for CartPole {
    fn name(&self) -> &'static str {
        "cartpole"
    }

    fn state_dim(&self) -> usize {
        4
    }

    fn control_bounds(&self) -> &[Bounds] {
        &self.bounds
    }

    fn advance<S: Scalar>(&self, state: &[S], control: &[S], dt: f64) -> Vec<S> {
        let (x_acc, theta_acc) = self.accelerations(state, control[0]);
        // Semi-implicit Euler: velocities first, positions from the new velocities.
        let x_dot = state[1] + x_acc * dt;
        let theta_dot = state[3] + theta_acc * dt;
        vec![state[0] + x_dot * dt, x_dot, state[2] + theta_dot * dt, theta_dot]
    }

    fn nominal_control(&self) -> Vec<f64> {
        vec![0.0]
    }

    fn error_weights(&self) -> &[f64] {
        &self.params.error_weights
    }

    fn position_indices(&self) -> Range<usize> {
        0..1
    }

    fn perturbation_scale(&self) -> Vec<f64> {
        // σ is an angle for the pole, metres for the cart.
        vec![0.2, 0.2, 1.0, 1.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_upright_equilibrium() {
        let cp = CartPole::default();
        let next = cp.advance(&[0.0, 0.0, 0.0, 0.0], &[0.0], 0.02);
        assert_eq!(next, vec![0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_pole_falls_towards_tilt() {
        let cp = CartPole::default();
        let mut s = vec![0.0, 0.0, 0.05, 0.0];
        for _ in 0..10 {
            s = cp.advance(&s, &[0.0], 0.02);
        }
        assert!(s[2] > 0.05);
        assert!(s[3] > 0.0);
        // Reaction pushes the cart the other way.
        assert!(s[0] < 0.0);
    }

    #[test]
    fn test_force_accelerates_cart() {
        let cp = CartPole::default();
        let (x_acc, theta_acc) = cp.accelerations(&[0.0, 0.0, 0.0, 0.0], 11.0);
        // At θ = 0: θ̈ = -F/M / (l·(4/3 - m_p/M)), ẍ = F/M - m_p l θ̈ / M.
        let total = 1.1;
        let expected_theta = -(11.0 / total) / (0.5 * (4.0 / 3.0 - 0.1 / total));
        assert_relative_eq!(theta_acc, expected_theta, epsilon = 1e-12);
        assert_relative_eq!(x_acc, 10.0 - 0.05 * expected_theta / total, epsilon = 1e-12);
    }

    #[test]
    fn test_deterministic() {
        let cp = CartPole::default();
        let s = [0.3, -0.2, 0.4, 1.5];
        let a = cp.advance(&s, &[7.5], 0.01);
        let b = cp.advance(&s, &[7.5], 0.01);
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_params() {
        let params = CartPoleParams {
            pole_mass: 0.0,
            ..Default::default()
        };
        assert!(CartPole::new(params).is_err());
    }

    #[test]
    fn test_partial_params_json() {
        let params: CartPoleParams = serde_json::from_str(r#"{"force_limit": 10.0}"#).unwrap();
        assert_eq!(params.force_limit, 10.0);
        assert_eq!(params.cart_mass, 1.0);
    }
}
