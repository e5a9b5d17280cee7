//! Mapping network outputs onto actuator ranges.

use gradpilot_diff::{Scalar, saturate};
use gradpilot_model::Bounds;
use serde::{Deserialize, Serialize};

/// How raw network outputs are squashed into the admissible control range.
///
/// Both policies first map the raw output `y` to `mid + half·y`, so that
/// `y ∈ [-1, 1]` spans the actuator range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaturationPolicy {
    /// `mid + half·tanh(y)`: smooth, gradients shrink near the limits.
    #[default]
    Tanh,
    /// Hard clamp in the forward pass, identity gradient in the backward pass.
    StraightThrough,
}

impl SaturationPolicy {
    pub fn apply<S: Scalar>(&self, raw: S, bounds: &Bounds) -> S {
        let linear = raw * bounds.half_range() + bounds.mid();
        match self {
            Self::Tanh => saturate(linear, bounds.lo, bounds.hi),
            Self::StraightThrough => linear.clamp_straight_through(bounds.lo, bounds.hi),
        }
    }

    /// Raw output that produces `control`; used to start a policy at the
    /// vehicle's nominal control.
    pub fn inverse(&self, control: f64, bounds: &Bounds) -> f64 {
        let y = (control - bounds.mid()) / bounds.half_range();
        match self {
            Self::Tanh => y.clamp(-0.95, 0.95).atanh(),
            Self::StraightThrough => y.clamp(-1.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use gradpilot_diff::Tape;

    #[test]
    fn test_tanh_stays_inside() {
        let b = Bounds::new(0.0, 4.0);
        for raw in [-100.0, -1.0, 0.0, 0.3, 100.0] {
            let u = SaturationPolicy::Tanh.apply(raw, &b);
            assert!(b.contains(u));
        }
        assert_relative_eq!(SaturationPolicy::Tanh.apply(0.0, &b), 2.0);
    }

    #[test]
    fn test_inverse() {
        let b = Bounds::new(0.0, 4.0);
        for policy in [SaturationPolicy::Tanh, SaturationPolicy::StraightThrough] {
            let raw = policy.inverse(1.2, &b);
            assert_relative_eq!(policy.apply(raw, &b), 1.2, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_straight_through_gradient() {
        let b = Bounds::symmetric(1.0);
        let tape = Tape::new();
        let raw = tape.var(5.0);
        let u = SaturationPolicy::StraightThrough.apply(raw, &b);
        assert_eq!(u.value(), 1.0);
        assert_eq!(tape.gradient(u).wrt(raw), 1.0);

        let raw = tape.var(5.0);
        let u = SaturationPolicy::Tanh.apply(raw, &b);
        assert!(tape.gradient(u).wrt(raw) < 1e-3);
    }
}
