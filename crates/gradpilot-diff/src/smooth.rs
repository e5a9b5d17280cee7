//! Smooth substitutes for non-smooth operations.
//!
//! Hard clamps and plain norms have undefined or zero derivatives at exactly
//! the points a rollout tends to visit (saturated actuators, rest).
//! Differentiated code uses these instead.

use crate::scalar::Scalar;

/// `ln(1 + exp(β·x)) / β`.
///
/// Both branches are the same function; the split only keeps `exp` from
/// overflowing, so the gradient path is unaffected.
pub fn softplus<S: Scalar>(x: S, sharpness: f64) -> S {
    let z = x * sharpness;
    let y = if z.value() > 0.0 {
        z + ((-z).exp() + 1.0).ln()
    } else {
        (z.exp() + 1.0).ln()
    };
    y / sharpness
}

/// Map an unbounded value into `(lo, hi)` with `tanh`, centred so that
/// `saturate(mid) = mid` with unit slope.
pub fn saturate<S: Scalar>(x: S, lo: f64, hi: f64) -> S {
    let mid = 0.5 * (lo + hi);
    let half = 0.5 * (hi - lo);
    ((x - mid) / half).tanh() * half + mid
}

/// Euclidean norm regularised by `eps`, safe to differentiate at zero.
pub fn safe_norm<S: Scalar>(xs: &[S], eps: f64) -> S {
    debug_assert!(!xs.is_empty());
    let sq = xs[1..].iter().fold(xs[0] * xs[0], |acc, &x| acc + x * x);
    (sq + eps * eps).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tape::tape_gradient;
    use approx::assert_relative_eq;

    #[test]
    fn test_softplus_is_stable() {
        assert_relative_eq!(softplus(1000.0, 1.0), 1000.0);
        assert!(softplus(-1000.0, 1.0) >= 0.0);
        assert_relative_eq!(softplus(0.0, 1.0), 2.0_f64.ln());
        let (_, g) = tape_gradient(|_, v| softplus(v[0], 10.0), &[50.0]);
        assert_relative_eq!(g[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_saturate_bounds_and_slope() {
        assert_relative_eq!(saturate(1.0, -1.0, 3.0), 1.0);
        assert!(saturate(1e6, -1.0, 3.0) <= 3.0);
        assert!(saturate(-1e6, -1.0, 3.0) >= -1.0);
        let (_, g) = tape_gradient(|_, v| saturate(v[0], -1.0, 3.0), &[1.0]);
        assert_relative_eq!(g[0], 1.0);
    }

    #[test]
    fn test_safe_norm_at_zero() {
        assert_relative_eq!(safe_norm(&[3.0, 4.0], 0.0), 5.0);
        assert_relative_eq!(safe_norm(&[0.0, 0.0], 0.5), 0.5);
        let (_, g) = tape_gradient(|_, v| safe_norm(v, 1e-6), &[0.0, 0.0]);
        assert_eq!(g, vec![0.0, 0.0]);
    }
}
