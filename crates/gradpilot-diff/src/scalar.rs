//! Scalar abstraction shared by plain and differentiated evaluation.

use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// A real number that dynamics and controllers can be written against.
///
/// Implemented by `f64` (plain evaluation) and by [`crate::Var`] (values
/// recorded on a tape). Mixed arithmetic with `f64` constants is part of the
/// contract so that model code can write `x * dt` or `v + 1.0` directly.
pub trait Scalar:
    Copy
    + Debug
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + Add<f64, Output = Self>
    + Sub<f64, Output = Self>
    + Mul<f64, Output = Self>
    + Div<f64, Output = Self>
{
    /// Primal value.
    fn value(self) -> f64;

    /// A constant living in the same context as `self` (same tape for `Var`).
    fn constant_like(self, c: f64) -> Self;

    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn tanh(self) -> Self;
    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn sqrt(self) -> Self;
    fn powi(self, n: i32) -> Self;

    /// Clamp the value to `[lo, hi]` while passing the gradient through
    /// unchanged (straight-through estimator).
    fn clamp_straight_through(self, lo: f64, hi: f64) -> Self;

    /// `Σ wᵢ·xᵢ + bias`.
    ///
    /// Implementations may record this as a single fused operation.
    fn affine(weights: &[Self], inputs: &[Self], bias: Self) -> Self {
        debug_assert_eq!(weights.len(), inputs.len());
        weights
            .iter()
            .zip(inputs)
            .fold(bias, |acc, (&w, &x)| acc + w * x)
    }

    #[inline]
    fn square(self) -> Self {
        self * self
    }

    #[inline]
    fn is_finite(self) -> bool {
        self.value().is_finite()
    }
}

impl Scalar for f64 {
    #[inline]
    fn value(self) -> f64 {
        self
    }

    #[inline]
    fn constant_like(self, c: f64) -> Self {
        c
    }

    #[inline]
    fn sin(self) -> Self {
        f64::sin(self)
    }

    #[inline]
    fn cos(self) -> Self {
        f64::cos(self)
    }

    #[inline]
    fn tanh(self) -> Self {
        f64::tanh(self)
    }

    #[inline]
    fn exp(self) -> Self {
        f64::exp(self)
    }

    #[inline]
    fn ln(self) -> Self {
        f64::ln(self)
    }

    #[inline]
    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }

    #[inline]
    fn powi(self, n: i32) -> Self {
        f64::powi(self, n)
    }

    #[inline]
    fn clamp_straight_through(self, lo: f64, hi: f64) -> Self {
        self.clamp(lo, hi)
    }
}

/// Check that every element of a slice has a finite value.
pub fn all_finite<S: Scalar>(xs: &[S]) -> bool {
    xs.iter().all(|x| x.is_finite())
}
