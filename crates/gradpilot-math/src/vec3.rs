//! Three-component vectors over any [`Scalar`].

use std::ops::{Add, Neg, Sub};

use gradpilot_diff::Scalar;

use crate::Vec3;

/// A 3-vector whose components may be tape variables.
#[derive(Debug, Clone, Copy)]
pub struct V3<S> {
    pub x: S,
    pub y: S,
    pub z: S,
}

impl<S: Scalar> V3<S> {
    pub fn new(x: S, y: S, z: S) -> Self {
        Self { x, y, z }
    }

    /// Read three consecutive components starting at `offset`.
    pub fn from_slice(s: &[S], offset: usize) -> Self {
        Self::new(s[offset], s[offset + 1], s[offset + 2])
    }

    /// Lift a constant `f64` vector next to `like`.
    pub fn constant(like: S, v: &Vec3) -> Self {
        Self::new(
            like.constant_like(v.x),
            like.constant_like(v.y),
            like.constant_like(v.z),
        )
    }

    pub fn to_array(self) -> [S; 3] {
        [self.x, self.y, self.z]
    }

    /// Multiply by a scalar of the same kind.
    pub fn scale(self, s: S) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }

    /// Multiply by an `f64` constant.
    pub fn scale_f(self, c: f64) -> Self {
        Self::new(self.x * c, self.y * c, self.z * c)
    }

    /// Component-wise product with a constant vector.
    pub fn mul_elem(self, c: &Vec3) -> Self {
        Self::new(self.x * c.x, self.y * c.y, self.z * c.z)
    }

    pub fn dot(self, other: Self) -> S {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn norm_sq(self) -> S {
        self.dot(self)
    }

    /// Primal values as an nalgebra vector.
    pub fn value(self) -> Vec3 {
        Vec3::new(self.x.value(), self.y.value(), self.z.value())
    }
}

impl<S: Scalar> Add for V3<S> {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl<S: Scalar> Sub for V3<S> {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl<S: Scalar> Neg for V3<S> {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl From<Vec3> for V3<f64> {
    fn from(v: Vec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gradpilot_diff::tape_gradient;

    #[test]
    fn test_cross_matches_nalgebra() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(-0.5, 0.25, 4.0);
        let c = V3::from(a).cross(V3::from(b));
        assert!((c.value() - a.cross(&b)).norm() < 1e-14);
    }

    #[test]
    fn test_norm_sq_gradient() {
        let (value, grad) = tape_gradient(|_, v| V3::from_slice(v, 0).norm_sq(), &[1.0, -2.0, 0.5]);
        assert_eq!(value, 5.25);
        assert_eq!(grad, vec![2.0, -4.0, 1.0]);
    }
}
