//! Quaternion utilities for 3D rotations.
//!
//! Convention: q = [w; x; y; z] where w is scalar, (x,y,z) is vector part.
//! A quaternion maps body-frame vectors into the world frame.

use gradpilot_diff::Scalar;

use crate::vec3::V3;
use crate::Vec3;

/// A (nominally unit) quaternion over any [`Scalar`].
#[derive(Debug, Clone, Copy)]
pub struct Quat<S> {
    /// Scalar part (w).
    pub w: S,
    /// Vector part (x, y, z).
    pub v: V3<S>,
}

impl<S: Scalar> Quat<S> {
    /// Create a new quaternion from scalar and vector parts.
    pub fn new(w: S, x: S, y: S, z: S) -> Self {
        Self {
            w,
            v: V3::new(x, y, z),
        }
    }

    /// Read `[w, x, y, z]` starting at `offset`.
    pub fn from_slice(s: &[S], offset: usize) -> Self {
        Self::new(s[offset], s[offset + 1], s[offset + 2], s[offset + 3])
    }

    /// Identity quaternion on the same tape as `like`.
    pub fn identity_like(like: S) -> Self {
        let zero = like.constant_like(0.0);
        Self::new(like.constant_like(1.0), zero, zero, zero)
    }

    pub fn to_array(self) -> [S; 4] {
        [self.w, self.v.x, self.v.y, self.v.z]
    }

    pub fn norm_sq(&self) -> S {
        self.w * self.w + self.v.norm_sq()
    }

    /// Four-dimensional dot product. `1 - dot²` is a sign-invariant
    /// attitude distance.
    pub fn dot(&self, other: &Self) -> S {
        self.w * other.w + self.v.dot(other.v)
    }

    /// Normalize this quaternion to unit length.
    ///
    /// A degenerate (near-zero) quaternion becomes the identity rather than
    /// producing NaN.
    pub fn normalize(&self) -> Self {
        let norm = self.norm_sq().sqrt();
        if norm.value() < 1e-12 {
            return Self::identity_like(self.w);
        }
        Self {
            w: self.w / norm,
            v: self.v.scale(norm.constant_like(1.0) / norm),
        }
    }

    /// Quaternion multiplication: self * other.
    pub fn mul(&self, other: &Self) -> Self {
        Self {
            w: self.w * other.w - self.v.dot(other.v),
            v: self.v.cross(other.v) + other.v.scale(self.w) + self.v.scale(other.w),
        }
    }

    /// Conjugate of the quaternion (inverse for unit quaternions).
    pub fn conjugate(&self) -> Self {
        Self {
            w: self.w,
            v: -self.v,
        }
    }

    /// Rotate a body-frame vector into the world frame.
    pub fn rotate(&self, p: V3<S>) -> V3<S> {
        let t = self.v.cross(p).scale_f(2.0);
        p + t.scale(self.w) + self.v.cross(t)
    }

    /// Rotate a world-frame vector into the body frame.
    pub fn inverse_rotate(&self, p: V3<S>) -> V3<S> {
        self.conjugate().rotate(p)
    }

    /// Advance the attitude by a body angular rate over `dt`:
    /// q + dt/2 · q ⊗ [0, ω], renormalized.
    pub fn integrate(&self, omega: V3<S>, dt: f64) -> Self {
        let pure = Self {
            w: omega.x.constant_like(0.0),
            v: omega,
        };
        let dq = self.mul(&pure);
        Self {
            w: self.w + dq.w * (0.5 * dt),
            v: self.v + dq.v.scale_f(0.5 * dt),
        }
        .normalize()
    }
}

impl Quat<f64> {
    /// Identity quaternion (no rotation).
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Create quaternion from axis-angle representation.
    /// axis should be a unit vector, angle in radians.
    pub fn from_axis_angle(axis: &Vec3, angle: f64) -> Self {
        let (s, c) = (angle * 0.5).sin_cos();
        Self {
            w: c,
            v: V3::from(*axis * s),
        }
    }

    /// Build from roll, pitch, yaw applied in Z-Y-X order.
    pub fn from_euler(roll: f64, pitch: f64, yaw: f64) -> Self {
        let (sr, cr) = (roll * 0.5).sin_cos();
        let (sp, cp) = (pitch * 0.5).sin_cos();
        let (sy, cy) = (yaw * 0.5).sin_cos();
        Self::new(
            cr * cp * cy + sr * sp * sy,
            sr * cp * cy - cr * sp * sy,
            cr * sp * cy + sr * cp * sy,
            cr * cp * sy - sr * sp * cy,
        )
    }

    /// Recover `(roll, pitch, yaw)` in Z-Y-X order.
    pub fn to_euler(&self) -> (f64, f64, f64) {
        let (w, x, y, z) = (self.w, self.v.x, self.v.y, self.v.z);
        let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));
        let pitch = (2.0 * (w * y - z * x)).clamp(-1.0, 1.0).asin();
        let yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));
        (roll, pitch, yaw)
    }
}
