//! Math primitives for gradpilot.
//!
//! Plain `f64` linear algebra goes through nalgebra aliases. Code that has to
//! stay differentiable uses [`V3`] and [`Quat`], which are generic over
//! [`gradpilot_diff::Scalar`].

pub mod quaternion;
pub mod vec3;

pub use quaternion::Quat;
pub use vec3::V3;

use nalgebra as na;

/// 3D vector alias.
pub type Vec3 = na::Vector3<f64>;
/// Dynamic vector.
pub type DVec = na::DVector<f64>;

/// Standard gravity (m/s²).
pub const GRAVITY: f64 = 9.81;
