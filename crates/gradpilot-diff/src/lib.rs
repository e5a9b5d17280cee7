//! Differentiation utilities for gradpilot.
//!
//! Dynamics models, controllers and the rollout engine are written once,
//! generic over [`Scalar`]. Running them with `f64` gives plain simulation;
//! running them with [`Var`] records every elementary operation on a
//! [`Tape`], from which exact reverse-mode gradients are recovered.
//!
//! Finite-difference helpers are provided to check the analytic gradients.

pub mod finite_diff;
pub mod scalar;
pub mod smooth;
pub mod tape;

pub use finite_diff::{central_gradient, central_jacobian, max_relative_error};
pub use scalar::{Scalar, all_finite};
pub use smooth::{safe_norm, saturate, softplus};
pub use tape::{Gradients, Tape, Var, tape_gradient};

/// Dynamic matrix alias used for Jacobians.
pub type DMat = nalgebra::DMatrix<f64>;
