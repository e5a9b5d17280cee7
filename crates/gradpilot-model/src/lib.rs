//! Dynamics capability interface for gradpilot.
//!
//! A vehicle is a pure, closed-form state transition `(state, control) -> next`
//! written against [`gradpilot_diff::Scalar`]. The same implementation serves
//! plain simulation and taped differentiation.

pub mod bounds;
pub mod dynamics;
pub mod error;
pub mod jacobians;

pub use bounds::Bounds;
pub use dynamics::Dynamics;
pub use error::{ModelError, Result};
pub use jacobians::{StepJacobians, finite_diff_jacobians, tape_jacobians};
