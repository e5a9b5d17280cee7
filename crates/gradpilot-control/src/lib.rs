//! Feedback controllers for gradpilot.
//!
//! A [`Policy`] maps the current state and a window of reference states to a
//! saturated control command. The trainable part is a [`Controller`]
//! architecture ([`LinearController`] or [`MlpController`]) whose parameters
//! live in a [`ParamStore`] of named tensors. Everything on the forward path
//! is generic over [`gradpilot_diff::Scalar`], so the same code is used for
//! evaluation and for taped training rollouts.

pub mod checkpoint;
pub mod controller;
pub mod error;
pub mod linear;
pub mod mlp;
pub mod normalizer;
pub mod params;
pub mod saturation;

pub use checkpoint::{Checkpoint, CheckpointMeta};
pub use controller::{Architecture, Controller, ControllerConfig, Network, Policy};
pub use error::{ControlError, Result};
pub use linear::LinearController;
pub use mlp::{Activation, MlpController};
pub use normalizer::Normalizer;
pub use params::{ParamStore, Tensor};
pub use saturation::SaturationPolicy;
