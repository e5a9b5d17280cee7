//! The `Dynamics` capability interface.

use std::ops::Range;

use gradpilot_diff::Scalar;

use crate::bounds::Bounds;
use crate::error::{ModelError, Result};

/// A vehicle's differentiable state transition.
///
/// Implementations must be closed-form and deterministic: the same inputs give
/// bit-identical outputs, and nothing inside [`Dynamics::advance`] branches on
/// state values except between identical formulas.
pub trait Dynamics: Send + Sync {
    /// Short identifier, stored in checkpoints.
    fn name(&self) -> &'static str;

    fn state_dim(&self) -> usize;

    fn control_dim(&self) -> usize {
        self.control_bounds().len()
    }

    /// Admissible range of each control channel.
    fn control_bounds(&self) -> &[Bounds];

    /// One integrator step. Dimensions are not checked.
    fn advance<S: Scalar>(&self, state: &[S], control: &[S], dt: f64) -> Vec<S>;

    /// Control that holds the vehicle at an equilibrium (e.g. hover thrust).
    fn nominal_control(&self) -> Vec<f64>;

    /// Per-component weights of the tracking error, `state_dim` long.
    fn error_weights(&self) -> &[f64];

    /// State indices holding the position, used for RMS position error.
    fn position_indices(&self) -> Range<usize>;

    /// Index of the first of four unit-quaternion components, if any.
    fn quaternion_offset(&self) -> Option<usize> {
        None
    }

    /// Per-component scale of initial-state perturbations; multiplied by
    /// the difficulty level's σ.
    fn perturbation_scale(&self) -> Vec<f64> {
        vec![1.0; self.state_dim()]
    }

    /// Checked transition: validates dimensions and timestep first.
    fn step<S: Scalar>(&self, state: &[S], control: &[S], dt: f64) -> Result<Vec<S>> {
        self.check_dims(state.len(), control.len())?;
        if !(dt.is_finite() && dt > 0.0) {
            return Err(ModelError::InvalidTimestep(dt));
        }
        Ok(self.advance(state, control, dt))
    }

    fn check_dims(&self, state_len: usize, control_len: usize) -> Result<()> {
        if state_len != self.state_dim() {
            return Err(ModelError::DimensionMismatch {
                what: "state",
                expected: self.state_dim(),
                got: state_len,
            });
        }
        if control_len != self.control_dim() {
            return Err(ModelError::DimensionMismatch {
                what: "control",
                expected: self.control_dim(),
                got: control_len,
            });
        }
        Ok(())
    }

    /// Weighted squared tracking error against a reference state.
    ///
    /// Quaternion blocks contribute `w·(1 - (q·q_ref)²)`, which is zero for
    /// both `q_ref` and `-q_ref`.
    fn tracking_error<S: Scalar>(&self, state: &[S], reference: &[f64]) -> S {
        let weights = self.error_weights();
        let quat = self.quaternion_offset();
        let mut err = state[0].constant_like(0.0);
        let mut i = 0;
        while i < state.len() {
            if Some(i) == quat {
                let dot = (0..4).fold(state[i].constant_like(0.0), |acc, k| {
                    acc + state[i + k] * reference[i + k]
                });
                err = err + (dot.square() * -1.0 + 1.0) * weights[i];
                i += 4;
            } else {
                if weights[i] != 0.0 {
                    err = err + (state[i] - reference[i]).square() * weights[i];
                }
                i += 1;
            }
        }
        err
    }

    /// Squared position distance between a state and a reference (plain values).
    fn position_error_sq(&self, state: &[f64], reference: &[f64]) -> f64 {
        self.position_indices()
            .map(|i| (state[i] - reference[i]).powi(2))
            .sum()
    }

    /// Project a plain state back onto its manifold (unit quaternion).
    fn normalize_state(&self, state: &mut [f64]) {
        if let Some(q) = self.quaternion_offset() {
            let norm = state[q..q + 4].iter().map(|c| c * c).sum::<f64>().sqrt();
            if norm > 1e-12 {
                state[q..q + 4].iter_mut().for_each(|c| *c /= norm);
            } else {
                state[q..q + 4].copy_from_slice(&[1.0, 0.0, 0.0, 0.0]);
            }
        }
    }
}
