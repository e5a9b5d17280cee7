//! Jacobians of a single dynamics step.
//!
//! For `x' = f(x, u)`:
//! - `dx_dx`: ∂x'/∂x
//! - `dx_du`: ∂x'/∂u

use gradpilot_diff::{DMat, Tape, central_jacobian};

use crate::dynamics::Dynamics;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct StepJacobians {
    pub dx_dx: DMat,
    pub dx_du: DMat,
}

/// Exact step Jacobians from one taped step and one backward sweep per output.
pub fn tape_jacobians<D: Dynamics>(
    model: &D,
    state: &[f64],
    control: &[f64],
    dt: f64,
) -> Result<StepJacobians> {
    model.check_dims(state.len(), control.len())?;
    let n = state.len();
    let m = control.len();

    let tape = Tape::with_capacity(64 * (n + m));
    let x = tape.vars(state);
    let u = tape.vars(control);
    let next = model.step(&x, &u, dt)?;

    let mut dx_dx = DMat::zeros(n, n);
    let mut dx_du = DMat::zeros(n, m);
    for (i, out) in next.iter().enumerate() {
        let grads = tape.gradient(*out);
        for (j, xj) in x.iter().enumerate() {
            dx_dx[(i, j)] = grads.wrt(*xj);
        }
        for (j, uj) in u.iter().enumerate() {
            dx_du[(i, j)] = grads.wrt(*uj);
        }
    }

    Ok(StepJacobians { dx_dx, dx_du })
}

/// Step Jacobians via central finite differences over `(x, u)`.
pub fn finite_diff_jacobians<D: Dynamics>(
    model: &D,
    state: &[f64],
    control: &[f64],
    dt: f64,
    eps: f64,
) -> Result<StepJacobians> {
    model.check_dims(state.len(), control.len())?;
    let n = state.len();
    let m = control.len();

    let mut xu = state.to_vec();
    xu.extend_from_slice(control);
    let jac = central_jacobian(|z| model.advance(&z[..n], &z[n..], dt), &xu, eps);

    Ok(StepJacobians {
        dx_dx: jac.columns(0, n).into_owned(),
        dx_du: jac.columns(n, m).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::tests::Pendulum;

    #[test]
    fn test_tape_matches_finite_difference() {
        let p = Pendulum::new();
        let state = [0.4, -0.3];
        let control = [0.7];
        let exact = tape_jacobians(&p, &state, &control, 0.02).unwrap();
        let approx = finite_diff_jacobians(&p, &state, &control, 0.02, 1e-6).unwrap();

        assert!((&exact.dx_dx - &approx.dx_dx).abs().max() < 1e-8);
        assert!((&exact.dx_du - &approx.dx_du).abs().max() < 1e-8);
    }

    #[test]
    fn test_known_control_jacobian() {
        let p = Pendulum::new();
        let dt = 0.01;
        let j = tape_jacobians(&p, &[0.0, 0.0], &[0.0], dt).unwrap();
        // ω' = ω + u·dt, θ' = θ + ω'·dt.
        assert!((j.dx_du[(1, 0)] - dt).abs() < 1e-15);
        assert!((j.dx_du[(0, 0)] - dt * dt).abs() < 1e-15);
    }

    #[test]
    fn test_dimension_error() {
        let p = Pendulum::new();
        assert!(tape_jacobians(&p, &[0.0], &[0.0], 0.01).is_err());
    }
}
