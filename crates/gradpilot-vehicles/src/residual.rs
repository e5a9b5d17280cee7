//! A nominal model corrected by a residual fitted on observed transitions.
//!
//! `x' = f(x, u, dt) + dt·(W·[x, ũ] + b)`, where `f` is the nominal step and
//! `ũ` is the control offset from nominal in half-range units. `W` and `b`
//! are the ridge least-squares fit of `(x'_observed - f(x, u, dt)) / dt`, so
//! one fit serves every timestep near the one it was observed at.
//!
//! Checkpoints trained on a residual model carry the nominal vehicle's name
//! and restore on the true vehicle.

use std::ops::Range;

use gradpilot_diff::Scalar;
use gradpilot_model::{Bounds, Dynamics, ModelError, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// One observed transition `(x, u) -> x'` over `dt` seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub state: Vec<f64>,
    pub control: Vec<f64>,
    pub next: Vec<f64>,
    pub dt: f64,
}

/// One-step prediction quality of a fitted residual.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResidualFit {
    pub observations: usize,
    /// Mean squared one-step error of the nominal model alone.
    pub nominal_error: f64,
    /// Mean squared one-step error with the residual applied.
    pub fitted_error: f64,
}

/// Nominal dynamics plus a learnt linear residual.
#[derive(Debug, Clone)]
pub struct ResidualDynamics<D> {
    nominal: D,
    /// `state_dim × (state_dim + control_dim + 1)`; the last column is the
    /// bias.
    weights: DMatrix<f64>,
    control_offset: Vec<f64>,
    control_scale: Vec<f64>,
}

impl<D: Dynamics> ResidualDynamics<D> {
    /// A residual of zero: steps exactly like `nominal`.
    pub fn zero(nominal: D) -> Self {
        let n = nominal.state_dim();
        let p = n + nominal.control_dim() + 1;
        let control_offset = nominal.nominal_control();
        let control_scale = nominal
            .control_bounds()
            .iter()
            .map(|b| 1.0 / b.half_range())
            .collect();
        Self {
            nominal,
            weights: DMatrix::zeros(n, p),
            control_offset,
            control_scale,
        }
    }

    /// Ridge least-squares fit of the residual on `observations`.
    pub fn fit(nominal: D, observations: &[Observation], ridge: f64) -> Result<Self> {
        if !(ridge >= 0.0 && ridge.is_finite()) {
            return Err(ModelError::InvalidParameter(format!(
                "ridge must be non-negative, got {ridge}"
            )));
        }
        if observations.is_empty() {
            return Err(ModelError::InvalidParameter(
                "cannot fit a residual on no observations".into(),
            ));
        }
        let mut model = Self::zero(nominal);
        let n = model.state_dim();
        let p = model.feature_dim();
        let rows = observations.len();

        let mut phi = DMatrix::zeros(rows, p);
        let mut target = DMatrix::zeros(rows, n);
        for (r, obs) in observations.iter().enumerate() {
            model.check_observation(obs)?;
            let predicted = model.nominal.advance(&obs.state, &obs.control, obs.dt);
            for (j, f) in model.features(&obs.state, &obs.control).into_iter().enumerate() {
                phi[(r, j)] = f;
            }
            for i in 0..n {
                target[(r, i)] = (obs.next[i] - predicted[i]) / obs.dt;
            }
        }

        // (ΦᵀΦ + λI)·Wᵀ = ΦᵀY, solved by SVD so rank-deficient data (e.g.
        // a constant state component) still gives the minimum-norm answer.
        let mut normal = phi.transpose() * &phi;
        for j in 0..p {
            normal[(j, j)] += ridge;
        }
        let rhs = phi.transpose() * target;
        let solution = normal
            .svd(true, true)
            .solve(&rhs, 1e-12)
            .map_err(|e| ModelError::InvalidParameter(format!("residual fit failed: {e}")))?;
        if solution.iter().any(|w| !w.is_finite()) {
            return Err(ModelError::InvalidParameter(
                "residual fit produced non-finite weights".into(),
            ));
        }
        model.weights = solution.transpose();
        Ok(model)
    }

    pub fn nominal(&self) -> &D {
        &self.nominal
    }

    pub fn weights(&self) -> &DMatrix<f64> {
        &self.weights
    }

    /// Regressors per transition: state, scaled control offset, bias.
    pub fn feature_dim(&self) -> usize {
        self.weights.ncols()
    }

    fn check_observation(&self, obs: &Observation) -> Result<()> {
        self.check_dims(obs.state.len(), obs.control.len())?;
        self.check_dims(obs.next.len(), obs.control.len())?;
        if !(obs.dt.is_finite() && obs.dt > 0.0) {
            return Err(ModelError::InvalidTimestep(obs.dt));
        }
        let finite = |xs: &[f64]| xs.iter().all(|x| x.is_finite());
        if !(finite(&obs.state) && finite(&obs.control) && finite(&obs.next)) {
            return Err(ModelError::InvalidParameter("non-finite observation".into()));
        }
        Ok(())
    }

    fn features(&self, state: &[f64], control: &[f64]) -> Vec<f64> {
        let mut phi = Vec::with_capacity(self.feature_dim());
        phi.extend_from_slice(state);
        phi.extend(
            control
                .iter()
                .zip(&self.control_offset)
                .zip(&self.control_scale)
                .map(|((u, o), k)| (u - o) * k),
        );
        phi.push(1.0);
        phi
    }

    /// Residual rate `W·[x, ũ] + b` for a plain state.
    pub fn residual(&self, state: &[f64], control: &[f64]) -> DVector<f64> {
        &self.weights * DVector::from_vec(self.features(state, control))
    }

    /// Prediction quality of the nominal and the corrected model on
    /// `observations`.
    pub fn assess(&self, observations: &[Observation]) -> ResidualFit {
        let mse = |step: &dyn Fn(&Observation) -> Vec<f64>| {
            let total: f64 = observations
                .iter()
                .map(|obs| {
                    step(obs)
                        .iter()
                        .zip(&obs.next)
                        .map(|(a, b)| (a - b).powi(2))
                        .sum::<f64>()
                })
                .sum();
            total / observations.len().max(1) as f64
        };
        ResidualFit {
            observations: observations.len(),
            nominal_error: mse(&|o| self.nominal.advance(&o.state, &o.control, o.dt)),
            fitted_error: mse(&|o| self.advance(&o.state, &o.control, o.dt)),
        }
    }
}

impl<D: Dynamics> Dynamics for ResidualDynamics<D> {
    fn name(&self) -> &'static str {
        self.nominal.name()
    }

    fn state_dim(&self) -> usize {
        self.nominal.state_dim()
    }

    fn control_bounds(&self) -> &[Bounds] {
        self.nominal.control_bounds()
    }

    fn advance<S: Scalar>(&self, state: &[S], control: &[S], dt: f64) -> Vec<S> {
        let mut next = self.nominal.advance(state, control, dt);
        let n = state.len();
        let bias = self.weights.ncols() - 1;
        let mut corrected = false;
        for (i, x) in next.iter_mut().enumerate() {
            let row = self.weights.row(i);
            let mut acc = *x;
            if row[bias] != 0.0 {
                acc = acc + row[bias] * dt;
            }
            for (j, &s) in state.iter().enumerate() {
                if row[j] != 0.0 {
                    acc = acc + s * (row[j] * dt);
                }
            }
            for (k, &u) in control.iter().enumerate() {
                let w = row[n + k];
                if w != 0.0 {
                    acc = acc + (u - self.control_offset[k]) * (w * self.control_scale[k] * dt);
                }
            }
            corrected |= row.iter().any(|w| *w != 0.0);
            *x = acc;
        }
        if corrected && let Some(q) = self.nominal.quaternion_offset() {
            let norm = next[q + 1..q + 4]
                .iter()
                .fold(next[q] * next[q], |acc, &c| acc + c * c)
                .sqrt();
            next[q..q + 4].iter_mut().for_each(|c| *c = *c / norm);
        }
        next
    }

    fn nominal_control(&self) -> Vec<f64> {
        self.nominal.nominal_control()
    }

    fn error_weights(&self) -> &[f64] {
        self.nominal.error_weights()
    }

    fn position_indices(&self) -> Range<usize> {
        self.nominal.position_indices()
    }

    fn quaternion_offset(&self) -> Option<usize> {
        self.nominal.quaternion_offset()
    }

    fn perturbation_scale(&self) -> Vec<f64> {
        self.nominal.perturbation_scale()
    }

    fn normalize_state(&self, state: &mut [f64]) {
        self.nominal.normalize_state(state)
    }
}
