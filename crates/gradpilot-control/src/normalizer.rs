//! Per-feature input standardization.

use gradpilot_diff::Scalar;
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, Result};

/// `x ↦ (x - mean) / std`, fitted on sampled controller inputs and stored
/// with the checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalizer {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl Normalizer {
    pub fn identity(dim: usize) -> Self {
        Self {
            mean: vec![0.0; dim],
            std: vec![1.0; dim],
        }
    }

    /// Fit mean and standard deviation; each std is floored at `min_std` so
    /// constant features do not blow up.
    pub fn fit(samples: &[Vec<f64>], min_std: f64) -> Result<Self> {
        let first = samples.first().ok_or_else(|| {
            ControlError::InvalidConfig("cannot fit normalizer on no samples".into())
        })?;
        let dim = first.len();
        if let Some(bad) = samples.iter().find(|s| s.len() != dim) {
            return Err(ControlError::DimensionMismatch {
                what: "normalizer sample",
                expected: dim,
                got: bad.len(),
            });
        }

        let n = samples.len() as f64;
        let mut mean = vec![0.0; dim];
        for s in samples {
            for (m, x) in mean.iter_mut().zip(s) {
                *m += x / n;
            }
        }
        let mut var = vec![0.0; dim];
        for s in samples {
            for ((v, x), m) in var.iter_mut().zip(s).zip(&mean) {
                *v += (x - m).powi(2) / n;
            }
        }
        let std = var.into_iter().map(|v| v.sqrt().max(min_std)).collect();
        Ok(Self { mean, std })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn is_identity(&self) -> bool {
        self.mean.iter().all(|m| *m == 0.0) && self.std.iter().all(|s| *s == 1.0)
    }

    pub fn apply<S: Scalar>(&self, x: &[S]) -> Vec<S> {
        debug_assert_eq!(x.len(), self.dim());
        x.iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(&v, (m, s))| (v - *m) * (1.0 / s))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fit_and_apply() {
        let samples = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let n = Normalizer::fit(&samples, 0.1).unwrap();
        assert_relative_eq!(n.mean[0], 2.0);
        assert_relative_eq!(n.std[0], 1.0);
        // Constant feature: std floored.
        assert_relative_eq!(n.std[1], 0.1);
        let y = n.apply(&[3.0, 5.2]);
        assert_relative_eq!(y[0], 1.0);
        assert_relative_eq!(y[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_fit_errors() {
        assert!(Normalizer::fit(&[], 0.1).is_err());
        assert!(Normalizer::fit(&[vec![1.0], vec![1.0, 2.0]], 0.1).is_err());
    }

    #[test]
    fn test_identity() {
        let n = Normalizer::identity(3);
        assert!(n.is_identity());
        assert_eq!(n.apply(&[1.0, -2.0, 3.0]), vec![1.0, -2.0, 3.0]);
    }
}
