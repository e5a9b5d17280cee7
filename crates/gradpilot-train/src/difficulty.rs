//! Difficulty levels: the knobs the curriculum turns.

use serde::{Deserialize, Serialize};

use crate::error::RolloutError;

/// Weights of the rollout loss terms.
///
/// The loss is `tracking · mean_t e(x_t, r_t) + effort · mean_t |u_t - u_nom|²
/// + smoothness · mean_t |u_t - u_{t-1}|² + terminal · e(x_H, r_H)`, with
/// control terms measured in units of each channel's half range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LossWeights {
    pub tracking: f64,
    pub effort: f64,
    pub smoothness: f64,
    pub terminal: f64,
}

impl Default for LossWeights {
    fn default() -> Self {
        Self {
            tracking: 1.0,
            effort: 1e-3,
            smoothness: 1e-3,
            terminal: 0.0,
        }
    }
}

impl LossWeights {
    fn as_array(&self) -> [f64; 4] {
        [self.tracking, self.effort, self.smoothness, self.terminal]
    }

    fn lerp(&self, other: &Self, t: f64) -> Self {
        Self {
            tracking: lerp(self.tracking, other.tracking, t),
            effort: lerp(self.effort, other.effort, t),
            smoothness: lerp(self.smoothness, other.smoothness, t),
            terminal: lerp(self.terminal, other.terminal, t),
        }
    }
}

/// One immutable snapshot of the curriculum knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DifficultyLevel {
    /// Rollout length H in steps.
    pub horizon: usize,
    /// Standard deviation σ of the initial-state perturbation, scaled per
    /// component by the vehicle's perturbation scale.
    pub perturbation: f64,
    /// Scale of a segment's deviation from its first state, in (0, 1].
    pub aggressiveness: f64,
    /// Number of future reference states shown to the controller.
    pub window: usize,
    pub weights: LossWeights,
    /// Divergence threshold used for evaluations run at this level.
    pub eval_threshold: Option<f64>,
}

impl Default for DifficultyLevel {
    fn default() -> Self {
        Self {
            horizon: 20,
            perturbation: 0.05,
            aggressiveness: 1.0,
            window: 1,
            weights: LossWeights::default(),
            eval_threshold: None,
        }
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a * (1.0 - t) + b * t
}

impl DifficultyLevel {
    /// Check the knobs against a controller that accepts at most
    /// `max_window` reference states.
    pub fn validate(&self, max_window: usize) -> Result<(), RolloutError> {
        let invalid = |msg: String| Err(RolloutError::Configuration(msg));
        if self.horizon == 0 {
            return invalid("horizon must be at least 1".into());
        }
        if !(self.perturbation.is_finite() && self.perturbation >= 0.0) {
            return invalid(format!("perturbation must be non-negative, got {}", self.perturbation));
        }
        if !(self.aggressiveness > 0.0 && self.aggressiveness <= 1.0) {
            return invalid(format!(
                "aggressiveness must be in (0, 1], got {}",
                self.aggressiveness
            ));
        }
        if self.window == 0 || self.window > max_window {
            return invalid(format!(
                "window must be in 1..={max_window}, got {}",
                self.window
            ));
        }
        if self.weights.as_array().iter().any(|w| !(w.is_finite() && *w >= 0.0)) {
            return invalid(format!("loss weights must be non-negative: {:?}", self.weights));
        }
        if self.weights.tracking == 0.0 && self.weights.terminal == 0.0 {
            return invalid("tracking or terminal weight must be positive".into());
        }
        if let Some(th) = self.eval_threshold {
            if !(th > 0.0) {
                return invalid(format!("eval_threshold must be positive, got {th}"));
            }
        }
        Ok(())
    }

    /// Interpolate between `self` (t = 0) and `other` (t = 1). Integer knobs
    /// are rounded.
    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        let round = |a: usize, b: usize| lerp(a as f64, b as f64, t).round() as usize;
        let eval_threshold = match (self.eval_threshold, other.eval_threshold) {
            (Some(a), Some(b)) => Some(lerp(a, b, t)),
            (a, b) => b.or(a),
        };
        Self {
            horizon: round(self.horizon, other.horizon),
            perturbation: lerp(self.perturbation, other.perturbation, t),
            aggressiveness: lerp(self.aggressiveness, other.aggressiveness, t),
            window: round(self.window, other.window),
            weights: self.weights.lerp(&other.weights, t),
            eval_threshold,
        }
    }
}
