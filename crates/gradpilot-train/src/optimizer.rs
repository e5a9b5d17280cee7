//! Gradient step rules.

use gradpilot_math::DVec;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepRuleKind {
    Sgd,
    Momentum,
    #[default]
    Adam,
}

/// Configuration for the parameter update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub kind: StepRuleKind,
    /// Learning rate.
    pub learning_rate: f64,
    /// Beta1 parameter for the first moment (Adam).
    pub beta1: f64,
    /// Beta2 parameter for the second moment (Adam).
    pub beta2: f64,
    /// Epsilon for numerical stability (Adam).
    pub epsilon: f64,
    /// Velocity decay (Momentum).
    pub momentum: f64,
    /// Rescale gradients whose global norm exceeds this value.
    pub grad_clip: Option<f64>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            kind: StepRuleKind::Adam,
            learning_rate: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            momentum: 0.9,
            grad_clip: Some(10.0),
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(TrainError::Configuration(msg));
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return invalid(format!("learning_rate must be positive, got {}", self.learning_rate));
        }
        let rates = [
            ("beta1", self.beta1),
            ("beta2", self.beta2),
            ("momentum", self.momentum),
        ];
        for (name, beta) in rates {
            if !(0.0..1.0).contains(&beta) {
                return invalid(format!("{name} must be in [0, 1), got {beta}"));
            }
        }
        if !(self.epsilon > 0.0) {
            return invalid(format!("epsilon must be positive, got {}", self.epsilon));
        }
        if let Some(clip) = self.grad_clip {
            if !(clip > 0.0) {
                return invalid(format!("grad_clip must be positive, got {clip}"));
            }
        }
        Ok(())
    }

    pub fn build_rule(&self) -> Box<dyn StepRule> {
        match self.kind {
            StepRuleKind::Sgd => Box::new(Sgd::new(self.learning_rate)),
            StepRuleKind::Momentum => Box::new(Momentum::new(self.learning_rate, self.momentum)),
            StepRuleKind::Adam => Box::new(Adam::new(
                self.learning_rate,
                self.beta1,
                self.beta2,
                self.epsilon,
            )),
        }
    }
}

/// One gradient-based parameter update.
pub trait StepRule: Send {
    fn name(&self) -> &'static str;

    /// Update `params` in place given `grad = ∂loss/∂params`.
    fn step(&mut self, params: &mut DVec, grad: &DVec);

    /// Forget accumulated state (moments, velocity).
    fn reset(&mut self) {}
}

/// Plain gradient descent.
#[derive(Debug, Clone)]
pub struct Sgd {
    pub learning_rate: f64,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Self {
        Self { learning_rate }
    }
}

impl StepRule for Sgd {
    fn name(&self) -> &'static str {
        "sgd"
    }

    fn step(&mut self, params: &mut DVec, grad: &DVec) {
        params.axpy(-self.learning_rate, grad, 1.0);
    }
}

/// Heavy-ball momentum.
#[derive(Debug, Clone)]
pub struct Momentum {
    pub learning_rate: f64,
    pub momentum: f64,
    velocity: Option<DVec>,
}

impl Momentum {
    pub fn new(learning_rate: f64, momentum: f64) -> Self {
        Self {
            learning_rate,
            momentum,
            velocity: None,
        }
    }
}

impl StepRule for Momentum {
    fn name(&self) -> &'static str {
        "momentum"
    }

    fn step(&mut self, params: &mut DVec, grad: &DVec) {
        let v = self
            .velocity
            .get_or_insert_with(|| DVec::zeros(grad.len()));
        *v *= self.momentum;
        *v += grad;
        params.axpy(-self.learning_rate, v, 1.0);
    }

    fn reset(&mut self) {
        self.velocity = None;
    }
}

/// Adam optimizer (adaptive moment estimation).
#[derive(Debug, Clone)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    m: Option<DVec>,
    v: Option<DVec>,
    t: i32,
}

impl Adam {
    pub fn new(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            m: None,
            v: None,
            t: 0,
        }
    }
}

impl StepRule for Adam {
    fn name(&self) -> &'static str {
        "adam"
    }

    fn step(&mut self, params: &mut DVec, grad: &DVec) {
        let n = grad.len();
        let m = self.m.get_or_insert_with(|| DVec::zeros(n));
        let v = self.v.get_or_insert_with(|| DVec::zeros(n));
        self.t = self.t.saturating_add(1);

        *m = &*m * self.beta1 + grad * (1.0 - self.beta1);
        *v = &*v * self.beta2 + grad.component_mul(grad) * (1.0 - self.beta2);

        let m_scale = 1.0 / (1.0 - self.beta1.powi(self.t));
        let v_scale = 1.0 / (1.0 - self.beta2.powi(self.t));
        for i in 0..n {
            let m_hat = m[i] * m_scale;
            let v_hat = v[i] * v_scale;
            params[i] -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }
    }

    fn reset(&mut self) {
        self.m = None;
        self.v = None;
        self.t = 0;
    }
}

/// Scale `grad` down to `max_norm` if its Euclidean norm is larger.
/// Returns the norm before clipping.
pub fn clip_by_global_norm(grad: &mut DVec, max_norm: f64) -> f64 {
    let norm = grad.norm();
    if norm > max_norm {
        *grad *= max_norm / norm;
    }
    norm
}

/// A step rule plus gradient clipping, applied to flat parameter vectors.
pub struct Optimizer {
    rule: Box<dyn StepRule>,
    grad_clip: Option<f64>,
}

impl Optimizer {
    pub fn new(config: &OptimizerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            rule: config.build_rule(),
            grad_clip: config.grad_clip,
        })
    }

    pub fn rule_name(&self) -> &'static str {
        self.rule.name()
    }

    /// Apply one update. Returns the gradient norm before clipping.
    pub fn apply(&mut self, params: &mut [f64], grad: &[f64]) -> Result<f64> {
        if params.len() != grad.len() {
            return Err(TrainError::Configuration(format!(
                "gradient has {} entries for {} parameters",
                grad.len(),
                params.len()
            )));
        }
        let mut g = DVec::from_column_slice(grad);
        let norm = match self.grad_clip {
            Some(max) => clip_by_global_norm(&mut g, max),
            None => g.norm(),
        };
        let mut p = DVec::from_column_slice(params);
        self.rule.step(&mut p, &g);
        params.copy_from_slice(p.as_slice());
        Ok(norm)
    }

    pub fn reset(&mut self) {
        self.rule.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Minimize `Σ (xᵢ - i)²` and return the final parameters.
    fn minimize(config: OptimizerConfig, iterations: usize) -> Vec<f64> {
        let mut opt = Optimizer::new(&config).unwrap();
        let mut x = vec![5.0, -3.0, 0.5];
        for _ in 0..iterations {
            let grad: Vec<f64> = x
                .iter()
                .enumerate()
                .map(|(i, xi)| 2.0 * (xi - i as f64))
                .collect();
            opt.apply(&mut x, &grad).unwrap();
        }
        x
    }

    #[test]
    fn test_sgd_step() {
        let mut p = DVec::from_vec(vec![1.0, 2.0]);
        Sgd::new(0.1).step(&mut p, &DVec::from_vec(vec![1.0, -1.0]));
        assert_relative_eq!(p[0], 0.9);
        assert_relative_eq!(p[1], 2.1);
    }

    #[test]
    fn test_all_rules_converge_on_quadratic() {
        for (kind, lr) in [
            (StepRuleKind::Sgd, 0.1),
            (StepRuleKind::Momentum, 0.05),
            (StepRuleKind::Adam, 0.1),
        ] {
            let config = OptimizerConfig {
                kind,
                learning_rate: lr,
                grad_clip: None,
                ..Default::default()
            };
            let x = minimize(config, 2000);
            for (i, xi) in x.iter().enumerate() {
                assert_relative_eq!(*xi, i as f64, epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn test_config_selects_rule() {
        for (kind, name) in [
            (StepRuleKind::Sgd, "sgd"),
            (StepRuleKind::Momentum, "momentum"),
            (StepRuleKind::Adam, "adam"),
        ] {
            let config = OptimizerConfig {
                kind,
                ..Default::default()
            };
            assert_eq!(Optimizer::new(&config).unwrap().rule_name(), name);
        }
    }

    #[test]
    fn test_adam_first_step_is_learning_rate() {
        let mut adam = Adam::new(0.01, 0.9, 0.999, 1e-8);
        let mut p = DVec::from_vec(vec![0.0, 0.0]);
        adam.step(&mut p, &DVec::from_vec(vec![3.0, -0.5]));
        assert_relative_eq!(p[0], -0.01, epsilon = 1e-8);
        assert_relative_eq!(p[1], 0.01, epsilon = 1e-8);
    }

    #[test]
    fn test_clip_by_global_norm() {
        let mut g = DVec::from_vec(vec![3.0, 4.0]);
        let norm = clip_by_global_norm(&mut g, 1.0);
        assert_relative_eq!(norm, 5.0);
        assert_relative_eq!(g.norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(g[0], 0.6, epsilon = 1e-12);

        let mut small = DVec::from_vec(vec![0.1, 0.0]);
        clip_by_global_norm(&mut small, 1.0);
        assert_eq!(small[0], 0.1);
    }

    #[test]
    fn test_invalid_config() {
        let bad = OptimizerConfig {
            learning_rate: 0.0,
            ..Default::default()
        };
        assert!(Optimizer::new(&bad).is_err());
        let bad_beta = OptimizerConfig {
            beta2: 1.0,
            ..Default::default()
        };
        assert!(bad_beta.validate().is_err());
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut opt = Optimizer::new(&OptimizerConfig::default()).unwrap();
        let mut p = vec![0.0; 3];
        assert!(opt.apply(&mut p, &[1.0, 2.0]).is_err());
    }
}
