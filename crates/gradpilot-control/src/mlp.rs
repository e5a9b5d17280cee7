//! Multi-layer perceptron controller.

use std::ops::Range;

use gradpilot_diff::{Scalar, softplus};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::controller::Controller;
use crate::error::{ControlError, Result};
use crate::linear::{Dense, template_of};
use crate::params::ParamStore;

/// Hidden-layer nonlinearity. Both are smooth everywhere.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Tanh,
    Softplus,
}

impl Activation {
    pub fn apply<S: Scalar>(&self, x: S) -> S {
        match self {
            Self::Tanh => x.tanh(),
            Self::Softplus => softplus(x, 1.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MlpController {
    layers: Vec<Dense>,
    hidden: Vec<usize>,
    activation: Activation,
    template: ParamStore,
}

fn weight_name(i: usize) -> String {
    format!("layer{i:02}.weight")
}

fn bias_name(i: usize) -> String {
    format!("layer{i:02}.bias")
}

impl MlpController {
    pub fn new(
        input_dim: usize,
        hidden: &[usize],
        output_dim: usize,
        activation: Activation,
    ) -> Result<Self> {
        if input_dim == 0 || output_dim == 0 || hidden.contains(&0) {
            return Err(ControlError::InvalidConfig(format!(
                "mlp layer sizes must be non-zero: {input_dim} -> {hidden:?} -> {output_dim}"
            )));
        }
        let template = Self::template_for(input_dim, hidden, output_dim)?;
        let layers = (0..=hidden.len())
            .map(|i| Dense::locate(&template, &weight_name(i), &bias_name(i)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            layers,
            hidden: hidden.to_vec(),
            activation,
            template,
        })
    }

    fn template_for(input: usize, hidden: &[usize], output: usize) -> Result<ParamStore> {
        let sizes: Vec<usize> = std::iter::once(input)
            .chain(hidden.iter().copied())
            .chain(std::iter::once(output))
            .collect();
        let mut names = Vec::new();
        for (i, pair) in sizes.windows(2).enumerate() {
            let [w, b] = Dense::shapes(pair[0], pair[1]);
            names.push((weight_name(i), w));
            names.push((bias_name(i), b));
        }
        template_of(names.iter().map(|(n, s)| (n.as_str(), s.clone())))
    }

    pub fn hidden(&self) -> &[usize] {
        &self.hidden
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }
}

impl Controller for MlpController {
    fn input_dim(&self) -> usize {
        self.layers[0].input
    }

    fn output_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].output
    }

    fn template(&self) -> &ParamStore {
        &self.template
    }

    fn initialize<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<ParamStore> {
        let mut flat = self.template.to_flat();
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            // Small output layer so an untrained policy stays near its bias.
            let gain = if i == last { 0.1 } else { 1.0 };
            layer.initialize(rng, &mut flat, gain);
        }
        let mut store = self.template.clone();
        store.set_flat(&flat)?;
        Ok(store)
    }

    fn output_bias(&self) -> Range<usize> {
        self.layers[self.layers.len() - 1].bias.clone()
    }

    fn forward<S: Scalar>(&self, params: &[S], input: &[S]) -> Vec<S> {
        let last = self.layers.len() - 1;
        let mut x = input.to_vec();
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.apply(params, &x);
            if i < last {
                x.iter_mut().for_each(|v| *v = self.activation.apply(*v));
            }
        }
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use gradpilot_diff::{central_gradient, tape_gradient};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_template_layout() {
        let mlp = MlpController::new(5, &[8, 6], 2, Activation::Tanh).unwrap();
        let t = mlp.template();
        assert_eq!(t.num_tensors(), 6);
        assert_eq!(t.len(), 5 * 8 + 8 + 8 * 6 + 6 + 6 * 2 + 2);
        assert_eq!(t.get("layer02.weight").unwrap().shape, vec![2, 6]);
        assert_eq!(mlp.output_bias(), t.range("layer02.bias").unwrap());
    }

    #[test]
    fn test_zero_weights_give_bias() {
        let mlp = MlpController::new(3, &[4], 2, Activation::Softplus).unwrap();
        let mut flat = mlp.template().to_flat();
        let out = mlp.output_bias();
        flat[out.start] = 1.5;
        flat[out.start + 1] = -2.0;
        let u = mlp.forward(&flat, &[0.3, -0.1, 0.9]);
        assert_eq!(u, vec![1.5, -2.0]);
    }

    #[test]
    fn test_parameter_gradient_matches_finite_difference() {
        let mlp = MlpController::new(3, &[5], 2, Activation::Tanh).unwrap();
        let params = mlp.initialize(&mut StdRng::seed_from_u64(3)).unwrap().to_flat();
        let input = [0.4, -0.7, 1.1];

        let f = |p: &[f64]| {
            let u = mlp.forward(p, &input);
            u[0] * u[0] + u[1]
        };
        let (_, analytic) = tape_gradient(
            |tape, p| {
                let x: Vec<_> = input.iter().map(|&v| tape.constant(v)).collect();
                let u = mlp.forward(p, &x);
                u[0] * u[0] + u[1]
            },
            &params,
        );
        let numeric = central_gradient(f, &params, 1e-6);
        for (a, n) in analytic.iter().zip(&numeric) {
            assert_relative_eq!(*a, *n, epsilon = 1e-7);
        }
    }

    #[test]
    fn test_rejects_zero_hidden() {
        assert!(MlpController::new(3, &[0], 1, Activation::Tanh).is_err());
    }
}
