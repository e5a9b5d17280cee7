//! Affine controller and the dense layer shared with the MLP.

use std::ops::Range;

use gradpilot_diff::Scalar;
use rand::Rng;

use crate::controller::Controller;
use crate::error::{ControlError, Result};
use crate::params::{ParamStore, Tensor};

/// A dense layer addressed inside a flat parameter vector.
///
/// The weight is `output × input`, row-major.
#[derive(Debug, Clone)]
pub(crate) struct Dense {
    pub input: usize,
    pub output: usize,
    pub weight: Range<usize>,
    pub bias: Range<usize>,
}

impl Dense {
    pub fn shapes(input: usize, output: usize) -> [Vec<usize>; 2] {
        [vec![output, input], vec![output]]
    }

    /// Locate the layer's tensors in `template`.
    pub fn locate(template: &ParamStore, weight: &str, bias: &str) -> Result<Self> {
        let w = template
            .get(weight)
            .ok_or_else(|| ControlError::UnknownTensor(weight.to_string()))?;
        let (output, input) = (w.shape[0], w.shape[1]);
        let find = |name: &str| {
            template
                .range(name)
                .ok_or_else(|| ControlError::UnknownTensor(name.to_string()))
        };
        Ok(Self {
            input,
            output,
            weight: find(weight)?,
            bias: find(bias)?,
        })
    }

    pub fn apply<S: Scalar>(&self, params: &[S], x: &[S]) -> Vec<S> {
        debug_assert_eq!(x.len(), self.input);
        let w = &params[self.weight.clone()];
        let b = &params[self.bias.clone()];
        w.chunks_exact(self.input)
            .zip(b)
            .map(|(row, &bias)| S::affine(row, x, bias))
            .collect()
    }

    /// Uniform Xavier initialization of the weight scaled by `gain`; zero bias.
    pub fn initialize<R: Rng + ?Sized>(&self, rng: &mut R, flat: &mut [f64], gain: f64) {
        let limit = gain * (6.0 / (self.input + self.output) as f64).sqrt();
        for w in &mut flat[self.weight.clone()] {
            *w = rng.gen_range(-limit..limit);
        }
        flat[self.bias.clone()].fill(0.0);
    }
}

/// Build a zero-filled store from `(name, shape)` pairs.
pub(crate) fn template_of<'a, I>(entries: I) -> Result<ParamStore>
where
    I: IntoIterator<Item = (&'a str, Vec<usize>)>,
{
    let mut store = ParamStore::new();
    for (name, shape) in entries {
        store.insert(name, Tensor::zeros(&shape))?;
    }
    Ok(store)
}

/// `u = W·x + b`.
#[derive(Debug, Clone)]
pub struct LinearController {
    layer: Dense,
    template: ParamStore,
}

impl LinearController {
    pub const WEIGHT: &'static str = "linear.weight";
    pub const BIAS: &'static str = "linear.bias";

    pub fn new(input_dim: usize, output_dim: usize) -> Result<Self> {
        if input_dim == 0 || output_dim == 0 {
            return Err(ControlError::InvalidConfig(
                "linear controller needs non-zero input and output".into(),
            ));
        }
        let [w, b] = Dense::shapes(input_dim, output_dim);
        let template = template_of([(Self::WEIGHT, w), (Self::BIAS, b)])?;
        Ok(Self {
            layer: Dense::locate(&template, Self::WEIGHT, Self::BIAS)?,
            template,
        })
    }
}

impl Controller for LinearController {
    fn input_dim(&self) -> usize {
        self.layer.input
    }

    fn output_dim(&self) -> usize {
        self.layer.output
    }

    fn template(&self) -> &ParamStore {
        &self.template
    }

    fn initialize<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<ParamStore> {
        let mut flat = self.template.to_flat();
        self.layer.initialize(rng, &mut flat, 0.1);
        let mut store = self.template.clone();
        store.set_flat(&flat)?;
        Ok(store)
    }

    fn output_bias(&self) -> Range<usize> {
        self.layer.bias.clone()
    }

    fn forward<S: Scalar>(&self, params: &[S], input: &[S]) -> Vec<S> {
        self.layer.apply(params, input)
    }
}
