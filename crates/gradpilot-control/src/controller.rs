//! The controller contract and the policy wrapper around it.

use std::ops::Range;

use gradpilot_diff::Scalar;
use gradpilot_model::{Bounds, Dynamics};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, Result};
use crate::linear::LinearController;
use crate::mlp::{Activation, MlpController};
use crate::normalizer::Normalizer;
use crate::params::ParamStore;
use crate::saturation::SaturationPolicy;

/// A trainable architecture: raw outputs from a flat parameter vector.
pub trait Controller: Send + Sync {
    fn input_dim(&self) -> usize;
    fn output_dim(&self) -> usize;

    /// Zero-filled store with this architecture's tensor names and shapes.
    fn template(&self) -> &ParamStore;

    /// Freshly initialized parameters.
    fn initialize<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<ParamStore>;

    /// Flat-vector location of the output layer's bias.
    fn output_bias(&self) -> Range<usize>;

    /// Raw (unsaturated) outputs. `params` is in [`ParamStore::to_flat`] order.
    fn forward<S: Scalar>(&self, params: &[S], input: &[S]) -> Vec<S>;
}

/// Architecture selection, as stored in configs and checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Architecture {
    Linear,
    Mlp {
        hidden: Vec<usize>,
        #[serde(default)]
        activation: Activation,
    },
}

impl Default for Architecture {
    fn default() -> Self {
        Self::Mlp {
            hidden: vec![32, 32],
            activation: Activation::Tanh,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub architecture: Architecture,
    pub saturation: SaturationPolicy,
    /// Number of reference states the controller reads. Shorter windows are
    /// padded by repeating their last state.
    pub max_window: usize,
    /// Fit an input normalizer before training.
    pub normalize_inputs: bool,
    /// Floor on fitted standard deviations.
    pub min_std: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            architecture: Architecture::default(),
            saturation: SaturationPolicy::Tanh,
            max_window: 5,
            normalize_inputs: true,
            min_std: 0.1,
        }
    }
}

/// Enum dispatch over the available architectures.
#[derive(Debug, Clone)]
pub enum Network {
    Linear(LinearController),
    Mlp(MlpController),
}

impl Network {
    pub fn build(architecture: &Architecture, input_dim: usize, output_dim: usize) -> Result<Self> {
        Ok(match architecture {
            Architecture::Linear => Self::Linear(LinearController::new(input_dim, output_dim)?),
            Architecture::Mlp { hidden, activation } => {
                Self::Mlp(MlpController::new(input_dim, hidden, output_dim, *activation)?)
            }
        })
    }
}

impl Controller for Network {
    fn input_dim(&self) -> usize {
        match self {
            Self::Linear(c) => c.input_dim(),
            Self::Mlp(c) => c.input_dim(),
        }
    }

    fn output_dim(&self) -> usize {
        match self {
            Self::Linear(c) => c.output_dim(),
            Self::Mlp(c) => c.output_dim(),
        }
    }

    fn template(&self) -> &ParamStore {
        match self {
            Self::Linear(c) => c.template(),
            Self::Mlp(c) => c.template(),
        }
    }

    fn initialize<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<ParamStore> {
        match self {
            Self::Linear(c) => c.initialize(rng),
            Self::Mlp(c) => c.initialize(rng),
        }
    }

    fn output_bias(&self) -> Range<usize> {
        match self {
            Self::Linear(c) => c.output_bias(),
            Self::Mlp(c) => c.output_bias(),
        }
    }

    fn forward<S: Scalar>(&self, params: &[S], input: &[S]) -> Vec<S> {
        match self {
            Self::Linear(c) => c.forward(params, input),
            Self::Mlp(c) => c.forward(params, input),
        }
    }
}

/// `act(state, reference_window) -> control` for one vehicle.
///
/// Input features are the state followed by `state - reference` for each of
/// `max_window` window slots, standardized by the normalizer. Outputs go
/// through the saturation policy for each control channel.
#[derive(Debug, Clone)]
pub struct Policy {
    config: ControllerConfig,
    network: Network,
    normalizer: Normalizer,
    bounds: Vec<Bounds>,
    nominal: Vec<f64>,
    state_dim: usize,
    vehicle: String,
}

impl Policy {
    pub fn new<D: Dynamics>(config: ControllerConfig, dynamics: &D) -> Result<Self> {
        if config.max_window == 0 {
            return Err(ControlError::InvalidConfig("max_window must be at least 1".into()));
        }
        if !(config.min_std > 0.0) {
            return Err(ControlError::InvalidConfig(format!(
                "min_std must be positive, got {}",
                config.min_std
            )));
        }
        let state_dim = dynamics.state_dim();
        let input_dim = state_dim * (1 + config.max_window);
        let network = Network::build(&config.architecture, input_dim, dynamics.control_dim())?;
        Ok(Self {
            normalizer: Normalizer::identity(input_dim),
            network,
            bounds: dynamics.control_bounds().to_vec(),
            nominal: dynamics.nominal_control(),
            state_dim,
            vehicle: dynamics.name().to_string(),
            config,
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn set_normalizer(&mut self, normalizer: Normalizer) -> Result<()> {
        if normalizer.dim() != self.input_dim() || normalizer.std.len() != normalizer.dim() {
            return Err(ControlError::DimensionMismatch {
                what: "normalizer",
                expected: self.input_dim(),
                got: normalizer.dim(),
            });
        }
        self.normalizer = normalizer;
        Ok(())
    }

    pub fn bounds(&self) -> &[Bounds] {
        &self.bounds
    }

    pub fn vehicle(&self) -> &str {
        &self.vehicle
    }

    pub fn state_dim(&self) -> usize {
        self.state_dim
    }

    pub fn control_dim(&self) -> usize {
        self.bounds.len()
    }

    pub fn input_dim(&self) -> usize {
        self.network.input_dim()
    }

    pub fn max_window(&self) -> usize {
        self.config.max_window
    }

    /// Initialize parameters so that an untrained policy outputs roughly the
    /// vehicle's nominal control.
    pub fn initialize<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<ParamStore> {
        let mut store = self.network.initialize(rng)?;
        let mut flat = store.to_flat();
        let bias = self.network.output_bias();
        for ((slot, u), b) in flat[bias].iter_mut().zip(&self.nominal).zip(&self.bounds) {
            *slot = self.config.saturation.inverse(*u, b);
        }
        store.set_flat(&flat)?;
        Ok(store)
    }

    /// Unnormalized features: the state, then `state - r_k` per window slot.
    pub fn features<S: Scalar>(&self, state: &[S], window: &[Vec<f64>]) -> Vec<S> {
        debug_assert!(!window.is_empty());
        let mut x = Vec::with_capacity(self.input_dim());
        x.extend_from_slice(state);
        let last = window.len() - 1;
        for k in 0..self.config.max_window {
            let reference = &window[k.min(last)];
            x.extend(state.iter().zip(reference).map(|(&s, &r)| s - r));
        }
        x
    }

    /// Differentiable control for `state` under the flat parameters `params`.
    pub fn act_with<S: Scalar>(&self, params: &[S], state: &[S], window: &[Vec<f64>]) -> Vec<S> {
        let features = self.features(state, window);
        let input = if self.normalizer.is_identity() {
            features
        } else {
            self.normalizer.apply(&features)
        };
        self.network
            .forward(params, &input)
            .into_iter()
            .zip(&self.bounds)
            .map(|(raw, b)| self.config.saturation.apply(raw, b))
            .collect()
    }

    /// Checked plain-value control.
    pub fn act(&self, params: &ParamStore, state: &[f64], window: &[Vec<f64>]) -> Result<Vec<f64>> {
        self.check_params(params)?;
        self.check_inputs(state, window)?;
        Ok(self.act_with(&params.to_flat(), state, window))
    }

    pub fn check_inputs(&self, state: &[f64], window: &[Vec<f64>]) -> Result<()> {
        if state.len() != self.state_dim {
            return Err(ControlError::DimensionMismatch {
                what: "state",
                expected: self.state_dim,
                got: state.len(),
            });
        }
        if window.is_empty() {
            return Err(ControlError::InvalidConfig("empty reference window".into()));
        }
        if let Some(r) = window.iter().find(|r| r.len() != self.state_dim) {
            return Err(ControlError::DimensionMismatch {
                what: "reference state",
                expected: self.state_dim,
                got: r.len(),
            });
        }
        Ok(())
    }

    /// Parameters must have exactly this architecture's names and shapes.
    pub fn check_params(&self, params: &ParamStore) -> Result<()> {
        params.validate()?;
        if !params.same_layout(self.network.template()) {
            return Err(ControlError::ArchitectureMismatch(format!(
                "parameters [{}] do not match the {:?} architecture",
                params.names().collect::<Vec<_>>().join(", "),
                self.config.architecture
            )));
        }
        Ok(())
    }
}
