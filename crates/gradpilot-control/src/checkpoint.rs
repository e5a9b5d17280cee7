//! Checkpoint persistence.
//!
//! A checkpoint is one JSON document holding everything needed to rebuild a
//! policy exactly: vehicle name and dimensions, controller configuration,
//! input normalizer and the named parameter tensors.

use std::fs;
use std::path::Path;

use gradpilot_model::Dynamics;
use serde::{Deserialize, Serialize};

use crate::controller::{ControllerConfig, Policy};
use crate::error::{ControlError, Result};
use crate::normalizer::Normalizer;
use crate::params::ParamStore;

/// Training provenance stored next to the parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointMeta {
    pub iterations: usize,
    pub level: usize,
    pub train_loss: Option<f64>,
    pub eval_rmse: Option<f64>,
    pub eval_failures: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub vehicle: String,
    pub state_dim: usize,
    pub control_dim: usize,
    pub controller: ControllerConfig,
    pub normalizer: Normalizer,
    pub params: ParamStore,
    #[serde(default)]
    pub meta: CheckpointMeta,
}

impl Checkpoint {
    pub fn new(policy: &Policy, params: &ParamStore, meta: CheckpointMeta) -> Self {
        Self {
            vehicle: policy.vehicle().to_string(),
            state_dim: policy.state_dim(),
            control_dim: policy.control_dim(),
            controller: policy.config().clone(),
            normalizer: policy.normalizer().clone(),
            params: params.clone(),
            meta,
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Rebuild the policy for `dynamics`, failing loudly on any mismatch.
    pub fn restore<D: Dynamics>(&self, dynamics: &D) -> Result<(Policy, ParamStore)> {
        if self.vehicle != dynamics.name() {
            return Err(ControlError::ArchitectureMismatch(format!(
                "checkpoint is for '{}', not '{}'",
                self.vehicle,
                dynamics.name()
            )));
        }
        if self.state_dim != dynamics.state_dim() || self.control_dim != dynamics.control_dim() {
            return Err(ControlError::ArchitectureMismatch(format!(
                "checkpoint dimensions {}x{} differ from vehicle {}x{}",
                self.state_dim,
                self.control_dim,
                dynamics.state_dim(),
                dynamics.control_dim()
            )));
        }
        let mut policy = Policy::new(self.controller.clone(), dynamics)?;
        policy.set_normalizer(self.normalizer.clone())?;
        policy.check_params(&self.params)?;
        Ok((policy, self.params.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gradpilot_vehicles::{CartPole, Quadrotor};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn trained() -> (Policy, ParamStore) {
        let cp = CartPole::default();
        let mut policy = Policy::new(ControllerConfig::default(), &cp).unwrap();
        let params = policy.initialize(&mut StdRng::seed_from_u64(11)).unwrap();
        let samples: Vec<Vec<f64>> = (0..10)
            .map(|i| {
                let s = [0.1 * i as f64, 0.0, 0.02 * i as f64, -0.1];
                policy.features(&s, &[vec![0.0; 4]])
            })
            .collect();
        policy.set_normalizer(Normalizer::fit(&samples, 0.1).unwrap()).unwrap();
        (policy, params)
    }

    #[test]
    fn test_roundtrip_gives_identical_controls() {
        let (policy, params) = trained();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ckpt.json");
        Checkpoint::new(&policy, &params, CheckpointMeta::default())
            .save(&path)
            .unwrap();

        let loaded = Checkpoint::load(&path).unwrap();
        let (restored, restored_params) = loaded.restore(&CartPole::default()).unwrap();
        assert_eq!(restored_params, params);

        let window = vec![vec![0.2, 0.0, 0.0, 0.0], vec![0.3, 0.1, 0.0, 0.0]];
        for s in [[0.0, 0.0, 0.05, 0.0], [1.3, -0.4, -0.2, 0.7]] {
            let a = policy.act(&params, &s, &window).unwrap();
            let b = restored.act(&restored_params, &s, &window).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_restore_rejects_other_vehicle() {
        let (policy, params) = trained();
        let ckpt = Checkpoint::new(&policy, &params, CheckpointMeta::default());
        assert!(matches!(
            ckpt.restore(&Quadrotor::default()),
            Err(ControlError::ArchitectureMismatch(_))
        ));
    }

    #[test]
    fn test_restore_rejects_tampered_params() {
        let (policy, params) = trained();
        let mut ckpt = Checkpoint::new(&policy, &params, CheckpointMeta::default());
        ckpt.params.get_mut("layer00.bias").unwrap().data.pop();
        assert!(ckpt.restore(&CartPole::default()).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Checkpoint::load(dir.path().join("none.json")),
            Err(ControlError::Io(_))
        ));
    }
}
