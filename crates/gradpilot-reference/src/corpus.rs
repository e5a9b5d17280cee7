//! Named, persisted collections of trajectories with a train/test split.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ReferenceError, Result};
use crate::trajectory::{ReferenceProvider, Trajectory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    Train,
    Test,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryCorpus {
    pub name: String,
    /// Vehicle the states are laid out for.
    pub vehicle: String,
    pub train: Vec<Trajectory>,
    pub test: Vec<Trajectory>,
}

impl TrajectoryCorpus {
    pub fn split(&self, split: Split) -> &[Trajectory] {
        match split {
            Split::Train => &self.train,
            Split::Test => &self.test,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Trajectory> {
        self.train.iter().chain(&self.test).find(|t| t.id == id)
    }

    /// Validate every trajectory against the vehicle name and state dimension.
    pub fn validate(&self, vehicle: &str, state_dim: usize) -> Result<()> {
        if self.vehicle != vehicle {
            return Err(ReferenceError::VehicleMismatch {
                expected: vehicle.to_string(),
                found: self.vehicle.clone(),
            });
        }
        for traj in self.train.iter().chain(&self.test) {
            traj.validate()?;
            if traj.state_dim() != state_dim {
                return Err(ReferenceError::InvalidTrajectory {
                    id: traj.id.clone(),
                    reason: format!("state dimension {} != {state_dim}", traj.state_dim()),
                });
            }
        }
        let mut ids: Vec<&str> = self
            .train
            .iter()
            .chain(&self.test)
            .map(|t| t.id.as_str())
            .collect();
        ids.sort_unstable();
        if let Some(pair) = ids.windows(2).find(|p| p[0] == p[1]) {
            return Err(ReferenceError::InvalidTrajectory {
                id: pair[0].to_string(),
                reason: "duplicate identifier".into(),
            });
        }
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl ReferenceProvider for TrajectoryCorpus {
    fn get_window(&self, id: &str, t: usize, w: usize) -> Result<Vec<Vec<f64>>> {
        self.get(id)
            .map(|traj| traj.window(t, w))
            .ok_or_else(|| ReferenceError::UnknownTrajectory(id.to_string()))
    }
}
