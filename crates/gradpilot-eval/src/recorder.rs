//! Per-step trace recording and JSON export.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Records `(time, state, control, reference)` for one episode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RolloutRecorder {
    pub trajectory_id: String,
    pub time: Vec<f64>,
    pub states: Vec<Vec<f64>>,
    pub controls: Vec<Vec<f64>>,
    pub references: Vec<Vec<f64>>,
}

impl RolloutRecorder {
    pub fn new(trajectory_id: impl Into<String>) -> Self {
        Self {
            trajectory_id: trajectory_id.into(),
            ..Default::default()
        }
    }

    /// Record one step: the state the control was computed from, the control,
    /// and the reference the next state should reach.
    pub fn record(&mut self, time: f64, state: &[f64], control: &[f64], reference: &[f64]) {
        self.time.push(time);
        self.states.push(state.to_vec());
        self.controls.push(control.to_vec());
        self.references.push(reference.to_vec());
    }

    /// Number of timesteps recorded.
    pub fn len(&self) -> usize {
        self.time.len()
    }

    /// Check if recorder is empty.
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Export to `<dir>/<trajectory_id>.json`.
    pub fn save_in(&self, dir: impl AsRef<Path>) -> std::io::Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let json = self.to_json().map_err(std::io::Error::other)?;
        fs::write(dir.join(format!("{}.json", self.trajectory_id)), json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_export() {
        let mut rec = RolloutRecorder::new("traj-1");
        rec.record(0.0, &[1.0, 2.0], &[0.5], &[1.0, 2.1]);
        rec.record(0.02, &[1.1, 2.0], &[0.4], &[1.0, 2.2]);
        assert_eq!(rec.len(), 2);
        assert!(!rec.is_empty());

        let dir = tempfile::tempdir().unwrap();
        rec.save_in(dir.path()).unwrap();
        let text = std::fs::read_to_string(dir.path().join("traj-1.json")).unwrap();
        let back: RolloutRecorder = serde_json::from_str(&text).unwrap();
        assert_eq!(back, rec);
    }
}
