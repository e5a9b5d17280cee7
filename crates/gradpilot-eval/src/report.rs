//! Evaluation metrics.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A state or control became NaN or infinite.
    NonFinite,
    /// Position error exceeded the divergence threshold.
    ThresholdExceeded,
}

/// Outcome of one closed-loop episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeResult {
    pub trajectory_id: String,
    pub horizon: usize,
    /// Steps completed before a failure (equal to `horizon` on success).
    pub steps_survived: usize,
    pub failure: Option<FailureKind>,
    /// RMS position error over the simulated steps.
    pub position_rmse: f64,
    /// Mean per-step weighted tracking error over the simulated steps.
    pub mean_tracking_error: f64,
}

impl EpisodeResult {
    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }
}

/// Aggregate metrics over a set of episodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub vehicle: String,
    pub n_episodes: usize,
    pub n_failed: usize,
    /// Failures caused by non-finite values.
    pub n_diverged: usize,
    pub mean_position_rmse: f64,
    pub std_position_rmse: f64,
    pub mean_steps_survived: f64,
    pub std_steps_survived: f64,
    pub mean_tracking_error: f64,
    pub episodes: Vec<EpisodeResult>,
}

fn mean_std(xs: impl Iterator<Item = f64> + Clone) -> (f64, f64) {
    let n = xs.clone().count();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = xs.clone().sum::<f64>() / n as f64;
    let var = xs.map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
    (mean, var.sqrt())
}

impl MetricsReport {
    pub fn from_episodes(vehicle: impl Into<String>, episodes: Vec<EpisodeResult>) -> Self {
        let n_failed = episodes.iter().filter(|e| e.failed()).count();
        let n_diverged = episodes
            .iter()
            .filter(|e| e.failure == Some(FailureKind::NonFinite))
            .count();
        // Non-finite episodes carry no meaningful error statistics.
        let finite = episodes
            .iter()
            .filter(|e| e.failure != Some(FailureKind::NonFinite));
        let (mean_position_rmse, std_position_rmse) =
            mean_std(finite.clone().map(|e| e.position_rmse));
        let (mean_tracking_error, _) = mean_std(finite.map(|e| e.mean_tracking_error));
        let (mean_steps_survived, std_steps_survived) =
            mean_std(episodes.iter().map(|e| e.steps_survived as f64));
        Self {
            vehicle: vehicle.into(),
            n_episodes: episodes.len(),
            n_failed,
            n_diverged,
            mean_position_rmse,
            std_position_rmse,
            mean_steps_survived,
            std_steps_survived,
            mean_tracking_error,
            episodes,
        }
    }

    /// Ordering used for best-checkpoint selection: fewer failed episodes
    /// first, then lower mean position RMSE.
    pub fn is_better_than(&self, other: &MetricsReport) -> bool {
        (self.n_failed, self.mean_position_rmse) < (other.n_failed, other.mean_position_rmse)
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
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn episode(id: &str, steps: usize, failure: Option<FailureKind>, rmse: f64) -> EpisodeResult {
        EpisodeResult {
            trajectory_id: id.into(),
            horizon: 10,
            steps_survived: steps,
            failure,
            position_rmse: rmse,
            mean_tracking_error: rmse * rmse,
        }
    }

    #[test]
    fn test_aggregates() {
        let report = MetricsReport::from_episodes(
            "quadrotor",
            vec![
                episode("a", 10, None, 0.1),
                episode("b", 10, None, 0.3),
                episode("c", 4, Some(FailureKind::ThresholdExceeded), 0.8),
                episode("d", 2, Some(FailureKind::NonFinite), 50.0),
            ],
        );
        assert_eq!(report.n_episodes, 4);
        assert_eq!(report.n_failed, 2);
        assert_eq!(report.n_diverged, 1);
        assert_relative_eq!(report.mean_position_rmse, 0.4, epsilon = 1e-12);
        assert_relative_eq!(report.mean_steps_survived, 6.5);
        assert!(report.std_steps_survived > 0.0);
    }

    #[test]
    fn test_better_than_prefers_fewer_failures() {
        let a = MetricsReport::from_episodes("v", vec![episode("a", 10, None, 0.9)]);
        let b = MetricsReport::from_episodes(
            "v",
            vec![episode("a", 3, Some(FailureKind::ThresholdExceeded), 0.1)],
        );
        assert!(a.is_better_than(&b));
        assert!(!b.is_better_than(&a));
        let c = MetricsReport::from_episodes("v", vec![episode("a", 10, None, 0.5)]);
        assert!(c.is_better_than(&a));
    }

    #[test]
    fn test_empty_report() {
        let r = MetricsReport::from_episodes("v", Vec::new());
        assert_eq!(r.mean_position_rmse, 0.0);
        assert_eq!(r.n_failed, 0);
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let r = MetricsReport::from_episodes("v", vec![episode("a", 10, None, 0.2)]);
        r.save(&path).unwrap();
        assert_eq!(MetricsReport::load(&path).unwrap(), r);
    }
}
