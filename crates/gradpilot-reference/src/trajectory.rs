//! Reference trajectories and windowed access.

use serde::{Deserialize, Serialize};

use crate::error::{ReferenceError, Result};

/// Supplies reference windows by trajectory identifier.
pub trait ReferenceProvider {
    /// States `t, t+1, …, t+w-1` of trajectory `id`; past the end the last
    /// state is repeated.
    fn get_window(&self, id: &str, t: usize, w: usize) -> Result<Vec<Vec<f64>>>;
}

/// An ordered sequence of reference states sampled every `dt` seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub id: String,
    pub dt: f64,
    pub states: Vec<Vec<f64>>,
}

impl Trajectory {
    pub fn new(id: impl Into<String>, dt: f64, states: Vec<Vec<f64>>) -> Result<Self> {
        let traj = Self {
            id: id.into(),
            dt,
            states,
        };
        traj.validate()?;
        Ok(traj)
    }

    fn invalid(&self, reason: impl Into<String>) -> ReferenceError {
        ReferenceError::InvalidTrajectory {
            id: self.id.clone(),
            reason: reason.into(),
        }
    }

    /// Non-empty, positive `dt`, consistent dimension, finite values.
    pub fn validate(&self) -> Result<()> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(self.invalid(format!("dt must be positive, got {}", self.dt)));
        }
        let Some(first) = self.states.first() else {
            return Err(self.invalid("no states"));
        };
        let dim = first.len();
        for (t, s) in self.states.iter().enumerate() {
            if s.len() != dim {
                return Err(self.invalid(format!(
                    "state {t} has dimension {}, expected {dim}",
                    s.len()
                )));
            }
            if s.iter().any(|x| !x.is_finite()) {
                return Err(self.invalid(format!("state {t} is not finite")));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn state_dim(&self) -> usize {
        self.states.first().map_or(0, Vec::len)
    }

    pub fn duration(&self) -> f64 {
        self.len().saturating_sub(1) as f64 * self.dt
    }

    /// State at step `t`, held at the last state past the end.
    pub fn state(&self, t: usize) -> &[f64] {
        &self.states[t.min(self.len() - 1)]
    }

    /// `w` consecutive states from `t`, holding the last one.
    pub fn window(&self, t: usize, w: usize) -> Vec<Vec<f64>> {
        (t..t + w).map(|k| self.state(k).to_vec()).collect()
    }

    /// A `len + 1`-state piece starting at `start`, with its deviation from
    /// the first state scaled by `aggressiveness`.
    ///
    /// Scaling keeps the timing and shrinks positions and velocities toward
    /// the anchor. Components `quat..quat + 4` are renormalized afterwards.
    pub fn segment(
        &self,
        start: usize,
        len: usize,
        aggressiveness: f64,
        quat: Option<usize>,
    ) -> Trajectory {
        self.anchored_segment(start, start, len, aggressiveness, quat)
    }

    /// Like [`segment`](Self::segment), but scaled toward the state at
    /// `anchor` rather than the first state of the piece.
    ///
    /// The result equals the tail of `segment(anchor, ..)` from `start`, so a
    /// piece resumed mid-way lines up with the one it was cut from.
    /// `anchor` past `start` is clamped to `start`.
    pub fn anchored_segment(
        &self,
        anchor: usize,
        start: usize,
        len: usize,
        aggressiveness: f64,
        quat: Option<usize>,
    ) -> Trajectory {
        let anchor = anchor.min(start);
        let anchor_state = self.state(anchor).to_vec();
        let states = (start..=start + len)
            .map(|t| {
                let mut s: Vec<f64> = self
                    .state(t)
                    .iter()
                    .zip(&anchor_state)
                    .map(|(r, a)| a + aggressiveness * (r - a))
                    .collect();
                if let Some(q) = quat {
                    let norm = s[q..q + 4].iter().map(|c| c * c).sum::<f64>().sqrt();
                    if norm > 1e-12 {
                        s[q..q + 4].iter_mut().for_each(|c| *c /= norm);
                    }
                }
                s
            })
            .collect();
        let id = if anchor == start {
            format!("{}@{start}", self.id)
        } else {
            format!("{}@{anchor}+{}", self.id, start - anchor)
        };
        Trajectory {
            id,
            dt: self.dt,
            states,
        }
    }
}

impl ReferenceProvider for Trajectory {
    fn get_window(&self, id: &str, t: usize, w: usize) -> Result<Vec<Vec<f64>>> {
        if id != self.id {
            return Err(ReferenceError::UnknownTrajectory(id.to_string()));
        }
        Ok(self.window(t, w))
    }
}
