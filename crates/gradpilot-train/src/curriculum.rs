//! Curriculum scheduling of difficulty levels.
//!
//! The scheduler holds an ordered list of [`DifficultyLevel`]s and moves
//! between them only in response to reported [`Outcome`]s:
//!
//! - a full trailing window of non-diverged outcomes with mean tracking loss
//!   below `advance_loss` advances one level;
//! - `divergence_patience` consecutive divergences at a level above the
//!   first regress one level;
//! - anything else holds, with a stagnation warning every
//!   `stagnation_iterations` iterations spent at one level.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::difficulty::DifficultyLevel;
use crate::error::RolloutError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurriculumConfig {
    /// Explicit levels, easiest first. When empty, `num_levels` levels are
    /// interpolated from `easy` to `target`.
    pub levels: Vec<DifficultyLevel>,
    pub easy: DifficultyLevel,
    pub target: DifficultyLevel,
    pub num_levels: usize,
    /// Trailing window of outcomes the advance criterion looks at.
    pub window: usize,
    /// Mean tracking loss over the window must be below this to advance.
    pub advance_loss: f64,
    /// Consecutive divergences that trigger a regression.
    pub divergence_patience: usize,
    /// Warn after this many iterations at one level (0 disables).
    pub stagnation_iterations: usize,
}

impl Default for CurriculumConfig {
    fn default() -> Self {
        let easy = DifficultyLevel {
            horizon: 10,
            perturbation: 0.02,
            aggressiveness: 0.3,
            window: 1,
            ..Default::default()
        };
        let target = DifficultyLevel {
            horizon: 100,
            perturbation: 0.1,
            aggressiveness: 1.0,
            window: 5,
            ..Default::default()
        };
        Self::linear(easy, target, 5)
    }
}

impl CurriculumConfig {
    /// `n` levels linearly interpolated from `easy` to `target`.
    pub fn linear(easy: DifficultyLevel, target: DifficultyLevel, n: usize) -> Self {
        Self {
            levels: Vec::new(),
            easy,
            target,
            num_levels: n,
            window: 10,
            advance_loss: 0.05,
            divergence_patience: 3,
            stagnation_iterations: 500,
        }
    }

    /// A single fixed level.
    pub fn fixed(level: DifficultyLevel) -> Self {
        Self {
            levels: vec![level.clone()],
            ..Self::linear(level.clone(), level, 1)
        }
    }

    /// The concrete level list.
    pub fn resolve_levels(&self) -> Vec<DifficultyLevel> {
        if !self.levels.is_empty() {
            return self.levels.clone();
        }
        match self.num_levels {
            0 => Vec::new(),
            1 => vec![self.target.clone()],
            n => (0..n)
                .map(|i| self.easy.lerp(&self.target, i as f64 / (n - 1) as f64))
                .collect(),
        }
    }

    pub fn validate(&self, max_window: usize) -> Result<(), RolloutError> {
        let levels = self.resolve_levels();
        if levels.is_empty() {
            return Err(RolloutError::Configuration("curriculum has no levels".into()));
        }
        for (i, level) in levels.iter().enumerate() {
            level.validate(max_window).map_err(|e| match e {
                RolloutError::Configuration(msg) => {
                    RolloutError::Configuration(format!("level {i}: {msg}"))
                }
                other => other,
            })?;
        }
        if self.window == 0 {
            return Err(RolloutError::Configuration("curriculum window must be at least 1".into()));
        }
        if self.divergence_patience == 0 {
            return Err(RolloutError::Configuration(
                "divergence_patience must be at least 1".into(),
            ));
        }
        if !(self.advance_loss > 0.0) {
            return Err(RolloutError::Configuration(format!(
                "advance_loss must be positive, got {}",
                self.advance_loss
            )));
        }
        Ok(())
    }
}

/// What one training iteration reports to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    /// Mean per-step tracking loss of the batch (ignored when diverged).
    pub loss: f64,
    pub diverged: bool,
}

impl Outcome {
    pub fn stable(loss: f64) -> Self {
        Self {
            loss,
            diverged: !loss.is_finite(),
        }
    }

    pub fn diverged() -> Self {
        Self {
            loss: f64::NAN,
            diverged: true,
        }
    }
}

/// Scheduler response to one outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Hold,
    Advance { from: usize, to: usize },
    Regress { from: usize, to: usize },
    /// Held, and the advance criterion has failed for a long time.
    Stagnated { level: usize, iterations: usize },
}

impl Transition {
    pub fn changed_level(&self) -> bool {
        matches!(self, Transition::Advance { .. } | Transition::Regress { .. })
    }
}

#[derive(Debug, Clone)]
pub struct CurriculumScheduler {
    config: CurriculumConfig,
    levels: Vec<DifficultyLevel>,
    current: usize,
    history: VecDeque<Outcome>,
    consecutive_divergences: usize,
    iterations_at_level: usize,
    criterion_met: bool,
}

impl CurriculumScheduler {
    pub fn new(config: CurriculumConfig, max_window: usize) -> Result<Self, RolloutError> {
        config.validate(max_window)?;
        Ok(Self {
            levels: config.resolve_levels(),
            history: VecDeque::with_capacity(config.window),
            config,
            current: 0,
            consecutive_divergences: 0,
            iterations_at_level: 0,
            criterion_met: false,
        })
    }

    pub fn config(&self) -> &CurriculumConfig {
        &self.config
    }

    pub fn levels(&self) -> &[DifficultyLevel] {
        &self.levels
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level_index(&self) -> usize {
        self.current
    }

    pub fn current_level(&self) -> &DifficultyLevel {
        &self.levels[self.current]
    }

    pub fn is_terminal(&self) -> bool {
        self.current + 1 == self.levels.len()
    }

    /// At the terminal level with the advance criterion satisfied.
    pub fn is_complete(&self) -> bool {
        self.is_terminal() && self.criterion_met
    }

    pub fn iterations_at_level(&self) -> usize {
        self.iterations_at_level
    }

    fn move_to(&mut self, level: usize) {
        self.current = level;
        self.history.clear();
        self.consecutive_divergences = 0;
        self.iterations_at_level = 0;
        self.criterion_met = false;
    }

    fn criterion(&self) -> bool {
        self.history.len() == self.config.window
            && self.history.iter().all(|o| !o.diverged)
            && self.history.iter().map(|o| o.loss).sum::<f64>() / (self.config.window as f64)
                < self.config.advance_loss
    }

    /// Record one outcome and apply the transition rule.
    pub fn report(&mut self, outcome: Outcome) -> Transition {
        self.iterations_at_level += 1;
        self.history.push_back(outcome);
        while self.history.len() > self.config.window {
            self.history.pop_front();
        }

        if outcome.diverged {
            self.consecutive_divergences += 1;
            self.criterion_met = false;
            if self.consecutive_divergences >= self.config.divergence_patience && self.current > 0 {
                let from = self.current;
                self.move_to(from - 1);
                return Transition::Regress { from, to: from - 1 };
            }
        } else {
            self.consecutive_divergences = 0;
            self.criterion_met = self.criterion();
            if self.criterion_met && !self.is_terminal() {
                let from = self.current;
                self.move_to(from + 1);
                return Transition::Advance { from, to: from + 1 };
            }
        }

        let every = self.config.stagnation_iterations;
        if every > 0 && !self.criterion_met && self.iterations_at_level % every == 0 {
            return Transition::Stagnated {
                level: self.current,
                iterations: self.iterations_at_level,
            };
        }
        Transition::Hold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(n: usize) -> CurriculumConfig {
        let easy = DifficultyLevel {
            horizon: 10,
            ..Default::default()
        };
        let target = DifficultyLevel {
            horizon: 50,
            window: 3,
            ..Default::default()
        };
        CurriculumConfig {
            window: 4,
            divergence_patience: 2,
            stagnation_iterations: 20,
            ..CurriculumConfig::linear(easy, target, n)
        }
    }

    #[test]
    fn test_linear_levels() {
        let levels = config(5).resolve_levels();
        assert_eq!(levels.len(), 5);
        assert_eq!(levels[0].horizon, 10);
        assert_eq!(levels[2].horizon, 30);
        assert_eq!(levels[4].horizon, 50);
        assert!(levels.windows(2).all(|w| w[0].horizon <= w[1].horizon));
    }

    #[test]
    fn test_monotone_progression_when_always_stable() {
        let mut sched = CurriculumScheduler::new(config(4), 5).unwrap();
        let mut previous = 0;
        let mut iterations = 0;
        while !sched.is_complete() {
            let t = sched.report(Outcome::stable(0.001));
            assert!(!matches!(t, Transition::Regress { .. }));
            assert!(sched.level_index() >= previous);
            previous = sched.level_index();
            iterations += 1;
            assert!(iterations <= 4 * 4, "did not complete in bounded iterations");
        }
        assert!(sched.is_terminal());
    }

    #[test]
    fn test_holds_when_loss_too_high() {
        let mut sched = CurriculumScheduler::new(config(3), 5).unwrap();
        for _ in 0..10 {
            let t = sched.report(Outcome::stable(1.0));
            assert!(!t.changed_level());
        }
        assert_eq!(sched.level_index(), 0);
    }

    #[test]
    fn test_window_must_be_divergence_free() {
        let mut sched = CurriculumScheduler::new(config(3), 5).unwrap();
        sched.report(Outcome::diverged());
        for _ in 0..3 {
            assert_eq!(sched.report(Outcome::stable(0.0)), Transition::Hold);
        }
        // The divergence has left the window.
        assert_eq!(sched.report(Outcome::stable(0.0)), Transition::Advance { from: 0, to: 1 });
    }

    #[test]
    fn test_recovery_regresses_but_never_below_initial() {
        let mut sched = CurriculumScheduler::new(config(3), 5).unwrap();
        for _ in 0..4 {
            sched.report(Outcome::stable(0.0));
        }
        assert_eq!(sched.level_index(), 1);

        assert_eq!(sched.report(Outcome::diverged()), Transition::Hold);
        assert_eq!(sched.report(Outcome::diverged()), Transition::Regress { from: 1, to: 0 });
        for _ in 0..10 {
            let t = sched.report(Outcome::diverged());
            assert!(!matches!(t, Transition::Regress { .. }));
        }
        assert_eq!(sched.level_index(), 0);
    }

    #[test]
    fn test_stable_outcome_resets_divergence_count() {
        let mut sched = CurriculumScheduler::new(config(3), 5).unwrap();
        for _ in 0..4 {
            sched.report(Outcome::stable(0.0));
        }
        sched.report(Outcome::diverged());
        sched.report(Outcome::stable(1.0));
        assert_eq!(sched.report(Outcome::diverged()), Transition::Hold);
        assert_eq!(sched.level_index(), 1);
    }

    #[test]
    fn test_stagnation_warning() {
        let mut sched = CurriculumScheduler::new(config(3), 5).unwrap();
        let warnings = (0..40)
            .map(|_| sched.report(Outcome::stable(1.0)))
            .filter(|t| matches!(t, Transition::Stagnated { .. }))
            .count();
        assert_eq!(warnings, 2);
    }

    #[test]
    fn test_single_level_completes() {
        let mut sched = CurriculumScheduler::new(
            CurriculumConfig {
                window: 2,
                ..CurriculumConfig::fixed(DifficultyLevel::default())
            },
            5,
        )
        .unwrap();
        assert!(sched.is_terminal());
        sched.report(Outcome::stable(0.0));
        assert!(!sched.is_complete());
        sched.report(Outcome::stable(0.0));
        assert!(sched.is_complete());
        sched.report(Outcome::diverged());
        assert!(!sched.is_complete());
    }

    #[test]
    fn test_invalid_levels_rejected() {
        let mut cfg = config(3);
        cfg.target.horizon = 0;
        cfg.easy.horizon = 0;
        assert!(CurriculumScheduler::new(cfg, 5).is_err());
        assert!(CurriculumScheduler::new(config(3), 2).is_err());
    }

    #[test]
    fn test_default_config_round_trips_json() {
        let cfg = CurriculumConfig::default();
        let text = serde_json::to_string(&cfg).unwrap();
        let back: CurriculumConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, cfg);
    }
}
