//! Training events and where they go.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrainingEvent {
    Iteration {
        iteration: usize,
        level: usize,
        horizon: usize,
        loss: f64,
        tracking_loss: f64,
        grad_norm: f64,
    },
    Diverged {
        iteration: usize,
        level: usize,
        step: usize,
    },
    LevelChanged {
        iteration: usize,
        from: usize,
        to: usize,
    },
    Stagnation {
        iteration: usize,
        level: usize,
        iterations_at_level: usize,
    },
    Evaluation {
        iteration: usize,
        level: usize,
        n_episodes: usize,
        n_failed: usize,
        mean_position_rmse: f64,
        mean_steps_survived: f64,
        best: bool,
    },
    Finished {
        iterations: usize,
        level: usize,
        completed: bool,
        diverged_iterations: usize,
    },
}

/// Receives training events.
pub trait EventSink {
    fn emit(&mut self, event: &TrainingEvent) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&mut self, _event: &TrainingEvent) -> Result<()> {
        Ok(())
    }
}

/// Keeps events in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub events: Vec<TrainingEvent>,
}

impl EventSink for MemorySink {
    fn emit(&mut self, event: &TrainingEvent) -> Result<()> {
        self.events.push(event.clone());
        Ok(())
    }
}

/// Human-readable progress on stdout; stagnation on stderr.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleSink {
    /// Print progress every N iterations.
    pub print_every: usize,
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self { print_every: 10 }
    }
}

impl EventSink for ConsoleSink {
    fn emit(&mut self, event: &TrainingEvent) -> Result<()> {
        match event {
            TrainingEvent::Iteration {
                iteration,
                level,
                horizon,
                loss,
                tracking_loss,
                grad_norm,
            } => {
                if self.print_every > 0 && iteration % self.print_every == 0 {
                    println!(
                        "Iteration {iteration}: level {level} (H={horizon}) loss = {loss:.6e} \
                         tracking = {tracking_loss:.6e} |g| = {grad_norm:.3e}"
                    );
                }
            }
            TrainingEvent::Diverged { iteration, level, step } => {
                if self.print_every > 0 && iteration % self.print_every == 0 {
                    println!("Iteration {iteration}: level {level} diverged at step {step}");
                }
            }
            TrainingEvent::LevelChanged { iteration, from, to } => {
                println!("Iteration {iteration}: level {from} -> {to}");
            }
            TrainingEvent::Stagnation {
                iteration,
                level,
                iterations_at_level,
            } => {
                eprintln!(
                    "warning: iteration {iteration}: no progress at level {level} \
                     for {iterations_at_level} iterations"
                );
            }
            TrainingEvent::Evaluation {
                iteration,
                n_episodes,
                n_failed,
                mean_position_rmse,
                best,
                ..
            } => {
                println!(
                    "Iteration {iteration}: eval rmse = {mean_position_rmse:.4} \
                     failed {n_failed}/{n_episodes}{}",
                    if *best { " (best)" } else { "" }
                );
            }
            TrainingEvent::Finished {
                iterations,
                level,
                completed,
                diverged_iterations,
            } => {
                println!(
                    "Finished after {iterations} iterations at level {level} \
                     (curriculum complete: {completed}, diverged iterations: {diverged_iterations})"
                );
            }
        }
        Ok(())
    }
}

/// Appends one JSON object per event (NDJSON).
pub struct JsonlSink {
    writer: BufWriter<File>,
}

impl JsonlSink {
    /// Open `path` for appending, creating parent directories.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl EventSink for JsonlSink {
    fn emit(&mut self, event: &TrainingEvent) -> Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        if matches!(event, TrainingEvent::Finished { .. }) {
            self.writer.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Forwards every event to each inner sink.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl EventSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn push(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutSink {
    fn emit(&mut self, event: &TrainingEvent) -> Result<()> {
        for sink in &mut self.sinks {
            sink.emit(event)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        for sink in &mut self.sinks {
            sink.flush()?;
        }
        Ok(())
    }
}
