//! Reference trajectories for gradpilot.
//!
//! Trajectories are generated once (see [`TrajectoryGenerator`]), stored as a
//! named [`TrajectoryCorpus`] with a train/test split, and read back through
//! the [`ReferenceProvider`] interface.

pub mod corpus;
pub mod error;
pub mod generator;
pub mod trajectory;

pub use corpus::{Split, TrajectoryCorpus};
pub use error::{ReferenceError, Result};
pub use generator::TrajectoryGenerator;
pub use trajectory::{ReferenceProvider, Trajectory};
