//! Vehicle dynamics for gradpilot.
//!
//! - [`CartPole`]: pole balanced on a cart, Lagrangian equations of motion
//! - [`Quadrotor`]: X-configuration multirotor, rigid-body dynamics
//! - [`FixedWing`]: small fixed-wing aircraft with linearized aerodynamics
//!
//! All three are selected at configuration time through [`Vehicle`].
//! [`ResidualDynamics`] wraps any of them with a correction fitted on
//! transitions observed elsewhere.

pub mod cartpole;
pub mod fixed_wing;
pub mod quadrotor;
pub mod residual;
pub mod rigid;
pub mod vehicle;

pub use cartpole::{CartPole, CartPoleParams};
pub use fixed_wing::{FixedWing, FixedWingParams};
pub use quadrotor::{Quadrotor, QuadrotorParams};
pub use residual::{Observation, ResidualDynamics, ResidualFit};
pub use rigid::TrackingWeights;
pub use vehicle::{Vehicle, VehicleConfig, VehicleKind};
