//! Configuration-time selection of a vehicle.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use gradpilot_diff::Scalar;
use gradpilot_model::{Bounds, Dynamics, ModelError, Result};
use serde::{Deserialize, Serialize};

use crate::cartpole::{CartPole, CartPoleParams};
use crate::fixed_wing::{FixedWing, FixedWingParams};
use crate::quadrotor::{Quadrotor, QuadrotorParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleKind {
    #[serde(rename = "cartpole")]
    CartPole,
    #[serde(rename = "quadrotor")]
    Quadrotor,
    #[serde(rename = "fixed-wing")]
    FixedWing,
}

impl VehicleKind {
    pub const ALL: [VehicleKind; 3] = [Self::CartPole, Self::Quadrotor, Self::FixedWing];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CartPole => "cartpole",
            Self::Quadrotor => "quadrotor",
            Self::FixedWing => "fixed-wing",
        }
    }
}

impl fmt::Display for VehicleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ModelError::InvalidParameter(format!("unknown vehicle '{s}'")))
    }
}

/// Physical parameters for every vehicle; only the selected one is used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub cartpole: CartPoleParams,
    pub quadrotor: QuadrotorParams,
    pub fixed_wing: FixedWingParams,
}

impl VehicleConfig {
    pub fn build(&self, kind: VehicleKind) -> Result<Vehicle> {
        Ok(match kind {
            VehicleKind::CartPole => Vehicle::CartPole(CartPole::new(self.cartpole.clone())?),
            VehicleKind::Quadrotor => Vehicle::Quadrotor(Quadrotor::new(self.quadrotor.clone())?),
            VehicleKind::FixedWing => Vehicle::FixedWing(FixedWing::new(self.fixed_wing.clone())?),
        })
    }
}

/// Enum dispatch over the three dynamics variants.
#[derive(Debug, Clone)]
pub enum Vehicle {
    CartPole(CartPole),
    Quadrotor(Quadrotor),
    FixedWing(FixedWing),
}

macro_rules! dispatch {
    ($self:ident, $v:ident => $e:expr) => {
        match $self {
            Vehicle::CartPole($v) => $e,
            Vehicle::Quadrotor($v) => $e,
            Vehicle::FixedWing($v) => $e,
        }
    };
}

impl Vehicle {
    /// Vehicle with default parameters.
    pub fn default_for(kind: VehicleKind) -> Self {
        match kind {
            VehicleKind::CartPole => Self::CartPole(CartPole::default()),
            VehicleKind::Quadrotor => Self::Quadrotor(Quadrotor::default()),
            VehicleKind::FixedWing => Self::FixedWing(FixedWing::default()),
        }
    }

    pub fn kind(&self) -> VehicleKind {
        match self {
            Self::CartPole(_) => VehicleKind::CartPole,
            Self::Quadrotor(_) => VehicleKind::Quadrotor,
            Self::FixedWing(_) => VehicleKind::FixedWing,
        }
    }
}

impl Dynamics for Vehicle {
    fn name(&self) -> &'static str {
        dispatch!(self, v => v.name())
    }

    fn state_dim(&self) -> usize {
        dispatch!(self, v => v.state_dim())
    }

    fn control_bounds(&self) -> &[Bounds] {
        dispatch!(self, v => v.control_bounds())
    }

    fn advance<S: Scalar>(&self, state: &[S], control: &[S], dt: f64) -> Vec<S> {
        dispatch!(self, v => v.advance(state, control, dt))
    }

    fn nominal_control(&self) -> Vec<f64> {
        dispatch!(self, v => v.nominal_control())
    }

    fn error_weights(&self) -> &[f64] {
        dispatch!(self, v => v.error_weights())
    }

    fn position_indices(&self) -> Range<usize> {
        dispatch!(self, v => v.position_indices())
    }

    fn quaternion_offset(&self) -> Option<usize> {
        dispatch!(self, v => v.quaternion_offset())
    }

    fn perturbation_scale(&self) -> Vec<f64> {
        dispatch!(self, v => v.perturbation_scale())
    }
}
