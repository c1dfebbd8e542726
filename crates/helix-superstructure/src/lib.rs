//! Shot solving and mechanism sequencing.
//!
//! [`ShooterModel`] turns the robot's pose and velocity into a firing
//! solution. [`Superstructure`] decides, once per tick, which mechanism state
//! the robot is in and what every actuator should be doing, using that
//! solution and the feedback read through a [`MechanismIo`] backend.

pub mod error;
pub mod io;
pub mod shooter;
pub mod state_machine;

pub use error::{Result, SuperstructureError};
pub use io::{
    ActuatorCommand, MechanismInputs, MechanismIo, NullMechanismIo, SimMechanismConfig,
    SimMechanismIo,
};
pub use shooter::{ShooterConfig, ShooterModel, ShotConfidenceLevel, ShotData};
pub use state_machine::{
    Guard, RejectReason, Rejection, Superstructure, SuperstructureConfig, SuperstructureEvent,
    SuperstructureState, TRANSITIONS,
};
