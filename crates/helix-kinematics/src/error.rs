#![warn(missing_docs)]

//! Error types for the kinematics library.
//!
//! This module defines error types that can occur during kinematic calculations,
//! drivetrain construction and odometry updates.

use core::fmt;

/// Errors that can occur in kinematic calculations.
#[derive(Debug, Clone, PartialEq)]
pub enum KinematicsError {
    /// Error for a drivetrain whose module layout cannot be inverted.
    /// This variant is returned when fewer than two modules are given or all modules
    /// share one location, leaving the velocity Jacobian rank-deficient.
    DegenerateModuleLayout(&'static str),
    /// Error for a reading set whose length does not match the drivetrain.
    ModuleCountMismatch {
        /// Number of modules the drivetrain was built with.
        expected: usize,
        /// Number of readings supplied.
        found: usize,
    },
    /// Error for NaN or infinite sensor data.
    /// This variant is returned when any module or gyro reading is not finite.
    NonFiniteInput(&'static str),
    /// Error for negative time delta.
    /// This variant is returned when a negative time delta is used for pose updates.
    NegativeTimeDelta(&'static str),
}

impl fmt::Display for KinematicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KinematicsError::DegenerateModuleLayout(msg) => {
                write!(f, "Degenerate module layout: {}", msg)
            }
            KinematicsError::ModuleCountMismatch { expected, found } => write!(
                f,
                "Module count mismatch: expected {} readings, found {}",
                expected, found
            ),
            KinematicsError::NonFiniteInput(msg) => write!(f, "Non-finite input: {}", msg),
            KinematicsError::NegativeTimeDelta(msg) => write!(f, "Negative time delta: {}", msg),
        }
    }
}

impl core::error::Error for KinematicsError {}
