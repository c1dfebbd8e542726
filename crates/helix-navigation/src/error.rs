//! Error types for pose estimation and trajectory generation.

use thiserror::Error;

/// Errors raised by `helix-navigation`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NavigationError {
    #[error("trajectory needs at least two waypoints, got {0}")]
    TooFewWaypoints(usize),

    #[error("waypoint {0} is not finite")]
    NonFiniteWaypoint(usize),

    #[error("all waypoints collapse to a single point")]
    DegeneratePath,

    #[error("no waypoint carries a rotation target")]
    MissingRotationTarget,

    #[error("invalid trajectory constraint: {0}")]
    InvalidConstraint(&'static str),

    #[error("odometry input rejected: {0}")]
    InvalidOdometry(&'static str),

    #[error("vision queue receiver has been dropped")]
    VisionQueueClosed,

    #[error("start and end velocity cannot both be reached under the constraints")]
    InfeasibleProfile,
}

pub type Result<T> = std::result::Result<T, NavigationError>;
