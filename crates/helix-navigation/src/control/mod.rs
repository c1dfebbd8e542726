//! Closed-loop and operator control of the chassis.

mod drive_controller;
mod follower;
mod pid;
mod trajectory_controller;

pub use drive_controller::{DriveController, DriveControllerConfig};
pub use follower::{FollowerProgress, TrajectoryFollower};
pub use pid::{PidController, PidGains};
pub use trajectory_controller::{
    HolonomicTrajectoryController, TrackingError, TrajectoryControllerConfig, limit_acceleration,
};
