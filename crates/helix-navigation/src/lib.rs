//! Knowing where the robot is, and getting it where it should be.
//!
//! - [`pose_estimator`] fuses odometry with latency-compensated vision.
//! - [`vision_queue`] hands vision results from camera tasks to the control loop.
//! - [`trajectory`] builds time-parameterized holonomic paths.
//! - [`control`] tracks those paths, and shapes operator input in teleop.

pub mod control;
pub mod error;
pub mod pose_estimator;
pub mod trajectory;
pub mod vision_queue;

pub use error::{NavigationError, Result};
pub use pose_estimator::{PoseEstimator, PoseEstimatorConfig, VisionMeasurement, VisionOutcome};
pub use trajectory::{
    HolonomicTrajectory, RegionConstraint, Trajectory, TrajectoryConfig, TrajectoryGenerator,
    TrajectoryState, Waypoint,
};
pub use vision_queue::{VisionReceiver, VisionSender, vision_channel};
