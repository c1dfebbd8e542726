//! Runs a generated trajectory against the live pose estimate.

use helix_common::{Alliance, FieldLayout};
use helix_kinematics::{ChassisSpeeds, Pose2d};
use tracing::{debug, info};

use super::trajectory_controller::{
    HolonomicTrajectoryController, TrackingError, limit_acceleration,
};
use crate::trajectory::HolonomicTrajectory;

/// Snapshot of how far along a follower is.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FollowerProgress {
    pub elapsed: f64,
    pub total_time: f64,
    pub error: TrackingError,
    pub finished: bool,
}

/// Owns one trajectory run.
///
/// The clock starts on the first `update`. Once the trajectory is finished or
/// cancelled every further update returns a stop command, so a superseded
/// follower can never leave a stale velocity latched on the drivetrain.
#[derive(Debug, Clone)]
pub struct TrajectoryFollower {
    trajectory: HolonomicTrajectory,
    controller: HolonomicTrajectoryController,
    alliance: Alliance,
    field: FieldLayout,
    start_time: Option<f64>,
    last_update: Option<(f64, ChassisSpeeds)>,
    progress: FollowerProgress,
    cancelled: bool,
}

impl TrajectoryFollower {
    pub fn new(
        trajectory: HolonomicTrajectory,
        controller: HolonomicTrajectoryController,
        alliance: Alliance,
        field: FieldLayout,
    ) -> Self {
        let total_time = trajectory.total_time();
        TrajectoryFollower {
            trajectory,
            controller,
            alliance,
            field,
            start_time: None,
            last_update: None,
            progress: FollowerProgress {
                total_time,
                ..FollowerProgress::default()
            },
            cancelled: false,
        }
    }

    /// Command for time `now` given the current estimate.
    pub fn update(
        &mut self,
        now: f64,
        pose: Pose2d,
        measured_velocity: Option<ChassisSpeeds>,
    ) -> ChassisSpeeds {
        if self.cancelled || self.progress.finished {
            return ChassisSpeeds::zero();
        }
        let start = *self.start_time.get_or_insert(now);
        let elapsed = now - start;

        let (reference, rotation) = self.trajectory.sample_for(elapsed, self.alliance, &self.field);
        let error = HolonomicTrajectoryController::tracking_error(&reference, &rotation, &pose);
        self.progress.elapsed = elapsed;
        self.progress.error = error;

        let config = self.controller.config();
        let past_end = elapsed >= self.trajectory.total_time();
        let arrived = error.distance() <= config.goal_position_tolerance
            && error.heading.abs() <= config.goal_heading_tolerance;
        if past_end && (arrived || elapsed >= self.trajectory.total_time() + config.end_timeout) {
            info!(
                elapsed,
                position_error = error.distance(),
                heading_error = error.heading,
                "trajectory finished"
            );
            self.progress.finished = true;
            self.last_update = Some((now, ChassisSpeeds::zero()));
            return ChassisSpeeds::zero();
        }

        let command = self.controller.calculate(&reference, &rotation, &pose, measured_velocity);
        let command = match self.last_update {
            Some((previous_time, previous)) => limit_acceleration(
                previous,
                command,
                config.max_linear_acceleration,
                config.max_angular_acceleration,
                now - previous_time,
            ),
            None => command,
        };
        self.last_update = Some((now, command));
        command
    }

    pub fn is_finished(&self) -> bool {
        self.progress.finished
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn progress(&self) -> FollowerProgress {
        self.progress
    }

    /// Stop following. Always returns the stop command for the drivetrain.
    pub fn cancel(&mut self) -> ChassisSpeeds {
        if !self.cancelled && !self.progress.finished {
            debug!(elapsed = self.progress.elapsed, "trajectory cancelled");
        }
        self.cancelled = true;
        ChassisSpeeds::zero()
    }
}
