//! Feedback plus feedforward tracking of a holonomic trajectory.
//!
//! Translation error is resolved into the path's own frame: along-track (the
//! robot is ahead of or behind the reference) and cross-track (it has drifted
//! sideways off the path). Each axis gets the reference velocity as
//! feedforward plus a proportional correction. Heading is a third axis,
//! tracked from the rotation sequence and never mixed with translation.

use helix_kinematics::{ChassisSpeeds, Pose2d, Translation2d, angle_difference};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::trajectory::{RotationState, TrajectoryState};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryControllerConfig {
    /// Along-track position gain (1/s).
    pub kp_along: f64,
    /// Cross-track position gain (1/s).
    pub kp_cross: f64,
    /// Velocity error gain, used when a measured velocity is supplied.
    pub kd_velocity: f64,
    /// Heading gain (1/s).
    pub kp_heading: f64,
    /// Feedforward is divided by `1 + cross_track_slowdown * |cross-track error|`.
    pub cross_track_slowdown: f64,
    pub max_linear_velocity: f64,
    pub max_angular_velocity: f64,
    pub max_linear_acceleration: Option<f64>,
    pub max_angular_acceleration: Option<f64>,
    /// Distance from the final pose that counts as arrived (m).
    pub goal_position_tolerance: f64,
    pub goal_heading_tolerance: f64,
    /// How long past the trajectory's end the follower keeps correcting (s).
    pub end_timeout: f64,
}

impl Default for TrajectoryControllerConfig {
    fn default() -> Self {
        TrajectoryControllerConfig {
            kp_along: 2.5,
            kp_cross: 2.5,
            kd_velocity: 0.0,
            kp_heading: 4.0,
            cross_track_slowdown: 1.0,
            max_linear_velocity: 4.5,
            max_angular_velocity: 7.5,
            max_linear_acceleration: Some(8.0),
            max_angular_acceleration: Some(25.0),
            goal_position_tolerance: 0.03,
            goal_heading_tolerance: 0.03,
            end_timeout: 1.0,
        }
    }
}

/// Pose error resolved into the reference path's frame.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackingError {
    /// Positive when the reference is ahead of the robot (m).
    pub along_track: f64,
    /// Positive when the reference is to the left of the robot's track (m).
    pub cross_track: f64,
    /// Shortest-arc heading error (rad).
    pub heading: f64,
}

impl TrackingError {
    pub fn distance(&self) -> f64 {
        self.along_track.hypot(self.cross_track)
    }
}

/// Stateless trajectory tracking law.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HolonomicTrajectoryController {
    config: TrajectoryControllerConfig,
}

impl HolonomicTrajectoryController {
    pub fn new(config: TrajectoryControllerConfig) -> Self {
        HolonomicTrajectoryController { config }
    }

    pub fn config(&self) -> &TrajectoryControllerConfig {
        &self.config
    }

    pub fn tracking_error(
        reference: &TrajectoryState,
        rotation: &RotationState,
        pose: &Pose2d,
    ) -> TrackingError {
        let (tangent, normal) = path_frame(reference.pose.theta);
        let error = reference.pose.translation() - pose.translation();
        TrackingError {
            along_track: error.dot(&tangent),
            cross_track: error.dot(&normal),
            heading: angle_difference(rotation.heading, pose.theta),
        }
    }

    /// Robot-relative command for the current tick.
    ///
    /// # Arguments
    ///
    /// * `reference`: Path sample at the current trajectory time.
    /// * `rotation`: Heading sample at the same time.
    /// * `pose`: Current estimated pose.
    /// * `measured_velocity`: Field-relative measured velocity, enables the velocity term.
    pub fn calculate(
        &self,
        reference: &TrajectoryState,
        rotation: &RotationState,
        pose: &Pose2d,
        measured_velocity: Option<ChassisSpeeds>,
    ) -> ChassisSpeeds {
        let c = &self.config;
        let (tangent, normal) = path_frame(reference.pose.theta);
        let error = Self::tracking_error(reference, rotation, pose);

        let feedforward =
            reference.velocity / (1.0 + c.cross_track_slowdown * error.cross_track.abs());
        let mut along = feedforward + c.kp_along * error.along_track;
        let mut cross = c.kp_cross * error.cross_track;

        if let Some(measured) = measured_velocity {
            let velocity_error =
                tangent * reference.velocity - Translation2d::new(measured.vx, measured.vy);
            along += c.kd_velocity * velocity_error.dot(&tangent);
            cross += c.kd_velocity * velocity_error.dot(&normal);
        }

        let mut linear = tangent * along + normal * cross;
        let magnitude = linear.norm();
        if magnitude > c.max_linear_velocity {
            linear = linear * (c.max_linear_velocity / magnitude);
        }
        let omega = (rotation.angular_velocity + c.kp_heading * error.heading)
            .clamp(-c.max_angular_velocity, c.max_angular_velocity);

        ChassisSpeeds::from_field_relative(
            ChassisSpeeds::new(linear.x, linear.y, omega),
            pose.theta,
        )
    }
}

fn path_frame(heading: f64) -> (Translation2d, Translation2d) {
    let (s, c) = heading.sin_cos();
    (Translation2d::new(c, s), Translation2d::new(-s, c))
}

/// Limit the change from `previous` to `next` over `dt` seconds.
///
/// The linear part is limited as a vector so the direction of travel is
/// preserved while the speed ramps.
pub fn limit_acceleration(
    previous: ChassisSpeeds,
    next: ChassisSpeeds,
    max_linear_acceleration: Option<f64>,
    max_angular_acceleration: Option<f64>,
    dt: f64,
) -> ChassisSpeeds {
    if dt <= 0.0 {
        return next;
    }
    let mut limited = next;
    if let Some(max) = max_linear_acceleration {
        let delta = Translation2d::new(next.vx - previous.vx, next.vy - previous.vy);
        let allowed = max * dt;
        let norm = delta.norm();
        if norm > allowed {
            let step = delta * (allowed / norm);
            limited.vx = previous.vx + step.x;
            limited.vy = previous.vy + step.y;
        }
    }
    if let Some(max) = max_angular_acceleration {
        let allowed = max * dt;
        limited.omega = previous.omega + (next.omega - previous.omega).clamp(-allowed, allowed);
    }
    limited
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use core::f64::consts::FRAC_PI_2;

    fn reference(x: f64, y: f64, heading: f64, velocity: f64) -> TrajectoryState {
        TrajectoryState {
            time: 0.0,
            pose: Pose2d::new(x, y, heading),
            velocity,
            acceleration: 0.0,
            curvature: 0.0,
        }
    }

    fn controller() -> HolonomicTrajectoryController {
        HolonomicTrajectoryController::new(TrajectoryControllerConfig::default())
    }

    #[test]
    fn test_zero_output_at_goal() {
        for pose in [
            Pose2d::new(0.0, 0.0, 0.0),
            Pose2d::new(3.0, -2.0, 2.0),
            Pose2d::new(-1.0, 5.0, -3.1),
        ] {
            let state = reference(pose.x, pose.y, 0.7, 0.0);
            let rotation = RotationState {
                heading: pose.theta,
                angular_velocity: 0.0,
            };
            let out = controller().calculate(&state, &rotation, &pose, Some(ChassisSpeeds::zero()));
            assert_abs_diff_eq!(out.vx, 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(out.vy, 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(out.omega, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_feedforward_is_robot_relative() {
        // Path heads along +x, robot faces +y: forward motion is to the robot's right.
        let pose = Pose2d::new(0.0, 0.0, FRAC_PI_2);
        let state = reference(0.0, 0.0, 0.0, 1.5);
        let rotation = RotationState {
            heading: FRAC_PI_2,
            angular_velocity: 0.0,
        };
        let out = controller().calculate(&state, &rotation, &pose, None);
        assert_abs_diff_eq!(out.vx, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.vy, -1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_cross_track_error_slows_feedforward() {
        let rotation = RotationState::default();
        let state = reference(0.0, 0.0, 0.0, 2.0);
        let on_path = Pose2d::new(0.0, 0.0, 0.0);
        let off_path = Pose2d::new(0.0, -0.5, 0.0);
        let c = controller();
        let a = c.calculate(&state, &rotation, &on_path, None);
        let b = c.calculate(&state, &rotation, &off_path, None);
        assert!(b.vx < a.vx);
        // Correction pulls back toward the path.
        assert!(b.vy > 0.0);
        let error = HolonomicTrajectoryController::tracking_error(&state, &rotation, &off_path);
        assert_abs_diff_eq!(error.cross_track, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_heading_axis_is_independent() {
        let pose = Pose2d::new(1.0, 1.0, 0.0);
        let state = reference(1.0, 1.0, 0.0, 0.0);
        let rotation = RotationState {
            heading: 0.1,
            angular_velocity: 0.5,
        };
        let out = controller().calculate(&state, &rotation, &pose, None);
        assert_abs_diff_eq!(out.vx, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.omega, 0.5 + 4.0 * 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_saturation() {
        let pose = Pose2d::default();
        let state = reference(100.0, 0.0, 0.0, 4.0);
        let rotation = RotationState {
            heading: 3.0,
            angular_velocity: 10.0,
        };
        let out = controller().calculate(&state, &rotation, &pose, None);
        assert_abs_diff_eq!(out.linear_magnitude(), 4.5, epsilon = 1e-9);
        assert_abs_diff_eq!(out.omega, 7.5, epsilon = 1e-12);
    }

    #[test]
    fn test_limit_acceleration() {
        let limited = limit_acceleration(
            ChassisSpeeds::zero(),
            ChassisSpeeds::new(3.0, 4.0, 10.0),
            Some(5.0),
            Some(50.0),
            0.02,
        );
        assert_abs_diff_eq!(limited.linear_magnitude(), 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(limited.vx / limited.vy, 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(limited.omega, 1.0, epsilon = 1e-12);
        let free = limit_acceleration(
            ChassisSpeeds::zero(),
            ChassisSpeeds::new(3.0, 4.0, 10.0),
            None,
            None,
            0.02,
        );
        assert_eq!(free, ChassisSpeeds::new(3.0, 4.0, 10.0));
    }
}
