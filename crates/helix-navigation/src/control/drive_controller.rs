//! Operator command shaping and simple point-seeking.

use core::f64::consts::PI;

use helix_common::math::{apply_deadband, curve};
use helix_kinematics::{ChassisSpeeds, Pose2d, Translation2d};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::pid::{PidController, PidGains};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveControllerConfig {
    /// Physical top speed of the drivetrain (m/s).
    pub max_linear_speed: f64,
    /// Share of `max_linear_speed` the operator can command.
    pub speed_multiplier: f64,
    /// Angular speed at full stick (rad/s).
    pub rotational_speed: f64,
    pub deadband: f64,
    pub drive_curve: f64,
    pub turn_curve: f64,
    /// Commands with every component below this become a stop.
    pub minimum_speed: f64,
    pub heading_gains: PidGains,
    /// Translation gain for drive-to-pose (1/s).
    pub seek_kp: f64,
    /// Translation speed cap for drive-to-pose (m/s).
    pub seek_max_speed: f64,
}

impl Default for DriveControllerConfig {
    fn default() -> Self {
        DriveControllerConfig {
            max_linear_speed: 4.5,
            speed_multiplier: 0.7,
            rotational_speed: 7.5,
            deadband: 0.1,
            drive_curve: 2.0,
            turn_curve: 2.0,
            minimum_speed: 1e-3,
            heading_gains: PidGains::new(5.0, 0.0, 0.05),
            seek_kp: 3.0,
            seek_max_speed: 2.0,
        }
    }
}

/// Maps normalized operator axes or pose goals onto chassis speeds.
///
/// Operator axes are field-relative: `x` away from the driver station, `y`
/// to the left, `theta` counter-clockwise, each in `[-1, 1]`. Every method
/// returns robot-relative speeds ready for the drivetrain.
#[derive(Debug, Clone)]
pub struct DriveController {
    config: DriveControllerConfig,
    heading: PidController,
}

impl DriveController {
    pub fn new(config: DriveControllerConfig) -> Self {
        let heading = PidController::new(config.heading_gains).with_continuous_input(-PI, PI);
        DriveController { config, heading }
    }

    pub fn config(&self) -> &DriveControllerConfig {
        &self.config
    }

    /// Shaped field-relative translation velocity for the linear axes.
    pub fn linear_velocity(&self, x: f64, y: f64) -> Translation2d {
        let input = Translation2d::new(x, y);
        if !input.is_finite() {
            return Translation2d::default();
        }
        // Diagonals would otherwise reach √2 of the envelope.
        let magnitude = input.norm().min(1.0);
        let magnitude = curve(
            apply_deadband(magnitude, self.config.deadband),
            self.config.drive_curve,
        );
        if magnitude == 0.0 {
            return Translation2d::default();
        }
        let max = self.config.max_linear_speed * self.config.speed_multiplier;
        Translation2d::new(magnitude * max, 0.0).rotate_by(input.angle())
    }

    /// Shaped angular velocity for the turn axis.
    pub fn angular_velocity(&self, theta: f64) -> f64 {
        if !theta.is_finite() {
            return 0.0;
        }
        let theta = apply_deadband(theta.clamp(-1.0, 1.0), self.config.deadband);
        curve(theta, self.config.turn_curve) * self.config.rotational_speed
    }

    /// Full open-loop teleop.
    pub fn drive(&self, x: f64, y: f64, theta: f64, robot_heading: f64) -> ChassisSpeeds {
        let linear = self.linear_velocity(x, y);
        let field = ChassisSpeeds::new(linear.x, linear.y, self.angular_velocity(theta));
        self.finish(field, robot_heading)
    }

    /// Operator drives translation; heading is held to `target_heading`.
    pub fn align_heading(
        &mut self,
        x: f64,
        y: f64,
        target_heading: f64,
        robot_heading: f64,
        dt: f64,
    ) -> ChassisSpeeds {
        let linear = self.linear_velocity(x, y);
        let omega = self.heading_command(robot_heading, target_heading, dt);
        self.finish(ChassisSpeeds::new(linear.x, linear.y, omega), robot_heading)
    }

    /// Closed-loop drive toward `target` on both translation and heading.
    pub fn seek_pose(&mut self, current: Pose2d, target: Pose2d, dt: f64) -> ChassisSpeeds {
        let error = target.translation() - current.translation();
        let mut linear = error * self.config.seek_kp;
        let speed = linear.norm();
        if speed > self.config.seek_max_speed {
            linear = linear * (self.config.seek_max_speed / speed);
        }
        let omega = self.heading_command(current.theta, target.theta, dt);
        self.finish(ChassisSpeeds::new(linear.x, linear.y, omega), current.theta)
    }

    /// Forget heading-loop history, e.g. when switching modes.
    pub fn reset(&mut self) {
        self.heading.reset();
    }

    fn heading_command(&mut self, heading: f64, target: f64, dt: f64) -> f64 {
        self.heading
            .calculate(heading, target, dt)
            .clamp(-self.config.rotational_speed, self.config.rotational_speed)
    }

    fn finish(&self, field: ChassisSpeeds, robot_heading: f64) -> ChassisSpeeds {
        let min = self.config.minimum_speed;
        if field.vx.abs() < min && field.vy.abs() < min && field.omega.abs() < min {
            return ChassisSpeeds::zero();
        }
        ChassisSpeeds::from_field_relative(field, robot_heading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use core::f64::consts::FRAC_PI_2;

    fn controller() -> DriveController {
        DriveController::new(DriveControllerConfig::default())
    }

    #[test]
    fn test_deadband_stops() {
        let c = controller();
        assert_eq!(c.drive(0.05, -0.05, 0.08, 0.0), ChassisSpeeds::zero());
    }

    #[test]
    fn test_full_stick_reaches_scaled_max() {
        let c = controller();
        let out = c.drive(1.0, 0.0, 1.0, 0.0);
        assert_abs_diff_eq!(out.vx, 4.5 * 0.7, epsilon = 1e-12);
        assert_abs_diff_eq!(out.omega, 7.5, epsilon = 1e-12);
    }

    #[test]
    fn test_diagonal_never_exceeds_envelope() {
        let c = controller();
        let max = 4.5 * 0.7;
        for i in 0..=20 {
            for j in 0..=20 {
                let x = -1.0 + 0.1 * i as f64;
                let y = -1.0 + 0.1 * j as f64;
                let out = c.drive(x, y, 0.0, 0.3);
                assert!(out.linear_magnitude() <= max + 1e-9);
            }
        }
        let corner = c.drive(1.0, 1.0, 0.0, 0.0);
        assert_abs_diff_eq!(corner.linear_magnitude(), max, epsilon = 1e-9);
        assert_abs_diff_eq!(corner.vx, corner.vy, epsilon = 1e-12);
    }

    #[test]
    fn test_curve_gives_fine_control_near_zero() {
        let c = controller();
        let half = c.linear_velocity(0.55, 0.0).x;
        // Deadband rescales 0.55 to 0.5, the square curve to 0.25.
        assert_abs_diff_eq!(half, 0.25 * 4.5 * 0.7, epsilon = 1e-12);
    }

    #[test]
    fn test_field_relative_conversion() {
        let c = controller();
        let out = c.drive(1.0, 0.0, 0.0, FRAC_PI_2);
        assert_abs_diff_eq!(out.vx, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.vy, -4.5 * 0.7, epsilon = 1e-12);
    }

    #[test]
    fn test_align_heading_holds_target_and_keeps_translation() {
        let mut c = controller();
        let out = c.align_heading(1.0, 0.0, 0.5, 0.0, 0.02);
        assert!(out.omega > 0.0);
        assert_abs_diff_eq!(out.vx, 4.5 * 0.7, epsilon = 1e-12);
        c.reset();
        assert_eq!(c.align_heading(0.0, 0.0, 0.5, 0.5, 0.02), ChassisSpeeds::zero());

        // Wrapping: from just below +PI to just above -PI is a small positive turn.
        c.reset();
        let out = c.align_heading(0.0, 0.0, -3.1, 3.1, 0.02);
        assert!(out.omega > 0.0 && out.omega < 1.0);
    }

    #[test]
    fn test_seek_pose_caps_speed_and_stops_at_goal() {
        let mut c = controller();
        let out = c.seek_pose(Pose2d::default(), Pose2d::new(10.0, 0.0, 0.0), 0.02);
        assert_abs_diff_eq!(out.linear_magnitude(), 2.0, epsilon = 1e-12);
        c.reset();
        let goal = Pose2d::new(1.0, 2.0, 0.3);
        assert_eq!(c.seek_pose(goal, goal, 0.02), ChassisSpeeds::zero());
    }
}
