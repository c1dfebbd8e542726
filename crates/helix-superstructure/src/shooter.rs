//! Shot solving.
//!
//! Every quantity is computed in the blue alliance frame and mirrored back at
//! the end, so the model itself only knows about one goal. Speeds passed in
//! are field-relative.

use core::f64::consts::{FRAC_PI_2, PI};

use helix_common::field::flip_heading;
use helix_common::math::{clamp_magnitude, ramp_down, scalar_position};
use helix_common::{Alliance, FieldLayout, InterpolatingTable};
use helix_kinematics::{ChassisSpeeds, Pose2d, Translation2d, normalize_angle};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Result, SuperstructureError};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct ShooterConfig {
    /// Distance up to which shots are fully trusted (m).
    pub max_reliable_range: f64,
    /// Distance past which no shot is trusted (m).
    pub max_range: f64,
    /// Goal-to-robot angle up to which shots are fully trusted (rad).
    pub max_reliable_angle: f64,
    pub max_angle: f64,
    /// Robot speed up to which shots are fully trusted (m/s).
    pub max_reliable_speed: f64,
    pub max_speed: f64,
    /// Meters per second of equivalent linear speed for each rad/s of rotation.
    pub angular_speed_weight: f64,

    pub max_rpm: f64,
    /// Distance at which the flywheel runs slowest (m).
    pub closest_range: f64,
    /// Distance from which the flywheel runs at `max_rpm` (m).
    pub max_rpm_falloff_range: f64,
    /// Share of `max_rpm` taken off at `closest_range`, in `[0, 1]`.
    pub rpm_falloff: f64,

    /// Distance to pivot angle samples `(m, rad)`.
    pub pivot_table: Vec<(f64, f64)>,
    /// Pivot raise per radian of goal-to-robot angle.
    pub side_shot_pivot_coefficient: f64,
    /// Heading bias per radian of goal-to-robot angle.
    pub side_shot_heading_coefficient: f64,

    /// Control loop period the lookahead is expressed in (s).
    pub loop_period: f64,
    /// Fixed lookahead, in loop periods.
    pub prediction_factor: f64,
    /// Extra lookahead per meter of goal distance, in loop periods.
    pub prediction_distance_factor: f64,

    pub momentum_coefficient: f64,
    /// Extra momentum gain per meter of goal distance.
    pub momentum_range_coefficient: f64,
    pub flywheel_radius: f64,
    /// Ratio of note exit speed to flywheel surface speed.
    pub exit_efficiency: f64,
    /// Shooter exit point in the robot frame (m).
    pub shooter_offset: Translation2d,
    /// Direction the shooter fires relative to the robot's front (rad).
    pub shooter_yaw: f64,

    pub high_confidence: f64,
    pub medium_confidence: f64,
}

impl Default for ShooterConfig {
    fn default() -> Self {
        ShooterConfig {
            max_reliable_range: 4.5,
            max_range: 7.0,
            max_reliable_angle: 50f64.to_radians(),
            max_angle: 75f64.to_radians(),
            max_reliable_speed: 1.0,
            max_speed: 3.0,
            angular_speed_weight: 0.25,
            max_rpm: 5600.0,
            closest_range: 1.02,
            max_rpm_falloff_range: 4.3,
            rpm_falloff: 0.46,
            pivot_table: vec![
                (1.096, 0.498),
                (1.406, 0.52),
                (2.197, 0.8072),
                (2.379, 0.816),
                (4.305, 1.0005),
                (5.295, 1.0601),
            ],
            side_shot_pivot_coefficient: 0.045,
            side_shot_heading_coefficient: 0.032,
            loop_period: 0.02,
            prediction_factor: 0.0,
            prediction_distance_factor: 2.0,
            momentum_coefficient: 1.0,
            momentum_range_coefficient: 0.05,
            flywheel_radius: 0.0508,
            exit_efficiency: 0.5,
            shooter_offset: Translation2d::new(-0.2, 0.0),
            shooter_yaw: PI,
            high_confidence: 0.75,
            medium_confidence: 0.25,
        }
    }
}

/// Coarse banding of [`ShotData::confidence`] for operators and logs.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ShotConfidenceLevel {
    #[default]
    Low,
    Medium,
    High,
}

/// One firing solution.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ShotData {
    /// Distance from the robot to the goal (m).
    pub distance: f64,
    /// Angle of the robot off the goal's center line, clamped to ±π/2 (rad).
    pub goal_to_robot_angle: f64,
    pub rpm: f64,
    pub pivot_angle: f64,
    /// Field heading the robot should hold, including moving-shot lead (rad).
    pub robot_heading: f64,
    /// Solution reliability in `[0, 1]`.
    pub confidence: f64,
    pub level: ShotConfidenceLevel,
}

impl ShotData {
    /// The same solution with no confidence, used while a mechanism reports a fault.
    pub fn degraded(self) -> Self {
        ShotData {
            confidence: 0.0,
            level: ShotConfidenceLevel::Low,
            ..self
        }
    }
}

/// Ballistic model of the shooter. Holds configuration only; every method is
/// a pure function of its arguments.
#[derive(Debug, Clone)]
pub struct ShooterModel {
    config: ShooterConfig,
    field: FieldLayout,
    pivot_table: InterpolatingTable,
}

impl ShooterModel {
    /// # Errors
    ///
    /// Returns `SuperstructureError::InvalidConfig` for inconsistent ranges or
    /// limits and `SuperstructureError::PivotTable` for a bad pivot table.
    pub fn new(config: ShooterConfig, field: FieldLayout) -> Result<Self> {
        if !(config.max_reliable_range > 0.0 && config.max_range > config.max_reliable_range) {
            return Err(SuperstructureError::InvalidConfig("range limits"));
        }
        if !(config.max_reliable_angle >= 0.0 && config.max_angle > config.max_reliable_angle) {
            return Err(SuperstructureError::InvalidConfig("angle limits"));
        }
        if !(config.max_reliable_speed >= 0.0 && config.max_speed > config.max_reliable_speed) {
            return Err(SuperstructureError::InvalidConfig("speed limits"));
        }
        if !(config.closest_range < config.max_rpm_falloff_range) {
            return Err(SuperstructureError::InvalidConfig("rpm falloff range"));
        }
        if !(0.0..=1.0).contains(&config.rpm_falloff) || !(config.max_rpm > 0.0) {
            return Err(SuperstructureError::InvalidConfig("rpm limits"));
        }
        if !(config.flywheel_radius > 0.0 && config.exit_efficiency > 0.0) {
            return Err(SuperstructureError::InvalidConfig("flywheel geometry"));
        }
        if !(config.medium_confidence <= config.high_confidence) {
            return Err(SuperstructureError::InvalidConfig("confidence bands"));
        }
        let pivot_table = InterpolatingTable::new(config.pivot_table.clone())?;
        Ok(ShooterModel {
            config,
            field,
            pivot_table,
        })
    }

    pub fn config(&self) -> &ShooterConfig {
        &self.config
    }

    pub fn field(&self) -> &FieldLayout {
        &self.field
    }

    pub fn goal_distance(&self, pose: &Pose2d, alliance: Alliance) -> f64 {
        pose.translation().distance(&self.field.goal_for(alliance))
    }

    /// Zero straight out from the goal, positive toward +y in the blue frame.
    pub fn goal_to_robot_angle(&self, pose: &Pose2d, alliance: Alliance) -> f64 {
        self.blue_goal_to_robot_angle(&self.field.apply(alliance, *pose))
    }

    pub fn in_range(&self, pose: &Pose2d, alliance: Alliance) -> bool {
        self.goal_distance(pose, alliance) <= self.config.max_range
    }

    /// Flywheel speed: linear from the slowest setting at `closest_range` up
    /// to `max_rpm` at `max_rpm_falloff_range`, flat outside.
    pub fn shooter_rpm(&self, distance: f64) -> f64 {
        let c = &self.config;
        let distance = distance.clamp(c.closest_range, c.max_rpm_falloff_range);
        let position = scalar_position(distance, c.closest_range, c.max_rpm_falloff_range);
        let falloff = c.max_rpm * c.rpm_falloff;
        (c.max_rpm - falloff) + falloff * position
    }

    pub fn pivot_angle(&self, distance: f64, goal_to_robot_angle: f64) -> f64 {
        self.pivot_table.get(distance)
            + goal_to_robot_angle.abs() * self.config.side_shot_pivot_coefficient
    }

    /// Where the robot will be when the note leaves, assuming constant speeds.
    pub fn predict_pose(
        &self,
        pose: &Pose2d,
        field_speeds: &ChassisSpeeds,
        distance: f64,
    ) -> Pose2d {
        let c = &self.config;
        let lookahead =
            c.loop_period * (c.prediction_factor + c.prediction_distance_factor * distance);
        Pose2d::new(
            pose.x + field_speeds.vx * lookahead,
            pose.y + field_speeds.vy * lookahead,
            pose.theta + field_speeds.omega * lookahead,
        )
    }

    /// Note exit speed for a flywheel speed (m/s).
    pub fn exit_velocity(&self, rpm: f64) -> f64 {
        rpm * 2.0 * PI / 60.0 * self.config.flywheel_radius * self.config.exit_efficiency
    }

    /// Lead angle (rad) to add to the aim heading for a moving shot.
    ///
    /// The note inherits the muzzle's velocity, which is the chassis
    /// translation plus rotation about the shooter offset. Only the part
    /// perpendicular to the aim line pushes the note off target, so the aim
    /// is rotated against it by `asin(v⊥ / v_exit)` scaled by the range gain.
    /// With the robot at rest the result is exactly zero.
    ///
    /// `aim_line` and `field_speeds` must share one field frame.
    pub fn momentum_compensation(
        &self,
        aim_line: f64,
        field_speeds: &ChassisSpeeds,
        distance: f64,
        rpm: f64,
    ) -> f64 {
        let c = &self.config;
        let exit = self.exit_velocity(rpm);
        if !exit.is_finite() || exit <= 0.0 || !field_speeds.is_finite() {
            return 0.0;
        }
        let offset = c.shooter_offset.rotate_by(aim_line - c.shooter_yaw);
        let muzzle = Translation2d::new(
            field_speeds.vx - field_speeds.omega * offset.y,
            field_speeds.vy + field_speeds.omega * offset.x,
        );
        let (sin, cos) = aim_line.sin_cos();
        let perpendicular = muzzle.dot(&Translation2d::new(-sin, cos));
        let gain = c.momentum_coefficient + c.momentum_range_coefficient * distance;
        -(perpendicular / exit).clamp(-1.0, 1.0).asin() * gain
    }

    /// Heading that points the shooter at the goal from a standstill.
    pub fn static_heading(&self, pose: &Pose2d, alliance: Alliance) -> f64 {
        let blue = self.field.apply(alliance, *pose);
        let heading =
            normalize_angle(self.aim_line(&blue) - self.config.shooter_yaw - self.side_bias(&blue));
        self.to_alliance(alliance, heading)
    }

    /// Heading to hold for a shot taken while moving at `field_speeds`.
    pub fn robot_heading(
        &self,
        pose: &Pose2d,
        field_speeds: &ChassisSpeeds,
        alliance: Alliance,
    ) -> f64 {
        let blue = self.field.apply(alliance, *pose);
        let blue_speeds = self.field.apply(alliance, *field_speeds);
        let distance = blue.translation().distance(&self.field.goal);
        let predicted = self.predict_pose(&blue, &blue_speeds, distance);
        self.heading_blue(&predicted, &blue_speeds, alliance)
    }

    /// Reliability in `[0, 1]`: the product of linear falloffs in distance,
    /// off-axis angle and robot speed, each 1 inside its reliable limit and 0
    /// past its hard limit. Non-increasing in each argument's magnitude.
    pub fn confidence(
        &self,
        distance: f64,
        goal_to_robot_angle: f64,
        field_speeds: &ChassisSpeeds,
    ) -> f64 {
        let c = &self.config;
        let speed =
            field_speeds.linear_magnitude() + c.angular_speed_weight * field_speeds.omega.abs();
        let confidence = ramp_down(distance, c.max_reliable_range, c.max_range)
            * ramp_down(goal_to_robot_angle.abs(), c.max_reliable_angle, c.max_angle)
            * ramp_down(speed, c.max_reliable_speed, c.max_speed);
        if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn confidence_level(&self, confidence: f64) -> ShotConfidenceLevel {
        if confidence >= self.config.high_confidence {
            ShotConfidenceLevel::High
        } else if confidence >= self.config.medium_confidence {
            ShotConfidenceLevel::Medium
        } else {
            ShotConfidenceLevel::Low
        }
    }

    /// Full solution for the current pose and field-relative speeds.
    ///
    /// Flywheel speed and confidence use the present pose; pivot and heading
    /// use the predicted pose at release.
    pub fn shot_data(
        &self,
        pose: &Pose2d,
        field_speeds: &ChassisSpeeds,
        alliance: Alliance,
    ) -> ShotData {
        let blue = self.field.apply(alliance, *pose);
        let blue_speeds = self.field.apply(alliance, *field_speeds);

        let distance = blue.translation().distance(&self.field.goal);
        let goal_to_robot_angle = self.blue_goal_to_robot_angle(&blue);
        let predicted = self.predict_pose(&blue, &blue_speeds, distance);
        let predicted_distance = predicted.translation().distance(&self.field.goal);

        let confidence = self.confidence(distance, goal_to_robot_angle, &blue_speeds);
        ShotData {
            distance,
            goal_to_robot_angle,
            rpm: self.shooter_rpm(distance),
            pivot_angle: self
                .pivot_angle(predicted_distance, self.blue_goal_to_robot_angle(&predicted)),
            robot_heading: self.heading_blue(&predicted, &blue_speeds, alliance),
            confidence,
            level: self.confidence_level(confidence),
        }
    }

    fn heading_blue(
        &self,
        predicted: &Pose2d,
        blue_speeds: &ChassisSpeeds,
        alliance: Alliance,
    ) -> f64 {
        let distance = predicted.translation().distance(&self.field.goal);
        let aim_line = self.aim_line(predicted);
        let rpm = self.shooter_rpm(distance);
        let lead = self.momentum_compensation(aim_line, blue_speeds, distance, rpm);
        let heading =
            normalize_angle(aim_line - self.config.shooter_yaw - self.side_bias(predicted) + lead);
        self.to_alliance(alliance, heading)
    }

    fn aim_line(&self, blue: &Pose2d) -> f64 {
        (self.field.goal - blue.translation()).angle()
    }

    fn side_bias(&self, blue: &Pose2d) -> f64 {
        self.blue_goal_to_robot_angle(blue) * self.config.side_shot_heading_coefficient
    }

    fn blue_goal_to_robot_angle(&self, blue: &Pose2d) -> f64 {
        // Positions behind the alliance wall would otherwise wrap.
        clamp_magnitude((blue.translation() - self.field.goal).angle(), FRAC_PI_2)
    }

    fn to_alliance(&self, alliance: Alliance, heading: f64) -> f64 {
        match alliance {
            Alliance::Blue => heading,
            Alliance::Red => flip_heading(heading),
        }
    }
}
