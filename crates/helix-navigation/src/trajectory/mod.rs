//! Holonomic trajectories.
//!
//! A trajectory is split into two independently timed parts: the translation
//! path the robot's center follows ([`Trajectory`]), and the heading the
//! robot's chassis points in along the way ([`RotationSequence`]). Both share
//! one absolute time axis starting at zero.

mod generator;
mod parameterizer;
mod rotation_sequence;
mod spline;

pub use generator::{HolonomicTrajectory, TrajectoryGenerator};
pub use rotation_sequence::{RotationSequence, RotationState};

use helix_common::field::flip_heading;
use helix_common::{AllianceFlip, FieldLayout};
use helix_kinematics::{Pose2d, Translation2d, angle_difference};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A control point of the translation path.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    pub translation: Translation2d,
    /// Direction of travel through this point. Chosen from the neighbours when absent.
    pub path_heading: Option<f64>,
    /// Robot heading to reach when the path passes this point.
    pub rotation: Option<f64>,
    /// Speed cap at this point (m/s). Zero makes the robot stop here.
    pub velocity_override: Option<f64>,
}

impl Waypoint {
    pub fn new(translation: Translation2d) -> Self {
        Waypoint {
            translation,
            path_heading: None,
            rotation: None,
            velocity_override: None,
        }
    }

    /// A waypoint whose path heading is the pose's heading.
    pub fn from_pose(pose: Pose2d) -> Self {
        Waypoint::new(pose.translation()).with_path_heading(pose.theta)
    }

    pub fn with_path_heading(mut self, heading: f64) -> Self {
        self.path_heading = Some(heading);
        self
    }

    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = Some(rotation);
        self
    }

    pub fn with_velocity_override(mut self, velocity: f64) -> Self {
        self.velocity_override = Some(velocity);
        self
    }

    fn is_finite(&self) -> bool {
        self.translation.is_finite()
            && self.path_heading.is_none_or(f64::is_finite)
            && self.rotation.is_none_or(f64::is_finite)
            && self.velocity_override.is_none_or(f64::is_finite)
    }
}

/// Tighter limits over the segments between two waypoints (inclusive
/// indices into the caller's waypoint list).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionConstraint {
    pub from_waypoint: usize,
    pub to_waypoint: usize,
    pub max_velocity: Option<f64>,
    pub max_acceleration: Option<f64>,
}

/// Global limits for time parameterization.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryConfig {
    /// m/s
    pub max_velocity: f64,
    /// m/s²
    pub max_acceleration: f64,
    /// Braking limit (m/s²); `max_acceleration` when absent.
    pub max_deceleration: Option<f64>,
    /// Lateral acceleration limit in turns (m/s²).
    pub max_centripetal_acceleration: Option<f64>,
    pub start_velocity: f64,
    pub end_velocity: f64,
    /// Distance between path samples (m).
    pub sample_spacing: f64,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        TrajectoryConfig {
            max_velocity: 4.0,
            max_acceleration: 3.0,
            max_deceleration: None,
            max_centripetal_acceleration: Some(5.0),
            start_velocity: 0.0,
            end_velocity: 0.0,
            sample_spacing: 0.02,
        }
    }
}

impl TrajectoryConfig {
    /// Config with only velocity and acceleration limits.
    pub fn new(max_velocity: f64, max_acceleration: f64) -> Self {
        TrajectoryConfig {
            max_velocity,
            max_acceleration,
            max_centripetal_acceleration: None,
            ..TrajectoryConfig::default()
        }
    }
}

/// One time-stamped sample of the translation path.
///
/// `pose.theta` is the direction of travel, not the robot's heading.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrajectoryState {
    /// s
    pub time: f64,
    pub pose: Pose2d,
    /// Speed along the path (m/s), never negative.
    pub velocity: f64,
    /// m/s²
    pub acceleration: f64,
    /// Signed path curvature (rad/m).
    pub curvature: f64,
}

impl TrajectoryState {
    fn interpolate(&self, end: &TrajectoryState, t: f64) -> TrajectoryState {
        let lerp = |a: f64, b: f64| a + (b - a) * t;
        let heading = self.pose.theta + angle_difference(end.pose.theta, self.pose.theta) * t;
        TrajectoryState {
            time: lerp(self.time, end.time),
            pose: Pose2d::new(
                lerp(self.pose.x, end.pose.x),
                lerp(self.pose.y, end.pose.y),
                heading,
            ),
            velocity: lerp(self.velocity, end.velocity),
            acceleration: self.acceleration,
            curvature: lerp(self.curvature, end.curvature),
        }
    }
}

impl AllianceFlip for TrajectoryState {
    fn flipped(&self, field: &FieldLayout) -> Self {
        TrajectoryState {
            pose: Pose2d::new(
                field.flip_x(self.pose.x),
                self.pose.y,
                flip_heading(self.pose.theta),
            ),
            curvature: -self.curvature,
            ..*self
        }
    }
}

/// An immutable, time-parameterized translation path.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    states: Vec<TrajectoryState>,
}

impl Trajectory {
    /// Built only by the generator, which guarantees at least two states with
    /// strictly increasing times.
    fn from_states(states: Vec<TrajectoryState>) -> Self {
        Trajectory { states }
    }

    pub fn states(&self) -> &[TrajectoryState] {
        &self.states
    }

    pub fn total_time(&self) -> f64 {
        self.states.last().map_or(0.0, |s| s.time)
    }

    pub fn initial_state(&self) -> TrajectoryState {
        self.states.first().copied().unwrap_or_default()
    }

    pub fn final_state(&self) -> TrajectoryState {
        self.states.last().copied().unwrap_or_default()
    }

    /// Reference state at `time`, clamped to `[0, total_time]`.
    pub fn sample(&self, time: f64) -> TrajectoryState {
        if time <= 0.0 || self.states.len() < 2 {
            return self.initial_state();
        }
        if time >= self.total_time() {
            return self.final_state();
        }
        let upper = self.states.partition_point(|s| s.time <= time);
        let before = &self.states[upper - 1];
        let after = &self.states[upper];
        let span = after.time - before.time;
        if span <= 0.0 {
            return *after;
        }
        before.interpolate(after, (time - before.time) / span)
    }
}
