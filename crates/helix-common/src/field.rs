//! Field geometry and alliance mirroring.
//!
//! All field-frame coordinates are stored from the blue alliance's point of
//! view, with the origin at the right corner of the blue alliance wall. Red
//! alliance positions are obtained by mirroring across the field's center line
//! (x → length − x, heading θ → π − θ).

use core::f64::consts::PI;

use helix_kinematics::{ChassisSpeeds, Pose2d, Translation2d, normalize_angle};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Inches to meters.
const INCH: f64 = 0.0254;

/// Which side of the field the robot plays for.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alliance {
    #[default]
    Blue,
    Red,
}

/// Dimensions of the playing field and the scoring goal.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldLayout {
    /// Wall-to-wall length along x (m).
    pub length: f64,
    /// Wall-to-wall width along y (m).
    pub width: f64,
    /// Center of the blue alliance goal opening, field frame (m).
    pub goal: Translation2d,
}

impl Default for FieldLayout {
    fn default() -> Self {
        let width = 8.211;
        FieldLayout {
            length: 16.451,
            width,
            goal: Translation2d::new(0.0, width - 103.875 * INCH),
        }
    }
}

impl FieldLayout {
    /// The goal position as seen by `alliance`.
    pub fn goal_for(&self, alliance: Alliance) -> Translation2d {
        self.apply(alliance, self.goal)
    }

    /// Mirror `value` if `alliance` is red, otherwise return it unchanged.
    pub fn apply<T: AllianceFlip>(&self, alliance: Alliance, value: T) -> T {
        match alliance {
            Alliance::Blue => value,
            Alliance::Red => value.flipped(self),
        }
    }

    /// Mirror an x coordinate across the center line.
    pub fn flip_x(&self, x: f64) -> f64 {
        self.length - x
    }

    /// Whether `point` lies inside the field walls shrunk by `margin`.
    pub fn contains(&self, point: Translation2d, margin: f64) -> bool {
        point.x >= margin
            && point.y >= margin
            && point.x <= self.length - margin
            && point.y <= self.width - margin
    }

    /// Clamp `point` to the field walls shrunk by `margin`.
    pub fn clamp(&self, point: Translation2d, margin: f64) -> Translation2d {
        let margin = margin.clamp(0.0, 0.5 * self.length.min(self.width));
        Translation2d::new(
            point.x.clamp(margin, self.length - margin),
            point.y.clamp(margin, self.width - margin),
        )
    }
}

/// Values that can be mirrored to the red alliance's side of the field.
pub trait AllianceFlip {
    /// The mirrored value.
    fn flipped(&self, field: &FieldLayout) -> Self;
}

/// Mirror a heading: the x component of its direction changes sign.
pub fn flip_heading(theta: f64) -> f64 {
    normalize_angle(PI - theta)
}

impl AllianceFlip for Translation2d {
    fn flipped(&self, field: &FieldLayout) -> Self {
        Translation2d::new(field.flip_x(self.x), self.y)
    }
}

impl AllianceFlip for Pose2d {
    fn flipped(&self, field: &FieldLayout) -> Self {
        Pose2d::new(field.flip_x(self.x), self.y, flip_heading(self.theta))
    }
}

/// Field-relative speeds only; robot-relative speeds are unaffected by alliance.
impl AllianceFlip for ChassisSpeeds {
    fn flipped(&self, _field: &FieldLayout) -> Self {
        ChassisSpeeds::new(-self.vx, self.vy, -self.omega)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use core::f64::consts::FRAC_PI_2;

    #[test]
    fn test_default_goal_is_on_blue_wall() {
        let field = FieldLayout::default();
        assert_abs_diff_eq!(field.goal.x, 0.0);
        assert_abs_diff_eq!(field.goal.y, 8.211 - 2.638425, epsilon = 1e-9);
        let red = field.goal_for(Alliance::Red);
        assert_abs_diff_eq!(red.x, 16.451, epsilon = 1e-9);
        assert_abs_diff_eq!(red.y, field.goal.y, epsilon = 1e-9);
    }

    #[test]
    fn test_pose_flip_mirrors_heading() {
        let field = FieldLayout::default();
        let pose = Pose2d::new(2.0, 3.0, 0.0);
        let red = field.apply(Alliance::Red, pose);
        assert_abs_diff_eq!(red.x, 14.451, epsilon = 1e-9);
        assert_abs_diff_eq!(red.theta.abs(), PI, epsilon = 1e-9);

        let up = Pose2d::new(2.0, 3.0, FRAC_PI_2);
        assert_abs_diff_eq!(up.flipped(&field).theta, FRAC_PI_2, epsilon = 1e-9);
        assert_eq!(field.apply(Alliance::Blue, pose), pose);

        let speeds = ChassisSpeeds::new(1.0, 2.0, 0.5);
        assert_eq!(field.apply(Alliance::Red, speeds), ChassisSpeeds::new(-1.0, 2.0, -0.5));
    }

    #[test]
    fn test_clamp_and_contains() {
        let field = FieldLayout::default();
        assert!(field.contains(Translation2d::new(1.0, 1.0), 0.3));
        assert!(!field.contains(Translation2d::new(-0.1, 1.0), 0.0));
        let clamped = field.clamp(Translation2d::new(20.0, -1.0), 0.3);
        assert_abs_diff_eq!(clamped.x, 16.151, epsilon = 1e-9);
        assert_abs_diff_eq!(clamped.y, 0.3, epsilon = 1e-9);
    }
}
