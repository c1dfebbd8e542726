#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![warn(missing_docs)]
#![doc = "A `no_std`-capable library for 2D swerve-drive robot kinematics."]
#![doc = ""]
#![doc = "This crate provides planar geometry (poses, translations, twists and chassis"]
#![doc = "speeds), forward and inverse kinematics for an N-module swerve drivetrain, and"]
#![doc = "odometry integrated with the SE(2) exponential map."]

use core::f64::consts::PI;
use core::fmt;
use core::ops::{Add, Mul, Neg, Sub};
use libm::{atan2, cos, fabs, hypot, sin};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod error;
pub mod odometry;
pub mod swerve;

pub use error::KinematicsError;
pub use odometry::{OdometryUpdate, SwerveDriveOdometry};
pub use swerve::{SwerveDriveKinematics, SwerveModulePosition, SwerveModuleState};

/// Below this magnitude the exp/log maps switch to their Taylor expansions.
const SMALL_ANGLE: f64 = 1e-9;

/// Normalize an angle to be within `[-PI, PI)`.
///
/// Angles at `PI` will be normalized to `-PI`.
pub fn normalize_angle(angle: f64) -> f64 {
    let a = angle % (2.0 * PI);
    if a >= PI {
        a - 2.0 * PI
    } else if a < -PI {
        a + 2.0 * PI
    } else {
        a
    }
}

/// Signed shortest-arc difference `a - b`, in `[-PI, PI)`.
///
/// Never subtract headings directly: `angle_difference(-3.1, 3.1)` is a small
/// positive angle, not `-6.2`.
pub fn angle_difference(a: f64, b: f64) -> f64 {
    normalize_angle(a - b)
}

/// A 2-D translation `(x, y)` in meters.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Translation2d {
    /// x component (m).
    pub x: f64,
    /// y component (m).
    pub y: f64,
}

impl Translation2d {
    /// Construct a new translation.
    pub const fn new(x: f64, y: f64) -> Self {
        Translation2d { x, y }
    }

    /// Euclidean length of the vector.
    pub fn norm(&self) -> f64 {
        hypot(self.x, self.y)
    }

    /// Distance to another translation.
    pub fn distance(&self, other: &Translation2d) -> f64 {
        hypot(other.x - self.x, other.y - self.y)
    }

    /// Direction of the vector (rad). Zero for the zero vector.
    pub fn angle(&self) -> f64 {
        atan2(self.y, self.x)
    }

    /// Rotate the vector counter-clockwise by `angle` radians.
    pub fn rotate_by(&self, angle: f64) -> Translation2d {
        let (s, c) = (sin(angle), cos(angle));
        Translation2d::new(self.x * c - self.y * s, self.x * s + self.y * c)
    }

    /// Dot product.
    pub fn dot(&self, other: &Translation2d) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Returns `true` if both components are finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Translation2d {
    type Output = Translation2d;
    fn add(self, rhs: Translation2d) -> Translation2d {
        Translation2d::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Translation2d {
    type Output = Translation2d;
    fn sub(self, rhs: Translation2d) -> Translation2d {
        Translation2d::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Translation2d {
    type Output = Translation2d;
    fn mul(self, rhs: f64) -> Translation2d {
        Translation2d::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Translation2d {
    type Output = Translation2d;
    fn neg(self) -> Translation2d {
        Translation2d::new(-self.x, -self.y)
    }
}

impl fmt::Display for Translation2d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(x: {:.2}, y: {:.2})", self.x, self.y)
    }
}

/// A twist: the constant-curvature motion `(dx, dy, dθ)` expressed in the
/// frame of the pose it is applied to.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Twist2d {
    /// Forward displacement (m).
    pub dx: f64,
    /// Leftward displacement (m).
    pub dy: f64,
    /// Heading change (rad).
    pub dtheta: f64,
}

impl Twist2d {
    /// Construct a new twist.
    pub const fn new(dx: f64, dy: f64, dtheta: f64) -> Self {
        Twist2d { dx, dy, dtheta }
    }

    /// Scale every component by `factor`.
    pub fn scaled(&self, factor: f64) -> Twist2d {
        Twist2d::new(self.dx * factor, self.dy * factor, self.dtheta * factor)
    }

    /// Returns `true` if every component is finite.
    pub fn is_finite(&self) -> bool {
        self.dx.is_finite() && self.dy.is_finite() && self.dtheta.is_finite()
    }
}

impl fmt::Display for Twist2d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(dx: {:.3} m, dy: {:.3} m, dθ: {:.3} rad)",
            self.dx, self.dy, self.dtheta
        )
    }
}

/// A 2‑D pose `(x, y, θ)` in meters and radians (θ measured counter‑clockwise
/// from the x‑axis in the field frame).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose2d {
    /// Field‑frame x position (m).
    pub x: f64,
    /// Field‑frame y position (m).
    pub y: f64,
    /// Heading (rad), normalized to `[-PI, PI)`.
    pub theta: f64,
}

impl Pose2d {
    /// Construct a new pose. The heading is normalized.
    ///
    /// # Arguments
    ///
    /// * `x`: Field-frame x position in meters.
    /// * `y`: Field-frame y position in meters.
    /// * `theta`: Heading in radians.
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Pose2d {
            x,
            y,
            theta: normalize_angle(theta),
        }
    }

    /// Construct a pose from a translation and a heading.
    pub fn from_translation(translation: Translation2d, theta: f64) -> Self {
        Pose2d::new(translation.x, translation.y, theta)
    }

    /// The translational part of the pose.
    pub fn translation(&self) -> Translation2d {
        Translation2d::new(self.x, self.y)
    }

    /// Returns `true` if every component is finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.theta.is_finite()
    }

    /// Apply `transform` (expressed in this pose's frame) to this pose.
    pub fn transform_by(&self, transform: &Pose2d) -> Pose2d {
        let offset = transform.translation().rotate_by(self.theta);
        Pose2d::new(
            self.x + offset.x,
            self.y + offset.y,
            self.theta + transform.theta,
        )
    }

    /// Express this pose in the frame of `origin`.
    pub fn relative_to(&self, origin: &Pose2d) -> Pose2d {
        let local = (self.translation() - origin.translation()).rotate_by(-origin.theta);
        Pose2d::new(local.x, local.y, self.theta - origin.theta)
    }

    /// The transform that undoes this pose: `p.transform_by(&p.inverse())` is the origin.
    pub fn inverse(&self) -> Pose2d {
        Pose2d::default().relative_to(self)
    }

    /// Integrate a constant-curvature twist starting at this pose.
    ///
    /// Unlike Euler integration this stays exact for arcs, so heading error does
    /// not build up when the robot translates while spinning quickly.
    pub fn exp(&self, twist: &Twist2d) -> Pose2d {
        let theta = twist.dtheta;
        let (s, c) = (sin(theta), cos(theta));
        let (sin_term, cos_term) = if fabs(theta) < SMALL_ANGLE {
            (1.0 - theta * theta / 6.0, 0.5 * theta)
        } else {
            (s / theta, (1.0 - c) / theta)
        };
        let local = Pose2d {
            x: twist.dx * sin_term - twist.dy * cos_term,
            y: twist.dx * cos_term + twist.dy * sin_term,
            theta,
        };
        self.transform_by(&local)
    }

    /// The twist that carries this pose onto `end` along a constant-curvature arc.
    pub fn log(&self, end: &Pose2d) -> Twist2d {
        let transform = end.relative_to(self);
        let dtheta = transform.theta;
        let half_dtheta = 0.5 * dtheta;
        let cos_minus_one = cos(dtheta) - 1.0;
        let half_theta_by_tan = if fabs(cos_minus_one) < SMALL_ANGLE {
            1.0 - dtheta * dtheta / 12.0
        } else {
            -(half_dtheta * sin(dtheta)) / cos_minus_one
        };
        Twist2d::new(
            half_theta_by_tan * transform.x + half_dtheta * transform.y,
            half_theta_by_tan * transform.y - half_dtheta * transform.x,
            dtheta,
        )
    }

    /// Interpolate toward `end` along the connecting twist; `t` is clamped to `[0, 1]`.
    ///
    /// The heading always travels the shortest arc.
    pub fn interpolate(&self, end: &Pose2d, t: f64) -> Pose2d {
        let t = t.clamp(0.0, 1.0);
        if t <= 0.0 {
            return *self;
        }
        if t >= 1.0 {
            return *end;
        }
        self.exp(&self.log(end).scaled(t))
    }
}

impl fmt::Display for Pose2d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(x: {:.2}, y: {:.2}, θ: {:.2} rad)", self.x, self.y, self.theta)
    }
}

/// Chassis velocity `(vx, vy, ω)`.
///
/// Whether the linear part is robot-relative or field-relative depends on the
/// producer; the conversion helpers make the frame change explicit.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChassisSpeeds {
    /// Velocity along x (m/s).
    pub vx: f64,
    /// Velocity along y (m/s).
    pub vy: f64,
    /// Angular velocity (rad/s), counter-clockwise positive.
    pub omega: f64,
}

impl ChassisSpeeds {
    /// Construct chassis speeds.
    pub const fn new(vx: f64, vy: f64, omega: f64) -> Self {
        ChassisSpeeds { vx, vy, omega }
    }

    /// The stop command.
    pub const fn zero() -> Self {
        ChassisSpeeds::new(0.0, 0.0, 0.0)
    }

    /// Convert field-relative speeds to robot-relative given the robot heading.
    pub fn from_field_relative(field: ChassisSpeeds, robot_heading: f64) -> ChassisSpeeds {
        let v = Translation2d::new(field.vx, field.vy).rotate_by(-robot_heading);
        ChassisSpeeds::new(v.x, v.y, field.omega)
    }

    /// Convert robot-relative speeds to field-relative given the robot heading.
    pub fn to_field_relative(&self, robot_heading: f64) -> ChassisSpeeds {
        let v = Translation2d::new(self.vx, self.vy).rotate_by(robot_heading);
        ChassisSpeeds::new(v.x, v.y, self.omega)
    }

    /// Linear speed magnitude; ignores the angular component.
    pub fn linear_magnitude(&self) -> f64 {
        hypot(self.vx, self.vy)
    }

    /// Returns `true` if every component is finite.
    pub fn is_finite(&self) -> bool {
        self.vx.is_finite() && self.vy.is_finite() && self.omega.is_finite()
    }

    /// Correct for the skew produced when translating and rotating within one
    /// discrete period of `dt` seconds.
    ///
    /// # Errors
    ///
    /// Returns `Err(KinematicsError::NegativeTimeDelta)` if `dt` is not positive.
    pub fn discretize(&self, dt: f64) -> Result<ChassisSpeeds, KinematicsError> {
        if dt <= 0.0 {
            return Err(KinematicsError::NegativeTimeDelta("must be positive"));
        }
        let target = Pose2d::new(self.vx * dt, self.vy * dt, self.omega * dt);
        let twist = Pose2d::default().log(&target);
        Ok(ChassisSpeeds::new(
            twist.dx / dt,
            twist.dy / dt,
            twist.dtheta / dt,
        ))
    }
}

impl Add for ChassisSpeeds {
    type Output = ChassisSpeeds;
    fn add(self, rhs: ChassisSpeeds) -> ChassisSpeeds {
        ChassisSpeeds::new(self.vx + rhs.vx, self.vy + rhs.vy, self.omega + rhs.omega)
    }
}

impl Sub for ChassisSpeeds {
    type Output = ChassisSpeeds;
    fn sub(self, rhs: ChassisSpeeds) -> ChassisSpeeds {
        ChassisSpeeds::new(self.vx - rhs.vx, self.vy - rhs.vy, self.omega - rhs.omega)
    }
}

impl Mul<f64> for ChassisSpeeds {
    type Output = ChassisSpeeds;
    fn mul(self, rhs: f64) -> ChassisSpeeds {
        ChassisSpeeds::new(self.vx * rhs, self.vy * rhs, self.omega * rhs)
    }
}

impl fmt::Display for ChassisSpeeds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(vx: {:.2} m/s, vy: {:.2} m/s, ω: {:.2} rad/s)",
            self.vx, self.vy, self.omega
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use core::f64::consts::FRAC_PI_2;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_pose_normalization() {
        assert_abs_diff_eq!(normalize_angle(0.0), 0.0, epsilon = EPSILON);
        // PI maps to -PI for [-PI, PI)
        assert_abs_diff_eq!(normalize_angle(PI), -PI, epsilon = EPSILON);
        assert_abs_diff_eq!(normalize_angle(3.0 * PI), -PI, epsilon = EPSILON);
        assert_abs_diff_eq!(normalize_angle(2.5 * PI), 0.5 * PI, epsilon = EPSILON);
        assert_abs_diff_eq!(normalize_angle(-2.5 * PI), -0.5 * PI, epsilon = EPSILON);
    }

    #[test]
    fn test_angle_difference_takes_short_arc() {
        let d = angle_difference(-3.1, 3.1);
        assert_abs_diff_eq!(d, 2.0 * PI - 6.2, epsilon = EPSILON);
        assert_abs_diff_eq!(angle_difference(0.5, 0.25), 0.25, epsilon = EPSILON);
    }

    #[test]
    fn test_exp_straight_line() {
        let pose = Pose2d::new(1.0, 1.0, FRAC_PI_2);
        let next = pose.exp(&Twist2d::new(2.0, 0.0, 0.0));
        assert_abs_diff_eq!(next.x, 1.0, epsilon = EPSILON);
        assert_abs_diff_eq!(next.y, 3.0, epsilon = EPSILON);
        assert_abs_diff_eq!(next.theta, FRAC_PI_2, epsilon = EPSILON);
    }

    #[test]
    fn test_exp_quarter_circle() {
        // Quarter circle of radius 1 turning left.
        let twist = Twist2d::new(FRAC_PI_2, 0.0, FRAC_PI_2);
        let end = Pose2d::default().exp(&twist);
        assert_abs_diff_eq!(end.x, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(end.y, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(end.theta, FRAC_PI_2, epsilon = 1e-9);
    }

    #[test]
    fn test_log_inverts_exp() {
        let start = Pose2d::new(0.3, -1.2, 2.9);
        let twist = Twist2d::new(0.7, -0.2, 0.9);
        let end = start.exp(&twist);
        let recovered = start.log(&end);
        assert_abs_diff_eq!(recovered.dx, twist.dx, epsilon = 1e-9);
        assert_abs_diff_eq!(recovered.dy, twist.dy, epsilon = 1e-9);
        assert_abs_diff_eq!(recovered.dtheta, twist.dtheta, epsilon = 1e-9);
    }

    #[test]
    fn test_relative_to_and_inverse() {
        let origin = Pose2d::new(2.0, 1.0, FRAC_PI_2);
        let p = Pose2d::new(2.0, 3.0, PI - 0.1);
        let local = p.relative_to(&origin);
        assert_abs_diff_eq!(local.x, 2.0, epsilon = EPSILON);
        assert_abs_diff_eq!(local.y, 0.0, epsilon = EPSILON);
        let back = origin.transform_by(&local);
        assert_abs_diff_eq!(back.x, p.x, epsilon = EPSILON);
        assert_abs_diff_eq!(back.y, p.y, epsilon = EPSILON);
        let identity = origin.transform_by(&origin.inverse());
        assert_abs_diff_eq!(identity.x, 0.0, epsilon = EPSILON);
        assert_abs_diff_eq!(identity.theta, 0.0, epsilon = EPSILON);
    }

    #[test]
    fn test_interpolate_wraps_heading() {
        let a = Pose2d::new(0.0, 0.0, PI - 0.1);
        let b = Pose2d::new(0.0, 0.0, -PI + 0.1);
        let mid = a.interpolate(&b, 0.5);
        // Halfway along the short arc sits on ±PI, never near zero.
        assert!(fabs(mid.theta) > PI - 1e-6);
    }

    #[test]
    fn test_field_relative_round_trip_through_heading() {
        let field = ChassisSpeeds::new(1.0, 0.0, 0.5);
        let robot = ChassisSpeeds::from_field_relative(field, FRAC_PI_2);
        assert_abs_diff_eq!(robot.vx, 0.0, epsilon = EPSILON);
        assert_abs_diff_eq!(robot.vy, -1.0, epsilon = EPSILON);
        assert_abs_diff_eq!(robot.omega, 0.5, epsilon = EPSILON);
    }

    #[test]
    fn test_discretize_rejects_non_positive_dt() {
        let speeds = ChassisSpeeds::new(1.0, 0.0, 1.0);
        assert!(matches!(
            speeds.discretize(0.0),
            Err(KinematicsError::NegativeTimeDelta(_))
        ));
        let corrected = speeds.discretize(0.02).unwrap();
        // Integrating the corrected twist for one period lands on the straight-line target.
        let end = Pose2d::default().exp(&Twist2d::new(
            corrected.vx * 0.02,
            corrected.vy * 0.02,
            corrected.omega * 0.02,
        ));
        assert_abs_diff_eq!(end.x, 0.02, epsilon = 1e-12);
        assert_abs_diff_eq!(end.y, 0.0, epsilon = 1e-12);
    }
}
