//! Forward and inverse kinematics for an N-module swerve drivetrain.
//!
//! Each module contributes two rows to the velocity Jacobian `A`:
//! `[1, 0, -y_i]` and `[0, 1, x_i]`. Forward kinematics solves the
//! overdetermined system `A · [vx, vy, ω]ᵀ = b` in the least-squares sense
//! through the normal equations, so slipping or noisy modules are averaged out
//! instead of trusted individually.

use core::f64::consts::{FRAC_PI_2, PI};
use libm::{atan2, cos, fabs, hypot, sin};
use nalgebra::{Matrix3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    ChassisSpeeds, KinematicsError, Translation2d, Twist2d, angle_difference, normalize_angle,
};

/// Speeds below this are treated as a stopped module.
const STOPPED_SPEED: f64 = 1e-9;

/// Measured or commanded state of one swerve module.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SwerveModuleState {
    /// Wheel ground speed (m/s). Negative means driving backwards along `angle`.
    pub speed: f64,
    /// Steering angle (rad) relative to the robot's forward axis.
    pub angle: f64,
}

impl SwerveModuleState {
    /// Construct a module state.
    pub fn new(speed: f64, angle: f64) -> Self {
        SwerveModuleState {
            speed,
            angle: normalize_angle(angle),
        }
    }

    /// Minimize the steering change from `current_angle`.
    ///
    /// If the target is more than 90° away the module turns to the opposite
    /// angle and reverses its drive direction instead.
    pub fn optimize(&self, current_angle: f64) -> SwerveModuleState {
        let delta = angle_difference(self.angle, current_angle);
        if fabs(delta) > FRAC_PI_2 {
            SwerveModuleState::new(-self.speed, self.angle + PI)
        } else {
            *self
        }
    }

    fn velocity(&self) -> (f64, f64) {
        (self.speed * cos(self.angle), self.speed * sin(self.angle))
    }

    fn is_finite(&self) -> bool {
        self.speed.is_finite() && self.angle.is_finite()
    }
}

/// Accumulated wheel distance and steering angle of one swerve module.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SwerveModulePosition {
    /// Distance driven since startup (m).
    pub distance: f64,
    /// Steering angle (rad).
    pub angle: f64,
}

impl SwerveModulePosition {
    /// Construct a module position.
    pub fn new(distance: f64, angle: f64) -> Self {
        SwerveModulePosition {
            distance,
            angle: normalize_angle(angle),
        }
    }

    fn is_finite(&self) -> bool {
        self.distance.is_finite() && self.angle.is_finite()
    }
}

/// Kinematics of a swerve drivetrain with `N` modules at fixed offsets from
/// the robot center.
#[derive(Debug, Clone, PartialEq)]
pub struct SwerveDriveKinematics<const N: usize> {
    locations: [Translation2d; N],
    /// `(AᵀA)⁻¹`, computed once at construction.
    inverse_normal: Matrix3<f64>,
}

impl<const N: usize> SwerveDriveKinematics<N> {
    /// Construct kinematics for modules at `locations` (robot frame, meters).
    ///
    /// # Arguments
    ///
    /// * `locations`: Offset of each module from the robot center, x forward, y left.
    ///
    /// # Errors
    ///
    /// Returns `Err(KinematicsError::DegenerateModuleLayout)` if fewer than two
    /// modules are given, a location is not finite, or all modules share one point.
    pub fn new(locations: [Translation2d; N]) -> Result<Self, KinematicsError> {
        if N < 2 {
            return Err(KinematicsError::DegenerateModuleLayout(
                "at least two modules are required",
            ));
        }
        if locations.iter().any(|l| !l.is_finite()) {
            return Err(KinematicsError::DegenerateModuleLayout(
                "module locations must be finite",
            ));
        }

        let n = N as f64;
        let (sum_x, sum_y, sum_sq) = locations.iter().fold((0.0, 0.0, 0.0), |acc, l| {
            (acc.0 + l.x, acc.1 + l.y, acc.2 + l.x * l.x + l.y * l.y)
        });
        let normal = Matrix3::new(
            n, 0.0, -sum_y, //
            0.0, n, sum_x, //
            -sum_y, sum_x, sum_sq,
        );
        if fabs(normal.determinant()) < 1e-9 {
            return Err(KinematicsError::DegenerateModuleLayout(
                "all modules share one location",
            ));
        }
        let inverse_normal = normal.try_inverse().ok_or(
            KinematicsError::DegenerateModuleLayout("velocity Jacobian is not invertible"),
        )?;

        Ok(SwerveDriveKinematics {
            locations,
            inverse_normal,
        })
    }

    /// Returns the module locations.
    pub fn locations(&self) -> &[Translation2d; N] {
        &self.locations
    }

    /// Calculates the module states required to achieve `speeds` (robot-relative).
    /// This is the inverse kinematics problem.
    ///
    /// Stopped modules report an angle of zero; callers that care about
    /// steering jitter should keep the previous angle for those.
    pub fn to_module_states(&self, speeds: ChassisSpeeds) -> [SwerveModuleState; N] {
        let mut states = [SwerveModuleState::default(); N];
        for (state, location) in states.iter_mut().zip(self.locations.iter()) {
            let vx = speeds.vx - speeds.omega * location.y;
            let vy = speeds.vy + speeds.omega * location.x;
            let speed = hypot(vx, vy);
            *state = if speed < STOPPED_SPEED {
                SwerveModuleState::new(0.0, 0.0)
            } else {
                SwerveModuleState::new(speed, atan2(vy, vx))
            };
        }
        states
    }

    /// Calculates robot-relative chassis speeds from measured module states.
    /// This is the forward kinematics problem.
    ///
    /// # Errors
    ///
    /// Returns `Err(KinematicsError::ModuleCountMismatch)` if `states.len() != N`.
    /// Returns `Err(KinematicsError::NonFiniteInput)` if any reading is NaN or infinite.
    pub fn to_chassis_speeds(
        &self,
        states: &[SwerveModuleState],
    ) -> Result<ChassisSpeeds, KinematicsError> {
        self.check_len(states.len())?;
        if states.iter().any(|s| !s.is_finite()) {
            return Err(KinematicsError::NonFiniteInput("module state"));
        }
        let solution = self.solve(states.iter().map(SwerveModuleState::velocity));
        Ok(ChassisSpeeds::new(solution.x, solution.y, solution.z))
    }

    /// Calculates the robot-relative twist between two sets of module positions.
    ///
    /// Each module's displacement is taken along its final steering angle.
    ///
    /// # Errors
    ///
    /// Returns `Err(KinematicsError::ModuleCountMismatch)` if either slice length differs from `N`.
    /// Returns `Err(KinematicsError::NonFiniteInput)` if any reading is NaN or infinite.
    pub fn to_twist(
        &self,
        start: &[SwerveModulePosition],
        end: &[SwerveModulePosition],
    ) -> Result<Twist2d, KinematicsError> {
        self.check_len(start.len())?;
        self.check_len(end.len())?;
        if start.iter().chain(end.iter()).any(|p| !p.is_finite()) {
            return Err(KinematicsError::NonFiniteInput("module position"));
        }
        let deltas = start.iter().zip(end.iter()).map(|(s, e)| {
            let d = e.distance - s.distance;
            (d * cos(e.angle), d * sin(e.angle))
        });
        let solution = self.solve(deltas);
        Ok(Twist2d::new(solution.x, solution.y, solution.z))
    }

    /// Scale every module speed down uniformly so none exceeds `max_speed`.
    /// Preserves the commanded direction of travel.
    pub fn desaturate_wheel_speeds(states: &mut [SwerveModuleState], max_speed: f64) {
        let fastest = states.iter().fold(0.0_f64, |m, s| m.max(fabs(s.speed)));
        if fastest > max_speed && fastest > 0.0 {
            let scale = max_speed / fastest;
            for state in states.iter_mut() {
                state.speed *= scale;
            }
        }
    }

    fn check_len(&self, found: usize) -> Result<(), KinematicsError> {
        if found != N {
            return Err(KinematicsError::ModuleCountMismatch { expected: N, found });
        }
        Ok(())
    }

    fn solve(&self, module_vectors: impl Iterator<Item = (f64, f64)>) -> Vector3<f64> {
        // Aᵀb accumulated per module.
        let mut atb = Vector3::zeros();
        for ((vx, vy), l) in module_vectors.zip(self.locations.iter()) {
            atb.x += vx;
            atb.y += vy;
            atb.z += -l.y * vx + l.x * vy;
        }
        self.inverse_normal * atb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const EPSILON: f64 = 1e-9;

    fn square() -> SwerveDriveKinematics<4> {
        SwerveDriveKinematics::new([
            Translation2d::new(0.3, 0.3),
            Translation2d::new(0.3, -0.3),
            Translation2d::new(-0.3, 0.3),
            Translation2d::new(-0.3, -0.3),
        ])
        .unwrap()
    }

    #[test]
    fn test_rejects_degenerate_layouts() {
        let single = SwerveDriveKinematics::new([Translation2d::new(0.3, 0.3)]);
        assert!(matches!(single, Err(KinematicsError::DegenerateModuleLayout(_))));

        let stacked = SwerveDriveKinematics::new([Translation2d::new(0.2, 0.1); 3]);
        assert!(matches!(stacked, Err(KinematicsError::DegenerateModuleLayout(_))));
    }

    #[test]
    fn test_pure_translation_points_all_modules_forward() {
        let states = square().to_module_states(ChassisSpeeds::new(1.5, 0.0, 0.0));
        for s in states.iter() {
            assert_abs_diff_eq!(s.speed, 1.5, epsilon = EPSILON);
            assert_abs_diff_eq!(s.angle, 0.0, epsilon = EPSILON);
        }
    }

    #[test]
    fn test_pure_rotation_is_tangential() {
        let kin = square();
        let states = kin.to_module_states(ChassisSpeeds::new(0.0, 0.0, 1.0));
        let radius = hypot(0.3, 0.3);
        for (s, l) in states.iter().zip(kin.locations().iter()) {
            assert_abs_diff_eq!(s.speed, radius, epsilon = EPSILON);
            // Module velocity is perpendicular to its offset.
            let (vx, vy) = s.velocity();
            assert_abs_diff_eq!(vx * l.x + vy * l.y, 0.0, epsilon = EPSILON);
        }
    }

    #[test]
    fn test_forward_inverts_inverse() {
        let kin = square();
        let speeds = ChassisSpeeds::new(0.8, -1.1, 2.3);
        let states = kin.to_module_states(speeds);
        let recovered = kin.to_chassis_speeds(&states).unwrap();
        assert_abs_diff_eq!(recovered.vx, speeds.vx, epsilon = EPSILON);
        assert_abs_diff_eq!(recovered.vy, speeds.vy, epsilon = EPSILON);
        assert_abs_diff_eq!(recovered.omega, speeds.omega, epsilon = EPSILON);
    }

    #[test]
    fn test_three_module_layout_is_supported() {
        let kin = SwerveDriveKinematics::new([
            Translation2d::new(0.4, 0.0),
            Translation2d::new(-0.2, 0.35),
            Translation2d::new(-0.2, -0.35),
        ])
        .unwrap();
        let speeds = ChassisSpeeds::new(-0.4, 0.6, -1.2);
        let recovered = kin.to_chassis_speeds(&kin.to_module_states(speeds)).unwrap();
        assert_abs_diff_eq!(recovered.vx, speeds.vx, epsilon = EPSILON);
        assert_abs_diff_eq!(recovered.omega, speeds.omega, epsilon = EPSILON);
    }

    #[test]
    fn test_malformed_readings_are_rejected() {
        let kin = square();
        let three = [SwerveModuleState::default(); 3];
        assert_eq!(
            kin.to_chassis_speeds(&three),
            Err(KinematicsError::ModuleCountMismatch { expected: 4, found: 3 })
        );
        let mut states = [SwerveModuleState::default(); 4];
        states[2].speed = f64::NAN;
        assert!(matches!(
            kin.to_chassis_speeds(&states),
            Err(KinematicsError::NonFiniteInput(_))
        ));
    }

    #[test]
    fn test_twist_from_positions() {
        let kin = square();
        let start = [SwerveModulePosition::new(0.0, 0.0); 4];
        let end = [SwerveModulePosition::new(0.25, FRAC_PI_2); 4];
        let twist = kin.to_twist(&start, &end).unwrap();
        assert_abs_diff_eq!(twist.dx, 0.0, epsilon = EPSILON);
        assert_abs_diff_eq!(twist.dy, 0.25, epsilon = EPSILON);
        assert_abs_diff_eq!(twist.dtheta, 0.0, epsilon = EPSILON);
    }

    #[test]
    fn test_optimize_flips_instead_of_turning_far() {
        let target = SwerveModuleState::new(2.0, PI - 0.1);
        let optimized = target.optimize(0.0);
        assert_abs_diff_eq!(optimized.speed, -2.0, epsilon = EPSILON);
        assert_abs_diff_eq!(optimized.angle, -0.1, epsilon = EPSILON);

        let near = SwerveModuleState::new(2.0, 0.3).optimize(0.0);
        assert_eq!(near, SwerveModuleState::new(2.0, 0.3));
    }

    #[test]
    fn test_desaturate_preserves_ratios() {
        let mut states = [
            SwerveModuleState::new(6.0, 0.0),
            SwerveModuleState::new(-3.0, 0.0),
            SwerveModuleState::new(1.5, 0.0),
        ];
        SwerveDriveKinematics::<3>::desaturate_wheel_speeds(&mut states, 4.0);
        assert_abs_diff_eq!(states[0].speed, 4.0, epsilon = EPSILON);
        assert_abs_diff_eq!(states[1].speed, -2.0, epsilon = EPSILON);
        assert_abs_diff_eq!(states[2].speed, 1.0, epsilon = EPSILON);
    }
}
