//! Wheel odometry for a swerve drivetrain.

use crate::{
    KinematicsError, Pose2d, SwerveDriveKinematics, SwerveModulePosition, Twist2d,
    angle_difference,
};

/// Result of one successful odometry update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OdometryUpdate {
    /// Running odometry-only pose after the update.
    pub pose: Pose2d,
    /// Robot-relative twist integrated during this update.
    pub twist: Twist2d,
}

/// Tracks the robot pose by integrating module displacements with the
/// exponential map.
///
/// When a gyro yaw is supplied the rotation of each twist comes from the
/// gyro delta, which is far more accurate than the wheel-derived rotation.
#[derive(Debug, Clone)]
pub struct SwerveDriveOdometry<const N: usize> {
    kinematics: SwerveDriveKinematics<N>,
    pose: Pose2d,
    previous_positions: [SwerveModulePosition; N],
    previous_yaw: Option<f64>,
}

impl<const N: usize> SwerveDriveOdometry<N> {
    /// Construct odometry starting at `initial_pose`.
    ///
    /// # Arguments
    ///
    /// * `kinematics`: Drivetrain geometry.
    /// * `positions`: Module positions at the moment `initial_pose` is valid.
    /// * `initial_pose`: Starting field pose.
    pub fn new(
        kinematics: SwerveDriveKinematics<N>,
        positions: [SwerveModulePosition; N],
        initial_pose: Pose2d,
    ) -> Self {
        SwerveDriveOdometry {
            kinematics,
            pose: initial_pose,
            previous_positions: positions,
            previous_yaw: None,
        }
    }

    /// Current odometry-only pose.
    pub fn pose(&self) -> Pose2d {
        self.pose
    }

    /// Drivetrain geometry used by this odometry.
    pub fn kinematics(&self) -> &SwerveDriveKinematics<N> {
        &self.kinematics
    }

    /// Re-seed the pose. The next gyro reading becomes the new yaw reference.
    pub fn reset(&mut self, pose: Pose2d, positions: [SwerveModulePosition; N]) {
        self.pose = pose;
        self.previous_positions = positions;
        self.previous_yaw = None;
    }

    /// Integrate one set of module positions.
    ///
    /// # Arguments
    ///
    /// * `gyro_yaw`: Gyro yaw in radians, or `None` if the gyro is disconnected.
    /// * `positions`: Current accumulated module positions.
    ///
    /// # Errors
    ///
    /// Propagates `KinematicsError::ModuleCountMismatch` and
    /// `KinematicsError::NonFiniteInput`. On error the pose and the stored
    /// module positions are left untouched.
    pub fn update(
        &mut self,
        gyro_yaw: Option<f64>,
        positions: &[SwerveModulePosition],
    ) -> Result<OdometryUpdate, KinematicsError> {
        if let Some(yaw) = gyro_yaw {
            if !yaw.is_finite() {
                return Err(KinematicsError::NonFiniteInput("gyro yaw"));
            }
        }
        let mut twist = self.kinematics.to_twist(&self.previous_positions, positions)?;

        // The first reading after a reset or reconnect only sets the reference.
        if let (Some(yaw), Some(previous)) = (gyro_yaw, self.previous_yaw) {
            twist.dtheta = angle_difference(yaw, previous);
        }
        self.previous_yaw = gyro_yaw;
        self.previous_positions.copy_from_slice(positions);

        self.pose = self.pose.exp(&twist);
        Ok(OdometryUpdate {
            pose: self.pose,
            twist,
        })
    }
}
