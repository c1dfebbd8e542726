//! Swerve drivetrain subsystem: gyro and module capabilities, odometry and
//! command output.

use anyhow::Context;
use tracing::warn;

use helix_kinematics::{
    ChassisSpeeds, KinematicsError, Pose2d, SwerveDriveKinematics, SwerveDriveOdometry,
    SwerveModulePosition, SwerveModuleState, Twist2d,
};

use crate::config::DriveConfig;

pub const MODULE_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GyroInputs {
    pub connected: bool,
    /// Continuous yaw (rad), counter-clockwise positive.
    pub yaw: f64,
    pub yaw_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ModuleInputs {
    /// Steering angle (rad).
    pub angle: f64,
    /// Drive wheel surface speed (m/s).
    pub velocity: f64,
    /// Accumulated drive distance (m).
    pub distance: f64,
}

impl ModuleInputs {
    pub fn position(&self) -> SwerveModulePosition {
        SwerveModulePosition::new(self.distance, self.angle)
    }

    pub fn state(&self) -> SwerveModuleState {
        SwerveModuleState::new(self.velocity, self.angle)
    }
}

pub trait GyroIo: Send {
    fn update_inputs(&mut self, now: f64, inputs: &mut GyroInputs);
}

/// One swerve module.
pub trait ModuleIo: Send {
    fn update_inputs(&mut self, now: f64, inputs: &mut ModuleInputs);
    fn set_state(&mut self, state: SwerveModuleState);
}

/// A gyro that is never connected; odometry falls back to the wheels.
#[derive(Debug, Default)]
pub struct NullGyroIo;

impl GyroIo for NullGyroIo {
    fn update_inputs(&mut self, _now: f64, inputs: &mut GyroInputs) {
        *inputs = GyroInputs::default();
    }
}

/// A module that never moves.
#[derive(Debug, Default)]
pub struct NullModuleIo;

impl ModuleIo for NullModuleIo {
    fn update_inputs(&mut self, _now: f64, inputs: &mut ModuleInputs) {
        *inputs = ModuleInputs::default();
    }

    fn set_state(&mut self, _state: SwerveModuleState) {}
}

/// Everything the drivetrain learned in one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveReading {
    /// Robot-relative displacement since the last tick. Zero if the
    /// readings were rejected.
    pub twist: Twist2d,
    /// Measured robot-relative velocity.
    pub velocity: ChassisSpeeds,
    pub gyro_connected: bool,
}

pub struct Drive {
    kinematics: SwerveDriveKinematics<MODULE_COUNT>,
    odometry: SwerveDriveOdometry<MODULE_COUNT>,
    gyro: Box<dyn GyroIo>,
    modules: Vec<Box<dyn ModuleIo>>,
    gyro_inputs: GyroInputs,
    module_inputs: [ModuleInputs; MODULE_COUNT],
    max_module_speed: f64,
}

impl Drive {
    pub fn new(
        config: &DriveConfig,
        mut gyro: Box<dyn GyroIo>,
        mut modules: Vec<Box<dyn ModuleIo>>,
        now: f64,
    ) -> anyhow::Result<Self> {
        if modules.len() != MODULE_COUNT {
            return Err(KinematicsError::ModuleCountMismatch {
                expected: MODULE_COUNT,
                found: modules.len(),
            })
            .context("building drivetrain");
        }
        let kinematics =
            SwerveDriveKinematics::new(config.module_locations).context("module layout")?;

        let mut gyro_inputs = GyroInputs::default();
        gyro.update_inputs(now, &mut gyro_inputs);
        let mut module_inputs = [ModuleInputs::default(); MODULE_COUNT];
        for (module, inputs) in modules.iter_mut().zip(module_inputs.iter_mut()) {
            module.update_inputs(now, inputs);
        }
        let mut odometry = SwerveDriveOdometry::new(
            kinematics.clone(),
            module_inputs.map(|m| m.position()),
            config.starting_pose,
        );
        if gyro_inputs.connected {
            // Seed the yaw reference so the first tick integrates a real delta.
            odometry
                .update(Some(gyro_inputs.yaw), &module_inputs.map(|m| m.position()))
                .context("seeding odometry")?;
        }

        Ok(Drive {
            kinematics,
            odometry,
            gyro,
            modules,
            gyro_inputs,
            module_inputs,
            max_module_speed: config.max_module_speed,
        })
    }

    pub fn odometry_pose(&self) -> Pose2d {
        self.odometry.pose()
    }

    /// Read every sensor and advance odometry.
    pub fn update_inputs(&mut self, now: f64) -> DriveReading {
        self.gyro.update_inputs(now, &mut self.gyro_inputs);
        for (module, inputs) in self.modules.iter_mut().zip(self.module_inputs.iter_mut()) {
            module.update_inputs(now, inputs);
        }

        let positions = self.module_inputs.map(|m| m.position());
        let yaw = self.gyro_inputs.connected.then_some(self.gyro_inputs.yaw);
        let twist = match self.odometry.update(yaw, &positions) {
            Ok(update) => update.twist,
            Err(e) => {
                warn!(error = %e, "odometry update rejected, holding pose");
                Twist2d::default()
            }
        };

        let states = self.module_inputs.map(|m| m.state());
        let mut velocity = self
            .kinematics
            .to_chassis_speeds(&states)
            .unwrap_or_else(|_| ChassisSpeeds::zero());
        if self.gyro_inputs.connected {
            velocity.omega = self.gyro_inputs.yaw_rate;
        }

        DriveReading {
            twist,
            velocity,
            gyro_connected: self.gyro_inputs.connected,
        }
    }

    /// Drive at robot-relative `speeds` for the next `dt` seconds.
    pub fn run_velocity(&mut self, speeds: ChassisSpeeds, dt: f64) {
        let speeds = if speeds.is_finite() {
            speeds.discretize(dt).unwrap_or(speeds)
        } else {
            warn!(%speeds, "non-finite drive command, stopping");
            ChassisSpeeds::zero()
        };
        let mut states = self.kinematics.to_module_states(speeds);
        SwerveDriveKinematics::<MODULE_COUNT>::desaturate_wheel_speeds(
            &mut states,
            self.max_module_speed,
        );
        for ((module, state), inputs) in self
            .modules
            .iter_mut()
            .zip(states.iter())
            .zip(self.module_inputs.iter())
        {
            // Keep stopped modules pointing where they are instead of snapping to zero.
            let state = if state.speed == 0.0 {
                SwerveModuleState::new(0.0, inputs.angle)
            } else {
                state.optimize(inputs.angle)
            };
            module.set_state(state);
        }
    }

    pub fn stop(&mut self) {
        self.run_velocity(ChassisSpeeds::zero(), 1.0);
    }
}
