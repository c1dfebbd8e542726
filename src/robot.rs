//! The robot: every subsystem wired into one fixed-order control tick.
//!
//! [`RobotContext::tick`] is the only place data moves between components,
//! always in the same order:
//!
//! 1. drivetrain sensors and odometry
//! 2. pose estimate (`predict`, then every queued vision frame)
//! 3. shot solution
//! 4. chassis command (trajectory follower or operator)
//! 5. superstructure step
//! 6. actuation
//! 7. blackboard snapshot and telemetry
//!
//! Nothing in a tick blocks. Frames that arrive mid-tick wait in the vision
//! queue for the next one.

use std::time::{Duration, Instant};

use anyhow::Context;
use spin_sleep::SpinSleeper;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use helix_common::{Alliance, CountingCache, FieldLayout};
use helix_kinematics::{ChassisSpeeds, Pose2d, SwerveDriveKinematics, angle_difference};
use helix_navigation::control::{
    DriveController, HolonomicTrajectoryController, TrajectoryFollower,
};
use helix_navigation::{
    HolonomicTrajectory, PoseEstimator, TrajectoryGenerator, VisionOutcome, VisionReceiver,
};
use helix_superstructure::{
    ActuatorCommand, MechanismInputs, MechanismIo, NullMechanismIo, ShooterModel, ShotData,
    SimMechanismIo, Superstructure, SuperstructureEvent, SuperstructureState,
};

use crate::blackboard::{Blackboard, RobotMode, State, clear_fault, raise_fault};
use crate::bus::Topic;
use crate::config::{Backend, RobotConfig};
use crate::drive::{Drive, GyroIo, MODULE_COUNT, ModuleIo, NullGyroIo, NullModuleIo};
use crate::sim::{SharedWorld, SimCamera, SimGyroIo, SimModuleIo, SimWorld};
use crate::vision::{NullVisionIo, VisionIo};

pub const GYRO_FAULT: &str = "gyro disconnected";
pub const MECHANISM_FAULT: &str = "mechanism io";

/// Alliance color is re-read from the blackboard once a second at 50 Hz.
const ALLIANCE_REFRESH_TICKS: u32 = 50;

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("tick {tick} took {elapsed:?}, longer than the {period:?} period")]
    Overrun {
        tick: u64,
        elapsed: Duration,
        period: Duration,
    },
}

/// Fail if a tick ran past its period.
pub fn check_overrun(tick: u64, elapsed: Duration, period: Duration) -> Result<(), LoopError> {
    if elapsed > period {
        return Err(LoopError::Overrun {
            tick,
            elapsed,
            period,
        });
    }
    Ok(())
}

/// Driver-station axes, each in `[-1, 1]`, from the driver's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OperatorInput {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    /// Hold the heading on the shot solution while translating.
    pub align: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoPhase {
    FollowPath,
    Shoot,
    Done,
}

/// Capabilities the control loop drives directly.
pub struct RobotIo {
    pub gyro: Box<dyn GyroIo>,
    pub modules: Vec<Box<dyn ModuleIo>>,
    pub mechanism: Box<dyn MechanismIo>,
}

/// Every hardware backend, chosen once at startup.
pub struct Backends {
    pub io: RobotIo,
    /// Polled by the camera task, not the control loop.
    pub camera: Box<dyn VisionIo>,
    /// Shared physics behind the simulated devices, if any.
    pub world: Option<SharedWorld>,
}

impl Backends {
    pub fn from_config(config: &RobotConfig) -> anyhow::Result<Self> {
        match config.control_loop.backend {
            Backend::Sim => Self::sim(config),
            Backend::Null => Ok(Self::null()),
        }
    }

    pub fn sim(config: &RobotConfig) -> anyhow::Result<Self> {
        let kinematics = SwerveDriveKinematics::new(config.drive.module_locations)
            .context("sim drivetrain layout")?;
        let world = SimWorld::new(kinematics, config.drive.starting_pose, &config.sim).shared();
        info!(seed = config.sim.seed, "using simulated hardware");
        Ok(Backends {
            io: RobotIo {
                gyro: Box::new(SimGyroIo::new(world.clone())),
                modules: (0..MODULE_COUNT)
                    .map(|i| Box::new(SimModuleIo::new(world.clone(), i)) as Box<dyn ModuleIo>)
                    .collect(),
                mechanism: Box::new(SimMechanismIo::new(config.sim.mechanism)),
            },
            camera: Box::new(SimCamera::new(world.clone(), &config.sim)),
            world: Some(world),
        })
    }

    pub fn null() -> Self {
        info!("using null hardware");
        Backends {
            io: RobotIo {
                gyro: Box::new(NullGyroIo),
                modules: (0..MODULE_COUNT)
                    .map(|_| Box::new(NullModuleIo) as Box<dyn ModuleIo>)
                    .collect(),
                mechanism: Box::new(NullMechanismIo),
            },
            camera: Box::new(NullVisionIo),
            world: None,
        }
    }
}

type AllianceSupplier = Box<dyn FnMut() -> Alliance + Send>;

pub struct RobotContext {
    period: f64,
    mode: RobotMode,
    drive: Drive,
    estimator: PoseEstimator,
    vision: VisionReceiver,
    vision_applied: u64,
    vision_rejected: u64,
    field: FieldLayout,
    alliance: CountingCache<Alliance, AllianceSupplier>,
    auto_path: HolonomicTrajectory,
    auto: AutoPhase,
    aim_tolerance: f64,
    path_controller: HolonomicTrajectoryController,
    follower: Option<TrajectoryFollower>,
    teleop: DriveController,
    operator: OperatorInput,
    shooter: ShooterModel,
    superstructure: Superstructure,
    mechanism: Box<dyn MechanismIo>,
    mechanism_inputs: MechanismInputs,
    requests: Vec<SuperstructureEvent>,
    command: ChassisSpeeds,
    blackboard: Blackboard,
    telemetry: Topic<State>,
    tick: u64,
    last_tick: f64,
}

impl RobotContext {
    /// Build every subsystem and take the first sensor readings at `now`.
    pub fn new(
        config: &RobotConfig,
        io: RobotIo,
        vision: VisionReceiver,
        blackboard: Blackboard,
        telemetry: Topic<State>,
        now: f64,
    ) -> anyhow::Result<Self> {
        let drive = Drive::new(&config.drive, io.gyro, io.modules, now)?;
        let mut estimator = PoseEstimator::new(config.estimator);
        estimator.reset_pose(config.drive.starting_pose, now);

        let auto_path = TrajectoryGenerator::new(config.trajectory)
            .and_then(|generator| generator.generate(&config.auto.waypoints, &[]))
            .context("generating the autonomous path")?;
        info!(duration = auto_path.total_time(), "autonomous path ready");

        let shooter = ShooterModel::new(config.shooter.clone(), config.field.layout)
            .context("shooter model")?;

        let alliance_source = blackboard.clone();
        let supplier: AllianceSupplier = Box::new(move || alliance_source.read().alliance);
        let alliance = CountingCache::new(supplier, ALLIANCE_REFRESH_TICKS)?;

        Ok(RobotContext {
            period: config.control_loop.period,
            mode: RobotMode::Disabled,
            drive,
            estimator,
            vision,
            vision_applied: 0,
            vision_rejected: 0,
            field: config.field.layout,
            alliance,
            auto_path,
            auto: AutoPhase::Done,
            aim_tolerance: config.auto.aim_tolerance,
            path_controller: HolonomicTrajectoryController::new(config.controller),
            follower: None,
            teleop: DriveController::new(config.teleop),
            operator: OperatorInput::default(),
            shooter,
            superstructure: Superstructure::new(config.superstructure),
            mechanism: io.mechanism,
            mechanism_inputs: MechanismInputs::default(),
            requests: Vec::new(),
            command: ChassisSpeeds::zero(),
            blackboard,
            telemetry,
            tick: 0,
            last_tick: now,
        })
    }

    pub fn auto_phase(&self) -> AutoPhase {
        self.auto
    }

    pub fn superstructure_state(&self) -> SuperstructureState {
        self.superstructure.state()
    }

    pub fn actuator_command(&self) -> ActuatorCommand {
        self.superstructure.command()
    }

    /// Switch modes. Any running path is cancelled first; entering
    /// autonomous starts the configured path from the beginning.
    pub fn set_mode(&mut self, mode: RobotMode) {
        if mode == self.mode {
            return;
        }
        info!(from = ?self.mode, to = ?mode, "mode change");
        if let Some(follower) = self.follower.as_mut() {
            self.command = follower.cancel();
        }
        self.teleop.reset();
        self.requests.clear();

        if mode == RobotMode::Autonomous {
            let alliance = *self.alliance.get();
            self.follower = Some(TrajectoryFollower::new(
                self.auto_path.clone(),
                self.path_controller,
                alliance,
                self.field,
            ));
            self.auto = AutoPhase::FollowPath;
        } else {
            self.auto = AutoPhase::Done;
        }
        self.mode = mode;
    }

    pub fn set_operator_input(&mut self, input: OperatorInput) {
        self.operator = input;
    }

    /// Queue a superstructure request for the next tick.
    pub fn request(&mut self, event: SuperstructureEvent) {
        self.requests.push(event);
    }

    /// Run one control tick at loop time `now` (s).
    pub fn tick(&mut self, now: f64) {
        let started = Instant::now();
        let dt = (now - self.last_tick).max(0.0);
        self.last_tick = now;
        self.tick += 1;

        let reading = self.drive.update_inputs(now);
        if reading.gyro_connected {
            clear_fault(&self.blackboard, GYRO_FAULT);
        } else {
            raise_fault(&self.blackboard, GYRO_FAULT);
        }

        if let Err(e) = self.estimator.predict(now, reading.twist) {
            warn!(error = %e, "estimator rejected the odometry delta");
        }
        for outcome in self.estimator.add_vision_measurements(self.vision.drain()) {
            match outcome {
                VisionOutcome::Applied { .. } => self.vision_applied += 1,
                _ => self.vision_rejected += 1,
            }
        }
        let pose = self.estimator.estimated_pose();
        let field_velocity = reading.velocity.to_field_relative(pose.theta);

        let alliance = *self.alliance.get();
        self.read_mechanism(now);
        let mut shot = self.shooter.shot_data(&pose, &field_velocity, alliance);
        if self.mechanism_inputs.fault || !reading.gyro_connected {
            shot = shot.degraded();
        }

        let enabled = self.mode != RobotMode::Disabled;
        let mut requests = std::mem::take(&mut self.requests);
        self.command = match self.mode {
            RobotMode::Disabled => ChassisSpeeds::zero(),
            RobotMode::Autonomous => {
                self.autonomous_command(now, pose, field_velocity, &shot, dt, &mut requests)
            }
            RobotMode::Teleop => self.teleop_command(pose.theta, &shot, alliance, dt),
        };

        let actuator = self
            .superstructure
            .step(now, enabled, &requests, &shot, &self.mechanism_inputs);
        if let Err(e) = self.mechanism.apply(&actuator) {
            warn!(error = %e, "mechanism command failed");
            raise_fault(&self.blackboard, MECHANISM_FAULT);
        }

        if enabled {
            self.drive.run_velocity(self.command, self.period);
        } else {
            self.drive.stop();
        }

        self.publish(now, pose, field_velocity, shot, started.elapsed());
    }

    /// Drive the loop in real time for `duration` seconds, then disable.
    ///
    /// # Errors
    ///
    /// Returns `LoopError::Overrun` as soon as one tick takes longer than the
    /// period. The robot is disabled before returning either way.
    pub fn run(&mut self, duration: f64) -> Result<(), LoopError> {
        let period = Duration::from_secs_f64(self.period);
        let sleeper = SpinSleeper::new(100_000);
        let start = Instant::now();
        let mut deadline = start;
        let outcome = loop {
            let tick_start = Instant::now();
            let now = tick_start.duration_since(start).as_secs_f64();
            if now >= duration {
                break Ok(());
            }
            self.tick(now);
            if let Err(e) = check_overrun(self.tick, tick_start.elapsed(), period) {
                error!(error = %e, "control loop overrun");
                break Err(e);
            }

            deadline += period;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                // Started late; pace from here instead of bursting to catch up.
                deadline = Instant::now();
            } else {
                sleeper.sleep(remaining);
            }
        };

        self.set_mode(RobotMode::Disabled);
        self.tick(start.elapsed().as_secs_f64());
        info!(ticks = self.tick, "control loop stopped");
        outcome
    }

    fn read_mechanism(&mut self, now: f64) {
        match self.mechanism.update_inputs(now, &mut self.mechanism_inputs) {
            Ok(()) if !self.mechanism_inputs.fault => {
                clear_fault(&self.blackboard, MECHANISM_FAULT)
            }
            Ok(()) => raise_fault(&self.blackboard, MECHANISM_FAULT),
            Err(e) => {
                warn!(error = %e, "mechanism read failed, treating as faulted");
                self.mechanism_inputs.fault = true;
                raise_fault(&self.blackboard, MECHANISM_FAULT);
            }
        }
    }

    fn autonomous_command(
        &mut self,
        now: f64,
        pose: Pose2d,
        field_velocity: ChassisSpeeds,
        shot: &ShotData,
        dt: f64,
        requests: &mut Vec<SuperstructureEvent>,
    ) -> ChassisSpeeds {
        match self.auto {
            AutoPhase::FollowPath => {
                let Some(follower) = self.follower.as_mut() else {
                    self.auto = AutoPhase::Done;
                    return ChassisSpeeds::zero();
                };
                let command = follower.update(now, pose, Some(field_velocity));
                if follower.is_finished() {
                    info!(%pose, "autonomous path complete, aiming");
                    self.teleop.reset();
                    self.auto = AutoPhase::Shoot;
                }
                command
            }
            AutoPhase::Shoot => {
                let command = self
                    .teleop
                    .align_heading(0.0, 0.0, shot.robot_heading, pose.theta, dt);
                let aimed =
                    angle_difference(shot.robot_heading, pose.theta).abs() <= self.aim_tolerance;
                match self.superstructure.state() {
                    SuperstructureState::Holding => requests.push(SuperstructureEvent::RequestAim),
                    SuperstructureState::Stow if self.mechanism_inputs.note_present => {
                        requests.push(SuperstructureEvent::RequestAim)
                    }
                    SuperstructureState::Stow => {
                        info!("autonomous routine complete");
                        self.auto = AutoPhase::Done;
                        return ChassisSpeeds::zero();
                    }
                    SuperstructureState::Aim if aimed => {
                        requests.push(SuperstructureEvent::AutoAimReady)
                    }
                    _ => {}
                }
                command
            }
            AutoPhase::Done => ChassisSpeeds::zero(),
        }
    }

    fn teleop_command(
        &mut self,
        heading: f64,
        shot: &ShotData,
        alliance: Alliance,
        dt: f64,
    ) -> ChassisSpeeds {
        let input = self.operator;
        // Red drivers face the other way down the field.
        let (x, y) = match alliance {
            Alliance::Blue => (input.x, input.y),
            Alliance::Red => (-input.x, -input.y),
        };
        if input.align {
            self.teleop.align_heading(x, y, shot.robot_heading, heading, dt)
        } else {
            self.teleop.drive(x, y, input.theta, heading)
        }
    }

    fn publish(
        &mut self,
        now: f64,
        pose: Pose2d,
        velocity: ChassisSpeeds,
        shot: ShotData,
        elapsed: Duration,
    ) {
        let snapshot = {
            let mut state = self.blackboard.write();
            state.tick = self.tick;
            state.time = now;
            state.mode = self.mode;
            state.pose = pose;
            state.odometry_pose = self.estimator.odometry_pose();
            state.velocity = velocity;
            state.command = self.command;
            state.trajectory = self.follower.as_ref().map(|f| f.progress());
            state.shot = shot;
            state.superstructure = self.superstructure.state();
            state.vision_applied = self.vision_applied;
            state.vision_rejected = self.vision_rejected;
            state.tick_duration = elapsed.as_secs_f64();
            state.clone()
        };
        let receivers = self.telemetry.publish(snapshot);
        debug!(tick = self.tick, receivers, "telemetry published");
    }
}
