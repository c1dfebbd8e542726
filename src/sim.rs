//! Simulated drivetrain and camera.
//!
//! One [`SimWorld`] holds the true robot pose. The gyro and module handles
//! read from it and the camera observes it, so every sensor agrees on the
//! same physics. The world advances lazily to whatever time the first
//! sensor read of a tick asks for.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use helix_kinematics::{ChassisSpeeds, Pose2d, SwerveDriveKinematics, SwerveModuleState, Twist2d};
use helix_navigation::VisionMeasurement;

use crate::config::SimConfig;
use crate::drive::{GyroInputs, GyroIo, MODULE_COUNT, ModuleInputs, ModuleIo};
use crate::vision::VisionIo;

pub type SharedWorld = Arc<Mutex<SimWorld>>;

pub struct SimWorld {
    kinematics: SwerveDriveKinematics<MODULE_COUNT>,
    time: Option<f64>,
    truth: Pose2d,
    /// Unwrapped heading, as a gyro reports it.
    yaw: f64,
    yaw_rate: f64,
    commanded: [SwerveModuleState; MODULE_COUNT],
    actual: [SwerveModuleState; MODULE_COUNT],
    distances: [f64; MODULE_COUNT],
    module_acceleration: f64,
    wheel_slip: f64,
    rng: StdRng,
}

impl SimWorld {
    pub fn new(
        kinematics: SwerveDriveKinematics<MODULE_COUNT>,
        starting_pose: Pose2d,
        config: &SimConfig,
    ) -> Self {
        SimWorld {
            kinematics,
            time: None,
            truth: starting_pose,
            yaw: starting_pose.theta,
            yaw_rate: 0.0,
            commanded: [SwerveModuleState::default(); MODULE_COUNT],
            actual: [SwerveModuleState::default(); MODULE_COUNT],
            distances: [0.0; MODULE_COUNT],
            module_acceleration: config.module_acceleration.abs(),
            wheel_slip: config.wheel_slip.abs(),
            rng: StdRng::seed_from_u64(config.seed),
        }
    }

    pub fn shared(self) -> SharedWorld {
        Arc::new(Mutex::new(self))
    }

    pub fn truth(&self) -> Pose2d {
        self.truth
    }

    /// Simulation time, once anything has read the world.
    pub fn time(&self) -> Option<f64> {
        self.time
    }

    /// Bring the world forward to `now`. Calls at or before the current
    /// time are no-ops.
    pub fn advance(&mut self, now: f64) {
        let dt = match self.time {
            Some(time) if now > time => now - time,
            Some(_) => return,
            None => {
                self.time = Some(now);
                return;
            }
        };
        self.time = Some(now);

        let max_change = self.module_acceleration * dt;
        for (actual, commanded) in self.actual.iter_mut().zip(self.commanded.iter()) {
            // Steering is treated as instantaneous; only wheel speed slews.
            actual.angle = commanded.angle;
            actual.speed += (commanded.speed - actual.speed).clamp(-max_change, max_change);
        }

        let speeds = self
            .kinematics
            .to_chassis_speeds(&self.actual)
            .unwrap_or_else(|_| ChassisSpeeds::zero());
        self.truth = self
            .truth
            .exp(&Twist2d::new(speeds.vx * dt, speeds.vy * dt, speeds.omega * dt));
        self.yaw += speeds.omega * dt;
        self.yaw_rate = speeds.omega;

        let slip = self.wheel_slip;
        for (distance, actual) in self.distances.iter_mut().zip(self.actual.iter()) {
            let noise = 1.0 + self.rng.random_range(-slip..=slip);
            *distance += actual.speed * dt * noise;
        }
        trace!(time = now, truth = %self.truth, "sim world advanced");
    }
}

/// Gyro reading the world's true heading.
pub struct SimGyroIo {
    world: SharedWorld,
}

impl SimGyroIo {
    pub fn new(world: SharedWorld) -> Self {
        SimGyroIo { world }
    }
}

impl GyroIo for SimGyroIo {
    fn update_inputs(&mut self, now: f64, inputs: &mut GyroInputs) {
        let mut world = self.world.lock();
        world.advance(now);
        *inputs = GyroInputs {
            connected: true,
            yaw: world.yaw,
            yaw_rate: world.yaw_rate,
        };
    }
}

pub struct SimModuleIo {
    world: SharedWorld,
    index: usize,
}

impl SimModuleIo {
    pub fn new(world: SharedWorld, index: usize) -> Self {
        debug_assert!(index < MODULE_COUNT);
        SimModuleIo { world, index }
    }
}

impl ModuleIo for SimModuleIo {
    fn update_inputs(&mut self, now: f64, inputs: &mut ModuleInputs) {
        let mut world = self.world.lock();
        world.advance(now);
        let actual = world.actual[self.index];
        *inputs = ModuleInputs {
            angle: actual.angle,
            velocity: actual.speed,
            distance: world.distances[self.index],
        };
    }

    fn set_state(&mut self, state: SwerveModuleState) {
        self.world.lock().commanded[self.index] = state;
    }
}

/// A pose camera with fixed frame rate, latency and uniform noise.
///
/// Frames are captured at world time and only handed out once the latency
/// has passed, stamped with their capture time.
pub struct SimCamera {
    world: SharedWorld,
    period: f64,
    latency: f64,
    noise: f64,
    heading_noise: f64,
    trust: f64,
    rng: StdRng,
    last_capture: Option<f64>,
    in_flight: VecDeque<VisionMeasurement>,
}

impl SimCamera {
    pub fn new(world: SharedWorld, config: &SimConfig) -> Self {
        SimCamera {
            world,
            period: config.vision_period.max(0.0),
            latency: config.vision_latency.max(0.0),
            noise: config.vision_noise.abs(),
            heading_noise: config.vision_heading_noise.abs(),
            trust: config.vision_trust,
            // Separate stream from the wheels so changing one doesn't shift the other.
            rng: StdRng::seed_from_u64(config.seed.wrapping_add(1)),
            last_capture: None,
            in_flight: VecDeque::new(),
        }
    }

    fn capture(&mut self, time: f64, truth: Pose2d) {
        let (n, h) = (self.noise, self.heading_noise);
        let pose = Pose2d::new(
            truth.x + self.rng.random_range(-n..=n),
            truth.y + self.rng.random_range(-n..=n),
            truth.theta + self.rng.random_range(-h..=h),
        );
        self.in_flight.push_back(VisionMeasurement {
            pose,
            timestamp: time,
            trust: self.trust,
        });
        self.last_capture = Some(time);
    }
}

impl VisionIo for SimCamera {
    fn poll(&mut self) -> Vec<VisionMeasurement> {
        let (time, truth) = {
            let world = self.world.lock();
            match world.time() {
                Some(time) => (time, world.truth()),
                None => return Vec::new(),
            }
        };

        if self.last_capture.is_none_or(|last| time - last >= self.period) {
            self.capture(time, truth);
        }

        let mut ready = Vec::new();
        while let Some(front) = self.in_flight.front() {
            if front.timestamp + self.latency > time {
                break;
            }
            ready.extend(self.in_flight.pop_front());
        }
        if !ready.is_empty() {
            debug!(count = ready.len(), "sim camera frames delivered");
        }
        ready
    }
}
