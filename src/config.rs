use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use helix_common::{Alliance, FieldLayout};
use helix_kinematics::{Pose2d, Translation2d};
use helix_navigation::control::{DriveControllerConfig, TrajectoryControllerConfig};
use helix_navigation::{PoseEstimatorConfig, TrajectoryConfig, Waypoint};
use helix_superstructure::{ShooterConfig, SimMechanismConfig, SuperstructureConfig};

use crate::drive::MODULE_COUNT;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Environment variables with this prefix override file values, with `__`
/// separating nested keys: `HELIX_LOOP__PERIOD=0.01`.
const ENV_PREFIX: &str = "HELIX";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sim,
    Null,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Control period (s).
    pub period: f64,
    /// How long to run before disabling and exiting (s).
    pub duration: f64,
    pub backend: Backend,
    /// Telemetry topic capacity, in snapshots.
    pub telemetry_capacity: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        LoopConfig {
            period: 0.02,
            duration: 8.0,
            backend: Backend::Sim,
            telemetry_capacity: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Module positions relative to the robot center (m).
    pub module_locations: [Translation2d; MODULE_COUNT],
    /// Fastest a single wheel may be commanded (m/s).
    pub max_module_speed: f64,
    pub starting_pose: Pose2d,
}

impl Default for DriveConfig {
    fn default() -> Self {
        let half = 0.29;
        DriveConfig {
            module_locations: [
                Translation2d::new(half, half),
                Translation2d::new(half, -half),
                Translation2d::new(-half, half),
                Translation2d::new(-half, -half),
            ],
            max_module_speed: 4.5,
            starting_pose: Pose2d::new(1.4, 5.55, 0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    pub alliance: Alliance,
    pub layout: FieldLayout,
}

impl Default for FieldConfig {
    fn default() -> Self {
        FieldConfig {
            alliance: Alliance::Blue,
            layout: FieldLayout::default(),
        }
    }
}

/// The autonomous routine: drive the path, then aim and fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoConfig {
    pub waypoints: Vec<Waypoint>,
    /// Heading error below which automatic aiming reports ready (rad).
    pub aim_tolerance: f64,
}

impl Default for AutoConfig {
    fn default() -> Self {
        AutoConfig {
            waypoints: vec![
                Waypoint::from_pose(Pose2d::new(1.4, 5.55, 0.0)).with_rotation(0.0),
                Waypoint::from_pose(Pose2d::new(3.2, 5.0, 0.0)).with_rotation(0.2),
            ],
            aim_tolerance: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed for every noise source; fixed seeds make runs repeatable.
    pub seed: u64,
    /// Relative wheel slip noise on each module distance.
    pub wheel_slip: f64,
    /// Module velocity slew (m/s²).
    pub module_acceleration: f64,
    pub vision_period: f64,
    pub vision_latency: f64,
    /// Uniform translation noise on vision poses (m).
    pub vision_noise: f64,
    pub vision_heading_noise: f64,
    pub vision_trust: f64,
    pub mechanism: SimMechanismConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            seed: 4145,
            wheel_slip: 0.02,
            module_acceleration: 12.0,
            vision_period: 0.1,
            vision_latency: 0.06,
            vision_noise: 0.02,
            vision_heading_noise: 0.01,
            vision_trust: 0.5,
            mechanism: SimMechanismConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RobotConfig {
    #[serde(rename = "loop")]
    pub control_loop: LoopConfig,
    pub drive: DriveConfig,
    pub estimator: PoseEstimatorConfig,
    pub trajectory: TrajectoryConfig,
    pub controller: TrajectoryControllerConfig,
    pub teleop: DriveControllerConfig,
    pub shooter: ShooterConfig,
    pub superstructure: SuperstructureConfig,
    pub field: FieldConfig,
    pub auto: AutoConfig,
    pub sim: SimConfig,
}

/// Load the robot configuration from `path` (or [`DEFAULT_CONFIG_PATH`]),
/// layered under `HELIX_*` environment overrides.
///
/// An explicitly given file must exist; the default file is optional so the
/// robot can start on built-in defaults.
pub fn load_config(path: Option<&str>) -> Result<RobotConfig, ConfigError> {
    let (path, required) = match path {
        Some(path) => (path, true),
        None => (DEFAULT_CONFIG_PATH, false),
    };
    info!(path, "loading configuration");

    let settings = Config::builder()
        .add_source(File::new(path, FileFormat::Toml).required(required))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .and_then(|config| config.try_deserialize::<RobotConfig>());

    match settings {
        Ok(config) => {
            info!(
                backend = ?config.control_loop.backend,
                period = config.control_loop.period,
                alliance = ?config.field.alliance,
                "configuration loaded"
            );
            Ok(config)
        }
        Err(e) => {
            error!("failed to load configuration: {e}");
            Err(e)
        }
    }
}
