use parking_lot::RwLock;
use std::sync::Arc;

use helix_common::Alliance;
use helix_kinematics::{ChassisSpeeds, Pose2d};
use helix_navigation::control::FollowerProgress;
use helix_superstructure::{ShotData, SuperstructureState};

/// What the robot is currently doing, as seen by observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RobotMode {
    #[default]
    Disabled,
    Autonomous,
    Teleop,
}

/// Read-only picture of the robot at the end of one tick.
#[derive(Debug, Clone, Default)]
pub struct State {
    pub tick: u64,
    pub time: f64,
    pub mode: RobotMode,
    pub alliance: Alliance,
    pub pose: Pose2d,
    pub odometry_pose: Pose2d,
    /// Measured, field-relative.
    pub velocity: ChassisSpeeds,
    /// Last command sent to the drivetrain, robot-relative.
    pub command: ChassisSpeeds,
    pub trajectory: Option<FollowerProgress>,
    pub shot: ShotData,
    pub superstructure: SuperstructureState,
    pub vision_applied: u64,
    pub vision_rejected: u64,
    /// Compute time of the tick (s).
    pub tick_duration: f64,
    pub faults: Vec<String>,
}

pub type Blackboard = Arc<RwLock<State>>;

pub fn snapshot(bb: &Blackboard) -> State {
    (*bb.read()).clone()
}

pub fn raise_fault(bb: &Blackboard, msg: &str) {
    let mut g = bb.write();
    if !g.faults.iter().any(|s| s == msg) {
        g.faults.push(msg.to_string());
    }
}

pub fn clear_fault(bb: &Blackboard, msg: &str) {
    bb.write().faults.retain(|s| s != msg);
}

/// Change the alliance the robot plays for, as a driver station would.
pub fn set_alliance(bb: &Blackboard, alliance: Alliance) {
    bb.write().alliance = alliance;
}
