mod blackboard;
mod bus;
mod config;
mod drive;
mod robot;
mod sim;
mod vision;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use helix_navigation::vision_channel;

use crate::blackboard::{Blackboard, RobotMode, State, raise_fault, set_alliance};
use crate::bus::Topic;
use crate::config::load_config;
use crate::robot::{Backends, RobotContext};

/// How often the camera task checks for new frames.
const CAMERA_POLL: Duration = Duration::from_millis(5);

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config_path = std::env::args().nth(1);
    let config = load_config(config_path.as_deref()).context("loading configuration")?;
    info!("Helix robot core starting");

    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;

    let bb: Blackboard = Arc::default();
    set_alliance(&bb, config.field.alliance);
    let telemetry: Topic<State> = Topic::new("telemetry", config.control_loop.telemetry_capacity);
    let (vision_tx, vision_rx) = vision_channel();

    let Backends { io, camera, world } = Backends::from_config(&config)?;
    let mut ctx = RobotContext::new(&config, io, vision_rx, bb.clone(), telemetry.clone(), 0.0)?;

    runtime.spawn(async move {
        if let Err(e) = crate::vision::run_camera(camera, vision_tx, CAMERA_POLL).await {
            error!("camera task failed: {e:?}");
        }
    });
    runtime.spawn(observer(telemetry.subscribe()));

    let duration = config.control_loop.duration;
    info!(duration, "spawning control thread");
    let control = std::thread::Builder::new()
        .name("control".into())
        .spawn(move || {
            ctx.set_mode(RobotMode::Autonomous);
            ctx.run(duration)
        })?;

    let outcome = match control.join() {
        Ok(outcome) => outcome,
        Err(_) => anyhow::bail!("control thread panicked"),
    };
    if let Err(e) = &outcome {
        raise_fault(&bb, "loop overrun");
        error!("control loop aborted: {e}");
    }

    if let Some(world) = &world {
        info!(truth = %world.lock().truth(), "simulated ground truth at exit");
    }
    let last = crate::blackboard::snapshot(&bb);
    info!(
        ticks = last.tick,
        pose = %last.pose,
        superstructure = %last.superstructure,
        faults = ?last.faults,
        "Helix robot core stopped"
    );
    runtime.shutdown_timeout(Duration::from_millis(100));
    outcome.map_err(Into::into)
}

/// Log a line per second of robot state, like a dashboard would show.
async fn observer(mut rx: tokio::sync::broadcast::Receiver<Arc<State>>) {
    let mut last_logged = f64::NEG_INFINITY;
    loop {
        match rx.recv().await {
            Ok(state) => {
                if state.time - last_logged < 1.0 {
                    continue;
                }
                last_logged = state.time;
                info!(
                    time = %format!("{:.2}", state.time),
                    mode = ?state.mode,
                    pose = %state.pose,
                    odometry = %state.odometry_pose,
                    speed = %format!("{:.2}", state.velocity.linear_magnitude()),
                    command = %state.command,
                    path = ?state.trajectory.map(|p| (p.elapsed, p.total_time, p.finished)),
                    superstructure = %state.superstructure,
                    confidence = %format!("{:.2}", state.shot.confidence),
                    vision_applied = state.vision_applied,
                    vision_rejected = state.vision_rejected,
                    tick_ms = %format!("{:.3}", state.tick_duration * 1e3),
                    "robot"
                );
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "telemetry observer fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}
