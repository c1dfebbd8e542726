//! Pose cameras and the task that forwards their frames to the control loop.

use std::time::Duration;

use tracing::{debug, info};

use helix_navigation::{VisionMeasurement, VisionSender};

/// A source of field-pose observations.
pub trait VisionIo: Send {
    /// Frames that became available since the last poll, in any order.
    fn poll(&mut self) -> Vec<VisionMeasurement>;
}

/// No camera attached.
#[derive(Debug, Default)]
pub struct NullVisionIo;

impl VisionIo for NullVisionIo {
    fn poll(&mut self) -> Vec<VisionMeasurement> {
        Vec::new()
    }
}

/// Poll `camera` every `period` and queue its frames for the control loop.
///
/// Returns once the control loop has dropped its receiver.
pub async fn run_camera(
    mut camera: Box<dyn VisionIo>,
    sender: VisionSender,
    period: Duration,
) -> anyhow::Result<()> {
    info!(?period, "camera task started");
    let mut tick = tokio::time::interval(period);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tick.tick().await;
        if sender.is_closed() {
            break;
        }
        for measurement in camera.poll() {
            if sender.send(measurement).is_err() {
                debug!("control loop gone mid-batch");
                break;
            }
        }
    }
    info!("camera task stopped");
    Ok(())
}
