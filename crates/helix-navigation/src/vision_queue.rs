//! Hand-off of vision measurements from asynchronous producers to the
//! control loop.
//!
//! Producers (a camera task, a network listener) hold cloned
//! [`VisionSender`]s and may push at any rate. The control loop owns the single
//! [`VisionReceiver`] and drains it once per tick, after `predict`, so a batch
//! is applied entirely within one tick. The channel is unbounded: a
//! measurement is never dropped because the loop was busy, only later for
//! being older than the estimator's history.

use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{NavigationError, Result};
use crate::pose_estimator::VisionMeasurement;

/// Create a connected sender/receiver pair.
pub fn vision_channel() -> (VisionSender, VisionReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (VisionSender { tx }, VisionReceiver { rx })
}

/// Producer side; cheap to clone.
#[derive(Debug, Clone)]
pub struct VisionSender {
    tx: mpsc::UnboundedSender<VisionMeasurement>,
}

impl VisionSender {
    /// Queue a measurement. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::VisionQueueClosed` once the receiver is gone.
    pub fn send(&self, measurement: VisionMeasurement) -> Result<()> {
        self.tx.send(measurement).map_err(|_| {
            warn!("vision measurement sent after the control loop stopped");
            NavigationError::VisionQueueClosed
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side, owned by the control loop.
#[derive(Debug)]
pub struct VisionReceiver {
    rx: mpsc::UnboundedReceiver<VisionMeasurement>,
}

impl VisionReceiver {
    /// Take everything queued so far without waiting.
    pub fn drain(&mut self) -> Vec<VisionMeasurement> {
        let mut batch = Vec::new();
        while let Ok(measurement) = self.rx.try_recv() {
            batch.push(measurement);
        }
        batch
    }

    /// Wait for the next measurement; `None` once every sender is dropped.
    pub async fn recv(&mut self) -> Option<VisionMeasurement> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helix_kinematics::Pose2d;

    fn measurement(timestamp: f64) -> VisionMeasurement {
        VisionMeasurement {
            pose: Pose2d::new(timestamp, 0.0, 0.0),
            timestamp,
            trust: 0.8,
        }
    }

    #[tokio::test]
    async fn test_concurrent_producers_lose_nothing() {
        let (tx, mut rx) = vision_channel();
        let mut handles = Vec::new();
        for producer in 0..4 {
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..250 {
                    tx.send(measurement((producer * 1000 + i) as f64)).unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let batch = rx.drain();
        assert_eq!(batch.len(), 1000);
        assert!(rx.drain().is_empty());
    }

    #[tokio::test]
    async fn test_recv_and_closed_sender() {
        let (tx, mut rx) = vision_channel();
        tx.send(measurement(1.0)).unwrap();
        assert_eq!(rx.recv().await, Some(measurement(1.0)));
        drop(rx);
        assert!(tx.is_closed());
        assert_eq!(tx.send(measurement(2.0)), Err(NavigationError::VisionQueueClosed));
    }
}
