//! Odometry and vision fusion.
//!
//! The estimator keeps two poses: the pure odometry integration, and the
//! best estimate. Every tick [`PoseEstimator::predict`] composes the odometry
//! twist onto both and records the odometry pose in a short, time-ordered
//! history. When a vision pose arrives with some latency, the odometry pose at
//! its capture time is interpolated from that history, the motion since then
//! is replayed on top of the vision pose, and the current estimate is pulled
//! toward the result by an amount derived from the measurement's trust.
//!
//! This is a one-step explicit filter: history is never rewritten, only the
//! current estimate moves.

use std::collections::VecDeque;

use helix_common::FieldLayout;
use helix_kinematics::{Pose2d, Twist2d};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{NavigationError, Result};

/// One externally computed pose sample.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisionMeasurement {
    /// Measured field pose.
    pub pose: Pose2d,
    /// Capture time, same time base as the control loop (s).
    pub timestamp: f64,
    /// Confidence in `[0, 1]`; lower trust means a weaker correction.
    pub trust: f64,
}

/// An odometry-only pose recorded at a past tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseHistorySample {
    pub timestamp: f64,
    pub pose: Pose2d,
}

/// What happened to a vision measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VisionOutcome {
    /// Fused into the estimate with blend weight `weight`.
    Applied { weight: f64 },
    /// Captured before the oldest retained history sample.
    Stale,
    /// No odometry has been recorded yet, so there is nothing to reconcile against.
    NoHistory,
    /// Pose, timestamp or trust was not finite.
    Invalid,
}

/// Shrinks small translational corrections so the estimate does not chatter
/// around a stationary robot.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AntiJitter {
    /// Corrections shorter than this are scaled (m).
    pub threshold: f64,
    /// Scale applied to those corrections.
    pub factor: f64,
}

impl Default for AntiJitter {
    fn default() -> Self {
        AntiJitter {
            threshold: 0.1143,
            factor: 0.2,
        }
    }
}

/// Keeps the fused estimate inside the field walls.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldClamp {
    pub field: FieldLayout,
    /// Half the robot's shorter side (m).
    pub margin: f64,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseEstimatorConfig {
    /// How long odometry samples are retained (s).
    pub history_length: f64,
    /// Blend weight is `trust ^ trust_exponent`.
    pub trust_exponent: f64,
    pub anti_jitter: Option<AntiJitter>,
    pub field_clamp: Option<FieldClamp>,
}

impl Default for PoseEstimatorConfig {
    fn default() -> Self {
        PoseEstimatorConfig {
            history_length: 0.3,
            trust_exponent: 2.0,
            anti_jitter: None,
            field_clamp: None,
        }
    }
}

/// Fuses odometry with delayed vision poses.
#[derive(Debug, Clone)]
pub struct PoseEstimator {
    config: PoseEstimatorConfig,
    odometry_pose: Pose2d,
    estimate: Pose2d,
    history: VecDeque<PoseHistorySample>,
}

impl PoseEstimator {
    pub fn new(config: PoseEstimatorConfig) -> Self {
        PoseEstimator {
            config,
            odometry_pose: Pose2d::default(),
            estimate: Pose2d::default(),
            history: VecDeque::new(),
        }
    }

    /// Current best pose. Pure read.
    pub fn estimated_pose(&self) -> Pose2d {
        self.estimate
    }

    /// Pure odometry integration since the last reset.
    pub fn odometry_pose(&self) -> Pose2d {
        self.odometry_pose
    }

    /// Retained odometry samples, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &PoseHistorySample> {
        self.history.iter()
    }

    /// Re-seed both poses and drop all history.
    pub fn reset_pose(&mut self, pose: Pose2d, timestamp: f64) {
        debug!(%pose, timestamp, "pose estimator reset");
        self.odometry_pose = pose;
        self.estimate = pose;
        self.history.clear();
        self.history.push_back(PoseHistorySample { timestamp, pose });
    }

    /// Apply one tick of odometry.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::InvalidOdometry` for a non-finite twist or a
    /// timestamp older than the newest sample. Both poses are held.
    pub fn predict(&mut self, timestamp: f64, twist: Twist2d) -> Result<Pose2d> {
        if !twist.is_finite() || !timestamp.is_finite() {
            return Err(NavigationError::InvalidOdometry("non-finite twist or timestamp"));
        }
        if let Some(newest) = self.history.back() {
            if timestamp < newest.timestamp {
                return Err(NavigationError::InvalidOdometry("timestamp went backwards"));
            }
        }

        self.odometry_pose = self.odometry_pose.exp(&twist);
        self.estimate = self.clamp_to_field(self.estimate.exp(&twist));
        self.history.push_back(PoseHistorySample {
            timestamp,
            pose: self.odometry_pose,
        });

        let horizon = timestamp - self.config.history_length;
        while self.history.len() > 1
            && self.history.front().is_some_and(|s| s.timestamp < horizon)
        {
            self.history.pop_front();
        }
        Ok(self.estimate)
    }

    /// Fuse a vision pose into the current estimate.
    pub fn add_vision_measurement(&mut self, measurement: &VisionMeasurement) -> VisionOutcome {
        if !measurement.pose.is_finite()
            || !measurement.timestamp.is_finite()
            || !measurement.trust.is_finite()
        {
            return VisionOutcome::Invalid;
        }
        let (Some(oldest), Some(newest)) = (self.history.front(), self.history.back()) else {
            return VisionOutcome::NoHistory;
        };
        if measurement.timestamp < oldest.timestamp {
            debug!(
                timestamp = measurement.timestamp,
                oldest = oldest.timestamp,
                "discarding stale vision measurement"
            );
            return VisionOutcome::Stale;
        }

        let odometry_at_capture = if measurement.timestamp >= newest.timestamp {
            self.odometry_pose
        } else {
            self.sample_history(measurement.timestamp)
        };

        // Motion since capture, replayed on top of the vision pose.
        let since_capture = self.odometry_pose.relative_to(&odometry_at_capture);
        let implied = measurement.pose.transform_by(&since_capture);

        let weight = blend_weight(measurement.trust, self.config.trust_exponent);
        let mut translation_scale = weight;
        if let Some(anti_jitter) = self.config.anti_jitter {
            if self.estimate.translation().distance(&implied.translation())
                < anti_jitter.threshold
            {
                translation_scale *= anti_jitter.factor;
            }
        }

        let fused = if weight >= 1.0 && translation_scale >= 1.0 {
            implied
        } else {
            let correction = self.estimate.log(&implied);
            self.estimate.exp(&Twist2d::new(
                correction.dx * translation_scale,
                correction.dy * translation_scale,
                correction.dtheta * weight,
            ))
        };
        trace!(weight, %fused, "vision measurement fused");
        self.estimate = self.clamp_to_field(fused);
        VisionOutcome::Applied { weight }
    }

    /// Fuse a batch in capture-time order.
    pub fn add_vision_measurements(
        &mut self,
        mut measurements: Vec<VisionMeasurement>,
    ) -> Vec<VisionOutcome> {
        measurements.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        measurements
            .iter()
            .map(|m| self.add_vision_measurement(m))
            .collect()
    }

    /// Odometry pose at `timestamp`, which must lie within the history.
    fn sample_history(&self, timestamp: f64) -> Pose2d {
        let upper = self.history.partition_point(|s| s.timestamp <= timestamp);
        if upper == 0 {
            return self.history[0].pose;
        }
        if upper >= self.history.len() {
            return self.odometry_pose;
        }
        let before = &self.history[upper - 1];
        let after = &self.history[upper];
        let span = after.timestamp - before.timestamp;
        if span <= 0.0 {
            return after.pose;
        }
        before
            .pose
            .interpolate(&after.pose, (timestamp - before.timestamp) / span)
    }

    fn clamp_to_field(&self, pose: Pose2d) -> Pose2d {
        match self.config.field_clamp {
            Some(clamp) => Pose2d::from_translation(
                clamp.field.clamp(pose.translation(), clamp.margin),
                pose.theta,
            ),
            None => pose,
        }
    }
}

/// Correction weight for a measurement of the given trust.
///
/// Monotonic in trust, 0 for no trust and 1 for full trust.
pub fn blend_weight(trust: f64, exponent: f64) -> f64 {
    trust.clamp(0.0, 1.0).powf(exponent.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use helix_kinematics::Translation2d;

    fn seeded() -> PoseEstimator {
        let mut estimator = PoseEstimator::new(PoseEstimatorConfig::default());
        estimator.reset_pose(Pose2d::default(), 0.0);
        estimator
    }

    fn assert_pose_eq(a: Pose2d, b: Pose2d) {
        assert_abs_diff_eq!(a.x, b.x, epsilon = 1e-9);
        assert_abs_diff_eq!(a.y, b.y, epsilon = 1e-9);
        assert_abs_diff_eq!(a.theta, b.theta, epsilon = 1e-9);
    }

    #[test]
    fn test_without_vision_estimate_is_odometry() {
        let mut estimator = seeded();
        let mut expected = Pose2d::default();
        for i in 1..=200 {
            let twist = Twist2d::new(0.03, 0.01 * (i as f64 * 0.1).sin(), 0.04);
            expected = expected.exp(&twist);
            estimator.predict(i as f64 * 0.02, twist).unwrap();
        }
        assert_pose_eq(estimator.estimated_pose(), expected);
        assert_pose_eq(estimator.estimated_pose(), estimator.odometry_pose());
    }

    #[test]
    fn test_full_trust_zero_latency_collapses_to_vision() {
        let mut estimator = seeded();
        estimator.predict(0.02, Twist2d::new(0.1, 0.0, 0.0)).unwrap();
        let vision = Pose2d::new(3.0, -1.0, 2.5);
        let outcome = estimator.add_vision_measurement(&VisionMeasurement {
            pose: vision,
            timestamp: 0.02,
            trust: 1.0,
        });
        assert_eq!(outcome, VisionOutcome::Applied { weight: 1.0 });
        assert_eq!(estimator.estimated_pose(), vision);
    }

    #[test]
    fn test_stale_measurement_is_noop() {
        let mut estimator = seeded();
        for i in 1..=50 {
            estimator.predict(i as f64 * 0.02, Twist2d::new(0.02, 0.0, 0.0)).unwrap();
        }
        let before = estimator.estimated_pose();
        let outcome = estimator.add_vision_measurement(&VisionMeasurement {
            pose: Pose2d::new(9.0, 9.0, 1.0),
            timestamp: 0.1,
            trust: 1.0,
        });
        assert_eq!(outcome, VisionOutcome::Stale);
        assert_eq!(estimator.estimated_pose(), before);
    }

    #[test]
    fn test_history_is_bounded_and_ordered() {
        let mut estimator = seeded();
        for i in 1..=500 {
            estimator.predict(i as f64 * 0.02, Twist2d::new(0.01, 0.0, 0.0)).unwrap();
        }
        let samples: Vec<_> = estimator.history().copied().collect();
        assert!(samples.len() <= 17);
        assert!(samples.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert!(samples[0].timestamp >= 10.0 - 0.3 - 1e-9);
    }

    #[test]
    fn test_latent_measurement_replays_motion_since_capture() {
        let mut estimator = seeded();
        for i in 1..=10 {
            estimator.predict(i as f64 * 0.02, Twist2d::new(0.05, 0.0, 0.0)).unwrap();
        }
        // Captured at t = 0.1 (odometry x = 0.25), robot has moved another 0.25 m since.
        let outcome = estimator.add_vision_measurement(&VisionMeasurement {
            pose: Pose2d::new(1.25, 0.5, 0.0),
            timestamp: 0.1,
            trust: 1.0,
        });
        assert_eq!(outcome, VisionOutcome::Applied { weight: 1.0 });
        assert_pose_eq(estimator.estimated_pose(), Pose2d::new(1.5, 0.5, 0.0));
    }

    #[test]
    fn test_interpolated_capture_between_samples() {
        let mut estimator = seeded();
        estimator.predict(0.02, Twist2d::new(0.2, 0.0, 0.0)).unwrap();
        estimator.predict(0.04, Twist2d::new(0.2, 0.0, 0.0)).unwrap();
        // Odometry at t = 0.03 is x = 0.3, so 0.1 m of motion remains.
        estimator.add_vision_measurement(&VisionMeasurement {
            pose: Pose2d::new(2.0, 0.0, 0.0),
            timestamp: 0.03,
            trust: 1.0,
        });
        assert_abs_diff_eq!(estimator.estimated_pose().x, 2.1, epsilon = 1e-9);
    }

    #[test]
    fn test_lower_trust_gives_smaller_correction() {
        let vision = Pose2d::new(1.0, 0.0, 0.0);
        let corrections: Vec<f64> = [0.0, 0.25, 0.5, 0.75, 1.0]
            .iter()
            .map(|&trust| {
                let mut estimator = seeded();
                estimator.predict(0.02, Twist2d::default()).unwrap();
                estimator.add_vision_measurement(&VisionMeasurement {
                    pose: vision,
                    timestamp: 0.02,
                    trust,
                });
                estimator.estimated_pose().x
            })
            .collect();
        assert_abs_diff_eq!(corrections[0], 0.0, epsilon = 1e-12);
        assert!(corrections.windows(2).all(|w| w[0] < w[1]));
        assert_abs_diff_eq!(corrections[4], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_heading_blend_takes_short_arc() {
        let mut estimator = PoseEstimator::new(PoseEstimatorConfig::default());
        estimator.reset_pose(Pose2d::new(0.0, 0.0, 3.0), 0.0);
        estimator.predict(0.02, Twist2d::default()).unwrap();
        estimator.add_vision_measurement(&VisionMeasurement {
            pose: Pose2d::new(0.0, 0.0, -3.0),
            timestamp: 0.02,
            trust: 0.5f64.sqrt(),
        });
        // Halfway across the ±PI seam, not back through zero.
        assert!(estimator.estimated_pose().theta.abs() > 3.0);
    }

    #[test]
    fn test_rejects_without_history_or_bad_input() {
        let mut estimator = PoseEstimator::new(PoseEstimatorConfig::default());
        let m = VisionMeasurement {
            pose: Pose2d::new(1.0, 1.0, 0.0),
            timestamp: 0.0,
            trust: 1.0,
        };
        assert_eq!(estimator.add_vision_measurement(&m), VisionOutcome::NoHistory);
        estimator.reset_pose(Pose2d::default(), 0.0);
        let bad = VisionMeasurement { trust: f64::NAN, ..m };
        assert_eq!(estimator.add_vision_measurement(&bad), VisionOutcome::Invalid);
        assert!(estimator.predict(0.02, Twist2d::new(f64::NAN, 0.0, 0.0)).is_err());
        assert!(estimator.predict(-1.0, Twist2d::default()).is_err());
        assert_eq!(estimator.estimated_pose(), Pose2d::default());
    }

    #[test]
    fn test_anti_jitter_and_field_clamp() {
        let config = PoseEstimatorConfig {
            anti_jitter: Some(AntiJitter::default()),
            field_clamp: Some(FieldClamp {
                field: FieldLayout::default(),
                margin: 0.4,
            }),
            ..PoseEstimatorConfig::default()
        };
        let mut estimator = PoseEstimator::new(config);
        estimator.reset_pose(Pose2d::new(2.0, 2.0, 0.0), 0.0);
        estimator.predict(0.02, Twist2d::default()).unwrap();
        estimator.add_vision_measurement(&VisionMeasurement {
            pose: Pose2d::new(2.1, 2.0, 0.0),
            timestamp: 0.02,
            trust: 1.0,
        });
        assert_abs_diff_eq!(estimator.estimated_pose().x, 2.02, epsilon = 1e-9);

        estimator.predict(0.04, Twist2d::new(-5.0, 0.0, 0.0)).unwrap();
        assert_abs_diff_eq!(estimator.estimated_pose().x, 0.4, epsilon = 1e-9);
        assert_eq!(
            estimator.estimated_pose().translation(),
            Translation2d::new(0.4, 2.0)
        );
    }
}
