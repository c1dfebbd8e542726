use helix_common::field::flip_heading;
use helix_common::{AllianceFlip, FieldLayout};
use helix_kinematics::{angle_difference, normalize_angle};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{NavigationError, Result};

/// Desired robot heading and its rate at one instant.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RotationState {
    /// rad
    pub heading: f64,
    /// rad/s
    pub angular_velocity: f64,
}

impl AllianceFlip for RotationState {
    fn flipped(&self, _field: &FieldLayout) -> Self {
        RotationState {
            heading: flip_heading(self.heading),
            angular_velocity: -self.angular_velocity,
        }
    }
}

/// Robot heading over time, timed independently of the translation path.
///
/// Between anchors the heading moves along the shortest arc at a constant
/// rate. Outside the anchors it holds the nearest one with zero rate.
#[derive(Debug, Clone, PartialEq)]
pub struct RotationSequence {
    /// `(time, heading)` with strictly increasing times.
    anchors: Vec<(f64, f64)>,
}

impl RotationSequence {
    /// # Errors
    ///
    /// `NavigationError::MissingRotationTarget` without anchors;
    /// `NavigationError::InvalidConstraint` if times are not finite and strictly increasing.
    pub fn new(anchors: Vec<(f64, f64)>) -> Result<Self> {
        if anchors.is_empty() {
            return Err(NavigationError::MissingRotationTarget);
        }
        if anchors.iter().any(|(t, h)| !t.is_finite() || !h.is_finite()) {
            return Err(NavigationError::InvalidConstraint("rotation anchor is not finite"));
        }
        if anchors.windows(2).any(|w| w[1].0 <= w[0].0) {
            return Err(NavigationError::InvalidConstraint(
                "rotation anchor times must strictly increase",
            ));
        }
        Ok(RotationSequence {
            anchors: anchors
                .into_iter()
                .map(|(t, h)| (t, normalize_angle(h)))
                .collect(),
        })
    }

    pub fn anchors(&self) -> &[(f64, f64)] {
        &self.anchors
    }

    pub fn sample(&self, time: f64) -> RotationState {
        let (first, last) = match (self.anchors.first(), self.anchors.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return RotationState::default(),
        };
        if time <= first.0 {
            return RotationState {
                heading: first.1,
                angular_velocity: 0.0,
            };
        }
        if time >= last.0 {
            return RotationState {
                heading: last.1,
                angular_velocity: 0.0,
            };
        }
        let upper = self.anchors.partition_point(|(t, _)| *t <= time);
        let (t0, h0) = self.anchors[upper - 1];
        let (t1, h1) = self.anchors[upper];
        let delta = angle_difference(h1, h0);
        let fraction = (time - t0) / (t1 - t0);
        RotationState {
            heading: normalize_angle(h0 + delta * fraction),
            angular_velocity: delta / (t1 - t0),
        }
    }
}
