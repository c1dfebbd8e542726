//! Scalar helpers and a linearly interpolating lookup table.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::CommonError;

/// Clamp the magnitude of `value` to `max`, keeping its sign.
pub fn clamp_magnitude(value: f64, max: f64) -> f64 {
    if value.abs() > max {
        max.copysign(value)
    } else {
        value
    }
}

/// Position of `value` within `[min, max]` as a fraction. Not clamped.
///
/// The position of 4 within 1 and 7 is 0.5.
pub fn scalar_position(value: f64, min: f64, max: f64) -> f64 {
    (value - min) / (max - min)
}

/// Linear falloff factor: 1 at or below `start`, 0 at or beyond `end`.
pub fn ramp_down(value: f64, start: f64, end: f64) -> f64 {
    if value <= start {
        1.0
    } else if value >= end {
        0.0
    } else {
        1.0 - scalar_position(value, start, end)
    }
}

/// Raise `value` to `exponent` while keeping the original sign.
///
/// Exponents above 1 flatten the response near zero for fine control.
pub fn curve(value: f64, exponent: f64) -> f64 {
    value.abs().powf(exponent).copysign(value)
}

/// Zero out `value` inside `±deadband` and rescale the rest back onto `[0, 1]`
/// so the output stays continuous at the deadband edge.
pub fn apply_deadband(value: f64, deadband: f64) -> f64 {
    if value.abs() <= deadband || deadband >= 1.0 {
        0.0
    } else {
        ((value.abs() - deadband) / (1.0 - deadband)).copysign(value)
    }
}

/// Whether `measurement` is within `margin` of `goal`.
pub fn within_tolerance(measurement: f64, goal: f64, margin: f64) -> bool {
    (goal - measurement).abs() <= margin
}

/// A one-to-one lookup table that linearly interpolates between samples and
/// clamps outside its range.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolatingTable {
    samples: Vec<(f64, f64)>,
}

impl InterpolatingTable {
    /// Build a table from `(input, output)` samples.
    ///
    /// # Errors
    ///
    /// Returns `CommonError::EmptyTable` for no samples and
    /// `CommonError::UnsortedTable` if inputs are not finite and strictly increasing.
    pub fn new(samples: Vec<(f64, f64)>) -> Result<Self, CommonError> {
        if samples.is_empty() {
            return Err(CommonError::EmptyTable);
        }
        for (i, (x, y)) in samples.iter().enumerate() {
            if !x.is_finite() || !y.is_finite() {
                return Err(CommonError::UnsortedTable(i));
            }
            if i > 0 && samples[i - 1].0 >= *x {
                return Err(CommonError::UnsortedTable(i));
            }
        }
        Ok(InterpolatingTable { samples })
    }

    /// Interpolated output for `x`.
    pub fn get(&self, x: f64) -> f64 {
        let index = self.samples.partition_point(|(sx, _)| *sx < x);
        if index >= self.samples.len() {
            return self.samples[self.samples.len() - 1].1;
        }
        let (high_x, high_y) = self.samples[index];
        if index == 0 || high_x == x {
            return high_y;
        }
        let (low_x, low_y) = self.samples[index - 1];
        low_y + (x - low_x) * (high_y - low_y) / (high_x - low_x)
    }

    /// The `(input, output)` samples in ascending input order.
    pub fn samples(&self) -> &[(f64, f64)] {
        &self.samples
    }
}
