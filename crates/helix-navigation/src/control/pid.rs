//! A discrete PID controller with optional continuous (wrapping) input.
//!
//! Used wherever one axis has to be held to a closed-loop target: heading
//! alignment in teleop, and the heading axis of drive-to-pose.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Proportional, integral and derivative gains.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl PidGains {
    pub const fn new(kp: f64, ki: f64, kd: f64) -> Self {
        PidGains { kp, ki, kd }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PidController {
    gains: PidGains,
    /// Wrapping input range, e.g. `(-PI, PI)` for headings.
    continuous_range: Option<(f64, f64)>,
    /// Output magnitude the integral term alone may reach.
    max_integral_output: f64,
    tolerance: f64,
    integral: f64,
    previous_error: Option<f64>,
}

impl PidController {
    pub fn new(gains: PidGains) -> Self {
        PidController {
            gains,
            continuous_range: None,
            max_integral_output: f64::INFINITY,
            tolerance: 0.0,
            integral: 0.0,
            previous_error: None,
        }
    }

    /// Treat `min` and `max` as the same point; the error always takes the short way round.
    pub fn with_continuous_input(mut self, min: f64, max: f64) -> Self {
        self.continuous_range = Some((min, max));
        self
    }

    pub fn with_max_integral_output(mut self, limit: f64) -> Self {
        self.max_integral_output = limit.abs();
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance.abs();
        self
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    /// Error `setpoint - measurement`, wrapped if the input is continuous.
    pub fn error(&self, measurement: f64, setpoint: f64) -> f64 {
        let error = setpoint - measurement;
        match self.continuous_range {
            Some((min, max)) => {
                let span = max - min;
                let half = span / 2.0;
                (error + half).rem_euclid(span) - half
            }
            None => error,
        }
    }

    pub fn at_setpoint(&self, measurement: f64, setpoint: f64) -> bool {
        self.error(measurement, setpoint).abs() <= self.tolerance
    }

    /// One controller step of `dt` seconds.
    pub fn calculate(&mut self, measurement: f64, setpoint: f64, dt: f64) -> f64 {
        let error = self.error(measurement, setpoint);
        if dt <= 0.0 || !error.is_finite() {
            return 0.0;
        }

        if self.gains.ki != 0.0 {
            let limit = self.max_integral_output / self.gains.ki.abs();
            self.integral = (self.integral + error * dt).clamp(-limit, limit);
        }
        let derivative = self
            .previous_error
            .map_or(0.0, |previous| (error - previous) / dt);
        self.previous_error = Some(error);

        self.gains.kp * error + self.gains.ki * self.integral + self.gains.kd * derivative
    }

    /// Clear the integral and derivative history.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use core::f64::consts::PI;

    #[test]
    fn test_proportional_only() {
        let mut pid = PidController::new(PidGains::new(2.0, 0.0, 0.0));
        assert_abs_diff_eq!(pid.calculate(1.0, 3.0, 0.02), 4.0);
        assert_abs_diff_eq!(pid.calculate(3.0, 3.0, 0.02), 0.0);
    }

    #[test]
    fn test_continuous_input_takes_short_way() {
        let pid = PidController::new(PidGains::new(1.0, 0.0, 0.0)).with_continuous_input(-PI, PI);
        assert_abs_diff_eq!(pid.error(3.0, -3.0), 2.0 * PI - 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(pid.error(-3.0, 3.0), 6.0 - 2.0 * PI, epsilon = 1e-12);
        assert_abs_diff_eq!(pid.error(0.0, 1.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_integral_is_bounded() {
        let mut pid =
            PidController::new(PidGains::new(0.0, 1.0, 0.0)).with_max_integral_output(0.5);
        let mut out = 0.0;
        for _ in 0..1000 {
            out = pid.calculate(0.0, 10.0, 0.02);
        }
        assert_abs_diff_eq!(out, 0.5, epsilon = 1e-12);
        pid.reset();
        assert_abs_diff_eq!(pid.calculate(0.0, 1.0, 0.02), 0.02, epsilon = 1e-12);
    }

    #[test]
    fn test_derivative_uses_previous_error() {
        let mut pid = PidController::new(PidGains::new(0.0, 0.0, 1.0));
        assert_abs_diff_eq!(pid.calculate(0.0, 1.0, 0.1), 0.0);
        assert_abs_diff_eq!(pid.calculate(0.5, 1.0, 0.1), -5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_tolerance() {
        let pid = PidController::new(PidGains::default()).with_tolerance(0.05);
        assert!(pid.at_setpoint(1.02, 1.0));
        assert!(!pid.at_setpoint(1.2, 1.0));
    }
}
