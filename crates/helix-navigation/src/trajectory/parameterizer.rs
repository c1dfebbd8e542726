//! Time parameterization of a sampled path.
//!
//! A forward pass limits every point's speed by how fast the robot can
//! accelerate into it, a backward pass by how hard it can brake out of it.
//! Taking the minimum of both with each point's own speed cap gives the
//! fastest profile that respects every constraint; with constant limits it is
//! the familiar trapezoid.

use helix_kinematics::Pose2d;

use super::TrajectoryState;
use super::spline::PathPoint;
use crate::error::{NavigationError, Result};

/// Constraints attached to one path point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PointLimits {
    pub max_velocity: f64,
    pub max_acceleration: f64,
    pub max_deceleration: f64,
}

const TOLERANCE: f64 = 1e-6;

pub(crate) fn time_parameterize(
    points: &[PathPoint],
    limits: &[PointLimits],
    start_velocity: f64,
    end_velocity: f64,
) -> Result<Vec<TrajectoryState>> {
    debug_assert_eq!(points.len(), limits.len());
    let n = points.len();
    if n < 2 {
        return Err(NavigationError::DegeneratePath);
    }

    let mut velocity: Vec<f64> = limits.iter().map(|l| l.max_velocity).collect();

    velocity[0] = velocity[0].min(start_velocity);
    for i in 1..n {
        let ds = points[i].distance - points[i - 1].distance;
        let reachable =
            (velocity[i - 1].powi(2) + 2.0 * limits[i - 1].max_acceleration * ds).sqrt();
        velocity[i] = velocity[i].min(reachable);
    }
    if velocity[n - 1] + TOLERANCE < end_velocity && limits[n - 1].max_velocity >= end_velocity {
        return Err(NavigationError::InfeasibleProfile);
    }

    velocity[n - 1] = velocity[n - 1].min(end_velocity);
    for i in (0..n - 1).rev() {
        let ds = points[i + 1].distance - points[i].distance;
        let reachable = (velocity[i + 1].powi(2) + 2.0 * limits[i].max_deceleration * ds).sqrt();
        velocity[i] = velocity[i].min(reachable);
    }
    if velocity[0] + TOLERANCE < start_velocity.min(limits[0].max_velocity) {
        return Err(NavigationError::InfeasibleProfile);
    }

    let mut states = Vec::with_capacity(n);
    let mut time = 0.0;
    for i in 0..n {
        if i > 0 {
            let ds = points[i].distance - points[i - 1].distance;
            let v_sum = velocity[i - 1] + velocity[i];
            let dt = if v_sum > TOLERANCE {
                2.0 * ds / v_sum
            } else {
                // Both ends at rest: treat as starting from zero at full acceleration.
                (2.0 * ds / limits[i - 1].max_acceleration).sqrt()
            };
            time += dt;
        }
        let acceleration = if i + 1 < n {
            let ds = points[i + 1].distance - points[i].distance;
            if ds > 0.0 {
                (velocity[i + 1].powi(2) - velocity[i].powi(2)) / (2.0 * ds)
            } else {
                0.0
            }
        } else {
            0.0
        };
        states.push(TrajectoryState {
            time,
            pose: Pose2d::from_translation(points[i].translation, points[i].heading),
            velocity: velocity[i].max(0.0),
            acceleration,
            curvature: points[i].curvature,
        });
    }
    Ok(states)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use helix_kinematics::Translation2d;

    fn line(length: f64, count: usize) -> Vec<PathPoint> {
        (0..count)
            .map(|i| {
                let d = length * i as f64 / (count - 1) as f64;
                PathPoint {
                    translation: Translation2d::new(d, 0.0),
                    heading: 0.0,
                    curvature: 0.0,
                    distance: d,
                    segment: 0,
                    knot: None,
                }
            })
            .collect()
    }

    fn uniform(count: usize, v: f64, a: f64, d: f64) -> Vec<PointLimits> {
        vec![
            PointLimits {
                max_velocity: v,
                max_acceleration: a,
                max_deceleration: d,
            };
            count
        ]
    }

    #[test]
    fn test_triangle_profile_when_too_short_for_cruise() {
        // 1 m at 2 m/s² never reaches 2 m/s: peak is sqrt(2 * 2 * 0.5) = sqrt(2).
        let points = line(1.0, 101);
        let states = time_parameterize(&points, &uniform(101, 2.0, 2.0, 2.0), 0.0, 0.0).unwrap();
        let peak = states.iter().fold(0.0_f64, |m, s| m.max(s.velocity));
        assert_abs_diff_eq!(peak, 2.0_f64.sqrt(), epsilon = 1e-9);
        assert_abs_diff_eq!(
            states.last().unwrap().time,
            2.0 * 2.0_f64.sqrt() / 2.0,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_asymmetric_deceleration_brakes_later() {
        let points = line(4.0, 401);
        let states = time_parameterize(&points, &uniform(401, 2.0, 1.0, 4.0), 0.0, 0.0).unwrap();
        // Accelerating takes 2 m, braking only 0.5 m; cruise covers the remaining 1.5 m.
        let expected = 2.0 + 0.75 + 0.5;
        assert_abs_diff_eq!(states.last().unwrap().time, expected, epsilon = 1e-6);
    }

    #[test]
    fn test_infeasible_end_velocity() {
        let points = line(0.1, 11);
        let result = time_parameterize(&points, &uniform(11, 3.0, 1.0, 1.0), 0.0, 2.0);
        assert_eq!(result, Err(NavigationError::InfeasibleProfile));
    }

    #[test]
    fn test_nonzero_start_velocity_is_kept() {
        let points = line(3.0, 301);
        let states = time_parameterize(&points, &uniform(301, 2.0, 2.0, 2.0), 1.0, 0.0).unwrap();
        assert_abs_diff_eq!(states[0].velocity, 1.0, epsilon = 1e-12);
        assert!(states.windows(2).all(|w| w[1].time > w[0].time));
    }
}
