use helix_common::{Alliance, FieldLayout};
use tracing::{debug, info};

use super::parameterizer::{PointLimits, time_parameterize};
use super::spline::sample_path;
use super::{
    RegionConstraint, RotationSequence, RotationState, Trajectory, TrajectoryConfig,
    TrajectoryState, Waypoint,
};
use crate::error::{NavigationError, Result};

/// Consecutive waypoints closer than this are the same point (m).
const DUPLICATE_DISTANCE: f64 = 1e-6;

/// A translation path together with its independently timed heading profile.
#[derive(Debug, Clone, PartialEq)]
pub struct HolonomicTrajectory {
    pub trajectory: Trajectory,
    pub rotation: RotationSequence,
}

impl HolonomicTrajectory {
    pub fn total_time(&self) -> f64 {
        self.trajectory.total_time()
    }

    /// Path and heading references at `time`, both clamped to the trajectory's domain.
    pub fn sample(&self, time: f64) -> (TrajectoryState, RotationState) {
        (self.trajectory.sample(time), self.rotation.sample(time))
    }

    /// Path and heading references as seen by `alliance`.
    pub fn sample_for(
        &self,
        time: f64,
        alliance: Alliance,
        field: &FieldLayout,
    ) -> (TrajectoryState, RotationState) {
        let (state, rotation) = self.sample(time);
        (field.apply(alliance, state), field.apply(alliance, rotation))
    }
}

/// Builds [`HolonomicTrajectory`]s from waypoint lists. Stateless apart from
/// its limits; every call is deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryGenerator {
    config: TrajectoryConfig,
}

impl TrajectoryGenerator {
    /// # Errors
    ///
    /// `NavigationError::InvalidConstraint` if any limit is not positive or a
    /// boundary velocity is negative.
    pub fn new(config: TrajectoryConfig) -> Result<Self> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(config.max_velocity) || !positive(config.max_acceleration) {
            return Err(NavigationError::InvalidConstraint(
                "max velocity and acceleration must be positive",
            ));
        }
        if !config.max_deceleration.is_none_or(positive)
            || !config.max_centripetal_acceleration.is_none_or(positive)
        {
            return Err(NavigationError::InvalidConstraint(
                "deceleration and centripetal limits must be positive",
            ));
        }
        if !positive(config.sample_spacing) {
            return Err(NavigationError::InvalidConstraint("sample spacing must be positive"));
        }
        if !(config.start_velocity >= 0.0 && config.end_velocity >= 0.0) {
            return Err(NavigationError::InvalidConstraint(
                "start and end velocity must be non-negative",
            ));
        }
        Ok(TrajectoryGenerator { config })
    }

    pub fn config(&self) -> &TrajectoryConfig {
        &self.config
    }

    /// Generate a trajectory through `waypoints`.
    ///
    /// # Errors
    ///
    /// * `TooFewWaypoints` / `NonFiniteWaypoint` for malformed input.
    /// * `DegeneratePath` if every waypoint sits on the same point.
    /// * `MissingRotationTarget` if no waypoint has a rotation target.
    /// * `InvalidConstraint` for an out-of-range region constraint.
    /// * `InfeasibleProfile` if the boundary velocities cannot be met.
    pub fn generate(
        &self,
        waypoints: &[Waypoint],
        constraints: &[RegionConstraint],
    ) -> Result<HolonomicTrajectory> {
        if waypoints.len() < 2 {
            return Err(NavigationError::TooFewWaypoints(waypoints.len()));
        }
        if let Some(i) = waypoints.iter().position(|w| !w.is_finite()) {
            return Err(NavigationError::NonFiniteWaypoint(i));
        }
        validate_constraints(constraints, waypoints.len())?;

        let (path, original_index) = collapse_duplicates(waypoints);
        if path.len() < 2 {
            return Err(NavigationError::DegeneratePath);
        }
        if path.len() < waypoints.len() {
            debug!(
                given = waypoints.len(),
                kept = path.len(),
                "collapsed duplicate waypoints"
            );
        }

        let points = sample_path(&path, self.config.sample_spacing);
        let limits: Vec<PointLimits> = points
            .iter()
            .map(|p| {
                let mut limit = PointLimits {
                    max_velocity: self.config.max_velocity,
                    max_acceleration: self.config.max_acceleration,
                    max_deceleration: self
                        .config
                        .max_deceleration
                        .unwrap_or(self.config.max_acceleration),
                };
                if let Some(centripetal) = self.config.max_centripetal_acceleration {
                    if p.curvature.abs() > 1e-9 {
                        let bound = (centripetal / p.curvature.abs()).sqrt();
                        limit.max_velocity = limit.max_velocity.min(bound);
                    }
                }
                let (from, to) = (original_index[p.segment], original_index[p.segment + 1]);
                for region in constraints
                    .iter()
                    .filter(|c| c.from_waypoint <= from && to <= c.to_waypoint)
                {
                    if let Some(v) = region.max_velocity {
                        limit.max_velocity = limit.max_velocity.min(v);
                    }
                    if let Some(a) = region.max_acceleration {
                        limit.max_acceleration = limit.max_acceleration.min(a);
                        limit.max_deceleration = limit.max_deceleration.min(a);
                    }
                }
                if let Some(v) = p.knot.and_then(|k| path[k].velocity_override) {
                    limit.max_velocity = limit.max_velocity.min(v.max(0.0));
                }
                limit
            })
            .collect();

        let states = time_parameterize(
            &points,
            &limits,
            self.config.start_velocity,
            self.config.end_velocity,
        )?;

        let mut anchors: Vec<(f64, f64)> = points
            .iter()
            .zip(states.iter())
            .filter_map(|(p, s)| p.knot.and_then(|k| path[k].rotation).map(|h| (s.time, h)))
            .collect();
        let Some(&(_, first_heading)) = anchors.first() else {
            return Err(NavigationError::MissingRotationTarget);
        };
        if path[0].rotation.is_none() {
            anchors.insert(0, (0.0, first_heading));
        }
        let rotation = RotationSequence::new(anchors)?;

        let trajectory = Trajectory::from_states(states);
        info!(
            waypoints = path.len(),
            states = trajectory.states().len(),
            duration = trajectory.total_time(),
            "generated trajectory"
        );
        Ok(HolonomicTrajectory {
            trajectory,
            rotation,
        })
    }
}

fn validate_constraints(constraints: &[RegionConstraint], count: usize) -> Result<()> {
    for c in constraints {
        if c.from_waypoint > c.to_waypoint || c.to_waypoint >= count {
            return Err(NavigationError::InvalidConstraint("region indices out of range"));
        }
        let bad = |v: Option<f64>| v.is_some_and(|v| !(v.is_finite() && v > 0.0));
        if bad(c.max_velocity) || bad(c.max_acceleration) {
            return Err(NavigationError::InvalidConstraint("region limits must be positive"));
        }
    }
    Ok(())
}

/// Merge runs of coincident waypoints into their last member, returning the
/// kept waypoints and each one's index in the input.
fn collapse_duplicates(waypoints: &[Waypoint]) -> (Vec<Waypoint>, Vec<usize>) {
    let mut kept: Vec<Waypoint> = Vec::with_capacity(waypoints.len());
    let mut index = Vec::with_capacity(waypoints.len());
    for (i, waypoint) in waypoints.iter().enumerate() {
        match kept.last_mut() {
            Some(previous)
                if previous.translation.distance(&waypoint.translation) < DUPLICATE_DISTANCE =>
            {
                let velocity_override =
                    match (previous.velocity_override, waypoint.velocity_override) {
                        (Some(a), Some(b)) => Some(a.min(b)),
                        (a, b) => b.or(a),
                    };
                *previous = Waypoint {
                    translation: waypoint.translation,
                    path_heading: waypoint.path_heading.or(previous.path_heading),
                    rotation: waypoint.rotation.or(previous.rotation),
                    velocity_override,
                };
                if let Some(last) = index.last_mut() {
                    *last = i;
                }
            }
            _ => {
                kept.push(*waypoint);
                index.push(i);
            }
        }
    }
    (kept, index)
}
