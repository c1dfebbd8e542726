//! Tangent-continuous cubic Hermite path through the waypoint positions.

use helix_kinematics::{Translation2d, normalize_angle};

use super::Waypoint;

/// A point on the sampled path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PathPoint {
    pub translation: Translation2d,
    /// Direction of travel (rad).
    pub heading: f64,
    /// Signed curvature (rad/m).
    pub curvature: f64,
    /// Arc length from the start of the path (m).
    pub distance: f64,
    /// Index of the segment this point starts or lies on.
    pub segment: usize,
    /// Set on the first point of each segment and on the final point.
    pub knot: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct HermiteSegment {
    p0: Translation2d,
    p1: Translation2d,
    m0: Translation2d,
    m1: Translation2d,
}

impl HermiteSegment {
    fn position(&self, u: f64) -> Translation2d {
        let (u2, u3) = (u * u, u * u * u);
        self.p0 * (2.0 * u3 - 3.0 * u2 + 1.0)
            + self.m0 * (u3 - 2.0 * u2 + u)
            + self.p1 * (-2.0 * u3 + 3.0 * u2)
            + self.m1 * (u3 - u2)
    }

    fn velocity(&self, u: f64) -> Translation2d {
        let u2 = u * u;
        self.p0 * (6.0 * u2 - 6.0 * u)
            + self.m0 * (3.0 * u2 - 4.0 * u + 1.0)
            + self.p1 * (-6.0 * u2 + 6.0 * u)
            + self.m1 * (3.0 * u2 - 2.0 * u)
    }

    fn acceleration(&self, u: f64) -> Translation2d {
        self.p0 * (12.0 * u - 6.0)
            + self.m0 * (6.0 * u - 4.0)
            + self.p1 * (-12.0 * u + 6.0)
            + self.m1 * (6.0 * u - 2.0)
    }

    fn curvature(&self, u: f64) -> f64 {
        let d = self.velocity(u);
        let dd = self.acceleration(u);
        let speed = d.norm();
        if speed < 1e-9 {
            return 0.0;
        }
        (d.x * dd.y - d.y * dd.x) / (speed * speed * speed)
    }
}

/// Unit tangent direction at waypoint `i`.
fn tangent_heading(waypoints: &[Waypoint], i: usize) -> f64 {
    if let Some(heading) = waypoints[i].path_heading {
        return normalize_angle(heading);
    }
    let last = waypoints.len() - 1;
    let (from, to) = match i {
        0 => (0, 1),
        i if i == last => (last - 1, last),
        i => (i - 1, i + 1),
    };
    (waypoints[to].translation - waypoints[from].translation).angle()
}

/// Sample the spline through `waypoints` (already collapsed, at least two,
/// consecutive points distinct) every `spacing` meters or closer.
pub(crate) fn sample_path(waypoints: &[Waypoint], spacing: f64) -> Vec<PathPoint> {
    let headings: Vec<f64> = (0..waypoints.len())
        .map(|i| tangent_heading(waypoints, i))
        .collect();

    let mut points = Vec::new();
    let mut distance = 0.0;
    let mut previous: Option<Translation2d> = None;
    let unit = |h: f64| Translation2d::new(h.cos(), h.sin());

    for segment in 0..waypoints.len() - 1 {
        let p0 = waypoints[segment].translation;
        let p1 = waypoints[segment + 1].translation;
        let chord = p0.distance(&p1);
        let spline = HermiteSegment {
            p0,
            p1,
            m0: unit(headings[segment]) * chord,
            m1: unit(headings[segment + 1]) * chord,
        };

        // Over-sample a little so curved segments still respect the spacing.
        let steps = ((1.5 * chord / spacing).ceil() as usize).max(1);
        let is_last = segment + 2 == waypoints.len();
        let end = if is_last { steps } else { steps - 1 };
        for j in 0..=end {
            let u = j as f64 / steps as f64;
            let translation = spline.position(u);
            if let Some(prev) = previous {
                distance += prev.distance(&translation);
            }
            previous = Some(translation);
            let knot = if j == 0 {
                Some(segment)
            } else if is_last && j == steps {
                Some(segment + 1)
            } else {
                None
            };
            points.push(PathPoint {
                translation,
                heading: spline.velocity(u).angle(),
                curvature: spline.curvature(u),
                distance,
                segment,
                knot,
            });
        }
    }
    points
}
