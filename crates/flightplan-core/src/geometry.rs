//! Planar geometry kernel: rotated bounding boxes, line equations and
//! coordinate transforms.
//!
//! Everything here works in a projected CRS; callers reject geographic
//! coordinates before geometry reaches this module.

use crate::error::{FlightPlanError, Result};
use serde::{Deserialize, Serialize};

const DEGENERATE_EXTENT_M: f64 = 1e-6;

/// A point in projected map coordinates (metres).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Line in slope/intercept form, `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineEq {
    pub slope: f64,
    pub intercept: f64,
}

/// Slope/intercept of the line through `(x0, y0)` and `(x1, y1)`.
///
/// Fails with `DivisionByZero` for a vertical segment; corridor callers
/// special-case that as a 90 degree bearing.
pub fn line_equation(y0: f64, y1: f64, x0: f64, x1: f64) -> Result<LineEq> {
    let dx = x1 - x0;
    if dx.abs() < f64::EPSILON {
        return Err(FlightPlanError::DivisionByZero("line_equation"));
    }
    let slope = (y1 - y0) / dx;
    Ok(LineEq {
        slope,
        intercept: y0 - slope * x0,
    })
}

/// Maps a coordinate between two projected CRS.
pub trait CrsTransform: Send + Sync {
    fn forward(&self, x: f64, y: f64) -> (f64, f64);
}

/// Identity when no transformer is supplied (source and target CRS equal).
pub fn transform_coordinate(transform: Option<&dyn CrsTransform>, x: f64, y: f64) -> (f64, f64) {
    match transform {
        Some(t) => t.forward(x, y),
        None => (x, y),
    }
}

/// Normalize an angle in degrees into `[0, 360)`.
pub fn normalize_angle_deg(angle: f64) -> f64 {
    let a = angle.rem_euclid(360.0);
    if a == 360.0 {
        0.0
    } else {
        a
    }
}

/// Minimal rectangle enclosing a geometry in the flight-direction frame.
///
/// The local frame has its `s` axis along the flight direction and `t`
/// perpendicular to it; `(0, 0)` in local coordinates is the corner at
/// minimum `s` and `t`. `dx` is the along-track extent, `dy` the
/// across-track extent.
#[derive(Debug, Clone)]
pub struct RotatedBoundingBox {
    angle_deg: f64,
    cos_a: f64,
    sin_a: f64,
    s_min: f64,
    t_min: f64,
    pub dx: f64,
    pub dy: f64,
}

impl RotatedBoundingBox {
    /// Rotated envelope of `vertices` at `angle` degrees.
    ///
    /// Near-zero extents are a reported error, not a silently zero-sized
    /// box.
    pub fn at_angle(angle_deg: f64, vertices: &[Point]) -> Result<Self> {
        if vertices.len() < 3 {
            return Err(FlightPlanError::InvalidGeometry(format!(
                "bounding box needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }
        let angle_deg = normalize_angle_deg(angle_deg);
        let rad = angle_deg.to_radians();
        let (sin_a, cos_a) = rad.sin_cos();

        let mut s_min = f64::INFINITY;
        let mut s_max = f64::NEG_INFINITY;
        let mut t_min = f64::INFINITY;
        let mut t_max = f64::NEG_INFINITY;
        for p in vertices {
            if !p.x.is_finite() || !p.y.is_finite() {
                return Err(FlightPlanError::InvalidGeometry(
                    "non-finite vertex coordinate".into(),
                ));
            }
            let s = p.x * cos_a + p.y * sin_a;
            let t = -p.x * sin_a + p.y * cos_a;
            s_min = s_min.min(s);
            s_max = s_max.max(s);
            t_min = t_min.min(t);
            t_max = t_max.max(t);
        }

        let dx = s_max - s_min;
        let dy = t_max - t_min;
        if dx < DEGENERATE_EXTENT_M || dy < DEGENERATE_EXTENT_M {
            return Err(FlightPlanError::InvalidGeometry(format!(
                "degenerate extent {dx:.3} x {dy:.3} m at angle {angle_deg:.1}"
            )));
        }
        // Collinear input spans a non-zero box in a rotated frame; the
        // enclosed area is the angle-independent degeneracy test.
        if shoelace_area(vertices).abs() < DEGENERATE_EXTENT_M {
            return Err(FlightPlanError::InvalidGeometry(
                "zero-area geometry".into(),
            ));
        }

        Ok(Self {
            angle_deg,
            cos_a,
            sin_a,
            s_min,
            t_min,
            dx,
            dy,
        })
    }

    pub fn angle_deg(&self) -> f64 {
        self.angle_deg
    }

    /// Map local `(sx, ty)` (offsets from the box corner) to map
    /// coordinates.
    pub fn from_local(&self, sx: f64, ty: f64) -> Point {
        let s = self.s_min + sx;
        let t = self.t_min + ty;
        Point {
            x: s * self.cos_a - t * self.sin_a,
            y: s * self.sin_a + t * self.cos_a,
        }
    }

    /// Map a map coordinate into local offsets from the box corner.
    pub fn to_local(&self, p: Point) -> (f64, f64) {
        let s = p.x * self.cos_a + p.y * self.sin_a;
        let t = -p.x * self.sin_a + p.y * self.cos_a;
        (s - self.s_min, t - self.t_min)
    }

    /// Box corners in map coordinates, counter-clockwise in the local
    /// frame.
    pub fn corners(&self) -> [Point; 4] {
        [
            self.from_local(0.0, 0.0),
            self.from_local(self.dx, 0.0),
            self.from_local(self.dx, self.dy),
            self.from_local(0.0, self.dy),
        ]
    }

    /// The two pairs of parallel boundary lines as slope/intercept
    /// equations: front/back (parallel to the flight axis) then
    /// left/right.
    ///
    /// Fails with `DivisionByZero` when an edge is vertical in map
    /// coordinates; use the local-frame accessors in that case.
    pub fn edges(&self) -> Result<[LineEq; 4]> {
        let [c0, c1, c2, c3] = self.corners();
        Ok([
            line_equation(c0.y, c1.y, c0.x, c1.x)?,
            line_equation(c0.y, c3.y, c0.x, c3.x)?,
            line_equation(c3.y, c2.y, c3.x, c2.x)?,
            line_equation(c1.y, c2.y, c1.x, c2.x)?,
        ])
    }
}

/// Signed shoelace area of a closed ring [m^2]; positive when
/// counter-clockwise.
pub fn shoelace_area(vertices: &[Point]) -> f64 {
    let mut sum = 0.0;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        sum += vertices[j].x * vertices[i].y - vertices[i].x * vertices[j].y;
        j = i;
    }
    sum / 2.0
}

/// Ray-casting point-in-polygon test; boundary points count as inside.
pub fn point_in_polygon(p: Point, polygon: &[Point]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let a = polygon[i];
        let b = polygon[j];
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < x_cross {
                inside = !inside;
            } else if (p.x - x_cross).abs() < 1e-9 {
                return true;
            }
        }
        j = i;
    }
    inside
}

/// Axis-aligned bounds of a polygon.
pub fn polygon_bounds(polygon: &[Point]) -> Option<(Point, Point)> {
    let first = polygon.first()?;
    let mut min = *first;
    let mut max = *first;
    for p in polygon {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
    }
    Some((min, max))
}

/// Explode a polyline into its 2-point segments.
pub fn explode_to_segments(line: &[Point]) -> Vec<(Point, Point)> {
    line.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Buffer a 2-point segment by `distance` with round caps, each quarter
/// arc approximated with `segments` chords.
pub fn buffer_segment(
    a: Point,
    b: Point,
    distance: f64,
    segments: usize,
) -> Result<Vec<Point>> {
    if distance <= 0.0 {
        return Err(FlightPlanError::InvalidParameter(format!(
            "buffer distance must be positive, got {distance}"
        )));
    }
    let length = a.distance(&b);
    if length < DEGENERATE_EXTENT_M {
        return Err(FlightPlanError::InvalidGeometry(
            "zero-length corridor segment".into(),
        ));
    }
    let ux = (b.x - a.x) / length;
    let uy = (b.y - a.y) / length;
    // Perpendicular, to the left of travel.
    let (px, py) = (-uy, ux);
    let segments = segments.max(1);
    let axis = uy.atan2(ux);

    let mut ring = Vec::with_capacity(2 * segments + 6);
    // Left side, then cap around b, right side, cap around a.
    ring.push(Point::new(a.x + px * distance, a.y + py * distance));
    ring.push(Point::new(b.x + px * distance, b.y + py * distance));
    for i in 1..(2 * segments) {
        let phi = axis + std::f64::consts::FRAC_PI_2
            - std::f64::consts::PI * i as f64 / (2 * segments) as f64;
        ring.push(Point::new(
            b.x + distance * phi.cos(),
            b.y + distance * phi.sin(),
        ));
    }
    ring.push(Point::new(b.x - px * distance, b.y - py * distance));
    ring.push(Point::new(a.x - px * distance, a.y - py * distance));
    for i in 1..(2 * segments) {
        let phi = axis - std::f64::consts::FRAC_PI_2
            - std::f64::consts::PI * i as f64 / (2 * segments) as f64;
        ring.push(Point::new(
            a.x + distance * phi.cos(),
            a.y + distance * phi.sin(),
        ));
    }
    Ok(ring)
}
