//! Strip/photo grid generation for block and corridor flights.

use crate::error::{FlightPlanError, Result};
use crate::geometry::{
    buffer_segment, explode_to_segments, line_equation, transform_coordinate, CrsTransform, Point,
    RotatedBoundingBox,
};
use crate::models::{AreaGeometry, FlightDesign, PhotoFootprint, PlanLayers, ProjectionCentre};

/// Chords per quarter arc when buffering corridor segments.
const BUFFER_ARC_SEGMENTS: usize = 5;

/// Running strip/photo counters, so multi-segment runs keep numbering
/// cumulative.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridCursor {
    pub strip: u32,
    pub photo: u32,
}

/// A generated plan plus the coverage polygons it was derived from (the
/// block polygon, or one buffer polygon per corridor segment). The
/// altitude solver samples terrain extrema over these.
#[derive(Debug, Clone)]
pub struct PlanOutput {
    pub layers: PlanLayers,
    pub coverage: Vec<Vec<Point>>,
}

/// Compass direction [deg, 0 = north] to the rotation angle used by the
/// bounding-box routine.
pub fn block_angle_from_direction(direction_deg: f64) -> f64 {
    let angle = 90.0 - direction_deg;
    if angle < 0.0 {
        angle + 360.0
    } else {
        angle
    }
}

/// Flight angle of one corridor segment in `[0, 180)`, from the segment's
/// slope. Vertical segments are treated as 90 degrees.
pub fn corridor_segment_angle(a: Point, b: Point) -> f64 {
    match line_equation(a.y, b.y, a.x, b.x) {
        Ok(eq) => {
            let angle = eq.slope.atan().to_degrees();
            if angle < 0.0 {
                angle + 180.0
            } else {
                angle
            }
        }
        Err(_) => 90.0,
    }
}

/// Enumerates projection centres and photo footprints for an area or a
/// corridor.
pub struct GridGenerator<'a> {
    design: &'a FlightDesign,
    transform: Option<&'a dyn CrsTransform>,
}

impl<'a> GridGenerator<'a> {
    pub fn new(design: &'a FlightDesign) -> Self {
        Self {
            design,
            transform: None,
        }
    }

    /// Apply a CRS transform to every emitted coordinate.
    pub fn with_transform(mut self, transform: &'a dyn CrsTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Plan the given area with the design's parameters. The unrefined
    /// layer carries the design altitude `w0` on every centre.
    pub fn plan(&self, area: &AreaGeometry, direction_deg: f64) -> Result<PlanOutput> {
        area.validate()?;
        match area {
            AreaGeometry::Block { polygon } => self.plan_block(polygon, direction_deg),
            AreaGeometry::Corridor { line, buffer_m } => self.plan_corridor(line, *buffer_m),
        }
    }

    fn plan_block(&self, polygon: &[Point], direction_deg: f64) -> Result<PlanOutput> {
        let angle = block_angle_from_direction(direction_deg);
        let bbox = RotatedBoundingBox::at_angle(angle, polygon)?;
        let mut layers = PlanLayers::default();
        let cursor = self.sweep(&bbox, GridCursor::default(), None, &mut layers)?;
        layers.strip_count = cursor.strip;
        layers.photo_count = cursor.photo;
        Ok(PlanOutput {
            layers,
            coverage: vec![polygon.to_vec()],
        })
    }

    fn plan_corridor(&self, line: &[Point], buffer_m: f64) -> Result<PlanOutput> {
        let mut layers = PlanLayers::default();
        let mut coverage = Vec::new();
        let mut cursor = GridCursor::default();
        let mut planned_any = false;

        for (segment_id, (a, b)) in explode_to_segments(line).into_iter().enumerate() {
            if a.distance(&b) < 1e-6 {
                tracing::warn!(segment = segment_id, "skipping zero-length corridor segment");
                continue;
            }
            let angle = corridor_segment_angle(a, b);
            let ring = buffer_segment(a, b, buffer_m, BUFFER_ARC_SEGMENTS)?;
            let bbox = RotatedBoundingBox::at_angle(angle, &ring)?;
            cursor = self.sweep(&bbox, cursor, Some(segment_id as u32), &mut layers)?;
            coverage.push(ring);
            planned_any = true;
        }

        if !planned_any {
            return Err(FlightPlanError::InvalidGeometry(
                "corridor contains no usable segments".into(),
            ));
        }
        layers.strip_count = cursor.strip;
        layers.photo_count = cursor.photo;
        Ok(PlanOutput { layers, coverage })
    }

    /// Sweep one rotated bounding box, appending centres and footprints.
    /// Returns the advanced counters.
    fn sweep(
        &self,
        bbox: &RotatedBoundingBox,
        start: GridCursor,
        segment: Option<u32>,
        out: &mut PlanLayers,
    ) -> Result<GridCursor> {
        let d = self.design;
        // Photo/strip counts inside the box; a sub-footprint extent still
        // yields one centred exposure.
        let nx = (bbox.dx / d.bx).floor() as i64;
        let ny = (bbox.dy / d.by).floor() as i64;
        let margin_x = (bbox.dx - nx as f64 * d.bx) / 2.0;
        let margin_y = (bbox.dy - ny as f64 * d.by) / 2.0;
        let extension = d.extreme_strip_extension_pct / 100.0 * d.by;
        let mb = d.multiple_base as i64;

        let mut cursor = start;
        for s in 0..=ny {
            let mut ty = margin_y + s as f64 * d.by;
            // Displace the outermost strips outward; a single strip stays
            // centred.
            if ny > 0 {
                if s == 0 {
                    ty -= extension;
                } else if s == ny {
                    ty += extension;
                }
            }
            for k in -mb..=(nx + mb) {
                let sx = margin_x + k as f64 * d.bx;
                let centre_local = (sx, ty);
                let centre = self.emit_point(bbox, centre_local);
                out.centres.push(ProjectionCentre {
                    x: centre.x,
                    y: centre.y,
                    alt_m: d.w0,
                    strip: cursor.strip,
                    photo: cursor.photo,
                    segment,
                });
                out.footprints.push(PhotoFootprint {
                    strip: cursor.strip,
                    photo: cursor.photo,
                    corners: self.footprint_corners(bbox, centre_local),
                });
                cursor.photo += 1;
            }
            cursor.strip += 1;
        }
        Ok(cursor)
    }

    fn emit_point(&self, bbox: &RotatedBoundingBox, (sx, ty): (f64, f64)) -> Point {
        let p = bbox.from_local(sx, ty);
        let (x, y) = transform_coordinate(self.transform, p.x, p.y);
        Point::new(x, y)
    }

    fn footprint_corners(&self, bbox: &RotatedBoundingBox, (sx, ty): (f64, f64)) -> [Point; 4] {
        let hx = self.design.len_along_m / 2.0;
        let hy = self.design.len_across_m / 2.0;
        [
            self.emit_point(bbox, (sx - hx, ty - hy)),
            self.emit_point(bbox, (sx + hx, ty - hy)),
            self.emit_point(bbox, (sx + hx, ty + hy)),
            self.emit_point(bbox, (sx - hx, ty + hy)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::models::FlightParameters;
    use approx::assert_relative_eq;

    fn design(multiple_base: u32, extension_pct: f64) -> FlightDesign {
        let params = FlightParameters {
            camera: Camera::from_sensor_width("t", 35.0, 35.9, 6000, 4000).unwrap(),
            gsd_cm: 5.0,
            forward_overlap: 0.8,
            side_overlap: 0.6,
            increase_overlap: false,
            multiple_base,
            extreme_strip_extension_pct: extension_pct,
            direction_deg: 0.0,
        };
        FlightDesign::new(&params, 0.0, 0.0).unwrap()
    }

    fn rect(w: f64, h: f64) -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(w, 0.0),
            Point::new(w, h),
            Point::new(0.0, h),
        ]
    }

    #[test]
    fn block_angle_convention() {
        assert_relative_eq!(block_angle_from_direction(0.0), 90.0);
        assert_relative_eq!(block_angle_from_direction(90.0), 0.0);
        assert_relative_eq!(block_angle_from_direction(180.0), 270.0);
        assert_relative_eq!(block_angle_from_direction(135.0), 315.0);
    }

    #[test]
    fn corridor_angle_convention() {
        assert_relative_eq!(
            corridor_segment_angle(Point::new(0.0, 0.0), Point::new(10.0, 10.0)),
            45.0
        );
        assert_relative_eq!(
            corridor_segment_angle(Point::new(0.0, 0.0), Point::new(-10.0, 10.0)),
            135.0
        );
        // Vertical segments cannot have a slope; treated as 90 degrees.
        assert_relative_eq!(
            corridor_segment_angle(Point::new(3.0, 0.0), Point::new(3.0, 10.0)),
            90.0
        );
    }

    #[test]
    fn rectangular_block_counts_match_formulas() {
        // 1000 x 600 m block, Bx = 60, By = 80, flown north (angle 90):
        // the along-track extent is 600, the across-track extent 1000.
        let d = design(0, 0.0);
        let area = AreaGeometry::Block {
            polygon: rect(1000.0, 600.0),
        };
        let out = GridGenerator::new(&d).plan(&area, 0.0).unwrap();
        let strips = (1000.0_f64 / d.by).floor() as u32 + 1;
        let per_strip = (600.0_f64 / d.bx).floor() as u32 + 1;
        assert_eq!(out.layers.strip_count, strips);
        assert_eq!(out.layers.photo_count, strips * per_strip);
        assert_eq!(out.layers.centres.len(), out.layers.footprints.len());
    }

    #[test]
    fn first_and_last_centre_positions() {
        let d = design(0, 0.0);
        let area = AreaGeometry::Block {
            polygon: rect(1000.0, 600.0),
        };
        let out = GridGenerator::new(&d).plan(&area, 0.0).unwrap();
        let first = &out.layers.centres[0];
        let last = out.layers.centres.last().unwrap();
        // 12 * 80 = 960 m of strip spacing centred in 1000 m leaves a
        // 20 m margin; strips sweep from x = 980 down to x = 20.
        assert_relative_eq!(first.x, 980.0, epsilon = 1e-6);
        assert_relative_eq!(first.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(last.x, 20.0, epsilon = 1e-6);
        assert_relative_eq!(last.y, 600.0, epsilon = 1e-6);
        assert_relative_eq!(first.alt_m, d.w0);
    }

    #[test]
    fn generator_is_idempotent() {
        let d = design(0, 0.0);
        let area = AreaGeometry::Block {
            polygon: rect(500.0, 300.0),
        };
        let a = GridGenerator::new(&d).plan(&area, 30.0).unwrap();
        let b = GridGenerator::new(&d).plan(&area, 30.0).unwrap();
        assert_eq!(a.layers.centres, b.layers.centres);
        assert_eq!(a.layers.footprints, b.layers.footprints);
    }

    #[test]
    fn sub_footprint_area_yields_single_centred_exposure() {
        let d = design(0, 0.0);
        let area = AreaGeometry::Block {
            polygon: rect(40.0, 30.0),
        };
        let out = GridGenerator::new(&d).plan(&area, 0.0).unwrap();
        assert_eq!(out.layers.centres.len(), 1);
        let c = &out.layers.centres[0];
        assert_relative_eq!(c.x, 20.0, epsilon = 1e-6);
        assert_relative_eq!(c.y, 15.0, epsilon = 1e-6);
    }

    #[test]
    fn multiple_base_extends_strip_ends() {
        let d0 = design(0, 0.0);
        let d2 = design(2, 0.0);
        let area = AreaGeometry::Block {
            polygon: rect(1000.0, 600.0),
        };
        let base = GridGenerator::new(&d0).plan(&area, 0.0).unwrap();
        let extended = GridGenerator::new(&d2).plan(&area, 0.0).unwrap();
        let strips = base.layers.strip_count;
        assert_eq!(
            extended.layers.photo_count,
            base.layers.photo_count + 4 * strips
        );
    }

    #[test]
    fn extreme_strips_are_displaced_outward() {
        let d = design(0, 10.0);
        let area = AreaGeometry::Block {
            polygon: rect(1000.0, 600.0),
        };
        let out = GridGenerator::new(&d).plan(&area, 0.0).unwrap();
        let first = &out.layers.centres[0];
        let last = out.layers.centres.last().unwrap();
        // 10% of By = 8 m beyond the undisplaced extremes.
        assert_relative_eq!(first.x, 988.0, epsilon = 1e-6);
        assert_relative_eq!(last.x, 12.0, epsilon = 1e-6);
    }

    #[test]
    fn corridor_numbering_continues_across_segments() {
        let d = design(0, 0.0);
        let area = AreaGeometry::Corridor {
            line: vec![
                Point::new(0.0, 0.0),
                Point::new(600.0, 0.0),
                Point::new(600.0, 500.0),
            ],
            buffer_m: 120.0,
        };
        let out = GridGenerator::new(&d).plan(&area, 0.0).unwrap();
        assert_eq!(out.coverage.len(), 2);
        assert_eq!(out.layers.photo_count as usize, out.layers.centres.len());
        // Photo numbers are strictly increasing across the merged layers.
        for pair in out.layers.centres.windows(2) {
            assert_eq!(pair[1].photo, pair[0].photo + 1);
        }
        let segments: Vec<Option<u32>> =
            out.layers.centres.iter().map(|c| c.segment).collect();
        assert!(segments.contains(&Some(0)));
        assert!(segments.contains(&Some(1)));
    }

    #[test]
    fn zero_length_segment_is_skipped() {
        let d = design(0, 0.0);
        let area = AreaGeometry::Corridor {
            line: vec![
                Point::new(0.0, 0.0),
                Point::new(0.0, 0.0),
                Point::new(600.0, 0.0),
            ],
            buffer_m: 120.0,
        };
        let out = GridGenerator::new(&d).plan(&area, 0.0).unwrap();
        assert_eq!(out.coverage.len(), 1);
    }
}
