//! Terrain sampling: the collaborator trait plus an in-memory elevation
//! grid with bilinear interpolation.

use crate::error::{FlightPlanError, Result};
use crate::geometry::{point_in_polygon, polygon_bounds, transform_coordinate, CrsTransform, Point};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Read-only elevation source consumed by the altitude solver and the
/// control engine.
pub trait TerrainSampler: Send + Sync {
    /// Elevation [m ASL] at a single point.
    fn sample_at(&self, x: f64, y: f64) -> Result<f64>;

    /// (min, max) elevation under a polygon (area footprint or buffered
    /// corridor).
    fn sample_extrema(&self, polygon: &[Point]) -> Result<(f64, f64)>;
}

/// Regular elevation grid in projected coordinates, row-major from the
/// lower-left corner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElevationGrid {
    origin_x: f64,
    origin_y: f64,
    cell_size_m: f64,
    rows: usize,
    cols: usize,
    elevations_m: Vec<f64>,
}

impl ElevationGrid {
    pub fn new(
        origin_x: f64,
        origin_y: f64,
        cell_size_m: f64,
        rows: usize,
        cols: usize,
        elevations_m: Vec<f64>,
    ) -> Result<Self> {
        if !(cell_size_m > 0.0) {
            return Err(FlightPlanError::InvalidParameter(format!(
                "cell size must be positive, got {cell_size_m}"
            )));
        }
        if rows < 2 || cols < 2 {
            return Err(FlightPlanError::InvalidParameter(format!(
                "elevation grid needs at least 2x2 cells, got {rows}x{cols}"
            )));
        }
        if elevations_m.len() != rows * cols {
            return Err(FlightPlanError::InvalidParameter(format!(
                "expected {} elevation values, got {}",
                rows * cols,
                elevations_m.len()
            )));
        }
        if elevations_m.iter().any(|v| !v.is_finite()) {
            return Err(FlightPlanError::TerrainUnavailable(
                "elevation grid contains non-finite values".into(),
            ));
        }
        Ok(Self {
            origin_x,
            origin_y,
            cell_size_m,
            rows,
            cols,
            elevations_m,
        })
    }

    pub fn cell_size_m(&self) -> f64 {
        self.cell_size_m
    }

    fn max_x(&self) -> f64 {
        self.origin_x + (self.cols - 1) as f64 * self.cell_size_m
    }

    fn max_y(&self) -> f64 {
        self.origin_y + (self.rows - 1) as f64 * self.cell_size_m
    }

    fn value_at(&self, row: usize, col: usize) -> f64 {
        self.elevations_m[row * self.cols + col.min(self.cols - 1)]
    }

    fn covers(&self, x: f64, y: f64) -> bool {
        // Half a cell of slack at the edges.
        let slack = self.cell_size_m / 2.0;
        x >= self.origin_x - slack
            && x <= self.max_x() + slack
            && y >= self.origin_y - slack
            && y <= self.max_y() + slack
    }
}

impl TerrainSampler for ElevationGrid {
    fn sample_at(&self, x: f64, y: f64) -> Result<f64> {
        if !x.is_finite() || !y.is_finite() || !self.covers(x, y) {
            return Err(FlightPlanError::TerrainUnavailable(format!(
                "point ({x:.1}, {y:.1}) outside elevation grid"
            )));
        }
        let fx = ((x - self.origin_x) / self.cell_size_m).clamp(0.0, (self.cols - 1) as f64);
        let fy = ((y - self.origin_y) / self.cell_size_m).clamp(0.0, (self.rows - 1) as f64);

        let x0 = fx.floor() as usize;
        let y0 = fy.floor() as usize;
        let x1 = (x0 + 1).min(self.cols - 1);
        let y1 = (y0 + 1).min(self.rows - 1);
        let dx = fx - x0 as f64;
        let dy = fy - y0 as f64;

        let v00 = self.value_at(y0, x0);
        let v10 = self.value_at(y0, x1);
        let v01 = self.value_at(y1, x0);
        let v11 = self.value_at(y1, x1);

        let v0 = v00 + (v10 - v00) * dx;
        let v1 = v01 + (v11 - v01) * dx;
        Ok(v0 + (v1 - v0) * dy)
    }

    fn sample_extrema(&self, polygon: &[Point]) -> Result<(f64, f64)> {
        let (min_b, max_b) = polygon_bounds(polygon).ok_or_else(|| {
            FlightPlanError::InvalidGeometry("empty polygon for extrema sampling".into())
        })?;

        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;

        // Every grid node inside the polygon.
        let col0 = ((min_b.x - self.origin_x) / self.cell_size_m).floor().max(0.0) as usize;
        let row0 = ((min_b.y - self.origin_y) / self.cell_size_m).floor().max(0.0) as usize;
        let col1 = (((max_b.x - self.origin_x) / self.cell_size_m).ceil().max(0.0) as usize)
            .min(self.cols - 1);
        let row1 = (((max_b.y - self.origin_y) / self.cell_size_m).ceil().max(0.0) as usize)
            .min(self.rows - 1);
        for row in row0..=row1 {
            for col in col0..=col1 {
                let x = self.origin_x + col as f64 * self.cell_size_m;
                let y = self.origin_y + row as f64 * self.cell_size_m;
                if point_in_polygon(Point::new(x, y), polygon) {
                    let v = self.value_at(row, col);
                    lo = lo.min(v);
                    hi = hi.max(v);
                }
            }
        }

        // Small footprints can fall between nodes; fall back to
        // interpolated samples at the vertices and the centroid.
        for p in polygon {
            if let Ok(v) = self.sample_at(p.x, p.y) {
                lo = lo.min(v);
                hi = hi.max(v);
            }
        }
        let n = polygon.len() as f64;
        let cx = polygon.iter().map(|p| p.x).sum::<f64>() / n;
        let cy = polygon.iter().map(|p| p.y).sum::<f64>() / n;
        if let Ok(v) = self.sample_at(cx, cy) {
            lo = lo.min(v);
            hi = hi.max(v);
        }

        if !lo.is_finite() || !hi.is_finite() {
            return Err(FlightPlanError::TerrainUnavailable(
                "footprint entirely outside elevation grid".into(),
            ));
        }
        Ok((lo, hi))
    }
}

/// Constant elevation; stands in for a DTM when only the mean terrain
/// height is known.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UniformTerrain {
    pub elevation_m: f64,
}

impl TerrainSampler for UniformTerrain {
    fn sample_at(&self, _x: f64, _y: f64) -> Result<f64> {
        Ok(self.elevation_m)
    }

    fn sample_extrema(&self, _polygon: &[Point]) -> Result<(f64, f64)> {
        Ok((self.elevation_m, self.elevation_m))
    }
}

/// Adapter that maps vector-layer coordinates into the raster CRS before
/// sampling. Identity when the transformer is `None`.
pub struct ReprojectingSampler {
    inner: Arc<dyn TerrainSampler>,
    transform: Option<Arc<dyn CrsTransform>>,
}

impl ReprojectingSampler {
    pub fn new(inner: Arc<dyn TerrainSampler>, transform: Option<Arc<dyn CrsTransform>>) -> Self {
        Self { inner, transform }
    }
}

impl TerrainSampler for ReprojectingSampler {
    fn sample_at(&self, x: f64, y: f64) -> Result<f64> {
        let (x, y) = transform_coordinate(self.transform.as_deref(), x, y);
        self.inner.sample_at(x, y)
    }

    fn sample_extrema(&self, polygon: &[Point]) -> Result<(f64, f64)> {
        match self.transform.as_deref() {
            None => self.inner.sample_extrema(polygon),
            Some(t) => {
                let mapped: Vec<Point> = polygon
                    .iter()
                    .map(|p| {
                        let (x, y) = t.forward(p.x, p.y);
                        Point::new(x, y)
                    })
                    .collect();
                self.inner.sample_extrema(&mapped)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp_grid() -> ElevationGrid {
        // 5x5 grid, 10 m cells, elevation = x / 10.
        let mut values = Vec::new();
        for _row in 0..5 {
            for col in 0..5 {
                values.push(col as f64);
            }
        }
        ElevationGrid::new(0.0, 0.0, 10.0, 5, 5, values).unwrap()
    }

    #[test]
    fn bilinear_sample_interpolates() {
        let grid = ramp_grid();
        assert_relative_eq!(grid.sample_at(0.0, 0.0).unwrap(), 0.0);
        assert_relative_eq!(grid.sample_at(40.0, 40.0).unwrap(), 4.0);
        assert_relative_eq!(grid.sample_at(15.0, 20.0).unwrap(), 1.5);
    }

    #[test]
    fn sample_outside_coverage_is_an_error() {
        let grid = ramp_grid();
        assert!(matches!(
            grid.sample_at(500.0, 0.0),
            Err(FlightPlanError::TerrainUnavailable(_))
        ));
    }

    #[test]
    fn extrema_over_polygon() {
        let grid = ramp_grid();
        let polygon = vec![
            Point::new(5.0, 5.0),
            Point::new(35.0, 5.0),
            Point::new(35.0, 35.0),
            Point::new(5.0, 35.0),
        ];
        let (lo, hi) = grid.sample_extrema(&polygon).unwrap();
        assert_relative_eq!(lo, 0.5, epsilon = 1e-9);
        assert_relative_eq!(hi, 3.5, epsilon = 1e-9);
    }

    #[test]
    fn extrema_of_sub_cell_footprint_uses_interpolation() {
        let grid = ramp_grid();
        let tiny = vec![
            Point::new(12.0, 12.0),
            Point::new(13.0, 12.0),
            Point::new(13.0, 13.0),
            Point::new(12.0, 13.0),
        ];
        let (lo, hi) = grid.sample_extrema(&tiny).unwrap();
        assert!(lo >= 1.0 && hi <= 2.0);
    }

    #[test]
    fn grid_shape_validation() {
        assert!(ElevationGrid::new(0.0, 0.0, 10.0, 2, 2, vec![1.0; 3]).is_err());
        assert!(ElevationGrid::new(0.0, 0.0, 0.0, 2, 2, vec![1.0; 4]).is_err());
        assert!(ElevationGrid::new(0.0, 0.0, 10.0, 2, 2, vec![f64::NAN; 4]).is_err());
    }

    struct Shift;
    impl CrsTransform for Shift {
        fn forward(&self, x: f64, y: f64) -> (f64, f64) {
            (x - 100.0, y)
        }
    }

    #[test]
    fn reprojecting_sampler_applies_transform() {
        let grid = Arc::new(ramp_grid());
        let shifted = ReprojectingSampler::new(grid, Some(Arc::new(Shift)));
        assert_relative_eq!(shifted.sample_at(140.0, 40.0).unwrap(), 4.0);
    }
}
