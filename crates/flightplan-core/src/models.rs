//! Core data model: areas, flight parameters, derived design values and
//! the generated point/footprint layers.

use crate::camera::Camera;
use crate::error::{FlightPlanError, Result};
use crate::geometry::Point;
use serde::{Deserialize, Serialize};

/// Coordinate reference system identity as the caller declared it.
///
/// The planner itself never reprojects; it only refuses geographic
/// coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crs {
    pub authid: String,
    #[serde(default)]
    pub geographic: bool,
}

impl Crs {
    pub fn projected(authid: impl Into<String>) -> Self {
        Self {
            authid: authid.into(),
            geographic: false,
        }
    }

    pub fn ensure_projected(&self) -> Result<()> {
        if self.geographic {
            return Err(FlightPlanError::InvalidGeometry(format!(
                "CRS {} is geographic; a projected CRS is required",
                self.authid
            )));
        }
        Ok(())
    }
}

/// The area to be covered: a block polygon or a buffered corridor line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaGeometry {
    Block { polygon: Vec<Point> },
    Corridor { line: Vec<Point>, buffer_m: f64 },
}

impl AreaGeometry {
    pub fn validate(&self) -> Result<()> {
        match self {
            AreaGeometry::Block { polygon } => {
                if polygon.len() < 3 {
                    return Err(FlightPlanError::InvalidGeometry(format!(
                        "block polygon needs at least 3 vertices, got {}",
                        polygon.len()
                    )));
                }
            }
            AreaGeometry::Corridor { line, buffer_m } => {
                if line.len() < 2 {
                    return Err(FlightPlanError::InvalidGeometry(format!(
                        "corridor line needs at least 2 points, got {}",
                        line.len()
                    )));
                }
                if !(*buffer_m > 0.0) {
                    return Err(FlightPlanError::InvalidParameter(format!(
                        "corridor buffer must be positive, got {buffer_m}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Raise a corridor buffer below `min_m` up to it. A buffer narrower
    /// than half a DTM cell can slip between grid nodes during extrema
    /// sampling. Blocks are unaffected.
    pub fn clamp_buffer(&mut self, min_m: f64) {
        if let AreaGeometry::Corridor { buffer_m, .. } = self {
            if *buffer_m < min_m {
                tracing::warn!(
                    buffer_m = *buffer_m,
                    min_m,
                    "corridor buffer below sampling minimum, clamping"
                );
                *buffer_m = min_m;
            }
        }
    }
}

/// Acquisition parameters as entered by the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightParameters {
    pub camera: Camera,
    /// Target ground sample distance [cm].
    pub gsd_cm: f64,
    /// Forward overlap `p`, fraction in (0, 1).
    pub forward_overlap: f64,
    /// Side overlap `q`, fraction in (0, 1).
    pub side_overlap: f64,
    /// Grow `p`/`q` to compensate for terrain relief.
    #[serde(default)]
    pub increase_overlap: bool,
    /// Extra photo bases past each strip end for the turnaround.
    #[serde(default)]
    pub multiple_base: u32,
    /// Outward displacement of the extreme strips, percent of `By`.
    #[serde(default)]
    pub extreme_strip_extension_pct: f64,
    /// Compass flight direction [deg], 0 = north. Block mode only.
    #[serde(default)]
    pub direction_deg: f64,
}

impl FlightParameters {
    pub fn validate(&self) -> Result<()> {
        self.camera.validate()?;
        if !(self.gsd_cm > 0.0) {
            return Err(FlightPlanError::InvalidParameter(format!(
                "GSD must be positive, got {}",
                self.gsd_cm
            )));
        }
        for (name, value) in [
            ("forward overlap", self.forward_overlap),
            ("side overlap", self.side_overlap),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(FlightPlanError::InvalidParameter(format!(
                    "{name} must be in (0, 1), got {value}"
                )));
            }
        }
        if self.extreme_strip_extension_pct < 0.0 {
            return Err(FlightPlanError::InvalidParameter(format!(
                "extreme strip extension must be non-negative, got {}",
                self.extreme_strip_extension_pct
            )));
        }
        Ok(())
    }
}

/// Quantities derived from the parameters and the terrain height range.
///
/// Immutable once computed; both the grid generator and the altitude
/// solver consume it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightDesign {
    /// Flying height above mean terrain [m].
    pub w: f64,
    /// Design flight altitude above sea level [m].
    pub w0: f64,
    /// Effective forward overlap after optional growth correction.
    pub p: f64,
    /// Effective side overlap after optional growth correction.
    pub q: f64,
    /// Image ground length along track [m].
    pub len_along_m: f64,
    /// Image ground length across track [m].
    pub len_across_m: f64,
    /// Longitudinal base `Bx` [m].
    pub bx: f64,
    /// Transverse base `By` [m].
    pub by: f64,
    /// Angle of the image half-diagonal [rad].
    pub theta_rad: f64,
    /// Image half-diagonal on the ground [m].
    pub half_diag_m: f64,
    pub multiple_base: u32,
    pub extreme_strip_extension_pct: f64,
}

impl FlightDesign {
    /// Derive the design from parameters plus the min/max terrain height
    /// over the area [m ASL].
    pub fn new(params: &FlightParameters, h_min: f64, h_max: f64) -> Result<Self> {
        params.validate()?;
        if h_max < h_min {
            return Err(FlightPlanError::InvalidParameter(format!(
                "terrain max {h_max} below min {h_min}"
            )));
        }
        let w = params.camera.flying_height_m(params.gsd_cm);
        let mean_h = (h_max + h_min) / 2.0;
        let w0 = w + mean_h;

        let (mut p, mut q) = (params.forward_overlap, params.side_overlap);
        if params.increase_overlap {
            let relief = (h_max - h_min) / 2.0;
            p += 0.5 * relief / w;
            q += 0.7 * relief / w;
            if p >= 1.0 || q >= 1.0 {
                return Err(FlightPlanError::InvalidParameter(format!(
                    "overlap growth pushed p/q out of range: p={p:.3}, q={q:.3}"
                )));
            }
        }

        let len_along_m = params.camera.image_length_along_m(params.gsd_cm);
        let len_across_m = params.camera.image_length_across_m(params.gsd_cm);
        let bx = len_along_m * (1.0 - p);
        let by = len_across_m * (1.0 - q);
        if bx <= 0.0 || by <= 0.0 {
            return Err(FlightPlanError::DivisionByZero("photo base"));
        }

        Ok(Self {
            w,
            w0,
            p,
            q,
            len_along_m,
            len_across_m,
            bx,
            by,
            theta_rad: (len_across_m / 2.0).atan2(len_along_m / 2.0).abs(),
            half_diag_m: ((len_along_m / 2.0).powi(2) + (len_across_m / 2.0).powi(2)).sqrt(),
            multiple_base: params.multiple_base,
            extreme_strip_extension_pct: params.extreme_strip_extension_pct,
        })
    }
}

/// Camera position at the instant of one exposure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionCentre {
    pub x: f64,
    pub y: f64,
    /// Assigned flight altitude [m ASL].
    pub alt_m: f64,
    /// Strip number, monotone across the sweep.
    pub strip: u32,
    /// Photo number, sequential across strips without reset.
    pub photo: u32,
    /// Originating corridor segment, corridor mode only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment: Option<u32>,
}

/// Ground rectangle covered by one exposure, oriented along the flight
/// angle. One-to-one with a `ProjectionCentre`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoFootprint {
    pub strip: u32,
    pub photo: u32,
    pub corners: [Point; 4],
}

impl PhotoFootprint {
    pub fn polygon(&self) -> Vec<Point> {
        self.corners.to_vec()
    }
}

/// The generated plan: parallel centre/footprint collections ordered by
/// strip then photo index, plus final counters so a multi-segment caller
/// can continue numbering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanLayers {
    pub centres: Vec<ProjectionCentre>,
    pub footprints: Vec<PhotoFootprint>,
    pub strip_count: u32,
    pub photo_count: u32,
}

impl PlanLayers {
    pub fn merge(&mut self, other: PlanLayers) {
        self.centres.extend(other.centres);
        self.footprints.extend(other.footprints);
        self.strip_count = other.strip_count;
        self.photo_count = other.photo_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params() -> FlightParameters {
        FlightParameters {
            camera: Camera::from_sensor_width("t", 35.0, 35.9, 6000, 4000).unwrap(),
            gsd_cm: 5.0,
            forward_overlap: 0.8,
            side_overlap: 0.6,
            increase_overlap: false,
            multiple_base: 0,
            extreme_strip_extension_pct: 0.0,
            direction_deg: 0.0,
        }
    }

    #[test]
    fn design_bases_from_overlap() {
        let design = FlightDesign::new(&params(), 100.0, 140.0).unwrap();
        assert_relative_eq!(design.len_along_m, 300.0);
        assert_relative_eq!(design.len_across_m, 200.0);
        assert_relative_eq!(design.bx, 60.0, epsilon = 1e-9);
        assert_relative_eq!(design.by, 80.0, epsilon = 1e-9);
        assert_relative_eq!(design.w0, design.w + 120.0, epsilon = 1e-9);
    }

    #[test]
    fn overlap_growth_correction() {
        let mut p = params();
        p.increase_overlap = true;
        let design = FlightDesign::new(&p, 0.0, 200.0).unwrap();
        let w = p.camera.flying_height_m(5.0);
        assert_relative_eq!(design.p, 0.8 + 0.5 * 100.0 / w, epsilon = 1e-9);
        assert_relative_eq!(design.q, 0.6 + 0.7 * 100.0 / w, epsilon = 1e-9);
    }

    #[test]
    fn out_of_range_overlap_rejected() {
        let mut bad = params();
        bad.forward_overlap = 1.0;
        assert!(matches!(
            FlightDesign::new(&bad, 0.0, 0.0),
            Err(FlightPlanError::InvalidParameter(_))
        ));
    }

    #[test]
    fn corridor_buffer_clamped_to_minimum() {
        let mut area = AreaGeometry::Corridor {
            line: vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0)],
            buffer_m: 2.0,
        };
        area.clamp_buffer(5.0);
        let AreaGeometry::Corridor { buffer_m, .. } = &area else {
            unreachable!()
        };
        assert_eq!(*buffer_m, 5.0);

        // A buffer already above the minimum is left alone.
        area.clamp_buffer(1.0);
        let AreaGeometry::Corridor { buffer_m, .. } = &area else {
            unreachable!()
        };
        assert_eq!(*buffer_m, 5.0);
    }

    #[test]
    fn geographic_crs_rejected() {
        let crs = Crs {
            authid: "EPSG:4326".into(),
            geographic: true,
        };
        assert!(crs.ensure_projected().is_err());
        assert!(Crs::projected("EPSG:2180").ensure_projected().is_ok());
    }
}
