//! Verification of an already-flown mission against as-built camera
//! orientations.
//!
//! For each exposure the engine reprojects the sensor rectangle through
//! the recorded pose onto the terrain, derives the actual GSD from the
//! local flying height, compares successive footprints for actual
//! overlap, and classifies each exposure against the acceptance
//! threshold.

use crate::camera::Camera;
use crate::error::{FlightPlanError, Result};
use crate::geometry::Point;
use crate::terrain::TerrainSampler;
use crate::worker::WorkerCtl;
use chrono::{DateTime, Utc};
use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// Slack applied when comparing a deviation against the threshold, so a
/// deviation exactly at the threshold passes despite float noise.
const THRESHOLD_EPS: f64 = 1e-9;

/// As-built pose of one exposure, in the layer's projected CRS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposurePose {
    pub photo: u32,
    #[serde(default)]
    pub strip: Option<u32>,
    pub x: f64,
    pub y: f64,
    /// Flight altitude [m ASL].
    pub alt_m: f64,
    pub omega_deg: f64,
    pub phi_deg: f64,
    pub kappa_deg: f64,
}

/// Which checks to run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ControlChecks {
    pub overlap: bool,
    pub gsd: bool,
    pub footprint: bool,
}

/// Control run configuration. The refinement cap and tolerance are
/// deliberately explicit configuration rather than hidden constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    pub checks: ControlChecks,
    /// Acceptance threshold applied to every enabled check: fraction for
    /// overlap, cm for GSD, metres for footprint size. A deviation equal
    /// to the threshold passes.
    pub threshold: f64,
    /// Nominal GSD [cm] the flight was designed for.
    #[serde(default)]
    pub nominal_gsd_cm: Option<f64>,
    /// Nominal forward overlap, fraction.
    #[serde(default)]
    pub nominal_forward_overlap: Option<f64>,
    /// Nominal side overlap, fraction.
    #[serde(default)]
    pub nominal_side_overlap: Option<f64>,
    /// Iteration cap for footprint refinement.
    #[serde(default = "default_refinement_iterations")]
    pub max_refinement_iterations: u32,
    /// Convergence tolerance [m] for footprint refinement; defaults to
    /// `threshold` when unset.
    #[serde(default)]
    pub refinement_tolerance_m: Option<f64>,
}

fn default_refinement_iterations() -> u32 {
    10
}

impl ControlConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.threshold >= 0.0) {
            return Err(FlightPlanError::InvalidParameter(format!(
                "threshold must be non-negative, got {}",
                self.threshold
            )));
        }
        if self.max_refinement_iterations == 0 {
            return Err(FlightPlanError::InvalidParameter(
                "refinement iteration cap must be at least 1".into(),
            ));
        }
        Ok(())
    }

    fn tolerance(&self) -> f64 {
        self.refinement_tolerance_m.unwrap_or(self.threshold)
    }
}

/// Per-exposure verification output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRecord {
    pub photo: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strip: Option<u32>,
    /// Height above locally sampled terrain [m].
    pub flying_height_m: f64,
    pub actual_gsd_cm: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_forward_overlap: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_side_overlap: Option<f64>,
    pub footprint: [Point; 4],
    pub refinement_iterations: u32,
    /// False when the iteration cap was reached before the footprint
    /// settled; reported, not fatal.
    pub refinement_converged: bool,
    pub passed: bool,
    pub failures: Vec<String>,
}

/// The whole verification run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlReport {
    pub generated_at: DateTime<Utc>,
    pub threshold: f64,
    pub records: Vec<ControlRecord>,
    pub passed_count: usize,
    pub failed_count: usize,
}

pub struct ControlEngine<'a> {
    camera: &'a Camera,
    config: ControlConfig,
    terrain: &'a dyn TerrainSampler,
}

struct Projected {
    footprint: [Point; 4],
    ground_m: f64,
    iterations: u32,
    converged: bool,
}

impl<'a> ControlEngine<'a> {
    pub fn new(camera: &'a Camera, config: ControlConfig, terrain: &'a dyn TerrainSampler) -> Result<Self> {
        camera.validate()?;
        config.validate()?;
        Ok(Self {
            camera,
            config,
            terrain,
        })
    }

    pub fn verify(&self, exposures: &[ExposurePose], ctl: &mut WorkerCtl) -> Result<ControlReport> {
        if exposures.is_empty() {
            return Err(FlightPlanError::InvalidParameter(
                "no exposures to verify".into(),
            ));
        }

        let mut projections = Vec::with_capacity(exposures.len());
        let mut current_strip = None;
        for (idx, pose) in exposures.iter().enumerate() {
            if current_strip != pose.strip || pose.strip.is_none() && idx % 16 == 0 {
                ctl.checkpoint()?;
                current_strip = pose.strip;
            }
            projections.push(self.project_exposure(pose)?);
            // First half of the run: footprints.
            ctl.report(idx + 1, exposures.len() * 2);
        }

        let mut records = Vec::with_capacity(exposures.len());
        for (idx, (pose, proj)) in exposures.iter().zip(&projections).enumerate() {
            let flying_height = pose.alt_m - proj.ground_m;
            let actual_gsd_cm =
                flying_height * self.camera.pixel_m() / self.camera.focal_m() * 100.0;

            let forward = self
                .config
                .checks
                .overlap
                .then(|| forward_overlap(exposures, &projections, idx))
                .flatten();
            let side = self
                .config
                .checks
                .overlap
                .then(|| side_overlap(exposures, &projections, idx))
                .flatten();

            let mut failures = Vec::new();
            if flying_height <= 0.0 {
                failures.push(format!(
                    "flying height {flying_height:.1} m is not above terrain"
                ));
            }
            if self.config.checks.gsd {
                if let Some(nominal) = self.config.nominal_gsd_cm {
                    let dev = (actual_gsd_cm - nominal).abs();
                    if dev > self.config.threshold + THRESHOLD_EPS {
                        failures.push(format!(
                            "GSD deviation {dev:.2} cm exceeds threshold {:.2}",
                            self.config.threshold
                        ));
                    }
                }
            }
            if self.config.checks.overlap {
                if let (Some(actual), Some(nominal)) =
                    (forward, self.config.nominal_forward_overlap)
                {
                    let dev = (actual - nominal).abs();
                    if dev > self.config.threshold + THRESHOLD_EPS {
                        failures.push(format!(
                            "forward overlap deviation {dev:.3} exceeds threshold {:.3}",
                            self.config.threshold
                        ));
                    }
                }
                if let (Some(actual), Some(nominal)) = (side, self.config.nominal_side_overlap) {
                    let dev = (actual - nominal).abs();
                    if dev > self.config.threshold + THRESHOLD_EPS {
                        failures.push(format!(
                            "side overlap deviation {dev:.3} exceeds threshold {:.3}",
                            self.config.threshold
                        ));
                    }
                }
            }
            if self.config.checks.footprint {
                let nominal_along =
                    self.camera.pixels_along as f64 * self.camera.pixel_m() * flying_height
                        / self.camera.focal_m();
                let actual_along = mean_side_length(&proj.footprint, 0);
                let dev = (actual_along - nominal_along).abs();
                if dev > self.config.threshold + THRESHOLD_EPS {
                    failures.push(format!(
                        "footprint size deviation {dev:.2} m exceeds threshold {:.2}",
                        self.config.threshold
                    ));
                }
                if !proj.converged {
                    tracing::warn!(
                        photo = pose.photo,
                        iterations = proj.iterations,
                        "footprint refinement cap reached before convergence"
                    );
                }
            }

            records.push(ControlRecord {
                photo: pose.photo,
                strip: pose.strip,
                flying_height_m: flying_height,
                actual_gsd_cm,
                actual_forward_overlap: forward,
                actual_side_overlap: side,
                footprint: proj.footprint,
                refinement_iterations: proj.iterations,
                refinement_converged: proj.converged,
                passed: failures.is_empty(),
                failures,
            });
            ctl.report(exposures.len() + idx + 1, exposures.len() * 2);
        }

        let passed_count = records.iter().filter(|r| r.passed).count();
        let failed_count = records.len() - passed_count;
        Ok(ControlReport {
            generated_at: Utc::now(),
            threshold: self.config.threshold,
            records,
            passed_count,
            failed_count,
        })
    }

    /// Footprint of one exposure. With the footprint check enabled this
    /// iterates: project at the current ground height, re-sample terrain
    /// under the projected footprint, and repeat until the corners move
    /// less than the tolerance or the cap is hit.
    fn project_exposure(&self, pose: &ExposurePose) -> Result<Projected> {
        let mut ground = self.terrain.sample_at(pose.x, pose.y)?;
        let mut footprint = self.project_at(pose, ground)?;
        if !self.config.checks.footprint {
            return Ok(Projected {
                footprint,
                ground_m: ground,
                iterations: 1,
                converged: true,
            });
        }

        let tolerance = self.config.tolerance();
        let cap = self.config.max_refinement_iterations;
        let mut iterations = 1;
        let mut converged = false;
        while iterations < cap {
            let (lo, hi) = self.terrain.sample_extrema(&footprint)?;
            ground = (lo + hi) / 2.0;
            let refined = self.project_at(pose, ground)?;
            let shift = mean_corner_shift(&footprint, &refined);
            footprint = refined;
            iterations += 1;
            if shift <= tolerance {
                converged = true;
                break;
            }
        }
        Ok(Projected {
            footprint,
            ground_m: ground,
            iterations,
            converged,
        })
    }

    /// Intersect the four sensor-corner rays with the horizontal plane at
    /// `ground_m`.
    fn project_at(&self, pose: &ExposurePose, ground_m: f64) -> Result<[Point; 4]> {
        let focal = self.camera.focal_m();
        let half_x = self.camera.pixels_along as f64 * self.camera.pixel_m() / 2.0;
        let half_y = self.camera.pixels_across as f64 * self.camera.pixel_m() / 2.0;
        // R = Rz(kappa) * Ry(phi) * Rx(omega)
        let rotation = Rotation3::from_euler_angles(
            pose.omega_deg.to_radians(),
            pose.phi_deg.to_radians(),
            pose.kappa_deg.to_radians(),
        );

        let mut corners = [Point::new(0.0, 0.0); 4];
        for (i, (cx, cy)) in [
            (-half_x, -half_y),
            (half_x, -half_y),
            (half_x, half_y),
            (-half_x, half_y),
        ]
        .into_iter()
        .enumerate()
        {
            let ray = rotation * Vector3::new(cx, cy, -focal);
            if ray.z >= 0.0 {
                return Err(FlightPlanError::InvalidParameter(format!(
                    "photo {}: sensor corner ray points above the horizon",
                    pose.photo
                )));
            }
            let t = (ground_m - pose.alt_m) / ray.z;
            corners[i] = Point::new(pose.x + t * ray.x, pose.y + t * ray.y);
        }
        Ok(corners)
    }
}

fn centroid(footprint: &[Point; 4]) -> Point {
    Point::new(
        footprint.iter().map(|p| p.x).sum::<f64>() / 4.0,
        footprint.iter().map(|p| p.y).sum::<f64>() / 4.0,
    )
}

fn mean_corner_shift(a: &[Point; 4], b: &[Point; 4]) -> f64 {
    a.iter().zip(b).map(|(p, q)| p.distance(q)).sum::<f64>() / 4.0
}

/// Mean length of the footprint edge pair starting at corner `first`
/// (0 = along-track edges, 1 = across-track edges).
fn mean_side_length(footprint: &[Point; 4], first: usize) -> f64 {
    let d1 = footprint[first].distance(&footprint[first + 1]);
    let d2 = footprint[first + 2].distance(&footprint[(first + 3) % 4]);
    (d1 + d2) / 2.0
}

/// Interval of the footprint's corner projections onto a unit axis
/// through `origin`.
fn footprint_interval(footprint: &[Point; 4], origin: Point, ux: f64, uy: f64) -> (f64, f64) {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for p in footprint {
        let s = (p.x - origin.x) * ux + (p.y - origin.y) * uy;
        lo = lo.min(s);
        hi = hi.max(s);
    }
    (lo, hi)
}

/// Overlap fraction of exposure `idx` with the next exposure of the same
/// strip, along the baseline between the two footprint centres.
fn forward_overlap(
    exposures: &[ExposurePose],
    projections: &[Projected],
    idx: usize,
) -> Option<f64> {
    let next = idx + 1;
    if next >= exposures.len() || exposures[idx].strip != exposures[next].strip {
        return None;
    }
    let c0 = centroid(&projections[idx].footprint);
    let c1 = centroid(&projections[next].footprint);
    let base = c0.distance(&c1);
    if base < f64::EPSILON {
        return Some(1.0);
    }
    let (ux, uy) = ((c1.x - c0.x) / base, (c1.y - c0.y) / base);
    let (lo0, hi0) = footprint_interval(&projections[idx].footprint, c0, ux, uy);
    let (lo1, hi1) = footprint_interval(&projections[next].footprint, c0, ux, uy);
    let overlap = (hi0.min(hi1) - lo0.max(lo1)).max(0.0);
    let extent = hi0 - lo0;
    (extent > 0.0).then(|| overlap / extent)
}

/// Overlap fraction of exposure `idx` with the laterally nearest exposure
/// of the next strip, across the baseline direction.
fn side_overlap(exposures: &[ExposurePose], projections: &[Projected], idx: usize) -> Option<f64> {
    let strip = exposures[idx].strip?;
    let here = Point::new(exposures[idx].x, exposures[idx].y);
    let neighbour = exposures
        .iter()
        .enumerate()
        .filter(|(_, e)| e.strip == Some(strip + 1))
        .min_by(|(_, a), (_, b)| {
            let da = here.distance(&Point::new(a.x, a.y));
            let db = here.distance(&Point::new(b.x, b.y));
            da.total_cmp(&db)
        })
        .map(|(i, _)| i)?;

    let c0 = centroid(&projections[idx].footprint);
    let c1 = centroid(&projections[neighbour].footprint);
    let base = c0.distance(&c1);
    if base < f64::EPSILON {
        return Some(1.0);
    }
    let (ux, uy) = ((c1.x - c0.x) / base, (c1.y - c0.y) / base);
    let (lo0, hi0) = footprint_interval(&projections[idx].footprint, c0, ux, uy);
    let (lo1, hi1) = footprint_interval(&projections[neighbour].footprint, c0, ux, uy);
    let overlap = (hi0.min(hi1) - lo0.max(lo1)).max(0.0);
    let extent = hi0 - lo0;
    (extent > 0.0).then(|| overlap / extent)
}
