//! Mission file formats for the CLI: planning input, control input and
//! the emitted layer output.

use anyhow::{bail, Context};
use flightplan_core::altitude::AltitudeStrategy;
use flightplan_core::camera::{Camera, CameraStore};
use flightplan_core::control::{ControlChecks, ExposurePose};
use flightplan_core::geometry::Point;
use flightplan_core::models::{AreaGeometry, Crs, FlightParameters, PlanLayers};
use flightplan_core::terrain::{ElevationGrid, TerrainSampler, UniformTerrain};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Camera reference: inline parameters or a named profile from a store
/// file.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CameraRef {
    Named { profile: String, store: String },
    Inline(Camera),
}

impl CameraRef {
    pub fn resolve(&self) -> anyhow::Result<Camera> {
        match self {
            CameraRef::Inline(camera) => Ok(camera.clone()),
            CameraRef::Named { profile, store } => CameraStore::new(store)
                .find(profile)
                .with_context(|| format!("camera profile {profile:?}")),
        }
    }
}

/// In-file elevation grid, row-major from the lower-left corner.
#[derive(Debug, Clone, Deserialize)]
pub struct TerrainSpec {
    pub origin: [f64; 2],
    pub cell_size_m: f64,
    pub rows: usize,
    pub cols: usize,
    pub elevations_m: Vec<f64>,
}

/// Planning mission file.
#[derive(Debug, Clone, Deserialize)]
pub struct MissionFile {
    #[serde(default)]
    pub crs: Option<Crs>,
    /// Block polygon vertices; exclusive with `corridor`.
    #[serde(default)]
    pub area: Option<Vec<[f64; 2]>>,
    #[serde(default)]
    pub corridor: Option<Vec<[f64; 2]>>,
    #[serde(default)]
    pub buffer_m: Option<f64>,
    pub camera: CameraRef,
    pub gsd_cm: f64,
    pub forward_overlap: f64,
    pub side_overlap: f64,
    #[serde(default)]
    pub increase_overlap: bool,
    #[serde(default)]
    pub multiple_base: u32,
    #[serde(default)]
    pub extreme_strip_extension_pct: f64,
    #[serde(default)]
    pub direction_deg: f64,
    pub altitude_strategy: AltitudeStrategy,
    #[serde(default)]
    pub terrain: Option<TerrainSpec>,
    /// Terrain height range when no grid is supplied [m ASL].
    #[serde(default)]
    pub terrain_min_m: Option<f64>,
    #[serde(default)]
    pub terrain_max_m: Option<f64>,
}

impl MissionFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read mission file {path:?}"))?;
        let mission: MissionFile =
            serde_json::from_str(&raw).with_context(|| format!("parse mission file {path:?}"))?;
        if let Some(crs) = &mission.crs {
            crs.ensure_projected()?;
        }
        Ok(mission)
    }

    pub fn area_geometry(&self) -> anyhow::Result<AreaGeometry> {
        let mut geometry = match (&self.area, &self.corridor) {
            (Some(polygon), None) => AreaGeometry::Block {
                polygon: polygon.iter().map(|[x, y]| Point::new(*x, *y)).collect(),
            },
            (None, Some(line)) => AreaGeometry::Corridor {
                line: line.iter().map(|[x, y]| Point::new(*x, *y)).collect(),
                buffer_m: self
                    .buffer_m
                    .context("corridor mission needs `buffer_m`")?,
            },
            (Some(_), Some(_)) => bail!("mission declares both `area` and `corridor`"),
            (None, None) => bail!("mission declares neither `area` nor `corridor`"),
        };
        // A corridor buffer narrower than half a DTM cell would miss
        // every grid node when sampling extrema.
        if let Some(spec) = &self.terrain {
            geometry.clamp_buffer(spec.cell_size_m / 2.0);
        }
        Ok(geometry)
    }

    pub fn flight_parameters(&self) -> anyhow::Result<FlightParameters> {
        Ok(FlightParameters {
            camera: self.camera.resolve()?,
            gsd_cm: self.gsd_cm,
            forward_overlap: self.forward_overlap,
            side_overlap: self.side_overlap,
            increase_overlap: self.increase_overlap,
            multiple_base: self.multiple_base,
            extreme_strip_extension_pct: self.extreme_strip_extension_pct,
            direction_deg: self.direction_deg,
        })
    }

    pub fn terrain_sampler(&self) -> anyhow::Result<Arc<dyn TerrainSampler>> {
        if let Some(spec) = &self.terrain {
            let grid = ElevationGrid::new(
                spec.origin[0],
                spec.origin[1],
                spec.cell_size_m,
                spec.rows,
                spec.cols,
                spec.elevations_m.clone(),
            )?;
            return Ok(Arc::new(grid));
        }
        let mean = match (self.terrain_min_m, self.terrain_max_m) {
            (Some(lo), Some(hi)) => (lo + hi) / 2.0,
            _ => 0.0,
        };
        Ok(Arc::new(UniformTerrain { elevation_m: mean }))
    }

    /// Height range used to derive the flight design.
    pub fn height_range(&self) -> anyhow::Result<(f64, f64)> {
        if let (Some(lo), Some(hi)) = (self.terrain_min_m, self.terrain_max_m) {
            return Ok((lo, hi));
        }
        if let Some(spec) = &self.terrain {
            let lo = spec
                .elevations_m
                .iter()
                .copied()
                .fold(f64::INFINITY, f64::min);
            let hi = spec
                .elevations_m
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max);
            if !lo.is_finite() || !hi.is_finite() {
                bail!("terrain grid is empty");
            }
            return Ok((lo, hi));
        }
        Ok((0.0, 0.0))
    }
}

/// Control mission file.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlFile {
    #[serde(default)]
    pub crs: Option<Crs>,
    pub camera: CameraRef,
    pub checks: ControlChecks,
    pub threshold: f64,
    #[serde(default)]
    pub nominal_gsd_cm: Option<f64>,
    #[serde(default)]
    pub nominal_forward_overlap: Option<f64>,
    #[serde(default)]
    pub nominal_side_overlap: Option<f64>,
    #[serde(default)]
    pub max_refinement_iterations: Option<u32>,
    #[serde(default)]
    pub refinement_tolerance_m: Option<f64>,
    pub exposures: Vec<ExposurePose>,
    #[serde(default)]
    pub terrain: Option<TerrainSpec>,
    #[serde(default)]
    pub terrain_min_m: Option<f64>,
    #[serde(default)]
    pub terrain_max_m: Option<f64>,
}

impl ControlFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read control file {path:?}"))?;
        let control: ControlFile =
            serde_json::from_str(&raw).with_context(|| format!("parse control file {path:?}"))?;
        if let Some(crs) = &control.crs {
            crs.ensure_projected()?;
        }
        Ok(control)
    }

    pub fn terrain_sampler(&self) -> anyhow::Result<Arc<dyn TerrainSampler>> {
        if let Some(spec) = &self.terrain {
            let grid = ElevationGrid::new(
                spec.origin[0],
                spec.origin[1],
                spec.cell_size_m,
                spec.rows,
                spec.cols,
                spec.elevations_m.clone(),
            )?;
            return Ok(Arc::new(grid));
        }
        let mean = match (self.terrain_min_m, self.terrain_max_m) {
            (Some(lo), Some(hi)) => (lo + hi) / 2.0,
            _ => 0.0,
        };
        Ok(Arc::new(UniformTerrain { elevation_m: mean }))
    }
}

/// Emitted plan: the layers plus a few design values for the operator.
#[derive(Debug, Serialize)]
pub struct PlanDocument {
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub flying_height_m: f64,
    pub design_altitude_m: f64,
    pub base_along_m: f64,
    pub base_across_m: f64,
    pub layers: PlanLayers,
}
