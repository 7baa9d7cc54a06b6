//! Camera intrinsics and the named camera profile store.

use crate::error::{FlightPlanError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Metric camera description used by the grid generator and the control
/// engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub name: String,
    /// Focal length [mm].
    pub focal_length_mm: f64,
    /// Physical pixel size on the sensor [um].
    pub pixel_size_um: f64,
    /// Pixel count along track.
    pub pixels_along: u32,
    /// Pixel count across track.
    pub pixels_across: u32,
}

impl Camera {
    pub fn new(
        name: impl Into<String>,
        focal_length_mm: f64,
        pixel_size_um: f64,
        pixels_along: u32,
        pixels_across: u32,
    ) -> Result<Self> {
        let camera = Self {
            name: name.into(),
            focal_length_mm,
            pixel_size_um,
            pixels_along,
            pixels_across,
        };
        camera.validate()?;
        Ok(camera)
    }

    /// Build a camera from the physical sensor width instead of an
    /// explicit pixel size.
    pub fn from_sensor_width(
        name: impl Into<String>,
        focal_length_mm: f64,
        sensor_width_mm: f64,
        pixels_along: u32,
        pixels_across: u32,
    ) -> Result<Self> {
        if pixels_along == 0 {
            return Err(FlightPlanError::InvalidParameter(
                "pixels along track must be positive".into(),
            ));
        }
        let pixel_size_um = sensor_width_mm * 1000.0 / pixels_along as f64;
        Self::new(name, focal_length_mm, pixel_size_um, pixels_along, pixels_across)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.focal_length_mm > 0.0) {
            return Err(FlightPlanError::InvalidParameter(format!(
                "focal length must be positive, got {}",
                self.focal_length_mm
            )));
        }
        if !(self.pixel_size_um > 0.0) {
            return Err(FlightPlanError::InvalidParameter(format!(
                "pixel size must be positive, got {}",
                self.pixel_size_um
            )));
        }
        if self.pixels_along == 0 || self.pixels_across == 0 {
            return Err(FlightPlanError::InvalidParameter(
                "sensor pixel counts must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Flying height above mean terrain [m] required for a target GSD
    /// [cm].
    pub fn flying_height_m(&self, gsd_cm: f64) -> f64 {
        ((gsd_cm * 10.0) / (self.pixel_size_um / 1000.0) * self.focal_length_mm) / 1000.0
    }

    /// Ground length of one image along track [m] at a target GSD [cm].
    pub fn image_length_along_m(&self, gsd_cm: f64) -> f64 {
        self.pixels_along as f64 * gsd_cm / 100.0
    }

    /// Ground length of one image across track [m] at a target GSD [cm].
    pub fn image_length_across_m(&self, gsd_cm: f64) -> f64 {
        self.pixels_across as f64 * gsd_cm / 100.0
    }

    /// Focal length [m].
    pub fn focal_m(&self) -> f64 {
        self.focal_length_mm / 1000.0
    }

    /// Pixel size [m].
    pub fn pixel_m(&self) -> f64 {
        self.pixel_size_um / 1e6
    }
}

/// JSON-backed store of named camera profiles.
#[derive(Debug, Clone)]
pub struct CameraStore {
    path: PathBuf,
}

impl CameraStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self) -> Result<Vec<Camera>> {
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| FlightPlanError::ProfileStore(format!("read {:?}: {e}", self.path)))?;
        serde_json::from_str(&raw)
            .map_err(|e| FlightPlanError::ProfileStore(format!("parse {:?}: {e}", self.path)))
    }

    pub fn save(&self, cameras: &[Camera]) -> Result<()> {
        let raw = serde_json::to_string_pretty(cameras)
            .map_err(|e| FlightPlanError::ProfileStore(e.to_string()))?;
        std::fs::write(&self.path, raw)
            .map_err(|e| FlightPlanError::ProfileStore(format!("write {:?}: {e}", self.path)))
    }

    /// Add or replace a profile by name.
    pub fn upsert(&self, camera: Camera) -> Result<()> {
        camera.validate()?;
        let mut cameras = self.load().unwrap_or_default();
        cameras.retain(|c| c.name != camera.name);
        cameras.push(camera);
        self.save(&cameras)
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let mut cameras = self.load()?;
        let before = cameras.len();
        cameras.retain(|c| c.name != name);
        if cameras.len() == before {
            return Err(FlightPlanError::ProfileStore(format!(
                "no camera named {name:?}"
            )));
        }
        self.save(&cameras)
    }

    pub fn find(&self, name: &str) -> Result<Camera> {
        self.load()?
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| FlightPlanError::ProfileStore(format!("no camera named {name:?}")))
    }
}
