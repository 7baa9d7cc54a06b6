//! Photogrammetric flight planning: rotated-grid generation, altitude
//! strategies against a terrain model, and control of as-flown missions.

pub mod altitude;
pub mod camera;
pub mod control;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod models;
pub mod terrain;
pub mod worker;

pub use altitude::{AltitudeSolver, AltitudeStrategy};
pub use camera::{Camera, CameraStore};
pub use control::{
    ControlChecks, ControlConfig, ControlEngine, ControlRecord, ControlReport, ExposurePose,
};
pub use error::{FlightPlanError, Result};
pub use geometry::{
    line_equation, normalize_angle_deg, transform_coordinate, CrsTransform, LineEq, Point,
    RotatedBoundingBox,
};
pub use grid::{GridCursor, GridGenerator, PlanOutput};
pub use models::{
    AreaGeometry, Crs, FlightDesign, FlightParameters, PhotoFootprint, PlanLayers,
    ProjectionCentre,
};
pub use terrain::{ElevationGrid, ReprojectingSampler, TerrainSampler, UniformTerrain};
pub use worker::WorkerCtl;
