//! Error taxonomy shared by the planning and control modules.

use thiserror::Error;

/// Errors produced by flight planning, altitude solving and control runs.
///
/// Validation errors (`InvalidGeometry`, `InvalidParameter`) are returned
/// synchronously before a job starts; everything else can surface from a
/// running job's terminal state.
#[derive(Debug, Error)]
pub enum FlightPlanError {
    /// Degenerate or empty area/corridor, or a geographic CRS where a
    /// projected one is required.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Out-of-range overlap, non-positive dimension or similar bad input.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The elevation grid does not cover the requested footprint.
    #[error("terrain unavailable: {0}")]
    TerrainUnavailable(String),

    /// Vertical segment handed to a slope/intercept computation, or a
    /// zero-length photo base.
    #[error("division by zero in {0}")]
    DivisionByZero(&'static str),

    /// Camera profile store could not be read or written.
    #[error("camera profile store: {0}")]
    ProfileStore(String),

    /// The worker honored a kill request and exited without a result.
    #[error("cancelled by user")]
    Cancelled,

    /// Catch-all; always carries a diagnostic message.
    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

pub type Result<T> = std::result::Result<T, FlightPlanError>;
