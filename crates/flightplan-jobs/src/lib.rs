//! Background execution shell for long-running planning jobs.
//!
//! One job runs at a time per handle, on a dedicated blocking worker of
//! the tokio runtime. The handle exposes a progress channel, cooperative
//! cancellation and exactly one terminal outcome: the finished layers, an
//! error, or `Cancelled`. Partially built results from a cancelled run
//! are dropped with the worker, never surfaced.

use flightplan_core::altitude::{AltitudeSolver, AltitudeStrategy};
use flightplan_core::control::{ControlConfig, ControlEngine, ControlReport, ExposurePose};
use flightplan_core::error::FlightPlanError;
use flightplan_core::geometry::Point;
use flightplan_core::models::{FlightDesign, PlanLayers};
use flightplan_core::camera::Camera;
use flightplan_core::terrain::TerrainSampler;
use flightplan_core::worker::WorkerCtl;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Handle to one submitted job.
pub struct JobHandle<T> {
    progress: Option<mpsc::UnboundedReceiver<u8>>,
    cancel: Arc<AtomicBool>,
    worker: JoinHandle<Result<T, FlightPlanError>>,
}

impl<T> JobHandle<T> {
    /// Take the progress receiver; updates are 0-100 and non-decreasing,
    /// best-effort under load.
    pub fn take_progress(&mut self) -> Option<mpsc::UnboundedReceiver<u8>> {
        self.progress.take()
    }

    /// Request cancellation. Honored at the next strip/segment boundary;
    /// the job then terminates with `Cancelled` and produces no layers.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Wait for the terminal outcome. Resolves exactly once.
    pub async fn finish(self) -> Result<T, FlightPlanError> {
        match self.worker.await {
            Ok(result) => result,
            Err(join_err) => Err(FlightPlanError::Unexpected(format!(
                "worker thread failed: {join_err}"
            ))),
        }
    }
}

fn spawn_job<T, F>(name: &'static str, body: F) -> JobHandle<T>
where
    T: Send + 'static,
    F: FnOnce(&mut WorkerCtl) -> Result<T, FlightPlanError> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_worker = cancel.clone();

    let worker = tokio::task::spawn_blocking(move || {
        let mut ctl = WorkerCtl::new(
            cancel_worker,
            Box::new(move |pct| {
                // Receiver may be gone; progress is advisory.
                let _ = tx.send(pct);
            }),
        );
        tracing::info!(job = name, "job started");
        let result = body(&mut ctl);
        match &result {
            Ok(_) => tracing::info!(job = name, "job finished"),
            Err(FlightPlanError::Cancelled) => {
                tracing::warn!(job = name, "job cancelled by user")
            }
            Err(e) => tracing::error!(job = name, error = %e, "job failed"),
        }
        result
    });

    JobHandle {
        progress: Some(rx),
        cancel,
        worker,
    }
}

/// Run an altitude strategy over generated plan layers.
///
/// Ownership of the layers moves into the worker and transfers back,
/// whole, through `finish()`.
pub fn submit_altitude_job(
    mut layers: PlanLayers,
    coverage: Vec<Vec<Point>>,
    strategy: AltitudeStrategy,
    design: FlightDesign,
    terrain: Arc<dyn TerrainSampler>,
) -> JobHandle<PlanLayers> {
    spawn_job("altitude", move |ctl| {
        AltitudeSolver::new(&design, terrain.as_ref())
            .assign(strategy, &mut layers, &coverage, ctl)?;
        Ok(layers)
    })
}

/// Run a control/verification pass over as-built exposures.
pub fn submit_control_job(
    exposures: Vec<ExposurePose>,
    camera: Camera,
    config: ControlConfig,
    terrain: Arc<dyn TerrainSampler>,
) -> JobHandle<ControlReport> {
    spawn_job("control", move |ctl| {
        ControlEngine::new(&camera, config, terrain.as_ref())?.verify(&exposures, ctl)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flightplan_core::grid::GridGenerator;
    use flightplan_core::models::{AreaGeometry, FlightParameters};
    use flightplan_core::terrain::UniformTerrain;
    use flightplan_core::error::Result as CoreResult;
    use std::sync::mpsc as std_mpsc;
    use std::sync::Mutex;

    fn design() -> FlightDesign {
        let params = FlightParameters {
            camera: Camera::from_sensor_width("t", 35.0, 35.9, 6000, 4000).unwrap(),
            gsd_cm: 5.0,
            forward_overlap: 0.8,
            side_overlap: 0.6,
            increase_overlap: false,
            multiple_base: 0,
            extreme_strip_extension_pct: 0.0,
            direction_deg: 0.0,
        };
        FlightDesign::new(&params, 0.0, 0.0).unwrap()
    }

    fn plan() -> flightplan_core::grid::PlanOutput {
        let area = AreaGeometry::Block {
            polygon: vec![
                Point::new(0.0, 0.0),
                Point::new(1000.0, 0.0),
                Point::new(1000.0, 600.0),
                Point::new(0.0, 600.0),
            ],
        };
        GridGenerator::new(&design()).plan(&area, 0.0).unwrap()
    }

    #[tokio::test]
    async fn altitude_job_finishes_with_full_progress() {
        let out = plan();
        let expected = out.layers.centres.len();
        let mut handle = submit_altitude_job(
            out.layers,
            out.coverage,
            AltitudeStrategy::TerrainFollowing,
            design(),
            Arc::new(UniformTerrain { elevation_m: 50.0 }),
        );
        let mut progress = handle.take_progress().unwrap();
        let layers = handle.finish().await.unwrap();
        assert_eq!(layers.centres.len(), expected);

        let mut updates = Vec::new();
        while let Some(pct) = progress.recv().await {
            updates.push(pct);
        }
        assert!(!updates.is_empty());
        assert!(updates.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(*updates.last().unwrap(), 100);
    }

    /// Terrain sampler that blocks on a gate, so a test can cancel while
    /// the worker is mid-strip.
    struct GatedTerrain {
        gate: Mutex<std_mpsc::Receiver<()>>,
    }

    impl TerrainSampler for GatedTerrain {
        fn sample_at(&self, _x: f64, _y: f64) -> CoreResult<f64> {
            let _ = self.gate.lock().unwrap().recv();
            Ok(0.0)
        }

        fn sample_extrema(&self, _polygon: &[Point]) -> CoreResult<(f64, f64)> {
            let _ = self.gate.lock().unwrap().recv();
            Ok((0.0, 0.0))
        }
    }

    #[tokio::test]
    async fn cancelled_job_yields_no_layers() {
        let out = plan();
        let (release, gate) = std_mpsc::channel();
        let handle = submit_altitude_job(
            out.layers,
            out.coverage,
            AltitudeStrategy::PerStrip,
            design(),
            Arc::new(GatedTerrain {
                gate: Mutex::new(gate),
            }),
        );
        // Kill before the first strip completes, then let the in-flight
        // sample drain.
        handle.cancel();
        drop(release);
        let outcome = handle.finish().await;
        assert!(matches!(outcome, Err(FlightPlanError::Cancelled)));
    }

    #[tokio::test]
    async fn control_job_reports_terminal_result() {
        let camera = Camera::from_sensor_width("t", 35.0, 35.9, 6000, 4000).unwrap();
        let alt = camera.flying_height_m(5.0);
        let exposures = vec![ExposurePose {
            photo: 0,
            strip: Some(0),
            x: 0.0,
            y: 0.0,
            alt_m: alt,
            omega_deg: 0.0,
            phi_deg: 0.0,
            kappa_deg: 0.0,
        }];
        let config = ControlConfig {
            checks: flightplan_core::control::ControlChecks {
                gsd: true,
                ..Default::default()
            },
            threshold: 0.1,
            nominal_gsd_cm: Some(5.0),
            nominal_forward_overlap: None,
            nominal_side_overlap: None,
            max_refinement_iterations: 10,
            refinement_tolerance_m: None,
        };
        let handle = submit_control_job(
            exposures,
            camera,
            config,
            Arc::new(UniformTerrain { elevation_m: 0.0 }),
        );
        let report = handle.finish().await.unwrap();
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.passed_count, 1);
    }

    #[tokio::test]
    async fn invalid_job_surfaces_error_not_panic() {
        let handle = submit_control_job(
            Vec::new(),
            Camera::from_sensor_width("t", 35.0, 35.9, 6000, 4000).unwrap(),
            ControlConfig {
                checks: Default::default(),
                threshold: 0.1,
                nominal_gsd_cm: None,
                nominal_forward_overlap: None,
                nominal_side_overlap: None,
                max_refinement_iterations: 10,
                refinement_tolerance_m: None,
            },
            Arc::new(UniformTerrain { elevation_m: 0.0 }),
        );
        assert!(matches!(
            handle.finish().await,
            Err(FlightPlanError::InvalidParameter(_))
        ));
    }
}
