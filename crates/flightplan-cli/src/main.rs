//! Flight planner CLI: plan a photogrammetric flight or control an
//! as-flown mission.

mod mission;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flightplan_core::control::ControlConfig;
use flightplan_core::grid::GridGenerator;
use flightplan_core::models::FlightDesign;
use flightplan_jobs::{submit_altitude_job, submit_control_job};
use mission::{ControlFile, MissionFile, PlanDocument};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "flightplan", about = "Photogrammetric flight planning and control")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate projection centres and photo footprints for a mission
    /// file, with altitudes assigned by the selected strategy.
    Plan {
        /// Mission JSON file.
        mission: PathBuf,
        /// Output JSON file.
        #[arg(short, long, default_value = "plan.json")]
        out: PathBuf,
    },
    /// Verify an as-flown mission against its exposure poses.
    Verify {
        /// Control JSON file.
        control: PathBuf,
        /// Output report JSON file.
        #[arg(short, long, default_value = "report.json")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        Command::Plan { mission, out } => plan(mission, out).await,
        Command::Verify { control, out } => verify(control, out).await,
    }
}

async fn plan(mission_path: PathBuf, out: PathBuf) -> Result<()> {
    let mission = MissionFile::load(&mission_path)?;
    let params = mission.flight_parameters()?;
    let (h_min, h_max) = mission.height_range()?;
    let design = FlightDesign::new(&params, h_min, h_max)?;
    tracing::info!(
        w = format!("{:.1}", design.w),
        w0 = format!("{:.1}", design.w0),
        bx = format!("{:.1}", design.bx),
        by = format!("{:.1}", design.by),
        "flight design derived"
    );

    let area = mission.area_geometry()?;
    let output = GridGenerator::new(&design).plan(&area, params.direction_deg)?;
    tracing::info!(
        strips = output.layers.strip_count,
        photos = output.layers.photo_count,
        "grid generated"
    );

    let terrain = mission.terrain_sampler()?;
    let mut handle = submit_altitude_job(
        output.layers,
        output.coverage,
        mission.altitude_strategy,
        design.clone(),
        terrain,
    );
    let mut progress = handle.take_progress();
    let reporter = tokio::spawn(async move {
        if let Some(rx) = progress.as_mut() {
            while let Some(pct) = rx.recv().await {
                tracing::info!(pct, "altitude solving");
            }
        }
    });
    let layers = handle.finish().await?;
    let _ = reporter.await;

    let document = PlanDocument {
        generated_at: chrono::Utc::now(),
        flying_height_m: design.w,
        design_altitude_m: design.w0,
        base_along_m: design.bx,
        base_across_m: design.by,
        layers,
    };
    let raw = serde_json::to_string_pretty(&document)?;
    std::fs::write(&out, raw).with_context(|| format!("write plan to {out:?}"))?;
    tracing::info!(?out, "plan written");
    Ok(())
}

async fn verify(control_path: PathBuf, out: PathBuf) -> Result<()> {
    let control = ControlFile::load(&control_path)?;
    let camera = control.camera.resolve()?;
    let terrain = control.terrain_sampler()?;
    let config = ControlConfig {
        checks: control.checks,
        threshold: control.threshold,
        nominal_gsd_cm: control.nominal_gsd_cm,
        nominal_forward_overlap: control.nominal_forward_overlap,
        nominal_side_overlap: control.nominal_side_overlap,
        max_refinement_iterations: control.max_refinement_iterations.unwrap_or(10),
        refinement_tolerance_m: control.refinement_tolerance_m,
    };

    let handle = submit_control_job(control.exposures, camera, config, terrain);
    let report = handle.finish().await?;
    tracing::info!(
        passed = report.passed_count,
        failed = report.failed_count,
        "control run finished"
    );

    let raw = serde_json::to_string_pretty(&report)?;
    std::fs::write(&out, raw).with_context(|| format!("write report to {out:?}"))?;
    tracing::info!(?out, "report written");
    Ok(())
}
