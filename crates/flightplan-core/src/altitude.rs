//! Altitude assignment: fixed, per-strip and terrain-following
//! strategies.
//!
//! All strategies assign `w + mean(local terrain extrema)` to each
//! projection centre; they differ only in the grouping over which the
//! extrema are sampled. None of them changes the count or ordering of
//! points.

use crate::error::{FlightPlanError, Result};
use crate::geometry::{polygon_bounds, Point};
use crate::models::{FlightDesign, PlanLayers};
use crate::terrain::TerrainSampler;
use crate::worker::WorkerCtl;
use serde::{Deserialize, Serialize};

/// Mutually exclusive altitude strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AltitudeStrategy {
    /// One altitude for the whole flight from whole-area extrema.
    Fixed,
    /// Constant altitude per strip (block) or corridor segment.
    PerStrip,
    /// Independent altitude per exposure from its footprint window.
    TerrainFollowing,
}

pub struct AltitudeSolver<'a> {
    design: &'a FlightDesign,
    terrain: &'a dyn TerrainSampler,
}

impl<'a> AltitudeSolver<'a> {
    pub fn new(design: &'a FlightDesign, terrain: &'a dyn TerrainSampler) -> Self {
        Self { design, terrain }
    }

    /// Populate the elevation of every centre in `layers` in place.
    ///
    /// `coverage` is the polygon(s) the plan was generated from: the
    /// block polygon, or one buffer polygon per corridor segment.
    pub fn assign(
        &self,
        strategy: AltitudeStrategy,
        layers: &mut PlanLayers,
        coverage: &[Vec<Point>],
        ctl: &mut WorkerCtl,
    ) -> Result<()> {
        if layers.centres.len() != layers.footprints.len() {
            return Err(FlightPlanError::Unexpected(format!(
                "layer mismatch: {} centres vs {} footprints",
                layers.centres.len(),
                layers.footprints.len()
            )));
        }
        match strategy {
            AltitudeStrategy::Fixed => self.assign_fixed(layers, coverage, ctl),
            AltitudeStrategy::PerStrip => self.assign_per_strip(layers, ctl),
            AltitudeStrategy::TerrainFollowing => self.assign_terrain_following(layers, ctl),
        }
    }

    fn assign_fixed(
        &self,
        layers: &mut PlanLayers,
        coverage: &[Vec<Point>],
        ctl: &mut WorkerCtl,
    ) -> Result<()> {
        ctl.checkpoint()?;
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for polygon in coverage {
            let (p_lo, p_hi) = self.terrain.sample_extrema(polygon)?;
            lo = lo.min(p_lo);
            hi = hi.max(p_hi);
        }
        if !lo.is_finite() {
            return Err(FlightPlanError::TerrainUnavailable(
                "no coverage polygon to sample".into(),
            ));
        }
        let alt = self.design.w + (lo + hi) / 2.0;
        for centre in &mut layers.centres {
            centre.alt_m = alt;
        }
        ctl.report(1, 1);
        Ok(())
    }

    fn assign_per_strip(&self, layers: &mut PlanLayers, ctl: &mut WorkerCtl) -> Result<()> {
        // Corridor plans group by physical segment, block plans by
        // strip. Snapshot the keys up front; the loop below mutates the
        // centres.
        let keys: Vec<u32> = layers
            .centres
            .iter()
            .map(|c| c.segment.unwrap_or(c.strip))
            .collect();

        // Contiguous runs: the generator orders points by strip within
        // segment.
        let n = keys.len();
        let mut start = 0usize;
        let mut groups_done = 0usize;
        let total_groups = {
            let mut count = 0usize;
            let mut i = 0usize;
            while i < n {
                let g = keys[i];
                while i < n && keys[i] == g {
                    i += 1;
                }
                count += 1;
            }
            count.max(1)
        };

        while start < n {
            ctl.checkpoint()?;
            let group = keys[start];
            let mut end = start;
            while end < n && keys[end] == group {
                end += 1;
            }

            // Union footprint of the group, as its axis-aligned bounds.
            let corners: Vec<Point> = layers.footprints[start..end]
                .iter()
                .flat_map(|f| f.corners)
                .collect();
            let (min_b, max_b) = polygon_bounds(&corners).ok_or_else(|| {
                FlightPlanError::Unexpected("empty footprint group".into())
            })?;
            let envelope = vec![
                min_b,
                Point::new(max_b.x, min_b.y),
                max_b,
                Point::new(min_b.x, max_b.y),
            ];
            let (lo, hi) = self.terrain.sample_extrema(&envelope)?;
            let alt = self.design.w + (lo + hi) / 2.0;
            for centre in &mut layers.centres[start..end] {
                centre.alt_m = alt;
            }

            groups_done += 1;
            ctl.report(groups_done, total_groups);
            start = end;
        }
        Ok(())
    }

    fn assign_terrain_following(&self, layers: &mut PlanLayers, ctl: &mut WorkerCtl) -> Result<()> {
        let n = layers.centres.len();
        let mut current_strip = None;
        for idx in 0..n {
            let strip = layers.centres[idx].strip;
            if current_strip != Some(strip) {
                // Cancellation is honored at strip boundaries only.
                ctl.checkpoint()?;
                current_strip = Some(strip);
            }
            let window = layers.footprints[idx].polygon();
            let (lo, hi) = self.terrain.sample_extrema(&window)?;
            layers.centres[idx].alt_m = self.design.w + (lo + hi) / 2.0;
            ctl.report(idx + 1, n);
        }
        Ok(())
    }
}
