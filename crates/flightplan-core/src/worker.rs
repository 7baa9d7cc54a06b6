//! Cooperative progress reporting and cancellation for long-running jobs.

use crate::error::{FlightPlanError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Sink for 0-100 progress updates.
pub type ProgressFn = Box<dyn FnMut(u8) + Send>;

/// Handed into altitude and control runs by the execution shell.
///
/// Progress updates are advisory and delivered in non-decreasing order;
/// the cancel flag is polled at strip/segment boundaries only, so
/// in-flight fine-grained work completes before a kill request is
/// honored.
pub struct WorkerCtl {
    cancel: Arc<AtomicBool>,
    progress: Option<ProgressFn>,
    last_reported: u8,
}

impl WorkerCtl {
    pub fn new(cancel: Arc<AtomicBool>, progress: ProgressFn) -> Self {
        Self {
            cancel,
            progress: Some(progress),
            last_reported: 0,
        }
    }

    /// Control block that never reports and cannot be cancelled.
    pub fn noop() -> Self {
        Self {
            cancel: Arc::new(AtomicBool::new(false)),
            progress: None,
            last_reported: 0,
        }
    }

    /// Checked between coarse-grained units of work.
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(FlightPlanError::Cancelled);
        }
        Ok(())
    }

    /// Report `done` out of `total` units, clamped to a monotone 0-100.
    pub fn report(&mut self, done: usize, total: usize) {
        if total == 0 {
            return;
        }
        let pct = ((done.min(total) * 100) / total) as u8;
        if pct > self.last_reported {
            self.last_reported = pct;
            if let Some(progress) = self.progress.as_mut() {
                progress(pct);
            }
        }
    }
}
