use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::Semaphore;

use super::discovery::normalize;
use super::runner::BoundedCaptureRunner;
use super::types::{CaptureOutcome, CaptureStatus, CaptureSummary, Session};
use crate::error_handling::types::CaptureError;
use crate::report::layout::RunLayout;

const WRITE_PROBE: &str = ".gecko-write-probe";

/// Fans captures out over all sessions of a run.
///
/// Each session gets its own task. At most `max_parallel` grabs are in
/// flight; a session's timeout starts once it holds a slot.
pub struct CaptureOrchestrator {
    runner: Arc<BoundedCaptureRunner>,
    max_parallel: usize,
}

impl CaptureOrchestrator {
    pub fn new(runner: BoundedCaptureRunner, max_parallel: usize) -> Self {
        Self {
            runner: Arc::new(runner),
            max_parallel: max_parallel.max(1),
        }
    }

    /// Captures every session into the run directory of `layout`.
    ///
    /// Returns one outcome per distinct session id, sorted by id. Only an
    /// unusable output directory fails the batch.
    pub async fn run_all(
        &self,
        sessions: Vec<Session>,
        layout: &RunLayout,
    ) -> Result<Vec<CaptureOutcome>, CaptureError> {
        let requested = sessions.len();
        let sessions = normalize(sessions);
        if sessions.len() < requested {
            warn!(
                "Ignoring {} duplicate session ids",
                requested - sessions.len()
            );
        }

        if sessions.is_empty() {
            info!("No display sessions found, skipping screen capture");
            return Ok(Vec::new());
        }

        Self::check_output_dir(layout).await?;

        info!(
            "Capturing {} sessions (timeout {:?}, up to {} at once)",
            sessions.len(),
            self.runner.timeout(),
            self.max_parallel
        );

        let slots = Arc::new(Semaphore::new(self.max_parallel));
        let mut handles = Vec::with_capacity(sessions.len());
        for session in sessions {
            let output = layout.screenshot_path(&session);
            let runner = Arc::clone(&self.runner);
            let slots = Arc::clone(&slots);
            let task_session = session.clone();

            let handle = tokio::spawn(async move {
                let _slot = slots.acquire_owned().await.ok();
                runner.capture(task_session, output).await
            });
            handles.push((session, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (session, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("[{}] capture task failed: {}", session.label(), e);
                    CaptureOutcome::new(
                        session,
                        CaptureStatus::Failed(CaptureError::Application(e.to_string())),
                        Duration::ZERO,
                    )
                }
            };

            match outcome.status() {
                CaptureStatus::Success(_) => info!("{}", outcome),
                _ => warn!("{}", outcome),
            }
            outcomes.push(outcome);
        }

        outcomes.sort_by_key(|o| o.session().id);
        info!("Screen capture finished: {}", CaptureSummary::from_outcomes(&outcomes));
        Ok(outcomes)
    }

    async fn check_output_dir(layout: &RunLayout) -> Result<(), CaptureError> {
        let dir = layout.run_dir();
        let unusable = |e: std::io::Error| {
            error!("Capture output directory {} unusable: {}", dir.display(), e);
            CaptureError::OutputUnavailable(format!("{}: {}", dir.display(), e))
        };

        let probe = dir.join(WRITE_PROBE);
        tokio::fs::write(&probe, b"").await.map_err(unusable)?;
        tokio::fs::remove_file(&probe).await.map_err(unusable)?;
        Ok(())
    }
}
