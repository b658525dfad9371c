use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::time::Instant;

use super::grabber::ScreenGrabber;
use super::types::{CaptureOutcome, CaptureStatus, Session};
use crate::error_handling::types::CaptureError;
use crate::report::layout::staging_path;

/// Runs one capture under a hard wall-clock limit.
///
/// The grab runs as its own task and writes to a staging path next to the
/// requested output. Only a grab that finishes in time is moved to the
/// output path. If the limit expires first the task is detached: it is
/// neither awaited nor interrupted, and whatever it writes stays under the
/// staging name.
pub struct BoundedCaptureRunner {
    grabber: Arc<dyn ScreenGrabber>,
    timeout: Duration,
}

impl BoundedCaptureRunner {
    pub fn new(grabber: Arc<dyn ScreenGrabber>, timeout: Duration) -> Self {
        Self { grabber, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn capture(&self, session: Session, output: PathBuf) -> CaptureOutcome {
        let started = Instant::now();
        let grabber = Arc::clone(&self.grabber);
        let task_session = session.clone();
        let staging = staging_path(&output);

        debug!("[{}] capture dispatched to {}", session.label(), staging.display());
        let handle =
            tokio::spawn(async move { grabber.grab(&task_session, &staging).await });

        let status = match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(Ok(written))) => match tokio::fs::rename(&written, &output).await {
                Ok(()) => CaptureStatus::Success(output),
                Err(e) => CaptureStatus::Failed(CaptureError::Application(format!(
                    "cannot move {} to {}: {}",
                    written.display(),
                    output.display(),
                    e
                ))),
            },
            Ok(Ok(Err(e))) => CaptureStatus::Failed(e),
            Ok(Err(join_error)) => CaptureStatus::Failed(CaptureError::Application(format!(
                "capture task ended abnormally: {}",
                join_error
            ))),
            Err(_) => {
                warn!(
                    "[{}] capture exceeded {:?}, abandoning it",
                    session.label(),
                    self.timeout
                );
                CaptureStatus::TimedOut
            }
        };

        CaptureOutcome::new(session, status, started.elapsed())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::path::Path;

    use crate::error_handling::types::NetworkFailure;

    /// Writes a fake screenshot, except for sessions it is told to hang on
    /// or to refuse.
    pub(crate) struct FakeGrabber {
        pub hang: HashSet<u32>,
        pub refuse: HashSet<u32>,
        pub delay: Duration,
    }

    impl FakeGrabber {
        pub fn new() -> Self {
            Self {
                hang: HashSet::new(),
                refuse: HashSet::new(),
                delay: Duration::ZERO,
            }
        }
    }

    /// Writes part of an image, overruns any deadline below `stall`, then
    /// finishes writing.
    pub(crate) struct LateWriter {
        pub stall: Duration,
    }

    #[async_trait]
    impl ScreenGrabber for LateWriter {
        async fn grab(&self, _: &Session, output: &Path) -> Result<PathBuf, CaptureError> {
            std::fs::write(output, b"\x89PNG")
                .map_err(|e| CaptureError::Application(e.to_string()))?;
            tokio::time::sleep(self.stall).await;
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(output)
                .map_err(|e| CaptureError::Application(e.to_string()))?;
            std::io::Write::write_all(&mut file, &[0u8; 4096])
                .map_err(|e| CaptureError::Application(e.to_string()))?;
            Ok(output.to_path_buf())
        }
    }

    #[async_trait]
    impl ScreenGrabber for FakeGrabber {
        async fn grab(&self, session: &Session, output: &Path) -> Result<PathBuf, CaptureError> {
            if self.hang.contains(&session.id) {
                std::future::pending::<()>().await;
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.refuse.contains(&session.id) {
                return Err(CaptureError::network(
                    NetworkFailure::ConnectionRefused,
                    "connection refused",
                ));
            }
            std::fs::write(output, b"\x89PNG").map_err(|e| CaptureError::Application(e.to_string()))?;
            Ok(output.to_path_buf())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_grab_times_out() {
        let mut grabber = FakeGrabber::new();
        grabber.hang.insert(1);
        let timeout = Duration::from_secs(5);
        let runner = BoundedCaptureRunner::new(Arc::new(grabber), timeout);

        let started = Instant::now();
        let outcome = runner
            .capture(Session::x11(1), PathBuf::from("/nonexistent/shot.png"))
            .await;

        assert_eq!(outcome.status(), &CaptureStatus::TimedOut);
        assert!(started.elapsed() >= timeout);
        assert!(started.elapsed() < timeout + Duration::from_millis(100));
        assert!(outcome.elapsed() >= timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_grab_succeeds() {
        let dir = tempfile::TempDir::new().unwrap();
        let output = dir.path().join("shot.png");
        let mut grabber = FakeGrabber::new();
        grabber.delay = Duration::from_secs(1);
        let runner = BoundedCaptureRunner::new(Arc::new(grabber), Duration::from_secs(5));

        let outcome = runner.capture(Session::x11(1), output.clone()).await;

        assert_eq!(outcome.status(), &CaptureStatus::Success(output));
        assert!(outcome.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_write_never_reaches_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let output = dir.path().join("shot.png");
        let grabber = LateWriter {
            stall: Duration::from_secs(30),
        };
        let runner = BoundedCaptureRunner::new(Arc::new(grabber), Duration::from_secs(5));

        let outcome = runner.capture(Session::x11(1), output.clone()).await;
        assert_eq!(outcome.status(), &CaptureStatus::TimedOut);

        // Let the abandoned grab finish its write.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!output.exists());
        assert_eq!(std::fs::read(staging_path(&output)).unwrap().len(), 4 + 4096);
    }

    #[tokio::test]
    async fn test_grab_error_is_reported() {
        let mut grabber = FakeGrabber::new();
        grabber.refuse.insert(2);
        let runner = BoundedCaptureRunner::new(Arc::new(grabber), Duration::from_secs(5));

        let outcome = runner
            .capture(Session::x11(2), PathBuf::from("unused.png"))
            .await;

        match outcome.status() {
            CaptureStatus::Failed(e) => assert!(e.is_network()),
            other => panic!("unexpected status {:?}", other),
        }
        assert_eq!(outcome.session().id, 2);
    }

    #[tokio::test]
    async fn test_panicking_grab_is_a_failure() {
        struct Panics;

        #[async_trait]
        impl ScreenGrabber for Panics {
            async fn grab(&self, _: &Session, _: &Path) -> Result<PathBuf, CaptureError> {
                panic!("grabber bug");
            }
        }

        let runner = BoundedCaptureRunner::new(Arc::new(Panics), Duration::from_secs(5));
        let outcome = runner.capture(Session::x11(1), PathBuf::from("x.png")).await;
        assert!(matches!(
            outcome.status(),
            CaptureStatus::Failed(CaptureError::Application(_))
        ));
    }
}
