use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::configuration::types::VNC_BASE_PORT;
use crate::error_handling::types::CaptureError;

/// Where a session's screen can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Vnc { host: String, port: u16 },
    /// Local X display string such as `:1`.
    Display { display: String },
}

/// One capturable display session. Immutable once discovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: u32,
    pub endpoint: Endpoint,
    pub credential: Option<String>,
}

impl Session {
    /// VNC session `id` on `host`, listening on port `5900 + id`.
    ///
    /// Returns `None` when the derived port does not fit in a `u16`.
    pub fn vnc(id: u32, host: &str, credential: Option<String>) -> Option<Self> {
        let port = u16::try_from(id)
            .ok()
            .and_then(|id| VNC_BASE_PORT.checked_add(id))?;
        Some(Self {
            id,
            endpoint: Endpoint::Vnc {
                host: host.to_string(),
                port,
            },
            credential,
        })
    }

    pub fn x11(id: u32) -> Self {
        Self {
            id,
            endpoint: Endpoint::Display {
                display: format!(":{}", id),
            },
            credential: None,
        }
    }

    /// Zero-padded session number used in screenshot file names.
    pub fn label(&self) -> String {
        format!("{:02}", self.id)
    }

    /// X-style display name: `host:N` for VNC, `:N` for a local display.
    pub fn display_name(&self) -> String {
        match &self.endpoint {
            Endpoint::Vnc { host, .. } => format!("{}:{}", host, self.id),
            Endpoint::Display { display } => display.clone(),
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.endpoint {
            Endpoint::Vnc { host, port } => write!(f, "session {} ({}:{})", self.label(), host, port),
            Endpoint::Display { display } => write!(f, "session {} ({})", self.label(), display),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureStatus {
    Success(PathBuf),
    Failed(CaptureError),
    TimedOut,
}

impl CaptureStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, CaptureStatus::Success(_))
    }
}

impl fmt::Display for CaptureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureStatus::Success(path) => write!(f, "captured to {}", path.display()),
            CaptureStatus::Failed(e) => {
                let hint = if e.is_retryable() { " (retryable)" } else { "" };
                write!(f, "failed: {}{}", e, hint)
            }
            CaptureStatus::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Result of one capture attempt. Built once by the runner and never mutated.
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    session: Session,
    status: CaptureStatus,
    elapsed: Duration,
}

impl CaptureOutcome {
    pub(crate) fn new(session: Session, status: CaptureStatus, elapsed: Duration) -> Self {
        Self {
            session,
            status,
            elapsed,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn status(&self) -> &CaptureStatus {
        &self.status
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Screenshot path for a successful capture.
    pub fn screenshot(&self) -> Option<&PathBuf> {
        match &self.status {
            CaptureStatus::Success(path) => Some(path),
            _ => None,
        }
    }
}

impl fmt::Display for CaptureOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} after {:.1}s",
            self.session,
            self.status,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Per-status counts over one batch of outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl CaptureSummary {
    pub fn from_outcomes(outcomes: &[CaptureOutcome]) -> Self {
        outcomes
            .iter()
            .fold(CaptureSummary::default(), |mut acc, outcome| {
                acc.total += 1;
                match outcome.status() {
                    CaptureStatus::Success(_) => acc.succeeded += 1,
                    CaptureStatus::Failed(_) => acc.failed += 1,
                    CaptureStatus::TimedOut => acc.timed_out += 1,
                }
                acc
            })
    }
}

impl fmt::Display for CaptureSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} sessions: {} captured, {} failed, {} timed out",
            self.total, self.succeeded, self.failed, self.timed_out
        )
    }
}
