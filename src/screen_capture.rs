//! Time-bounded screen capture of display sessions.
//!
//! - `discovery`: finds the sessions to capture
//! - `grabber`: the external screen-grab delegates
//! - `runner`: one capture under a deadline
//! - `orchestrator`: fan-out over all sessions of a run

pub mod discovery;
pub mod grabber;
pub mod orchestrator;
pub mod runner;
pub mod types;

pub use discovery::{DisplaySocketDiscovery, SessionDiscovery, StaticSessionList};
pub use grabber::{CommandGrabber, ScreenGrabber, VncGrabber};
pub use orchestrator::CaptureOrchestrator;
pub use runner::BoundedCaptureRunner;
pub use types::{CaptureOutcome, CaptureStatus, CaptureSummary, Endpoint, Session};

use std::sync::Arc;

use crate::configuration::types::{CaptureConfig, DiscoveryConfig};

/// The grabber matching the configured discovery kind.
pub fn grabber_from_config(config: &CaptureConfig) -> Arc<dyn ScreenGrabber> {
    let command = CommandGrabber::new(config.command.clone());
    match config.discovery {
        DiscoveryConfig::Vnc { .. } => Arc::new(VncGrabber::new(command)),
        DiscoveryConfig::X11 { .. } => Arc::new(command),
    }
}
