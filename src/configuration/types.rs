//! Validated, immutable configuration handed to every component.
//!
//! These values are produced once by [`super::config`] and then only read.
//! Patterns are compiled during validation so no component has to re-parse
//! or re-check anything.

use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;

use crate::log_scanning::time_window::TimestampRule;

/// First TCP port of the VNC display range; session `N` listens on `5900 + N`.
pub const VNC_BASE_PORT: u16 = 5900;

#[derive(Debug, Clone)]
pub struct TriageConfig {
    pub report: ReportConfig,
    pub logs: LogConfig,
    pub capture: CaptureConfig,
    pub science: ScienceConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportConfig {
    /// Existing directory under which per-run directories and archives go.
    pub report_root: PathBuf,
    /// Present only when email alerts are enabled.
    pub delivery: Option<DeliveryConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryConfig {
    pub recipient: String,
    pub sender: String,
    pub sendmail_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log files or directories to comb and gather.
    pub sources: Vec<PathBuf>,
    /// File name suffixes picked up when walking a directory source.
    pub suffixes: Vec<String>,
    pub lookback: chrono::Duration,
    /// Case-insensitive line pattern for errors and warnings.
    pub match_pattern: Regex,
    pub timestamp_rule: TimestampRule,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    /// Wall-clock budget for each session's capture.
    pub timeout: Duration,
    /// Upper bound on captures in flight at once.
    pub max_parallel: usize,
    /// Screen-grab command template, see [`crate::screen_capture::grabber`].
    pub command: Vec<String>,
    pub discovery: DiscoveryConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryConfig {
    /// Fixed list of VNC session numbers on one host.
    Vnc {
        host: String,
        password: Option<String>,
        sessions: Vec<u32>,
    },
    /// Local X displays found as `X<n>` sockets in `socket_dir`.
    X11 { socket_dir: PathBuf },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScienceConfig {
    pub image_root: Option<PathBuf>,
    /// Extensions (without the dot, case-insensitive) that count as science images.
    pub extensions: Vec<String>,
}
