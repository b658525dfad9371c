//! Data types shared by the log scanning subsystem.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::error_handling::types::ScanError;

/// One error/warning line pulled out of a log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMatch {
    /// File the line came from.
    pub source: PathBuf,
    /// 1-based line number within `source`.
    pub line_number: usize,
    /// The raw line, without its line terminator.
    pub line: String,
    /// Leading timestamp, when the configured rule could parse one.
    pub timestamp: Option<DateTime<Utc>>,
    /// Whether the line falls inside the lookback window.
    pub in_window: bool,
}

/// A log source that could not be read and was left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSource {
    pub path: PathBuf,
    pub reason: ScanError,
}

/// Result of scanning one or more log roots. A scan never fails as a whole;
/// unreadable sources end up in `skipped`.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// In-window matches, in scan order.
    pub matches: Vec<LogMatch>,
    /// Number of files that were read and searched.
    pub files_scanned: usize,
    /// Matching lines dropped by the time window (old or undated).
    pub excluded: usize,
    pub skipped: Vec<SkippedSource>,
}

impl ScanReport {
    pub fn merge(&mut self, other: ScanReport) {
        self.matches.extend(other.matches);
        self.files_scanned += other.files_scanned;
        self.excluded += other.excluded;
        self.skipped.extend(other.skipped);
    }

    pub fn matches_from<'a>(&'a self, source: &'a Path) -> impl Iterator<Item = &'a LogMatch> + 'a {
        self.matches.iter().filter(move |m| m.source == source)
    }
}

/// Result of copying raw log files into the run directory.
#[derive(Debug, Clone, Default)]
pub struct GatherReport {
    /// Destination paths of the copies.
    pub copied: Vec<PathBuf>,
    pub failed: Vec<SkippedSource>,
}
