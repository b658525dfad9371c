//! Log combing and raw log gathering.
//!
//! [`LogScanner`] reads every candidate file under a log root, keeps lines
//! that match the error/warning pattern and fall inside the lookback window,
//! and attributes each to its source file. [`gather_logs`] copies the raw
//! files into the run directory so the bundle carries the full context.
//!
//! Neither operation fails as a whole: a missing, unreadable or non-UTF-8 file
//! is logged and recorded as skipped, and the remaining files are processed.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use regex::Regex;
use walkdir::WalkDir;

use crate::configuration::types::LogConfig;
use crate::error_handling::types::ScanError;
use crate::report::layout::unique_destination;

use super::time_window::TimeWindowFilter;
use super::types::{GatherReport, LogMatch, ScanReport, SkippedSource};

pub struct LogScanner {
    match_pattern: Regex,
    filter: TimeWindowFilter,
    suffixes: Vec<String>,
}

impl LogScanner {
    pub fn new(match_pattern: Regex, filter: TimeWindowFilter, suffixes: Vec<String>) -> Self {
        Self {
            match_pattern,
            filter,
            suffixes,
        }
    }

    pub fn from_config(config: &LogConfig, run_start: DateTime<Utc>) -> Self {
        Self::new(
            config.match_pattern.clone(),
            TimeWindowFilter::new(run_start, config.lookback, config.timestamp_rule.clone()),
            config.suffixes.clone(),
        )
    }

    pub fn cutoff(&self) -> DateTime<Utc> {
        self.filter.cutoff()
    }

    pub fn scan_all(&self, roots: &[PathBuf]) -> ScanReport {
        let mut report = ScanReport::default();
        for root in roots {
            report.merge(self.scan(root));
        }
        info!(
            "Log scan complete: {} files, {} recent matches, {} outside window, {} skipped",
            report.files_scanned,
            report.matches.len(),
            report.excluded,
            report.skipped.len()
        );
        report
    }

    /// Scans `root`, which may be a single file or a directory tree.
    pub fn scan(&self, root: &Path) -> ScanReport {
        let mut report = ScanReport::default();
        let (files, skipped) = collect_candidates(root, &self.suffixes);
        report.skipped.extend(skipped);

        for path in files {
            match self.scan_file(&path) {
                Ok((matches, excluded)) => {
                    report.files_scanned += 1;
                    report.excluded += excluded;
                    report.matches.extend(matches);
                }
                Err(reason) => {
                    warn!("Skipping log file {}: {}", path.display(), reason);
                    report.skipped.push(SkippedSource { path, reason });
                }
            }
        }
        report
    }

    /// In-window matches from one file, plus the count of matches dropped by
    /// the time window.
    pub fn scan_file(&self, path: &Path) -> Result<(Vec<LogMatch>, usize), ScanError> {
        let bytes = fs::read(path).map_err(|e| ScanError::from_io(&e))?;
        let contents = String::from_utf8(bytes).map_err(|_| ScanError::Decode)?;

        let all = self.extract_matches(path, &contents);
        let total = all.len();
        let kept: Vec<LogMatch> = all.into_iter().filter(|m| m.in_window).collect();
        debug!(
            "{}: {} matching lines, {} inside window",
            path.display(),
            total,
            kept.len()
        );
        let excluded = total - kept.len();
        Ok((kept, excluded))
    }

    /// Every line of `contents` matching the pattern, each tagged with its
    /// timestamp and window verdict.
    pub fn extract_matches(&self, source: &Path, contents: &str) -> Vec<LogMatch> {
        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| self.match_pattern.is_match(line))
            .map(|(idx, line)| {
                let (timestamp, in_window) = self.filter.evaluate(line);
                LogMatch {
                    source: source.to_path_buf(),
                    line_number: idx + 1,
                    line: line.to_string(),
                    timestamp,
                    in_window,
                }
            })
            .collect()
    }
}

/// Copies every candidate log file under `sources` flat into `dest`.
pub fn gather_logs(sources: &[PathBuf], suffixes: &[String], dest: &Path) -> GatherReport {
    let mut report = GatherReport::default();

    for root in sources {
        let (files, skipped) = collect_candidates(root, suffixes);
        report.failed.extend(skipped);

        for file in files {
            let Some(name) = file.file_name() else {
                continue;
            };
            let target = unique_destination(dest, name);
            match fs::copy(&file, &target) {
                Ok(bytes) => {
                    debug!("Copied {} ({} bytes) to {}", file.display(), bytes, target.display());
                    report.copied.push(target);
                }
                Err(e) => {
                    warn!("Failed to copy log {}: {}", file.display(), e);
                    report.failed.push(SkippedSource {
                        path: file,
                        reason: ScanError::from_io(&e),
                    });
                }
            }
        }
    }

    info!(
        "Gathered {} log files into {} ({} failed)",
        report.copied.len(),
        dest.display(),
        report.failed.len()
    );
    report
}

/// Files to consider under `root`. A root that is itself a file is always
/// taken; files found by walking a directory must carry one of `suffixes`.
fn collect_candidates(root: &Path, suffixes: &[String]) -> (Vec<PathBuf>, Vec<SkippedSource>) {
    let mut files = Vec::new();
    let mut skipped = Vec::new();

    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        match entry {
            Ok(entry) => {
                if !entry.file_type().is_file() {
                    continue;
                }
                if entry.depth() == 0 || has_suffix(entry.path(), suffixes) {
                    files.push(entry.into_path());
                }
            }
            Err(err) => {
                let path = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf());
                let reason = err
                    .io_error()
                    .map(ScanError::from_io)
                    .unwrap_or_else(|| ScanError::IoError(err.to_string()));
                warn!("Log source {} unavailable: {}", path.display(), reason);
                skipped.push(SkippedSource { path, reason });
            }
        }
    }

    (files, skipped)
}

fn has_suffix(path: &Path, suffixes: &[String]) -> bool {
    if suffixes.is_empty() {
        return true;
    }
    let Some(name) = path.file_name() else {
        return false;
    };
    let name = name.to_string_lossy();
    suffixes.iter().any(|s| name.ends_with(s.as_str()))
}
