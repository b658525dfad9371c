//! Plain-text bodies for the report sections.

use std::fmt::Write;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::log_scanning::types::ScanReport;
use crate::screen_capture::types::{CaptureOutcome, CaptureStatus, CaptureSummary};

/// In-window matches grouped under a `=====path=====` line per source file.
pub fn log_excerpts(scan: &ScanReport, cutoff: DateTime<Utc>) -> String {
    let mut body = String::new();
    let _ = writeln!(
        body,
        "Entries since {} ({} files scanned, {} matching lines outside the window)",
        cutoff.to_rfc3339_opts(SecondsFormat::Secs, true),
        scan.files_scanned,
        scan.excluded
    );

    if scan.matches.is_empty() {
        body.push_str("No errors or warnings found in the window.\n");
        return body;
    }

    let mut current: Option<&Path> = None;
    for entry in &scan.matches {
        if current != Some(entry.source.as_path()) {
            let _ = writeln!(body, "====={}=====", entry.source.display());
            current = Some(entry.source.as_path());
        }
        let _ = writeln!(body, "{}", entry.line);
    }
    body
}

pub fn captures(outcomes: &[CaptureOutcome]) -> String {
    if outcomes.is_empty() {
        return "No display sessions were found.\n".to_string();
    }

    let mut body = String::new();
    let _ = writeln!(body, "{}", CaptureSummary::from_outcomes(outcomes));
    for outcome in outcomes {
        let status = match outcome.status() {
            CaptureStatus::Success(path) => {
                let name = path.file_name().map(Path::new).unwrap_or(path.as_path());
                format!("captured {}", name.display())
            }
            other => other.to_string(),
        };
        let _ = writeln!(
            body,
            "session {}: {} ({:.1}s)",
            outcome.session().label(),
            status,
            outcome.elapsed().as_secs_f64()
        );
    }
    body
}

pub fn science(copied: Option<&Path>) -> String {
    match copied.and_then(|p| p.file_name()) {
        Some(name) => format!("Latest science image: {}\n", Path::new(name).display()),
        None => "No science image collected.\n".to_string(),
    }
}
