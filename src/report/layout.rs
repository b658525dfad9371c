use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, error};

use crate::error_handling::types::ReportError;
use crate::screen_capture::types::Session;

/// File system locations of one triage run.
///
/// ```text
/// {report_root}/{YYYY-MM-DD}/{HH-MM-SS}/gecko_report_{HH-MM-SS}.txt
/// {report_root}/{YYYY-MM-DD}/{HH-MM-SS}/gecko_screenshot_{NN}_{HH-MM-SS}.png
/// {report_root}/gecko_{YYYYMMDDTHHMMSSZ}.tar.gz
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    started: DateTime<Utc>,
    time_label: String,
    run_dir: PathBuf,
    report_path: PathBuf,
    archive_path: PathBuf,
}

impl RunLayout {
    /// Computes the paths for a run started at `started` without touching disk.
    pub fn plan(report_root: &Path, started: DateTime<Utc>) -> Self {
        let date_label = started.format("%Y-%m-%d").to_string();
        let time_label = started.format("%H-%M-%S").to_string();
        let stamp = started.format("%Y%m%dT%H%M%SZ").to_string();

        let run_dir = report_root.join(&date_label).join(&time_label);
        let report_path = run_dir.join(format!("gecko_report_{}.txt", time_label));
        let archive_path = report_root.join(format!("gecko_{}.tar.gz", stamp));

        Self {
            started,
            time_label,
            run_dir,
            report_path,
            archive_path,
        }
    }

    /// Plans the layout and creates the run directory.
    ///
    /// The date directory may already exist, the run directory itself must
    /// not: every run gets a fresh one.
    pub fn create(report_root: &Path, started: DateTime<Utc>) -> Result<Self, ReportError> {
        let layout = Self::plan(report_root, started);

        if let Some(parent) = layout.run_dir.parent() {
            fs::create_dir_all(parent)?;
        }
        match fs::create_dir(&layout.run_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                error!("Run directory {} already exists", layout.run_dir.display());
                return Err(ReportError::RunDirectoryExists(
                    layout.run_dir.display().to_string(),
                ));
            }
            Err(e) => return Err(ReportError::IoError(e)),
        }

        debug!("Created run directory {}", layout.run_dir.display());
        Ok(layout)
    }

    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    pub fn time_label(&self) -> &str {
        &self.time_label
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn report_path(&self) -> &Path {
        &self.report_path
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    pub fn screenshot_path(&self, session: &Session) -> PathBuf {
        self.run_dir.join(format!(
            "gecko_screenshot_{}_{}.png",
            session.label(),
            self.time_label
        ))
    }
}

const STAGING_PREFIX: &str = ".partial-";

/// Where a file destined for `path` is written until it is complete.
///
/// The staging name keeps the extension, since capture tools pick the image
/// format from it.
pub fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}{}", STAGING_PREFIX, name))
}

/// True for names produced by [`staging_path`].
pub fn is_staging_file(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with(STAGING_PREFIX)
}

/// A path for `name` inside `dir` that does not exist yet.
///
/// Collisions get a numeric suffix before the extension: `app.log`,
/// `app-1.log`, `app-2.log`, ...
pub fn unique_destination(dir: &Path, name: &OsStr) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let as_path = Path::new(name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = as_path.extension().map(|e| e.to_string_lossy().into_owned());

    (1u32..)
        .map(|n| match &extension {
            Some(ext) => dir.join(format!("{}-{}.{}", stem, n, ext)),
            None => dir.join(format!("{}-{}", stem, n)),
        })
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}
