use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use flate2::{Compression, GzBuilder};
use log::{debug, error, info, warn};
use tar::{Builder, HeaderMode};
use walkdir::WalkDir;

use crate::error_handling::types::BundleError;
use crate::report::layout::is_staging_file;

/// A finished archive of one run directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub path: PathBuf,
    /// Directories and files stored, the root included.
    pub entries: usize,
    /// Files that vanished or could not be opened while archiving.
    pub skipped: Vec<PathBuf>,
}

/// Packs a run directory into a reproducible `.tar.gz`.
///
/// Entries are stored under the run directory's base name, sorted by path,
/// with normalised ownership and timestamps. Files still under a staging
/// name belong to abandoned captures and are left out. The gzip header carries no
/// modification time, so the same directory contents always produce the same
/// bytes.
pub struct BundleAssembler;

impl BundleAssembler {
    pub fn assemble(run_dir: &Path, archive_path: &Path) -> Result<Bundle, BundleError> {
        if !run_dir.is_dir() {
            return Err(BundleError::SourceMissing(run_dir.display().to_string()));
        }
        let root_name = run_dir
            .file_name()
            .map(PathBuf::from)
            .ok_or_else(|| BundleError::SourceMissing(run_dir.display().to_string()))?;

        let file = File::create(archive_path).map_err(|e| {
            error!("Cannot create archive {}: {}", archive_path.display(), e);
            BundleError::IoError(e)
        })?;

        match Self::write_archive(file, run_dir, &root_name) {
            Ok((entries, skipped)) => {
                info!(
                    "Bundled {} entries from {} into {}",
                    entries,
                    run_dir.display(),
                    archive_path.display()
                );
                Ok(Bundle {
                    path: archive_path.to_path_buf(),
                    entries,
                    skipped,
                })
            }
            Err(e) => {
                error!("Failed to write archive {}: {}", archive_path.display(), e);
                let _ = fs::remove_file(archive_path);
                Err(BundleError::IoError(e))
            }
        }
    }

    fn write_archive(
        file: File,
        run_dir: &Path,
        root_name: &Path,
    ) -> io::Result<(usize, Vec<PathBuf>)> {
        let encoder = GzBuilder::new().mtime(0).write(file, Compression::default());
        let mut builder = Builder::new(encoder);
        builder.mode(HeaderMode::Deterministic);

        let mut entries = 0;
        let mut skipped = Vec::new();

        for entry in WalkDir::new(run_dir).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable path while bundling: {}", e);
                    if let Some(path) = e.path() {
                        skipped.push(path.to_path_buf());
                    }
                    continue;
                }
            };
            let relative = entry.path().strip_prefix(run_dir).unwrap_or(Path::new(""));
            let name = root_name.join(relative);

            if entry.file_type().is_dir() {
                builder.append_dir(&name, entry.path())?;
                entries += 1;
            } else if entry.file_type().is_file() {
                if is_staging_file(entry.file_name()) {
                    debug!("Not bundling unfinished file {}", entry.path().display());
                    continue;
                }
                let mut source = match File::open(entry.path()) {
                    Ok(source) => source,
                    Err(e) => {
                        warn!("Skipping {} while bundling: {}", entry.path().display(), e);
                        skipped.push(entry.path().to_path_buf());
                        continue;
                    }
                };
                builder.append_file(&name, &mut source)?;
                entries += 1;
            } else {
                debug!("Not bundling special file {}", entry.path().display());
            }
        }

        let encoder = builder.into_inner()?;
        let file = encoder.finish()?;
        file.sync_all()?;
        Ok((entries, skipped))
    }
}
