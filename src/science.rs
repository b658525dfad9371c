//! Snapshot of the most recent science artifact.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::error_handling::types::ScienceError;
use crate::report::layout::unique_destination;

/// Copies the most recently modified file under `image_root` whose extension
/// is one of `extensions` into `dest`, returning the copy's path.
///
/// Extensions are compared case-insensitively and without the leading dot.
/// When two files share a modification time the lexically greater path wins.
pub fn collect_latest(
    image_root: &Path,
    extensions: &[String],
    dest: &Path,
) -> Result<PathBuf, ScienceError> {
    if !image_root.is_dir() {
        return Err(ScienceError::RootMissing(image_root.display().to_string()));
    }

    let mut latest: Option<(SystemTime, PathBuf)> = None;
    for entry in WalkDir::new(image_root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable science path: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() || !has_extension(entry.path(), extensions) {
            continue;
        }
        let modified = match entry.metadata().ok().and_then(|m| m.modified().ok()) {
            Some(modified) => modified,
            None => continue,
        };

        let candidate = (modified, entry.into_path());
        if latest.as_ref().map_or(true, |current| candidate > *current) {
            latest = Some(candidate);
        }
    }

    let Some((_, source)) = latest else {
        return Err(ScienceError::NoArtifacts(image_root.display().to_string()));
    };
    debug!("Latest science artifact is {}", source.display());

    let name = source
        .file_name()
        .ok_or_else(|| ScienceError::NoArtifacts(image_root.display().to_string()))?;
    let target = unique_destination(dest, name);
    fs::copy(&source, &target)?;

    info!("Copied science snapshot {} to {}", source.display(), target.display());
    Ok(target)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;
    use tempfile::TempDir;

    fn touch(path: &Path, age: Duration) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, path.display().to_string()).unwrap();
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    fn fits() -> Vec<String> {
        vec!["fits".to_string()]
    }

    #[test]
    fn test_picks_newest_matching_file() {
        let root = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        touch(&root.path().join("night1/a.fits"), Duration::from_secs(7200));
        touch(&root.path().join("night2/b.FITS"), Duration::from_secs(60));
        touch(&root.path().join("night2/c.png"), Duration::from_secs(1));

        let copied = collect_latest(root.path(), &fits(), dest.path()).unwrap();

        assert_eq!(copied, dest.path().join("b.FITS"));
        assert_eq!(
            fs::read_to_string(&copied).unwrap(),
            root.path().join("night2/b.FITS").display().to_string()
        );
    }

    #[test]
    fn test_missing_root() {
        let root = TempDir::new().unwrap();
        let err = collect_latest(&root.path().join("absent"), &fits(), root.path()).unwrap_err();
        assert!(matches!(err, ScienceError::RootMissing(_)));
    }

    #[test]
    fn test_no_matching_artifacts() {
        let root = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        touch(&root.path().join("notes.txt"), Duration::from_secs(1));

        let err = collect_latest(root.path(), &fits(), dest.path()).unwrap_err();
        assert!(matches!(err, ScienceError::NoArtifacts(_)));
    }
}
