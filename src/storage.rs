// SPDX-License-Identifier: MPL-2.0

//! Storage utilities for the session photo and movie files
//!
//! A session writes to one fixed path per capture kind. The file is deleted
//! before every new attempt and on redo, so at most one capture exists at a
//! time and a failed attempt never leaves a partial file behind.

use crate::config::Config;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Fixed output paths for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    pub photo: PathBuf,
    pub movie: PathBuf,
}

impl SessionPaths {
    /// Paths inside `dir` using the default file names
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            photo: dir.join(crate::constants::output::PHOTO_FILE_NAME),
            movie: dir.join(crate::constants::output::MOVIE_FILE_NAME),
        }
    }

    /// Paths from persisted settings
    pub fn from_config(config: &Config) -> Self {
        let dir = config.output_dir();
        Self {
            photo: dir.join(&config.photo_file_name),
            movie: dir.join(&config.movie_file_name),
        }
    }
}

/// Remove a previous capture so the next attempt starts from nothing
///
/// A missing file is not an error.
pub fn clear_stale(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed stale capture");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Like [`clear_stale`] but logs instead of failing
pub fn discard(path: &Path) {
    if let Err(e) = clear_stale(path) {
        warn!(path = %path.display(), error = %e, "Failed to delete capture");
    }
}

/// Ensure the parent directory of `path` exists
pub fn prepare_parent(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Copy an accepted capture to a timestamped file next to it
///
/// `photo.jpg` becomes `photo_20240101_120000.jpg`. Used by the command line
/// front end, which keeps every accepted capture.
pub fn archive_copy(path: &Path) -> std::io::Result<PathBuf> {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "capture".to_string());
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, timestamp, ext.to_string_lossy()),
        None => format!("{}_{}", stem, timestamp),
    };
    let target = path.with_file_name(name);
    std::fs::copy(path, &target)?;
    info!(from = %path.display(), to = %target.display(), "Capture archived");
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(uuid::Uuid::new_v4().to_string());
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_clear_stale_missing_is_ok() {
        let dir = temp_dir();
        assert!(clear_stale(&dir.join("missing.jpg")).is_ok());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_clear_stale_removes_file() {
        let dir = temp_dir();
        let path = dir.join("photo.jpg");
        std::fs::write(&path, b"x").unwrap();
        clear_stale(&path).unwrap();
        assert!(!path.exists());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_archive_copy_keeps_extension() {
        let dir = temp_dir();
        let path = dir.join("movie.mp4");
        std::fs::write(&path, b"data").unwrap();
        let copy = archive_copy(&path).unwrap();
        assert!(copy.exists());
        assert_eq!(copy.extension().unwrap(), "mp4");
        assert!(copy.file_name().unwrap().to_string_lossy().starts_with("movie_"));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_session_paths() {
        let paths = SessionPaths::in_dir("/tmp/session");
        assert_eq!(paths.photo, PathBuf::from("/tmp/session/photo.jpg"));
        assert_eq!(paths.movie, PathBuf::from("/tmp/session/movie.mp4"));
    }
}
