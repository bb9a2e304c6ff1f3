//! Age-based retention of backup and log files

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, error, info, warn};

const SECS_PER_DAY: u64 = 86_400;

/// Delete files directly inside `directory` whose name ends with one of
/// `extensions` and whose modification time is older than `max_age_days`.
///
/// `max_age_days <= 0` disables rotation. Errors are logged, never returned.
/// Returns the paths that were deleted.
pub fn rotate(directory: &Path, extensions: &[&str], max_age_days: i64) -> Vec<PathBuf> {
    rotate_at(directory, extensions, max_age_days, SystemTime::now())
}

/// [`rotate`] with an explicit notion of "now"
pub fn rotate_at(
    directory: &Path,
    extensions: &[&str],
    max_age_days: i64,
    now: SystemTime,
) -> Vec<PathBuf> {
    if max_age_days <= 0 {
        return Vec::new();
    }

    let Some(cutoff) = (max_age_days as u64)
        .checked_mul(SECS_PER_DAY)
        .and_then(|secs| now.checked_sub(Duration::from_secs(secs)))
    else {
        warn!(
            dir = %directory.display(),
            max_age_days,
            "Retention window out of range, rotation skipped"
        );
        return Vec::new();
    };

    match rotate_older_than(directory, extensions, cutoff) {
        Ok(deleted) => deleted,
        Err(e) => {
            error!(dir = %directory.display(), error = %e, "Error in file rotation");
            Vec::new()
        }
    }
}

fn rotate_older_than(
    directory: &Path,
    extensions: &[&str],
    cutoff: SystemTime,
) -> std::io::Result<Vec<PathBuf>> {
    if !directory.is_dir() {
        debug!(dir = %directory.display(), "Rotation skipped, directory does not exist");
        return Ok(Vec::new());
    }

    let mut deleted = Vec::new();
    for entry in fs::read_dir(directory)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                error!(dir = %directory.display(), error = %e, "Failed to read directory entry");
                continue;
            }
        };

        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !extensions.iter().any(|ext| name.ends_with(ext)) {
            continue;
        }

        let modified = match entry.metadata().and_then(|m| {
            if m.is_file() {
                m.modified().map(Some)
            } else {
                Ok(None)
            }
        }) {
            Ok(Some(modified)) => modified,
            Ok(None) => continue,
            Err(e) => {
                error!(file = %path.display(), error = %e, "Failed to read file metadata");
                continue;
            }
        };

        // A file exactly at the cutoff is retained
        if modified < cutoff {
            match fs::remove_file(&path) {
                Ok(()) => {
                    info!(file = %name, "Rotated (deleted) old file");
                    deleted.push(path);
                }
                Err(e) => error!(file = %name, error = %e, "Error deleting old file"),
            }
        }
    }

    Ok(deleted)
}
