//! Storage layout for backups and run summaries
//!
//! ```text
//! backup_root/
//!   {device_folder}/{device_folder}_config_{YYYYMMDD_HHMMSS}.conf
//!   logs/summary_{YYYYMMDD_HHMMSS}.log
//! ```
//!
//! The archive repository mirrors this layout under [`ARCHIVE_PREFIX`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

/// Top-level directory of archived files inside the repository
pub const ARCHIVE_PREFIX: &str = "backups";

/// Timestamp embedded in file names
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Extension of device backup files
pub const BACKUP_EXTENSION: &str = ".conf";

/// Extension of summary and service log files
pub const LOG_EXTENSION: &str = ".log";

/// Storage layout rooted at the backup directory
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub backup_root: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(backup_root: impl Into<PathBuf>) -> Self {
        Self {
            backup_root: backup_root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.backup_root
    }

    /// Directory holding one device's backups
    pub fn device_dir(&self, folder_name: &str) -> PathBuf {
        self.backup_root.join(folder_name)
    }

    /// Directory holding run summaries and service logs
    pub fn logs_dir(&self) -> PathBuf {
        self.backup_root.join("logs")
    }

    /// Summary log path for a run started at `at`
    pub fn summary_file<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> PathBuf
    where
        Tz::Offset: std::fmt::Display,
    {
        self.logs_dir().join(summary_filename(at))
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new("/backups")
    }
}

/// `{folder}_config_{timestamp}.conf`
pub fn backup_filename<Tz: TimeZone>(folder_name: &str, at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{}_config_{}{}",
        folder_name,
        at.format(FILE_TIMESTAMP_FORMAT),
        BACKUP_EXTENSION
    )
}

/// `summary_{timestamp}.log`
pub fn summary_filename<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("summary_{}{}", at.format(FILE_TIMESTAMP_FORMAT), LOG_EXTENSION)
}
