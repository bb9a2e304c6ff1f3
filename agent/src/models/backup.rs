//! Backup run records

use std::path::PathBuf;

use chrono::{DateTime, Local};

/// A configuration backup persisted to local storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArtifact {
    pub device_folder_name: String,
    pub filename: String,
    pub local_path: PathBuf,
    pub created_at: DateTime<Local>,
}

impl BackupArtifact {
    /// Path of this artifact inside the archive repository
    pub fn repo_relative_path(&self) -> PathBuf {
        PathBuf::from(crate::storage::layout::ARCHIVE_PREFIX)
            .join(&self.device_folder_name)
            .join(&self.filename)
    }
}

/// Outcome of backing up one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub device_display_name: String,
    pub success: bool,
    pub message: String,
}

impl RunResult {
    pub fn success(device_display_name: impl Into<String>) -> Self {
        Self {
            device_display_name: device_display_name.into(),
            success: true,
            message: "Backup Successful".to_string(),
        }
    }

    pub fn failure(device_display_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            device_display_name: device_display_name.into(),
            success: false,
            message: message.into(),
        }
    }

    fn summary_line(&self) -> String {
        if self.success {
            format!("{} - ✅ SUCCESS", self.device_display_name)
        } else {
            format!("{} - ❌ FAILED: {}", self.device_display_name, self.message)
        }
    }
}

/// All device outcomes of one orchestration run, in device-list order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub started_at: DateTime<Local>,
    pub results: Vec<RunResult>,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Local>) -> Self {
        Self {
            started_at,
            results: Vec::new(),
        }
    }

    pub fn push(&mut self, result: RunResult) {
        self.results.push(result);
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    /// Human-readable form written to the summary log
    pub fn render(&self) -> String {
        let mut out = format!(
            "Backup Job Summary - {}\n{}\n",
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
            "=".repeat(40)
        );
        for result in &self.results {
            out.push_str(&result.summary_line());
            out.push('\n');
        }
        out
    }
}

/// A set of files to archive in one commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    /// `(local_path, repo_relative_path)` pairs, copied in order
    pub files: Vec<(PathBuf, PathBuf)>,
    pub commit_message: String,
}

impl SyncRequest {
    pub fn new(commit_message: impl Into<String>) -> Self {
        Self {
            files: Vec::new(),
            commit_message: commit_message.into(),
        }
    }

    pub fn with_file(mut self, local_path: impl Into<PathBuf>, repo_path: impl Into<PathBuf>) -> Self {
        self.files.push((local_path.into(), repo_path.into()));
        self
    }
}
