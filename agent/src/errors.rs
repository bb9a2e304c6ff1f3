//! Error types for the backup service

use thiserror::Error;

/// Main error type for the backup service
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(
        "Authentication failed: no API token found for {display_name} (checked {})",
        checked_keys.join(", ")
    )]
    AuthError {
        display_name: String,
        checked_keys: Vec<String>,
    },

    #[error("Backup request failed with status {status}: {body}")]
    FetchStatus { status: u16, body: String },

    #[error("Backup request failed: {0}")]
    FetchTransport(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    ArchiveError(String),
}

impl BackupError {
    /// Whether a later attempt could succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackupError::IoError(_) | BackupError::FetchTransport(_) => true,
            BackupError::FetchStatus { status, .. } => *status >= 500 || *status == 429,
            BackupError::ArchiveError(_) => true,
            BackupError::ConfigError(_) | BackupError::AuthError { .. } => false,
        }
    }
}
