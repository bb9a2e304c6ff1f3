//! Application configuration options
//!
//! Built once at startup from an environment-style lookup and handed to each
//! component. Device tokens are not part of this bundle; they are resolved per
//! device at fetch time.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveTime;
use secrecy::SecretString;

use crate::authn::credentials::EnvLookup;
use crate::errors::BackupError;
use crate::logs::{LogLevel, LogOptions};
use crate::storage::layout::StorageLayout;

/// Main application options
#[derive(Debug)]
pub struct AppOptions {
    /// Local storage layout
    pub layout: StorageLayout,

    /// Device list file
    pub devices_file: PathBuf,

    /// Appliance API options
    pub fetch: FetchOptions,

    /// Archive repository options
    pub archive: ArchiveOptions,

    /// Retention window in days, `<= 0` disables rotation
    pub retention_days: i64,

    /// Run once or daily
    pub run_mode: RunMode,

    /// Local time of the daily run
    pub schedule_time: NaiveTime,

    /// Logging
    pub logging: LogOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        let layout = StorageLayout::default();
        Self {
            devices_file: PathBuf::from("config/devices.txt"),
            fetch: FetchOptions::default(),
            archive: ArchiveOptions::default(),
            retention_days: 30,
            run_mode: RunMode::Manual,
            schedule_time: default_schedule_time(),
            logging: LogOptions {
                log_dir: Some(layout.logs_dir()),
                ..Default::default()
            },
            layout,
        }
    }
}

fn default_schedule_time() -> NaiveTime {
    NaiveTime::from_hms_opt(3, 0, 0).unwrap_or_default()
}

/// API scheme used to reach the appliances
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Protocol {
    Http,
    #[default]
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl FromStr for Protocol {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            other => Err(BackupError::ConfigError(format!(
                "Unsupported API protocol: {}",
                other
            ))),
        }
    }
}

/// Appliance backup download options
#[derive(Debug)]
pub struct FetchOptions {
    pub protocol: Protocol,

    /// Port used when the connection string has none
    pub default_port: u16,

    /// Ask the appliance to encrypt the backup
    pub encrypt: bool,

    /// Password for encrypted backups
    pub encryption_key: Option<SecretString>,

    /// Upper bound on one backup request
    pub request_timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            protocol: Protocol::Https,
            default_port: 443,
            encrypt: false,
            encryption_key: None,
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Archive repository options
#[derive(Debug)]
pub struct ArchiveOptions {
    /// Remote repository, must be `https://`
    pub repo_url: Option<String>,

    /// Token used as the HTTPS password on push
    pub push_token: Option<SecretString>,

    /// Committer name
    pub user_name: String,

    /// Committer email
    pub user_email: String,

    /// Disposable clone location, wiped before and after each sync
    pub workspace_dir: PathBuf,

    /// Credential-helper script location, removed after each sync
    pub askpass_path: PathBuf,
}

impl ArchiveOptions {
    /// Archival is switched off when neither remote nor credential is configured
    pub fn is_enabled(&self) -> bool {
        self.repo_url.is_some() || self.push_token.is_some()
    }
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            repo_url: None,
            push_token: None,
            user_name: "Backup Bot".to_string(),
            user_email: "bot@backup.local".to_string(),
            workspace_dir: PathBuf::from("/tmp/repo_sync"),
            askpass_path: PathBuf::from("/tmp/git_askpass.sh"),
        }
    }
}

/// Execution mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Run once and exit
    #[default]
    Manual,
    /// Run daily at the schedule time
    Schedule,
}

impl FromStr for RunMode {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "manual" | "once" => Ok(RunMode::Manual),
            "schedule" | "scheduled" => Ok(RunMode::Schedule),
            other => Err(BackupError::ConfigError(format!("Unknown run mode: {}", other))),
        }
    }
}

impl AppOptions {
    /// Build options from environment-style keys, falling back to defaults
    pub fn from_lookup(env: &dyn EnvLookup) -> Result<Self, BackupError> {
        let defaults = AppOptions::default();
        let get = |key: &str| env.get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let layout = get("BACKUP_DIR")
            .map(StorageLayout::new)
            .unwrap_or(defaults.layout);

        let fetch = FetchOptions {
            protocol: get("FGT_PROTOCOL")
                .map(|v| v.parse::<Protocol>())
                .transpose()?
                .unwrap_or(defaults.fetch.protocol),
            default_port: parse_number("FGT_PORT", get("FGT_PORT"))?
                .unwrap_or(defaults.fetch.default_port),
            encrypt: get("ENCRYPT_BACKUP").is_some_and(|v| parse_flag(&v)),
            encryption_key: env
                .get("BACKUP_ENCRYPTION_KEY")
                .filter(|v| !v.is_empty())
                .map(SecretString::from),
            request_timeout: parse_number("REQUEST_TIMEOUT_SECONDS", get("REQUEST_TIMEOUT_SECONDS"))?
                .map(Duration::from_secs)
                .unwrap_or(defaults.fetch.request_timeout),
        };

        let archive = ArchiveOptions {
            repo_url: get("GIT_REPO_URL"),
            push_token: get("GIT_PUSH_TOKEN").map(SecretString::from),
            user_name: get("GIT_USER_NAME").unwrap_or(defaults.archive.user_name),
            user_email: get("GIT_USER_EMAIL").unwrap_or(defaults.archive.user_email),
            workspace_dir: get("GIT_SYNC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.archive.workspace_dir),
            askpass_path: get("GIT_ASKPASS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.archive.askpass_path),
        };

        let schedule_time = match get("SCHEDULE_TIME") {
            Some(v) => parse_schedule_time(&v)?,
            None => defaults.schedule_time,
        };

        let log_level = match get("LOG_LEVEL") {
            Some(v) => v.parse::<LogLevel>().map_err(BackupError::ConfigError)?,
            None if get("DEBUG").is_some_and(|v| parse_flag(&v)) => LogLevel::Debug,
            None => LogLevel::Info,
        };

        Ok(Self {
            devices_file: get("DEVICES_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.devices_file),
            fetch,
            archive,
            retention_days: parse_number("LOGROTATE_DAYS", get("LOGROTATE_DAYS"))?
                .unwrap_or(defaults.retention_days),
            run_mode: get("RUN_MODE")
                .map(|v| v.parse::<RunMode>())
                .transpose()?
                .unwrap_or(defaults.run_mode),
            schedule_time,
            logging: LogOptions {
                log_level,
                stdout: true,
                log_dir: Some(layout.logs_dir()),
                json_format: get("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json")),
            },
            layout,
        })
    }

    /// Point every path derived from the backup root at `backup_root`
    pub fn set_backup_root(&mut self, backup_root: impl Into<PathBuf>) {
        self.layout = StorageLayout::new(backup_root);
        self.logging.log_dir = Some(self.layout.logs_dir());
    }
}

/// `yes`, `true`, `on` and `1` enable a flag
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "yes" | "y" | "true" | "on" | "1"
    )
}

fn parse_number<T: FromStr>(key: &str, value: Option<String>) -> Result<Option<T>, BackupError>
where
    T::Err: std::fmt::Display,
{
    value
        .map(|v| {
            v.parse::<T>()
                .map_err(|e| BackupError::ConfigError(format!("Invalid {} '{}': {}", key, v, e)))
        })
        .transpose()
}

fn parse_schedule_time(value: &str) -> Result<NaiveTime, BackupError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|e| {
            BackupError::ConfigError(format!("Invalid SCHEDULE_TIME '{}': {}", value, e))
        })
}
