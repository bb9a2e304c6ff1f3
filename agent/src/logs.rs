//! Logging configuration

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{Builder, Rotation};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::errors::BackupError;

/// Log level configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_filter_string(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

/// Logging options
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Log level
    pub log_level: LogLevel,

    /// Write logs to stdout
    pub stdout: bool,

    /// Directory for the daily-rolling log file, if any
    pub log_dir: Option<PathBuf>,

    /// Enable JSON format
    pub json_format: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            stdout: true,
            log_dir: None,
            json_format: false,
        }
    }
}

/// Initialize logging.
///
/// The returned guard flushes the file writer on drop and must be held for the
/// lifetime of the process.
pub fn init_logging(options: LogOptions) -> Result<Option<WorkerGuard>, BackupError> {
    // HTTP client internals are noisy below warn unless debugging
    let default_directives = if options.log_level == LogLevel::Debug || options.log_level == LogLevel::Trace {
        options.log_level.to_filter_string().to_string()
    } else {
        format!(
            "{},hyper=warn,reqwest=warn,rustls=warn",
            options.log_level.to_filter_string()
        )
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if options.stdout {
        if options.json_format {
            layers.push(fmt::layer().json().boxed());
        } else {
            layers.push(fmt::layer().boxed());
        }
    }

    let mut guard = None;
    if let Some(log_dir) = &options.log_dir {
        std::fs::create_dir_all(log_dir)?;
        let appender = Builder::new()
            .rotation(Rotation::DAILY)
            .filename_prefix("backup")
            .filename_suffix("log")
            .build(log_dir)
            .map_err(|e| BackupError::ConfigError(format!("Failed to open log file: {}", e)))?;
        let (writer, worker_guard) = tracing_appender::non_blocking(appender);
        layers.push(fmt::layer().with_writer(writer).with_ansi(false).boxed());
        guard = Some(worker_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| BackupError::ConfigError(e.to_string()))?;

    Ok(guard)
}
