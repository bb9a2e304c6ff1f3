//! Appliance Backup - Entry Point
//!
//! Backs up every appliance in the device list once, or daily at a fixed
//! local time when running as a service.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use appliance_backup::app::options::{AppOptions, RunMode};
use appliance_backup::app::run::Orchestrator;
use appliance_backup::archive::archiver::GitArchiver;
use appliance_backup::archive::client::GitCli;
use appliance_backup::authn::credentials::{CredentialResolver, ProcessEnv};
use appliance_backup::http::fetcher::BackupFetcher;
use appliance_backup::logs::init_logging;
use appliance_backup::utils::version_info;
use appliance_backup::workers::scheduler::run_daily;

use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        println!("{}", serde_json::to_string_pretty(&version)?);
        return Ok(());
    }

    let mut options = AppOptions::from_lookup(&ProcessEnv)?;
    if let Some(devices_file) = cli_args.get("devices") {
        options.devices_file = devices_file.into();
    }
    if let Some(backup_dir) = cli_args.get("backup-dir") {
        options.set_backup_root(backup_dir);
    }
    if cli_args.contains_key("run-once") {
        options.run_mode = RunMode::Manual;
    }

    // Initialize logging, the guard flushes the log file on exit
    let _log_guard = match init_logging(options.logging.clone()) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    info!(version = %version.version, git_hash = %version.git_hash, "Starting Appliance Backup");
    info!("Running with options: {:?}", options);

    let resolver = CredentialResolver::new(Arc::new(ProcessEnv));
    let fetcher = BackupFetcher::new(options.fetch, options.layout)?;
    let archiver = GitArchiver::new(GitCli::new(), options.archive);
    let orchestrator = Orchestrator::new(
        resolver,
        fetcher,
        archiver,
        options.devices_file,
        options.retention_days,
    );

    match options.run_mode {
        RunMode::Manual => {
            orchestrator.run().await;
        }
        RunMode::Schedule => {
            let orchestrator = &orchestrator;
            run_daily(
                options.schedule_time,
                || async move {
                    orchestrator.run().await;
                },
                |duration: Duration| tokio::time::sleep(duration),
                Box::pin(await_shutdown_signal()),
            )
            .await;
        }
    }

    info!("Appliance Backup stopped");
    Ok(())
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            _ => {
                error!("Failed to install signal handlers, falling back to Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl+C received, shutting down...");
    }
}
