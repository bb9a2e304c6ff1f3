//! Backup job: one pass over the device list

use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{error, info, warn};

use crate::archive::archiver::{Archiver, SyncOutcome};
use crate::authn::credentials::CredentialResolver;
use crate::errors::BackupError;
use crate::filesys::file::File;
use crate::filesys::rotate::rotate;
use crate::http::fetcher::BackupFetcher;
use crate::models::backup::{BackupArtifact, RunResult, RunSummary, SyncRequest};
use crate::models::device::{load_devices, Device};
use crate::storage::layout::{ARCHIVE_PREFIX, BACKUP_EXTENSION, LOG_EXTENSION};

/// Runs backup jobs. Devices are processed one at a time, in list order, and
/// a failing device never stops the ones after it.
pub struct Orchestrator<A> {
    resolver: CredentialResolver,
    fetcher: BackupFetcher,
    archiver: A,
    devices_file: PathBuf,
    retention_days: i64,
}

impl<A: Archiver> Orchestrator<A> {
    pub fn new(
        resolver: CredentialResolver,
        fetcher: BackupFetcher,
        archiver: A,
        devices_file: impl Into<PathBuf>,
        retention_days: i64,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            archiver,
            devices_file: devices_file.into(),
            retention_days,
        }
    }

    pub fn archiver(&self) -> &A {
        &self.archiver
    }

    /// Load the device list and back up every device on it.
    ///
    /// Returns `None` when there is nothing to back up.
    pub async fn run(&self) -> Option<RunSummary> {
        info!("Starting backup job...");
        let devices = load_devices(&self.devices_file);
        if devices.is_empty() {
            warn!(path = %self.devices_file.display(), "No devices found in device list");
            return None;
        }
        Some(self.run_batch(&devices).await)
    }

    /// Back up `devices` in order, then write, archive and rotate the run summary
    pub async fn run_batch(&self, devices: &[Device]) -> RunSummary {
        let mut summary = RunSummary::new(Local::now());

        for device in devices {
            let result = match self.backup_device(device).await {
                Ok(_) => RunResult::success(device.label()),
                Err(e) => {
                    error!(
                        device = device.label(),
                        error = %e,
                        retryable = e.is_retryable(),
                        "Backup failed"
                    );
                    RunResult::failure(device.label(), e.to_string())
                }
            };
            summary.push(result);
        }

        info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            "Backup job finished"
        );
        self.publish_summary(&summary).await;
        summary
    }

    /// Fetch one device, rotate its folder, archive the new file
    async fn backup_device(&self, device: &Device) -> Result<BackupArtifact, BackupError> {
        let credential = self.resolver.resolve(device)?;
        let artifact = self.fetcher.fetch(device, &credential).await?;

        if let Some(device_dir) = artifact.local_path.parent() {
            rotate(device_dir, &[BACKUP_EXTENSION], self.retention_days);
        }

        let request = SyncRequest::new(format!(
            "Backup {} - {}",
            artifact.device_folder_name, artifact.filename
        ))
        .with_file(&artifact.local_path, artifact.repo_relative_path());
        self.archive(request).await;

        Ok(artifact)
    }

    async fn archive(&self, request: SyncRequest) {
        let commit_message = request.commit_message.clone();
        match self.archiver.sync(request).await {
            SyncOutcome::Committed => info!(%commit_message, "Archived"),
            SyncOutcome::Unchanged => info!(%commit_message, "Archive already up to date"),
            SyncOutcome::Disabled => {}
            SyncOutcome::Failed(reason) => {
                warn!(%commit_message, %reason, "Archival failed, local copy kept")
            }
        }
    }

    async fn publish_summary(&self, summary: &RunSummary) {
        let layout = self.fetcher.layout();
        let summary_path = layout.summary_file(&Local::now());

        match File::new(&summary_path).write_string(&summary.render()).await {
            Ok(_) => {
                info!(path = %summary_path.display(), "Run summary written, syncing to git");
                let request = SyncRequest::new(format!(
                    "Run Summary - {}",
                    summary.started_at.format("%Y-%m-%d %H:%M:%S")
                ))
                .with_file(&summary_path, summary_repo_path(&summary_path));
                self.archive(request).await;
            }
            Err(e) => {
                error!(path = %summary_path.display(), error = %e, "Failed to write run summary");
            }
        }

        rotate(&layout.logs_dir(), &[LOG_EXTENSION], self.retention_days);
    }
}

fn summary_repo_path(summary_path: &Path) -> PathBuf {
    let mut repo_path = PathBuf::from(ARCHIVE_PREFIX).join("logs");
    if let Some(name) = summary_path.file_name() {
        repo_path.push(name);
    }
    repo_path
}
