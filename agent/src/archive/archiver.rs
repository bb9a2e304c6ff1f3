//! Git archival of backup artifacts and run summaries
//!
//! Each sync works in a disposable clone: the workspace and the credential
//! helper script are created at the start of a sync and removed when it ends,
//! whatever the outcome. Only one sync may be in flight at a time.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::app::options::ArchiveOptions;
use crate::archive::client::{GitAuth, RepoClient};
use crate::errors::BackupError;
use crate::models::backup::SyncRequest;

/// Username presented alongside the push token
const TOKEN_USERNAME: &str = "x-access-token";

/// Answers git's username prompt and password prompt from the environment
const ASKPASS_SCRIPT: &str = "#!/bin/sh\n\
case \"$1\" in\n\
  Username*) echo \"$GIT_USERNAME\" ;;\n\
  *) echo \"$GIT_PASSWORD\" ;;\n\
esac\n";

/// Result of one archive sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Archival is not configured
    Disabled,
    /// The remote already holds identical content, nothing was pushed
    Unchanged,
    /// A commit was created and pushed
    Committed,
    /// The sync failed; local backups are unaffected
    Failed(String),
}

/// Something that archives files. Never fails its caller.
#[async_trait]
pub trait Archiver: Send + Sync {
    async fn sync(&self, request: SyncRequest) -> SyncOutcome;
}

/// Archives into a remote git repository through a [`RepoClient`]
pub struct GitArchiver<R> {
    client: R,
    options: ArchiveOptions,
}

impl<R: RepoClient> GitArchiver<R> {
    pub fn new(client: R, options: ArchiveOptions) -> Self {
        Self { client, options }
    }

    /// Remote URL and push token, refusing anything but HTTPS
    fn remote(&self) -> Result<(&str, &SecretString), BackupError> {
        let (Some(url), Some(token)) = (self.options.repo_url.as_deref(), self.options.push_token.as_ref()) else {
            return Err(BackupError::ConfigError(
                "GIT_REPO_URL and GIT_PUSH_TOKEN must both be set".to_string(),
            ));
        };

        let parsed = Url::parse(url)
            .map_err(|e| BackupError::ConfigError(format!("Invalid GIT_REPO_URL: {}", e)))?;
        if parsed.scheme() != "https" {
            return Err(BackupError::ConfigError("GIT_REPO_URL must be HTTPS".to_string()));
        }
        if parsed.password().is_some() {
            return Err(BackupError::ConfigError(
                "GIT_REPO_URL must not embed credentials".to_string(),
            ));
        }

        Ok((url, token))
    }

    async fn try_sync(&self, request: &SyncRequest) -> Result<SyncOutcome, BackupError> {
        let (url, token) = self.remote()?;

        let workspace =
            Workspace::acquire(&self.options.workspace_dir, &self.options.askpass_path).await?;
        let auth = GitAuth {
            askpass_path: workspace.askpass_path(),
            username: TOKEN_USERNAME,
            token,
        };

        info!(commit_message = %request.commit_message, "Git: cloning repository");
        self.client
            .clone_shallow(url, workspace.path(), &auth)
            .await?;
        self.client
            .configure_identity(
                workspace.path(),
                &self.options.user_name,
                &self.options.user_email,
            )
            .await?;

        for (local_path, repo_path) in &request.files {
            copy_into(workspace.path(), local_path, repo_path).await?;
        }

        self.client.stage_all(workspace.path()).await?;
        if !self.client.has_changes(workspace.path()).await? {
            debug!(commit_message = %request.commit_message, "Git: no changes to commit");
            return Ok(SyncOutcome::Unchanged);
        }

        info!(commit_message = %request.commit_message, "Git: committing changes");
        self.client
            .commit(workspace.path(), &request.commit_message)
            .await?;
        self.client.push(workspace.path(), &auth).await?;
        info!(commit_message = %request.commit_message, "Git: sync successful");

        Ok(SyncOutcome::Committed)
    }
}

#[async_trait]
impl<R: RepoClient> Archiver for GitArchiver<R> {
    async fn sync(&self, request: SyncRequest) -> SyncOutcome {
        if !self.options.is_enabled() {
            debug!("Git sync skipped: GIT_REPO_URL and GIT_PUSH_TOKEN not set");
            return SyncOutcome::Disabled;
        }

        match self.try_sync(&request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    commit_message = %request.commit_message,
                    error = %e,
                    "Git sync error"
                );
                SyncOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Copy `local_path` to `repo_path` inside the clone, replacing any existing file
async fn copy_into(workspace: &Path, local_path: &Path, repo_path: &Path) -> Result<(), BackupError> {
    let escapes = repo_path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || repo_path.as_os_str().is_empty() {
        return Err(BackupError::ArchiveError(format!(
            "Archive path must stay inside the repository: {}",
            repo_path.display()
        )));
    }

    let target = workspace.join(repo_path);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::copy(local_path, &target).await.map_err(|e| {
        BackupError::ArchiveError(format!(
            "Failed to copy {} into repository: {}",
            local_path.display(),
            e
        ))
    })?;
    Ok(())
}

/// Exclusive hold on the clone directory and the credential helper script.
/// Both are removed on drop.
struct Workspace {
    dir: PathBuf,
    askpass: PathBuf,
}

impl Workspace {
    async fn acquire(dir: &Path, askpass: &Path) -> Result<Self, BackupError> {
        // Constructed first so a failure below still cleans up
        let workspace = Self {
            dir: dir.to_path_buf(),
            askpass: askpass.to_path_buf(),
        };

        if fs::try_exists(&workspace.dir).await? {
            debug!(dir = %workspace.dir.display(), "Removing stale workspace");
            fs::remove_dir_all(&workspace.dir).await?;
        }
        if let Some(parent) = workspace.dir.parent() {
            fs::create_dir_all(parent).await?;
        }
        if let Some(parent) = workspace.askpass.parent() {
            fs::create_dir_all(parent).await?;
        }
        write_askpass(&workspace.askpass).await?;

        Ok(workspace)
    }

    fn path(&self) -> &Path {
        &self.dir
    }

    fn askpass_path(&self) -> &Path {
        &self.askpass
    }
}

// Drop cannot await, so cleanup uses blocking std::fs calls
impl Drop for Workspace {
    fn drop(&mut self) {
        if self.dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.dir) {
                warn!(dir = %self.dir.display(), error = %e, "Failed to remove git workspace");
            }
        }
        if let Err(e) = std::fs::remove_file(&self.askpass) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.askpass.display(), error = %e, "Failed to remove askpass script");
            }
        }
    }
}

#[cfg(unix)]
async fn write_askpass(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o700)
        .open(path)
        .await?;
    file.write_all(ASKPASS_SCRIPT.as_bytes()).await?;
    file.flush().await?;
    // mode() is ignored for pre-existing files
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o700)).await
}

#[cfg(not(unix))]
async fn write_askpass(path: &Path) -> std::io::Result<()> {
    fs::write(path, ASKPASS_SCRIPT).await
}
