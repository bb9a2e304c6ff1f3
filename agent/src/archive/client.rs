//! Repository client capability and its `git` command-line implementation

use std::path::Path;
use std::process::{Output, Stdio};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::process::Command;
use tracing::debug;

use crate::errors::BackupError;
use crate::utils::truncate_chars;

/// Credentials handed to git through the environment of the child process
/// only, never through arguments or repository config
pub struct GitAuth<'a> {
    /// Script answering git's credential prompts
    pub askpass_path: &'a Path,
    pub username: &'a str,
    pub token: &'a SecretString,
}

/// The repository operations the archiver needs
#[async_trait]
pub trait RepoClient: Send + Sync {
    /// Shallow-clone `url` into `dest`, which must not exist
    async fn clone_shallow(&self, url: &str, dest: &Path, auth: &GitAuth<'_>)
        -> Result<(), BackupError>;

    /// Set the committer identity for `repo`
    async fn configure_identity(&self, repo: &Path, name: &str, email: &str)
        -> Result<(), BackupError>;

    /// Stage every change in the working tree
    async fn stage_all(&self, repo: &Path) -> Result<(), BackupError>;

    /// Whether anything is staged or modified
    async fn has_changes(&self, repo: &Path) -> Result<bool, BackupError>;

    async fn commit(&self, repo: &Path, message: &str) -> Result<(), BackupError>;

    /// Push the current branch to its remote
    async fn push(&self, repo: &Path, auth: &GitAuth<'_>) -> Result<(), BackupError>;
}

/// Runs the `git` binary
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self
    }

    async fn git(
        &self,
        repo: Option<&Path>,
        args: &[&str],
        auth: Option<&GitAuth<'_>>,
    ) -> Result<Output, BackupError> {
        let step = args
            .iter()
            .find(|a| !a.starts_with('-') && !a.contains('='))
            .copied()
            .unwrap_or("git");
        let mut cmd = Command::new("git");
        if let Some(repo) = repo {
            cmd.current_dir(repo);
        }
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(auth) = auth {
            cmd.env("GIT_ASKPASS", auth.askpass_path)
                .env("GIT_USERNAME", auth.username)
                .env("GIT_PASSWORD", auth.token.expose_secret());
        }

        debug!(step, "Running git");
        let output = cmd
            .output()
            .await
            .map_err(|e| BackupError::ArchiveError(format!("Failed to run git {}: {}", step, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackupError::ArchiveError(format!(
                "git {} failed ({}): {}",
                step,
                output.status,
                truncate_chars(stderr.trim(), 500)
            )));
        }
        Ok(output)
    }
}

#[async_trait]
impl RepoClient for GitCli {
    async fn clone_shallow(
        &self,
        url: &str,
        dest: &Path,
        auth: &GitAuth<'_>,
    ) -> Result<(), BackupError> {
        let dest = dest.to_string_lossy().into_owned();
        // An empty credential.helper keeps any configured store from saving the token
        self.git(
            None,
            &["-c", "credential.helper=", "clone", "--depth", "1", "--quiet", url, dest.as_str()],
            Some(auth),
        )
        .await?;
        Ok(())
    }

    async fn configure_identity(
        &self,
        repo: &Path,
        name: &str,
        email: &str,
    ) -> Result<(), BackupError> {
        self.git(Some(repo), &["config", "user.name", name], None).await?;
        self.git(Some(repo), &["config", "user.email", email], None).await?;
        Ok(())
    }

    async fn stage_all(&self, repo: &Path) -> Result<(), BackupError> {
        self.git(Some(repo), &["add", "-f", "--all"], None).await?;
        Ok(())
    }

    async fn has_changes(&self, repo: &Path) -> Result<bool, BackupError> {
        let output = self.git(Some(repo), &["status", "--porcelain"], None).await?;
        Ok(!String::from_utf8_lossy(&output.stdout).trim().is_empty())
    }

    async fn commit(&self, repo: &Path, message: &str) -> Result<(), BackupError> {
        self.git(Some(repo), &["commit", "--quiet", "-m", message], None).await?;
        Ok(())
    }

    async fn push(&self, repo: &Path, auth: &GitAuth<'_>) -> Result<(), BackupError> {
        self.git(
            Some(repo),
            &["-c", "credential.helper=", "push", "--quiet", "origin", "HEAD"],
            Some(auth),
        )
        .await?;
        Ok(())
    }
}
