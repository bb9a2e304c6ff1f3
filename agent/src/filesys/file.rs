//! File operations
//!
//! Writes go to a `.part` sibling first and are renamed into place only once
//! complete, so a failed write never leaves a truncated file at the final path.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use futures::{Stream, StreamExt};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::errors::BackupError;

/// A file wrapper with path
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
}

impl File {
    /// Create a new file reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the file exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    /// Write string to file
    pub async fn write_string(&self, contents: &str) -> Result<u64, BackupError> {
        let mut partial = PartialFile::create(&self.path).await?;
        partial.write_chunk(contents.as_bytes()).await?;
        partial.commit().await
    }

    /// Stream chunks into the file, returning the number of bytes written.
    ///
    /// Any error from the stream or the filesystem removes the partial output.
    pub async fn write_stream<S, B, E>(&self, stream: S) -> Result<u64, BackupError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        BackupError: From<E>,
    {
        let mut stream = std::pin::pin!(stream);
        let mut partial = PartialFile::create(&self.path).await?;
        while let Some(chunk) = stream.next().await {
            partial.write_chunk(chunk?.as_ref()).await?;
        }
        partial.commit().await
    }
}

/// An in-progress write that is discarded unless committed
struct PartialFile {
    target: PathBuf,
    temp: PathBuf,
    file: Option<fs::File>,
    written: u64,
}

impl PartialFile {
    async fn create(target: &Path) -> Result<Self, BackupError> {
        // Ensure parent directory exists
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut temp_name = target
            .file_name()
            .map(OsString::from)
            .ok_or_else(|| {
                BackupError::IoError(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("not a file path: {}", target.display()),
                ))
            })?;
        temp_name.push(".part");
        let temp = target.with_file_name(temp_name);

        let file = fs::File::create(&temp).await?;
        Ok(Self {
            target: target.to_path_buf(),
            temp,
            file: Some(file),
            written: 0,
        })
    }

    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), BackupError> {
        if let Some(file) = self.file.as_mut() {
            file.write_all(chunk).await?;
            self.written += chunk.len() as u64;
        }
        Ok(())
    }

    async fn commit(mut self) -> Result<u64, BackupError> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        fs::rename(&self.temp, &self.target).await?;
        debug!(path = %self.target.display(), bytes = self.written, "File written");
        Ok(self.written)
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        // Committed writes have been renamed away and leave nothing to remove
        drop(self.file.take());
        match std::fs::remove_file(&self.temp) {
            Ok(()) => warn!(path = %self.target.display(), "Discarded incomplete file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.temp.display(), error = %e, "Failed to remove incomplete file"),
        }
    }
}
