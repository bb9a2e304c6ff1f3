//! Archival of backups into a git repository

pub mod archiver;
pub mod client;
