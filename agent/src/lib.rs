//! Appliance Backup Library
//!
//! Pulls configuration backups from network appliances over their HTTPS API,
//! keeps a rotating local copy and archives each run into a git repository.

pub mod app;
pub mod archive;
pub mod authn;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod storage;
pub mod utils;
pub mod workers;
