//! Application configuration and the backup run

pub mod options;
pub mod run;
