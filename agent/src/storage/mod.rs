//! Local storage

pub mod layout;
