//! Appliance HTTP API

pub mod fetcher;
