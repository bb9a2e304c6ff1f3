//! Background workers

pub mod scheduler;
