//! Failover-aware connections to a sharded database backend.

pub mod backend;
pub mod cli;
pub mod config;
pub mod logger;

pub use logger::logger;
