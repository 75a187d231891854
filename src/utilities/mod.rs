//! Shared utilities: errors, configuration, storage paths.

pub mod config;
pub mod errors;
pub mod paths;
