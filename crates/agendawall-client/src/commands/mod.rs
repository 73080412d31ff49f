//! Subcommand implementations.

pub mod config;
pub mod control;
#[cfg(feature = "indico")]
pub mod fetch;
pub mod serve;
