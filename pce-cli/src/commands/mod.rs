//! Subcommand implementations
//!
//! Each returns the process exit code on success.

pub mod download;
pub mod internal;
pub mod run;
