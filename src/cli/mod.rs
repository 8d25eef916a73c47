// src/cli/mod.rs
//! Command-line interface definitions

/// Argument parser types
pub mod commands;

pub use commands::{Action, Commands, ConfigOptions, StartOptions};
