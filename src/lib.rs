//! Tellor Miner - proof-of-work mining coordinator in Rust
//!
//! This crate provides:
//! - A mining coordinator that feeds work to a parallel execution group,
//!   forwards solutions and shuts down through an acknowledged handshake
//! - A CPU execution group for the Keccak-256/SHA-256 challenge
//! - A JSON-RPC node client that supplies challenges and accepts solutions

#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Miner core implementation including the coordinator and execution group
pub mod miner;

/// Network communication with the node
pub mod network;

/// Statistics collection and reporting functionality
pub mod stats;

/// Utility functions and error handling
pub mod utils;

/// Command-line interface definitions
pub mod cli;

/// Configuration management
pub mod config;

/// Shared type definitions
pub mod types;

// Core exports
pub use cli::Commands;
pub use config::Config;
pub use miner::{
    ChallengeStore, MiningGroup, MiningHandle, MiningManager, SharedChallenge, SolutionSink,
    StopReason, TransactionSubmitter, WorkSource,
};
pub use network::{ChallengePoller, NodeClient, NodeSubmitter};
pub use stats::{MiningStats, StatsReporter};
pub use types::{Challenge, Dispatch, MiningOutcome, Solution, WorkUnit};
pub use utils::{MinerError, init_logging};
