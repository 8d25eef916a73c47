// src/miner/mod.rs
//! Core mining functionality
//!
//! This module contains all components related to the mining process:
//! - The coordinator that drives the mining loop
//! - The work source and solution sink it talks to
//! - The CPU execution group and its hashing algorithm

/// Proof-of-work hashing
pub mod algorithm;

/// CPU execution group
///
/// Spreads each work unit over worker threads and reports solutions back
/// over a single channel pair.
pub mod group;

/// Mining coordinator
///
/// Event loop, lifecycle and shutdown handshake.
pub mod manager;

/// Solution sink and submission queue
pub mod solution;

/// Work source backed by the current challenge
pub mod tasker;

// Re-export main components for cleaner imports
pub use self::algorithm::{Algorithm, KeccakSha256};
pub use self::group::{CpuMiningGroup, GroupSettings, MiningGroup};
pub use self::manager::{ManagerSettings, ManagerState, MiningHandle, MiningManager, StopReason};
pub use self::solution::{SolutionHandler, SolutionSink, TransactionSubmitter};
pub use self::tasker::{ChallengeStore, ChallengeTasker, SharedChallenge, WorkSource};
