// src/network/mod.rs
//! Network communication components
//!
//! Talks JSON-RPC to the node: polls the current challenge into the shared
//! store and submits solutions on behalf of the solution handler.

/// Node client, challenge poller and solution submitter
pub mod node;

// Re-export main components for cleaner imports
pub use node::{ChallengePoller, NodeClient, NodeConfig, NodeSubmitter};
