//! Statistics collection and reporting module
//!
//! Tracks hashes computed, work dispatched and the fate of every solution.
//! [`MiningStats`] is shared between the mining components, [`StatsReporter`]
//! periodically writes a summary to the log.

/// Counters and the periodic reporter
pub mod reporter;

// Re-export main components
pub use reporter::{MiningStats, StatsReporter, StatsSnapshot};
