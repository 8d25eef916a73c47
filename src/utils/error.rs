// src/utils/error.rs
use crate::types::{Dispatch, Solution};
use std::io;
use thiserror::Error;

/// Main error type for the mining application
///
/// This enum represents all possible error conditions that can occur
/// while wiring up and running the miner, including configuration,
/// network, protocol and thread coordination errors.
#[derive(Error, Debug)]
pub enum MinerError {
    /// Errors related to network connectivity
    #[error("Network connection error: {0}")]
    ConnectionError(String),

    /// Errors in protocol handling or invalid protocol messages
    #[error("Protocol violation: {0}")]
    ProtocolError(String),

    /// Standard I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL parse error: {0}")]
    UrlError(#[from] url::ParseError),

    /// HTTP request/response errors
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Configuration file or parameter errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Thread communication channel errors
    #[error("Thread communication error: {0}")]
    ChannelError(String),

    /// Invalid user input or parameter errors
    #[error("Invalid input: {0}")]
    InputError(String),

    /// Lifecycle misuse or a failed background task
    #[error("Task execution error: {0}")]
    TaskError(String),

    /// A node rejected a submitted solution
    #[error("Submission rejected: {0}")]
    SubmissionRejected(String),
}

/// Converts crossbeam channel send errors for solutions into MinerError
///
/// Raised when the solution queue has already been closed.
impl From<crossbeam_channel::SendError<Solution>> for MinerError {
    fn from(e: crossbeam_channel::SendError<Solution>) -> Self {
        MinerError::ChannelError(format!("Solution send failed: {}", e))
    }
}

/// Converts crossbeam channel send errors for dispatches into MinerError
///
/// Raised when the execution group has dropped its input channel.
impl From<crossbeam_channel::SendError<Dispatch>> for MinerError {
    fn from(e: crossbeam_channel::SendError<Dispatch>) -> Self {
        MinerError::ChannelError(format!("Dispatch send failed: {}", e))
    }
}

/// Converts TOML parse errors into MinerError
impl From<toml::de::Error> for MinerError {
    fn from(e: toml::de::Error) -> Self {
        MinerError::ConfigError(format!("Invalid config format: {}", e))
    }
}

/// Converts hex decoding errors into MinerError
///
/// Used when invalid hex data is encountered during:
/// - Challenge decoding from node responses
/// - Public address parsing in configuration
impl From<hex::FromHexError> for MinerError {
    fn from(e: hex::FromHexError) -> Self {
        MinerError::InputError(format!("Hex conversion failed: {}", e))
    }
}

/// Converts async task join errors into MinerError
///
/// Used when background tasks fail unexpectedly, such as the
/// challenge poller. Wraps the original error in a `TaskError` variant.
impl From<tokio::task::JoinError> for MinerError {
    fn from(e: tokio::task::JoinError) -> Self {
        MinerError::TaskError(format!("Async task failed: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_errors_become_input_errors() {
        let err: MinerError = hex::decode("zz").unwrap_err().into();
        assert!(matches!(err, MinerError::InputError(_)));
        assert!(err.to_string().starts_with("Invalid input: Hex conversion failed"));
    }

    #[test]
    fn closed_dispatch_channel_is_a_channel_error() {
        let (tx, rx) = crossbeam_channel::bounded::<Dispatch>(1);
        drop(rx);
        let err: MinerError = tx.send(Dispatch::Stop).unwrap_err().into();
        assert!(matches!(err, MinerError::ChannelError(_)));
    }
}
