// src/network/node.rs
use crate::miner::solution::TransactionSubmitter;
use crate::miner::tasker::SharedChallenge;
use crate::types::{Challenge, Solution};
use crate::utils::error::MinerError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

/// Configuration for connecting to a node's RPC interface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// URL of the node's RPC endpoint (e.g., "http://127.0.0.1:8545")
    pub rpc_url: String,
    /// Username for RPC authentication (empty when not required)
    #[serde(default)]
    pub rpc_user: String,
    /// Password for RPC authentication (empty when not required)
    #[serde(default)]
    pub rpc_password: String,
    /// How often to poll the node for the current challenge, in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub challenge_poll_interval_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    5
}

impl NodeConfig {
    /// Checks the RPC URL and the poll interval
    pub fn validate(&self) -> Result<(), MinerError> {
        let url = Url::parse(&self.rpc_url)
            .map_err(|e| MinerError::ConfigError(format!("Invalid URL '{}': {}", self.rpc_url, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(MinerError::ConfigError(format!(
                "Node URL '{}' must use http or https",
                self.rpc_url
            )));
        }
        if self.challenge_poll_interval_secs == 0 {
            return Err(MinerError::ConfigError(
                "challenge_poll_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Poll interval as a Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.challenge_poll_interval_secs)
    }
}

/// Client for interacting with a node's RPC interface
#[derive(Clone)]
pub struct NodeClient {
    /// Configuration for the node connection
    config: NodeConfig,
    /// HTTP client for making RPC requests
    client: Client,
}

impl NodeClient {
    /// Creates a new NodeClient with the given configuration
    ///
    /// # Errors
    /// Returns `MinerError` if the configuration is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: NodeConfig) -> Result<Self, MinerError> {
        config.validate()?;
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(NodeClient { config, client })
    }

    /// Requests the current mining challenge from the node
    ///
    /// # Returns
    /// * `Ok(Some(Challenge))` - The challenge to mine
    /// * `Ok(None)` - The node has no open challenge
    /// * `Err(MinerError)` - If the request failed or the reply was malformed
    pub async fn current_challenge(&self) -> Result<Option<Challenge>, MinerError> {
        let result = self.rpc_call("mining_getChallenge", json!([])).await?;
        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(result)?))
    }

    /// Submits a solution to the node
    ///
    /// # Errors
    /// Returns `MinerError::SubmissionRejected` if the node answers `false`.
    pub async fn submit_solution(&self, solution: &Solution) -> Result<(), MinerError> {
        let challenge = &solution.work.challenge;
        let result = self
            .rpc_call(
                "mining_submitSolution",
                json!({
                    "challenge": hex::encode(challenge.challenge),
                    "request_id": challenge.request_id,
                    "nonce": solution.nonce.to_string(),
                    "address": hex::encode(solution.work.public_address),
                }),
            )
            .await?;

        match result.as_bool() {
            Some(false) => Err(MinerError::SubmissionRejected(format!(
                "node refused nonce {}",
                solution.nonce
            ))),
            _ => Ok(()),
        }
    }

    /// Makes an RPC call to the node and unwraps the JSON-RPC envelope
    ///
    /// # Returns
    /// * `Ok(Value)` - The `result` member of the response
    /// * `Err(MinerError)` - If the call failed or the node returned an error
    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, MinerError> {
        let mut request = self.client.post(&self.config.rpc_url);
        if !self.config.rpc_user.is_empty() {
            request = request.basic_auth(&self.config.rpc_user, Some(&self.config.rpc_password));
        }

        let response: Value = request
            .json(&json!({
                "jsonrpc": "2.0",
                "id": "0",
                "method": method,
                "params": params
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        unwrap_rpc_response(method, response)
    }
}

fn unwrap_rpc_response(method: &str, mut response: Value) -> Result<Value, MinerError> {
    if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
        return Err(MinerError::ProtocolError(format!("{} failed: {}", method, error)));
    }
    match response.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(MinerError::ProtocolError(format!(
            "{} response has no result",
            method
        ))),
    }
}

/// Keeps a [`SharedChallenge`] in sync with the node
pub struct ChallengePoller {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ChallengePoller {
    /// Spawns the polling task on `runtime`
    ///
    /// RPC failures are logged and retried on the next tick; the last known
    /// challenge stays in place meanwhile.
    pub fn spawn(runtime: &Handle, client: NodeClient, store: Arc<SharedChallenge>) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let interval = client.config.poll_interval();

        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match client.current_challenge().await {
                            Ok(Some(challenge)) => {
                                if store.publish(challenge.clone()) {
                                    log::info!("New challenge from node: {}", challenge);
                                }
                            }
                            Ok(None) => log::debug!("Node has no open challenge"),
                            Err(e) => log::warn!("Failed to fetch challenge: {}", e),
                        }
                    }
                    _ = stop_rx.changed() => break,
                }
            }
            log::debug!("Challenge poller stopped");
        });

        ChallengePoller { stop_tx, task }
    }

    /// Stops polling and waits for the task to finish
    pub async fn stop(self) -> Result<(), MinerError> {
        let _ = self.stop_tx.send(true);
        self.task.await?;
        Ok(())
    }
}

/// [`TransactionSubmitter`] that submits through a [`NodeClient`]
///
/// Called from a plain thread; the request runs on the given runtime.
pub struct NodeSubmitter {
    client: NodeClient,
    runtime: Handle,
}

impl NodeSubmitter {
    /// Creates a submitter that drives requests on `runtime`
    pub fn new(client: NodeClient, runtime: Handle) -> Self {
        NodeSubmitter { client, runtime }
    }
}

impl TransactionSubmitter for NodeSubmitter {
    fn submit_solution(&self, solution: &Solution) -> Result<(), MinerError> {
        self.runtime.block_on(self.client.submit_solution(solution))
    }
}
