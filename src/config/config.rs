// src/config/config.rs
use crate::{
    miner::{GroupSettings, ManagerSettings},
    network::node::NodeConfig,
    types::{ADDRESS_LEN, Address},
    utils::error::MinerError,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for the mining application
///
/// Contains all settings needed to run the miner: the account that mines,
/// the CPU execution group, the coordinator's timers and the node to
/// fetch challenges from and submit solutions to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Hex encoded 20-byte address that mines (with or without `0x`)
    pub public_address: String,

    /// Number of worker threads to use for mining
    /// (0 = number of CPU cores)
    #[serde(default)]
    pub worker_threads: usize,

    /// Size of nonce batches each worker claims at once
    /// (default: 10000)
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// How often the coordinator re-checks for a new challenge, in milliseconds
    /// (default: 15000)
    #[serde(default = "default_interrupt_check_interval_ms")]
    pub mining_interrupt_check_interval_ms: u64,

    /// How long to wait for the miners to acknowledge a shutdown, in seconds
    /// (0 = wait forever, default: 30)
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// How often mining statistics are logged, in seconds
    /// (default: 60)
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,

    /// Node connection settings
    pub node: NodeConfig,
}

fn default_batch_size() -> u64 {
    10_000
}

fn default_interrupt_check_interval_ms() -> u64 {
    15_000
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_stats_interval_secs() -> u64 {
    60
}

impl Config {
    /// Loads configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Ok(Config)` - Successfully loaded and validated configuration
    /// * `Err(MinerError)` - If the file couldn't be read, parsed or validated
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, MinerError> {
        let path = path.into();
        let config_str = std::fs::read_to_string(&path).map_err(|e| {
            MinerError::ConfigError(format!(
                "Failed to read config at {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::parse(&config_str)
    }

    /// Parses and validates configuration from a TOML string
    pub fn parse(config_str: &str) -> Result<Self, MinerError> {
        let config: Config = toml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that serde cannot
    pub fn validate(&self) -> Result<(), MinerError> {
        self.address()?;
        if self.batch_size == 0 {
            return Err(MinerError::ConfigError("batch_size must be positive".into()));
        }
        if self.mining_interrupt_check_interval_ms == 0 {
            return Err(MinerError::ConfigError(
                "mining_interrupt_check_interval_ms must be positive".into(),
            ));
        }
        self.node.validate()
    }

    /// Decodes `public_address`
    pub fn address(&self) -> Result<Address, MinerError> {
        let raw = hex::decode(self.public_address.trim_start_matches("0x"))?;
        raw.try_into().map_err(|raw: Vec<u8>| {
            MinerError::ConfigError(format!(
                "public_address must be {} bytes, got {}",
                ADDRESS_LEN,
                raw.len()
            ))
        })
    }

    /// Worker thread count with 0 resolved to the number of cores
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            num_cpus::get()
        } else {
            self.worker_threads
        }
    }

    /// Settings snapshot for the mining coordinator
    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            check_interval: Duration::from_millis(self.mining_interrupt_check_interval_ms),
            shutdown_timeout: match self.shutdown_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }

    /// Settings for the CPU execution group
    pub fn group_settings(&self) -> GroupSettings {
        GroupSettings {
            worker_threads: self.resolved_worker_threads(),
            batch_size: self.batch_size,
        }
    }

    /// Statistics reporting interval
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs.max(1))
    }

    /// Generates a configuration template string
    ///
    /// # Returns
    /// String containing a commented TOML configuration template
    pub fn generate_template() -> String {
        let mut template = String::new();
        template.push_str("# Tellor Miner Configuration\n\n");
        template.push_str("# Address that mines (20 bytes, hex)\n");
        template.push_str("public_address = \"0x0000000000000000000000000000000000000000\"\n");
        template.push_str("# Number of worker threads (0 = auto-detect)\n");
        template.push_str("worker_threads = 0\n");
        template.push_str("# Nonce batch size per worker\n");
        template.push_str("batch_size = 10000\n");
        template.push_str("# How often to check for a new challenge (ms)\n");
        template.push_str("mining_interrupt_check_interval_ms = 15000\n");
        template.push_str("# Shutdown acknowledgement timeout (s, 0 = wait forever)\n");
        template.push_str("shutdown_timeout_secs = 30\n");
        template.push_str("# Statistics log interval (s)\n");
        template.push_str("stats_interval_secs = 60\n\n");

        template.push_str("# Node connection\n");
        template.push_str("[node]\n");
        template.push_str("rpc_url = \"http://localhost:8545\"\n");
        template.push_str("rpc_user = \"\"\n");
        template.push_str("rpc_password = \"\"\n");
        template.push_str("challenge_poll_interval_secs = 5\n");

        template
    }
}
