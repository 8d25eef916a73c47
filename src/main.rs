// src/main.rs
use clap::Parser;
use crossbeam_channel::bounded;
use std::sync::Arc;
use tellor_miner_rs::{self, *};
use tokio::runtime::Runtime;

/// Main entry point for the miner
///
/// # Returns
/// - `Ok(())` on successful execution
/// - `Err(MinerError)` if any operation fails
fn main() -> Result<(), MinerError> {
    let cli = cli::Commands::parse();

    match cli.action {
        cli::Action::Start(opts) => start_mining(opts),
        cli::Action::Config(opts) => generate_config(opts),
    }
}

/// Starts mining and blocks until the miner has shut down
///
/// # Operations
/// 1. Initializes logging
/// 2. Loads and validates configuration
/// 3. Starts statistics reporting and challenge polling
/// 4. Starts the mining coordinator
/// 5. Turns Ctrl-C into a graceful shutdown and waits for it to complete
fn start_mining(opts: cli::StartOptions) -> Result<(), MinerError> {
    if opts.verbose {
        utils::init_verbose_logging();
    } else {
        utils::init_logging();
    }

    let mut config = config::load(&opts.config)?;
    if let Some(workers) = opts.workers {
        config.worker_threads = workers;
    }

    let rt = Runtime::new()?;
    let stats = MiningStats::new();
    let mut reporter = StatsReporter::new(stats.clone(), config.stats_interval());
    reporter.start_reporting();

    // Challenge polling and submission
    let store = SharedChallenge::new();
    let client = NodeClient::new(config.node.clone())?;
    let poller = ChallengePoller::spawn(rt.handle(), client.clone(), store.clone());
    let submitter = Arc::new(NodeSubmitter::new(client, rt.handle().clone()));

    // Shutdown signal; the guard keeps the channel open if the signal
    // handler itself fails
    let (shutdown_tx, shutdown_rx) = bounded(1);
    let _shutdown_guard = shutdown_tx.clone();
    rt.spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::info!("Interrupt received, shutting down");
                let _ = shutdown_tx.send(());
            }
            Err(e) => log::error!("Cannot listen for Ctrl-C: {}", e),
        }
    });

    let manager =
        MiningManager::from_config(&config, store, submitter, shutdown_rx, stats.clone())?;
    log::info!(
        "Mining as 0x{} with {} workers",
        hex::encode(config.address()?),
        config.resolved_worker_threads()
    );
    let handle = manager.start()?;

    let reason = handle.join()?;
    log::info!("Mining manager exited: {:?}", reason);

    rt.block_on(poller.stop())?;
    reporter.stop();
    Ok(())
}

/// Generates configuration template file
///
/// # Arguments
/// * `opts` - Configuration generation options
fn generate_config(opts: cli::ConfigOptions) -> Result<(), MinerError> {
    std::fs::write(&opts.output, config::generate_template())?;
    println!("Wrote configuration template to {}", opts.output.display());
    Ok(())
}
