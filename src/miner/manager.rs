// src/miner/manager.rs
//! Mining coordinator
//!
//! Runs a single-threaded event loop that feeds work to the execution group,
//! forwards its solutions to the solution sink and re-checks the work source
//! on a timer. Four events drive the loop: shutdown requests, group outcomes,
//! timer ticks and (while stopping) the shutdown deadline.
//!
//! The input channel is a rendezvous channel, so a dispatch completes only
//! once the group takes the unit and there is never more than one unit in
//! flight. While a dispatch waits, the loop keeps draining the output channel
//! so the group can never block on a result while the coordinator blocks on
//! a send. A shutdown request that arrives during the wait replaces the
//! pending unit with the stop.
//!
//! Shutdown is a handshake: the loop sends [`Dispatch::Stop`] and keeps
//! running until the group answers with [`MiningOutcome::Stopped`].

use crate::config::Config;
use crate::miner::algorithm::KeccakSha256;
use crate::miner::group::{CpuMiningGroup, MiningGroup};
use crate::miner::solution::{SolutionHandler, SolutionSink, TransactionSubmitter};
use crate::miner::tasker::{ChallengeStore, ChallengeTasker, WorkSource};
use crate::stats::MiningStats;
use crate::types::{Dispatch, MiningOutcome};
use crate::utils::error::MinerError;
use crossbeam_channel::{Receiver, Select, Sender, after, never, select, tick};
use std::convert::Infallible;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Coordinator settings snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSettings {
    /// How often the work source is re-checked for a newer challenge
    pub check_interval: Duration,
    /// How long to wait for the group to acknowledge a stop; `None` waits forever
    pub shutdown_timeout: Option<Duration>,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        ManagerSettings {
            check_interval: Duration::from_secs(15),
            shutdown_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl ManagerSettings {
    /// Rejects settings the event loop cannot run with
    pub fn validate(&self) -> Result<(), MinerError> {
        if self.check_interval.is_zero() {
            return Err(MinerError::ConfigError(
                "check interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Lifecycle of a coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// Constructed, not started
    Idle,
    /// Event loop active
    Running,
    /// Event loop exited; terminal
    Stopped,
}

/// Why the event loop exited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The group acknowledged with its stop sentinel
    Sentinel,
    /// The group did not acknowledge a stop within the shutdown timeout
    ShutdownTimedOut,
    /// The group dropped its output channel without a sentinel
    GroupDisconnected,
}

/// Coordinator that has not been started yet
pub struct MiningManager {
    settings: ManagerSettings,
    group: Box<dyn MiningGroup>,
    source: Box<dyn WorkSource>,
    sink: Box<dyn SolutionSink>,
    shutdown: Receiver<()>,
    stats: Arc<MiningStats>,
}

impl MiningManager {
    /// Creates a coordinator from explicit collaborators
    ///
    /// # Arguments
    /// * `settings` - Timer and shutdown settings
    /// * `group` - Execution group, owned for the lifetime of one run
    /// * `source` - Where new work comes from
    /// * `sink` - Where solutions go
    /// * `shutdown` - Externally owned shutdown signal; a message or a
    ///   disconnect requests a graceful stop
    /// * `stats` - Shared counters
    ///
    /// # Errors
    /// Returns `MinerError::ConfigError` for invalid settings.
    pub fn new(
        settings: ManagerSettings,
        group: Box<dyn MiningGroup>,
        source: Box<dyn WorkSource>,
        sink: Box<dyn SolutionSink>,
        shutdown: Receiver<()>,
        stats: Arc<MiningStats>,
    ) -> Result<Self, MinerError> {
        settings.validate()?;
        Ok(MiningManager {
            settings,
            group,
            source,
            sink,
            shutdown,
            stats,
        })
    }

    /// Creates a coordinator with the CPU group, the challenge tasker and the
    /// queued solution handler, all reading `store`
    ///
    /// # Errors
    /// Any failure to build a collaborator is returned before anything runs.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn ChallengeStore>,
        submitter: Arc<dyn TransactionSubmitter>,
        shutdown: Receiver<()>,
        stats: Arc<MiningStats>,
    ) -> Result<Self, MinerError> {
        let group = CpuMiningGroup::new(
            Arc::new(KeccakSha256),
            config.group_settings(),
            stats.clone(),
        )
        .map_err(|e| MinerError::ConfigError(format!("failed to set up miners: {}", e)))?;
        let tasker = ChallengeTasker::new(store.clone(), config.address()?);
        let handler = SolutionHandler::new(submitter, store, stats.clone())?;

        Self::new(
            config.manager_settings(),
            Box::new(group),
            Box::new(tasker),
            Box::new(handler),
            shutdown,
            stats,
        )
    }

    /// State of a coordinator that has not been started
    pub fn state(&self) -> ManagerState {
        ManagerState::Idle
    }

    /// Starts the execution group and the event loop, returns immediately
    ///
    /// # Errors
    /// Returns `MinerError::IoError` if a thread cannot be spawned. Nothing
    /// is left running in that case.
    pub fn start(self) -> Result<MiningHandle, MinerError> {
        let MiningManager {
            settings,
            group,
            source,
            sink,
            shutdown,
            stats,
        } = self;

        // Unbuffered on purpose: the coordinator and group stay in lockstep
        let (input_tx, input_rx) = crossbeam_channel::bounded::<Dispatch>(0);
        let (output_tx, output_rx) = crossbeam_channel::bounded::<MiningOutcome>(0);

        let group_thread = std::thread::Builder::new()
            .name("mining-group".into())
            .spawn(move || group.mine(input_rx, output_tx))?;

        let running = Arc::new(AtomicBool::new(true));
        let event_loop = EventLoop {
            running: RunningGuard(running.clone()),
            settings,
            source,
            sink,
            stats,
            input: input_tx,
            output: output_rx,
            shutdown,
            ticker: tick(settings.check_interval),
            deadline: never(),
            stopping: false,
            refresh: false,
        };
        let spawned = std::thread::Builder::new()
            .name("mining-manager".into())
            .spawn(move || event_loop.run(group_thread));

        match spawned {
            Ok(thread) => Ok(MiningHandle { running, thread }),
            Err(e) => {
                // The closure was dropped: the group sees its input disconnect
                // and winds down on its own.
                log::error!("Failed to start mining manager: {}", e);
                Err(e.into())
            }
        }
    }
}

/// Handle to a started coordinator
pub struct MiningHandle {
    running: Arc<AtomicBool>,
    thread: JoinHandle<StopReason>,
}

impl MiningHandle {
    /// True while the event loop is active
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current lifecycle state
    pub fn state(&self) -> ManagerState {
        if self.is_running() {
            ManagerState::Running
        } else {
            ManagerState::Stopped
        }
    }

    /// Waits for the event loop to exit
    ///
    /// Queued solutions have been handed to the submitter by the time this
    /// returns.
    pub fn join(self) -> Result<StopReason, MinerError> {
        self.thread
            .join()
            .map_err(|_| MinerError::TaskError("mining manager panicked".into()))
    }
}

/// Owner of the running flag; clears it on loop exit, panics included
struct RunningGuard(Arc<AtomicBool>);

impl RunningGuard {
    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.clear();
    }
}

enum Event {
    Shutdown { disconnected: bool },
    Outcome(Option<MiningOutcome>),
    Tick,
    Deadline,
}

enum Delivery {
    Sent,
    Disconnected(MinerError),
    Outcome(Option<MiningOutcome>),
    Shutdown { disconnected: bool },
    Deadline,
}

/// State owned by the coordinator thread
struct EventLoop {
    running: RunningGuard,
    settings: ManagerSettings,
    source: Box<dyn WorkSource>,
    sink: Box<dyn SolutionSink>,
    stats: Arc<MiningStats>,
    input: Sender<Dispatch>,
    output: Receiver<MiningOutcome>,
    shutdown: Receiver<()>,
    ticker: Receiver<Instant>,
    deadline: Receiver<Instant>,
    /// Stop has been requested; no more work goes out
    stopping: bool,
    /// A result arrived and the work source should be asked again
    refresh: bool,
}

impl EventLoop {
    fn run(mut self, group_thread: JoinHandle<()>) -> StopReason {
        log::info!(
            "Mining manager started, checking for new work every {:?}",
            self.settings.check_interval
        );

        let reason = match self.drive() {
            ControlFlow::Break(reason) => reason,
            ControlFlow::Continue(never) => match never {},
        };
        self.running.clear();

        match reason {
            StopReason::Sentinel => log::info!("Mining stopped"),
            StopReason::ShutdownTimedOut => log::error!(
                "Miners did not acknowledge stop within {:?}, abandoning them",
                self.settings.shutdown_timeout.unwrap_or_default()
            ),
            StopReason::GroupDisconnected => {
                log::error!("Miners exited without acknowledging stop")
            }
        }

        // Only a group that sent its sentinel is known to be finishing
        if reason == StopReason::Sentinel && group_thread.join().is_err() {
            log::error!("Mining group panicked");
        }
        reason
    }

    fn drive(&mut self) -> ControlFlow<StopReason, Infallible> {
        self.attempt_dispatch()?;
        self.refresh_work()?;
        loop {
            let event = select! {
                recv(self.shutdown) -> msg => Event::Shutdown { disconnected: msg.is_err() },
                recv(self.output) -> msg => Event::Outcome(msg.ok()),
                recv(self.ticker) -> _ => Event::Tick,
                recv(self.deadline) -> _ => Event::Deadline,
            };

            match event {
                Event::Shutdown { disconnected } => self.request_stop(disconnected)?,
                Event::Outcome(outcome) => {
                    self.on_outcome(outcome)?;
                }
                Event::Tick => {
                    log::debug!("Checking for new work");
                    self.attempt_dispatch()?;
                }
                Event::Deadline => return ControlFlow::Break(StopReason::ShutdownTimedOut),
            }
            self.refresh_work()?;
        }
    }

    /// Asks the work source again after results, until it has nothing new
    fn refresh_work(&mut self) -> ControlFlow<StopReason> {
        while self.refresh {
            self.refresh = false;
            self.attempt_dispatch()?;
        }
        ControlFlow::Continue(())
    }

    fn attempt_dispatch(&mut self) -> ControlFlow<StopReason> {
        if self.stopping {
            return ControlFlow::Continue(());
        }
        let Some(work) = self.source.get_work() else {
            return ControlFlow::Continue(());
        };
        log::debug!("Dispatching challenge {}", work.challenge);
        // A shutdown seen while waiting turns the pending unit into a stop
        if self.deliver(Dispatch::Work(work))? && !self.stopping {
            self.stats.record_dispatch();
        }
        ControlFlow::Continue(())
    }

    fn request_stop(&mut self, disconnected: bool) -> ControlFlow<StopReason> {
        self.begin_stop(disconnected);
        self.deliver(Dispatch::Stop)?;
        ControlFlow::Continue(())
    }

    /// Stops new work and arms the shutdown deadline
    fn begin_stop(&mut self, disconnected: bool) {
        if disconnected {
            log::warn!("Shutdown channel closed, stopping miners");
        } else {
            log::info!("Shutdown requested, stopping miners");
        }
        self.stopping = true;
        self.shutdown = never();
        self.ticker = never();
        if let Some(timeout) = self.settings.shutdown_timeout {
            self.deadline = after(timeout);
        }
    }

    fn on_outcome(&mut self, outcome: Option<MiningOutcome>) -> ControlFlow<StopReason> {
        match outcome {
            Some(MiningOutcome::Found(solution)) => {
                log::debug!("Forwarding solution with nonce {}", solution.nonce);
                self.sink.submit(solution);
                self.refresh = true;
                ControlFlow::Continue(())
            }
            Some(MiningOutcome::Stopped) => ControlFlow::Break(StopReason::Sentinel),
            None => ControlFlow::Break(StopReason::GroupDisconnected),
        }
    }

    /// Sends `dispatch` to the group, handling any outcome that arrives first
    ///
    /// A shutdown request that arrives first replaces pending work with
    /// [`Dispatch::Stop`]. Returns whether a message was delivered.
    fn deliver(&mut self, dispatch: Dispatch) -> ControlFlow<StopReason, bool> {
        let mut pending = Some(dispatch);
        while let Some(dispatch) = pending.take() {
            let delivery = {
                let mut sel = Select::new();
                let send_idx = sel.send(&self.input);
                let output_idx = sel.recv(&self.output);
                let shutdown_idx = sel.recv(&self.shutdown);
                let _deadline_idx = sel.recv(&self.deadline);
                let oper = sel.select();
                match oper.index() {
                    i if i == send_idx => match oper.send(&self.input, dispatch) {
                        Ok(()) => Delivery::Sent,
                        Err(e) => Delivery::Disconnected(e.into()),
                    },
                    i if i == output_idx => {
                        pending = Some(dispatch);
                        Delivery::Outcome(oper.recv(&self.output).ok())
                    }
                    i if i == shutdown_idx => {
                        if let Dispatch::Work(work) = dispatch {
                            log::debug!("Dropping challenge {}, shutting down", work.challenge);
                        }
                        pending = Some(Dispatch::Stop);
                        Delivery::Shutdown {
                            disconnected: oper.recv(&self.shutdown).is_err(),
                        }
                    }
                    _ => {
                        let _ = oper.recv(&self.deadline);
                        Delivery::Deadline
                    }
                }
            };

            match delivery {
                Delivery::Sent => return ControlFlow::Continue(true),
                Delivery::Disconnected(e) => {
                    log::error!("Miners are no longer accepting work: {}", e);
                    return ControlFlow::Continue(false);
                }
                Delivery::Outcome(outcome) => self.on_outcome(outcome)?,
                Delivery::Shutdown { disconnected } => self.begin_stop(disconnected),
                Delivery::Deadline => return ControlFlow::Break(StopReason::ShutdownTimedOut),
            }
        }
        ControlFlow::Continue(false)
    }
}
