// src/miner/group.rs
//! Mining execution group
//!
//! Owns the hashing worker threads and exposes them to the coordinator as a
//! single input/output channel pair. Workers share the current job through an
//! atomically swappable slot and claim nonce batches from that job's counter.

use crate::miner::algorithm::{Algorithm, meets_difficulty};
use crate::stats::MiningStats;
use crate::types::{Dispatch, MiningOutcome, Solution, WorkUnit};
use crate::utils::error::MinerError;
use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, Sender, never, select};
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

const IDLE_POLL: Duration = Duration::from_millis(20);

/// Parallel searcher driven by the coordinator
///
/// `mine` consumes [`Dispatch`] messages in order until it sees
/// [`Dispatch::Stop`] or the input channel disconnects, then emits exactly one
/// [`MiningOutcome::Stopped`] and returns. Nothing is sent after it.
pub trait MiningGroup: Send {
    /// Runs the group until stopped
    fn mine(self: Box<Self>, input: Receiver<Dispatch>, output: Sender<MiningOutcome>);
}

/// Sizing of the CPU execution group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupSettings {
    /// Number of hashing threads
    pub worker_threads: usize,
    /// Nonces claimed per batch
    pub batch_size: u64,
}

/// The job every worker is currently searching
///
/// The nonce counter lives with the job so a worker still holding the
/// previous job can never claim nonces from the new one.
struct ActiveJob {
    work: WorkUnit,
    generation: u64,
    next_nonce: AtomicU64,
}

/// A worker's hit, tagged with the job generation it was found for
struct Found {
    generation: u64,
    solution: Solution,
}

/// CPU implementation of [`MiningGroup`]
pub struct CpuMiningGroup {
    algorithm: Arc<dyn Algorithm>,
    settings: GroupSettings,
    stats: Arc<MiningStats>,
}

impl CpuMiningGroup {
    /// Creates a new group
    ///
    /// # Errors
    /// Returns `MinerError::ConfigError` when the group would have no
    /// workers or an empty batch.
    pub fn new(
        algorithm: Arc<dyn Algorithm>,
        settings: GroupSettings,
        stats: Arc<MiningStats>,
    ) -> Result<Self, MinerError> {
        if settings.worker_threads == 0 {
            return Err(MinerError::ConfigError(
                "mining group needs at least one worker".into(),
            ));
        }
        if settings.batch_size == 0 {
            return Err(MinerError::ConfigError("batch_size must be positive".into()));
        }
        Ok(CpuMiningGroup {
            algorithm,
            settings,
            stats,
        })
    }
}

impl MiningGroup for CpuMiningGroup {
    fn mine(self: Box<Self>, input: Receiver<Dispatch>, output: Sender<MiningOutcome>) {
        let current_job: Arc<ArcSwap<Option<ActiveJob>>> = Arc::new(ArcSwap::from_pointee(None));
        let active = Arc::new(AtomicBool::new(true));
        let (found_tx, found_rx) = crossbeam_channel::unbounded::<Found>();

        let workers: Vec<JoinHandle<()>> = (0..self.settings.worker_threads)
            .filter_map(|id| {
                let worker = Worker {
                    job: current_job.clone(),
                    active: active.clone(),
                    found: found_tx.clone(),
                    algorithm: self.algorithm.clone(),
                    stats: self.stats.clone(),
                    batch_size: self.settings.batch_size,
                };
                std::thread::Builder::new()
                    .name(format!("miner-{}", id))
                    .spawn(move || worker.run())
                    .map_err(|e| log::error!("Failed to spawn mining worker {}: {}", id, e))
                    .ok()
            })
            .collect();
        drop(found_tx);

        log::info!(
            "Mining group started: {} workers, {} algorithm",
            workers.len(),
            self.algorithm.name()
        );

        let mut found_rx = if workers.is_empty() { never() } else { found_rx };
        let mut generation = 0u64;
        let mut live = false;

        loop {
            let mut workers_gone = false;
            select! {
                recv(input) -> msg => match msg {
                    Ok(Dispatch::Work(work)) => {
                        generation += 1;
                        live = true;
                        log::info!("Mining challenge {}", work.challenge);
                        current_job.store(Arc::new(Some(ActiveJob {
                            work,
                            generation,
                            next_nonce: AtomicU64::new(0),
                        })));
                    }
                    Ok(Dispatch::Stop) => {
                        log::info!("Mining group received stop");
                        break;
                    }
                    Err(_) => {
                        log::warn!("Coordinator hung up without a stop, stopping");
                        break;
                    }
                },
                recv(found_rx) -> found => match found {
                    Err(_) => {
                        log::error!("All mining workers exited");
                        workers_gone = true;
                    }
                    Ok(found) if !live || found.generation != generation => {
                        log::debug!("Dropping solution for a superseded job");
                    }
                    Ok(found) => {
                        // One solution per job
                        live = false;
                        current_job.store(Arc::new(None));
                        self.stats.record_found();
                        log::info!(
                            "Found nonce {} for challenge {}",
                            found.solution.nonce,
                            found.solution.work.challenge
                        );
                        if output.send(MiningOutcome::Found(found.solution)).is_err() {
                            log::warn!("Coordinator is gone, stopping");
                            break;
                        }
                    }
                },
            }
            if workers_gone {
                found_rx = never();
            }
        }

        active.store(false, Ordering::SeqCst);
        current_job.store(Arc::new(None));
        for worker in workers {
            if worker.join().is_err() {
                log::error!("Mining worker panicked");
            }
        }
        log::info!("Mining group stopped");
        let _ = output.send(MiningOutcome::Stopped);
    }
}

/// One hashing thread
struct Worker {
    job: Arc<ArcSwap<Option<ActiveJob>>>,
    active: Arc<AtomicBool>,
    found: Sender<Found>,
    algorithm: Arc<dyn Algorithm>,
    stats: Arc<MiningStats>,
    batch_size: u64,
}

impl Worker {
    fn run(&self) {
        while self.active.load(Ordering::Relaxed) {
            let current_job = self.job.load();
            let Some(job) = &**current_job else {
                std::thread::sleep(IDLE_POLL);
                continue;
            };

            let start = job.next_nonce.fetch_add(self.batch_size, Ordering::Relaxed);
            let end = start.saturating_add(self.batch_size);
            if start == end {
                // Nonce space exhausted for this job
                std::thread::sleep(IDLE_POLL);
                continue;
            }

            let work = &job.work;
            let hit = (start..end).into_par_iter().find_any(|&nonce| {
                let digest =
                    self.algorithm
                        .hash(&work.challenge.challenge, &work.public_address, nonce);
                meets_difficulty(&digest, work.challenge.difficulty)
            });
            // A batch cut short by a hit still counts in full
            self.stats.record_hashes(end - start);

            if let Some(nonce) = hit {
                let digest =
                    self.algorithm
                        .hash(&work.challenge.challenge, &work.public_address, nonce);
                let found = Found {
                    generation: job.generation,
                    solution: Solution {
                        work: work.clone(),
                        nonce,
                        digest,
                    },
                };
                if self.found.send(found).is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::algorithm::KeccakSha256;
    use crate::types::Challenge;
    use crossbeam_channel::bounded;

    const WAIT: Duration = Duration::from_secs(10);

    const BATCH: u64 = 64;

    fn group(workers: usize) -> Box<CpuMiningGroup> {
        group_with_stats(workers, MiningStats::new())
    }

    fn group_with_stats(workers: usize, stats: Arc<MiningStats>) -> Box<CpuMiningGroup> {
        Box::new(
            CpuMiningGroup::new(
                Arc::new(KeccakSha256),
                GroupSettings {
                    worker_threads: workers,
                    batch_size: BATCH,
                },
                stats,
            )
            .unwrap(),
        )
    }

    fn work(difficulty: u64) -> WorkUnit {
        WorkUnit::new(
            Challenge {
                challenge: [3; 32],
                difficulty,
                request_id: 1,
            },
            [5; 20],
        )
    }

    #[test]
    fn rejects_empty_group() {
        let settings = GroupSettings {
            worker_threads: 0,
            batch_size: 1,
        };
        assert!(CpuMiningGroup::new(Arc::new(KeccakSha256), settings, MiningStats::new()).is_err());
    }

    #[test]
    fn finds_a_valid_nonce_then_stops() {
        let (input_tx, input_rx) = bounded(0);
        let (output_tx, output_rx) = bounded(0);
        let handle = std::thread::spawn(move || group(2).mine(input_rx, output_tx));

        input_tx.send(Dispatch::Work(work(16))).unwrap();
        let outcome = output_rx.recv_timeout(WAIT).unwrap();
        let MiningOutcome::Found(solution) = outcome else {
            panic!("expected a solution, got {:?}", outcome);
        };
        assert_eq!(solution.work, work(16));
        assert!(meets_difficulty(&solution.digest, 16));
        assert_eq!(
            KeccakSha256.hash(&[3; 32], &[5; 20], solution.nonce),
            solution.digest
        );

        input_tx.send(Dispatch::Stop).unwrap();
        assert_eq!(output_rx.recv_timeout(WAIT).unwrap(), MiningOutcome::Stopped);
        handle.join().unwrap();
        assert!(output_rx.recv().is_err());
    }

    #[test]
    fn input_disconnect_still_emits_sentinel() {
        let (input_tx, input_rx) = bounded::<Dispatch>(0);
        let (output_tx, output_rx) = bounded(0);
        let handle = std::thread::spawn(move || group(1).mine(input_rx, output_tx));

        drop(input_tx);
        assert_eq!(output_rx.recv_timeout(WAIT).unwrap(), MiningOutcome::Stopped);
        handle.join().unwrap();
    }

    #[test]
    fn new_work_preempts_unsolvable_job() {
        let (input_tx, input_rx) = bounded(0);
        let (output_tx, output_rx) = bounded(0);
        let handle = std::thread::spawn(move || group(2).mine(input_rx, output_tx));

        // Practically unsolvable
        input_tx.send(Dispatch::Work(work(u64::MAX))).unwrap();
        let easy = WorkUnit::new(
            Challenge {
                challenge: [4; 32],
                difficulty: 1,
                request_id: 2,
            },
            [5; 20],
        );
        input_tx.send(Dispatch::Work(easy.clone())).unwrap();

        match output_rx.recv_timeout(WAIT).unwrap() {
            MiningOutcome::Found(solution) => assert_eq!(solution.work, easy),
            other => panic!("unexpected outcome {:?}", other),
        }

        input_tx.send(Dispatch::Stop).unwrap();
        assert_eq!(output_rx.recv_timeout(WAIT).unwrap(), MiningOutcome::Stopped);
        handle.join().unwrap();
    }

    #[test]
    fn every_job_starts_at_nonce_zero() {
        let (input_tx, input_rx) = bounded(0);
        let (output_tx, output_rx) = bounded(0);
        let handle = std::thread::spawn(move || group(2).mine(input_rx, output_tx));

        // Difficulty 1 is met by the first nonce a worker tries
        for _ in 0..20 {
            input_tx.send(Dispatch::Work(work(1))).unwrap();
            match output_rx.recv_timeout(WAIT).unwrap() {
                MiningOutcome::Found(solution) => assert!(solution.nonce < 2 * BATCH),
                other => panic!("unexpected outcome {:?}", other),
            }
        }

        input_tx.send(Dispatch::Stop).unwrap();
        assert_eq!(output_rx.recv_timeout(WAIT).unwrap(), MiningOutcome::Stopped);
        handle.join().unwrap();
    }

    #[test]
    fn unsolved_batches_count_in_full() {
        let stats = MiningStats::new();
        let (input_tx, input_rx) = bounded(0);
        let (output_tx, output_rx) = bounded(0);
        let group = group_with_stats(1, stats.clone());
        let handle = std::thread::spawn(move || group.mine(input_rx, output_tx));

        input_tx.send(Dispatch::Work(work(u64::MAX))).unwrap();
        let started = std::time::Instant::now();
        while stats.snapshot().hashes_total == 0 {
            assert!(started.elapsed() < WAIT, "no hashes recorded");
            std::thread::sleep(Duration::from_millis(5));
        }

        input_tx.send(Dispatch::Stop).unwrap();
        assert_eq!(output_rx.recv_timeout(WAIT).unwrap(), MiningOutcome::Stopped);
        handle.join().unwrap();
        assert_eq!(stats.snapshot().hashes_total % BATCH, 0);
    }
}
