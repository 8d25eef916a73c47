// src/miner/solution.rs
//! Solution sink
//!
//! Accepts solutions from the coordinator without blocking it and submits
//! them from a dedicated thread.

use crate::miner::tasker::ChallengeStore;
use crate::stats::MiningStats;
use crate::types::{Challenge, Solution};
use crate::utils::error::MinerError;
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Destination for solutions found by the execution group
///
/// `submit` is fire-and-forget and must return promptly.
pub trait SolutionSink: Send {
    /// Hands a solution over for submission
    fn submit(&self, solution: Solution);
}

/// Performs the actual submission of one solution
pub trait TransactionSubmitter: Send + Sync {
    /// Submits `solution`, blocking until the node answers
    fn submit_solution(&self, solution: &Solution) -> Result<(), MinerError>;
}

/// Queue-backed [`SolutionSink`]
///
/// Before submitting, the worker drops solutions whose challenge is no
/// longer current and solutions for a challenge it already submitted.
/// Dropping the handler drains the queue and joins the worker.
pub struct SolutionHandler {
    queue: Option<Sender<Solution>>,
    worker: Option<JoinHandle<()>>,
}

impl SolutionHandler {
    /// Spawns the submission worker
    ///
    /// # Errors
    /// Returns `MinerError::IoError` if the thread cannot be spawned.
    pub fn new(
        submitter: Arc<dyn TransactionSubmitter>,
        store: Arc<dyn ChallengeStore>,
        stats: Arc<MiningStats>,
    ) -> Result<Self, MinerError> {
        let (queue, rx) = crossbeam_channel::unbounded();
        let worker = std::thread::Builder::new()
            .name("solution-submitter".into())
            .spawn(move || submit_loop(rx, submitter.as_ref(), store.as_ref(), &stats))?;

        Ok(SolutionHandler {
            queue: Some(queue),
            worker: Some(worker),
        })
    }

    /// Closes the queue and waits until every queued solution was handled
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.queue.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Solution submitter panicked");
            }
        }
    }
}

impl SolutionSink for SolutionHandler {
    fn submit(&self, solution: Solution) {
        let Some(queue) = &self.queue else {
            return;
        };
        if let Err(e) = queue.send(solution) {
            log::error!("{}", MinerError::from(e));
        }
    }
}

impl Drop for SolutionHandler {
    fn drop(&mut self) {
        self.close();
    }
}

fn submit_loop(
    rx: Receiver<Solution>,
    submitter: &dyn TransactionSubmitter,
    store: &dyn ChallengeStore,
    stats: &MiningStats,
) {
    let mut last_submitted: Option<Challenge> = None;

    for solution in rx {
        let challenge = &solution.work.challenge;

        if last_submitted.as_ref() == Some(&**challenge) {
            log::info!("Already submitted for challenge {}, dropping", challenge);
            stats.record_stale();
            continue;
        }

        match store.current_challenge() {
            Ok(Some(current)) if current != **challenge => {
                log::info!("Challenge {} is stale, dropping solution", challenge);
                stats.record_stale();
                continue;
            }
            Ok(_) => {}
            Err(e) => log::warn!("Could not check challenge freshness: {}", e),
        }

        match submitter.submit_solution(&solution) {
            Ok(()) => {
                log::info!(
                    "Submitted nonce {} for challenge {}",
                    solution.nonce,
                    challenge
                );
                stats.record_submitted();
                last_submitted = Some((**challenge).clone());
            }
            Err(e) => {
                log::error!("Failed to submit solution for {}: {}", challenge, e);
                stats.record_failure();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::tasker::SharedChallenge;
    use crate::types::{Challenge, WorkUnit};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<u64>>,
        fail: bool,
    }

    impl TransactionSubmitter for Recorder {
        fn submit_solution(&self, solution: &Solution) -> Result<(), MinerError> {
            self.seen.lock().unwrap().push(solution.nonce);
            if self.fail {
                Err(MinerError::SubmissionRejected("nope".into()))
            } else {
                Ok(())
            }
        }
    }

    fn challenge(byte: u8) -> Challenge {
        Challenge {
            challenge: [byte; 32],
            difficulty: 1,
            request_id: 1,
        }
    }

    fn solution(byte: u8, nonce: u64) -> Solution {
        Solution {
            work: WorkUnit::new(challenge(byte), [0; 20]),
            nonce,
            digest: [0; 32],
        }
    }

    #[test]
    fn submits_and_dedupes_per_challenge() {
        let recorder = Arc::new(Recorder::default());
        let store = SharedChallenge::new();
        store.publish(challenge(1));
        let stats = MiningStats::new();

        let handler = SolutionHandler::new(recorder.clone(), store, stats.clone()).unwrap();
        handler.submit(solution(1, 10));
        handler.submit(solution(1, 11));
        handler.shutdown();

        assert_eq!(*recorder.seen.lock().unwrap(), vec![10]);
        let s = stats.snapshot();
        assert_eq!(s.solutions_submitted, 1);
        assert_eq!(s.stale_solutions, 1);
    }

    #[test]
    fn drops_stale_challenges() {
        let recorder = Arc::new(Recorder::default());
        let store = SharedChallenge::new();
        store.publish(challenge(2));
        let stats = MiningStats::new();

        let handler = SolutionHandler::new(recorder.clone(), store, stats.clone()).unwrap();
        handler.submit(solution(1, 10));
        handler.submit(solution(2, 20));
        drop(handler);

        assert_eq!(*recorder.seen.lock().unwrap(), vec![20]);
        assert_eq!(stats.snapshot().stale_solutions, 1);
    }

    #[test]
    fn republished_difficulty_makes_old_solutions_stale() {
        let recorder = Arc::new(Recorder::default());
        let store = SharedChallenge::new();
        let mut harder = challenge(1);
        harder.difficulty = 5;
        store.publish(harder.clone());
        let stats = MiningStats::new();

        let handler = SolutionHandler::new(recorder.clone(), store, stats.clone()).unwrap();
        handler.submit(solution(1, 10));
        handler.submit(Solution {
            work: WorkUnit::new(harder, [0; 20]),
            nonce: 30,
            digest: [0; 32],
        });
        handler.shutdown();

        assert_eq!(*recorder.seen.lock().unwrap(), vec![30]);
        assert_eq!(stats.snapshot().stale_solutions, 1);
    }

    #[test]
    fn failures_are_counted_and_retry_allowed() {
        let recorder = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let store = SharedChallenge::new();
        store.publish(challenge(1));
        let stats = MiningStats::new();

        let handler = SolutionHandler::new(recorder.clone(), store, stats.clone()).unwrap();
        handler.submit(solution(1, 10));
        handler.submit(solution(1, 11));
        handler.shutdown();

        // A failed submission does not mark the challenge as done
        assert_eq!(*recorder.seen.lock().unwrap(), vec![10, 11]);
        assert_eq!(stats.snapshot().submit_failures, 2);
    }
}
