// src/miner/tasker.rs
//! Work source for the coordinator
//!
//! Turns the node's current challenge into work units, handing each
//! challenge out once.

use crate::types::{Address, Challenge, WorkUnit};
use crate::utils::error::MinerError;
use arc_swap::ArcSwapOption;
use std::sync::Arc;

/// Something the coordinator can ask for fresh work
///
/// `get_work` must not block. `None` means "nothing new", not an error.
pub trait WorkSource: Send {
    /// Returns a unit to dispatch, or `None` if the current one is still good
    fn get_work(&mut self) -> Option<WorkUnit>;
}

/// Read access to the node's current challenge
///
/// Shared by the tasker, the solution handler and whatever keeps it fresh.
pub trait ChallengeStore: Send + Sync {
    /// The challenge miners should be working on, if one is known
    fn current_challenge(&self) -> Result<Option<Challenge>, MinerError>;
}

/// In-memory [`ChallengeStore`] updated by the challenge poller
#[derive(Default)]
pub struct SharedChallenge {
    current: ArcSwapOption<Challenge>,
}

impl SharedChallenge {
    /// Creates an empty store
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replaces the current challenge, returns true if it changed
    pub fn publish(&self, challenge: Challenge) -> bool {
        let changed = self
            .current
            .load()
            .as_deref()
            .is_none_or(|old| *old != challenge);
        if changed {
            self.current.store(Some(Arc::new(challenge)));
        }
        changed
    }

    /// Forgets the current challenge
    pub fn clear(&self) {
        self.current.store(None);
    }
}

impl ChallengeStore for SharedChallenge {
    fn current_challenge(&self) -> Result<Option<Challenge>, MinerError> {
        Ok(self.current.load_full().map(|c| (*c).clone()))
    }
}

/// [`WorkSource`] that hands out each new challenge exactly once
///
/// A challenge counts as new when any of its fields changed, so a
/// republished difficulty or request id replaces the running unit.
pub struct ChallengeTasker {
    store: Arc<dyn ChallengeStore>,
    public_address: Address,
    last_challenge: Option<Challenge>,
}

impl ChallengeTasker {
    /// Creates a tasker mining for `public_address`
    pub fn new(store: Arc<dyn ChallengeStore>, public_address: Address) -> Self {
        ChallengeTasker {
            store,
            public_address,
            last_challenge: None,
        }
    }
}

impl WorkSource for ChallengeTasker {
    fn get_work(&mut self) -> Option<WorkUnit> {
        let challenge = match self.store.current_challenge() {
            Ok(Some(challenge)) => challenge,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("Could not read current challenge: {}", e);
                return None;
            }
        };

        if self.last_challenge.as_ref() == Some(&challenge) {
            return None;
        }
        if challenge.difficulty == 0 {
            log::warn!("Skipping challenge {} with zero difficulty", challenge);
            return None;
        }

        log::debug!("New challenge {}", challenge);
        self.last_challenge = Some(challenge.clone());
        Some(WorkUnit::new(challenge, self.public_address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingStore;

    impl ChallengeStore for FailingStore {
        fn current_challenge(&self) -> Result<Option<Challenge>, MinerError> {
            Err(MinerError::ConnectionError("node down".into()))
        }
    }

    fn challenge(byte: u8, difficulty: u64) -> Challenge {
        Challenge {
            challenge: [byte; 32],
            difficulty,
            request_id: byte as u64,
        }
    }

    #[test]
    fn empty_store_yields_nothing() {
        let mut tasker = ChallengeTasker::new(SharedChallenge::new(), [1; 20]);
        assert_eq!(tasker.get_work(), None);
        assert_eq!(tasker.get_work(), None);
    }

    #[test]
    fn each_challenge_is_handed_out_once() {
        let store = SharedChallenge::new();
        let mut tasker = ChallengeTasker::new(store.clone(), [1; 20]);

        store.publish(challenge(1, 10));
        let work = tasker.get_work().unwrap();
        assert_eq!(work.challenge.challenge, [1; 32]);
        assert_eq!(work.public_address, [1; 20]);
        assert_eq!(tasker.get_work(), None);

        store.publish(challenge(2, 10));
        assert_eq!(tasker.get_work().unwrap().challenge.challenge, [2; 32]);
        assert_eq!(tasker.get_work(), None);
    }

    #[test]
    fn zero_difficulty_is_skipped() {
        let store = SharedChallenge::new();
        let mut tasker = ChallengeTasker::new(store.clone(), [1; 20]);
        store.publish(challenge(1, 0));
        assert_eq!(tasker.get_work(), None);
    }

    #[test]
    fn corrected_difficulty_is_handed_out() {
        let store = SharedChallenge::new();
        let mut tasker = ChallengeTasker::new(store.clone(), [1; 20]);

        store.publish(challenge(1, 0));
        assert_eq!(tasker.get_work(), None);

        assert!(store.publish(challenge(1, 10)));
        let work = tasker.get_work().unwrap();
        assert_eq!(work.challenge.difficulty, 10);
        assert_eq!(tasker.get_work(), None);
    }

    #[test]
    fn republished_challenge_replaces_work() {
        let store = SharedChallenge::new();
        let mut tasker = ChallengeTasker::new(store.clone(), [1; 20]);

        store.publish(challenge(1, 10));
        assert_eq!(tasker.get_work().unwrap().challenge.difficulty, 10);

        let mut harder = challenge(1, 20);
        harder.request_id = 9;
        store.publish(harder.clone());
        let work = tasker.get_work().unwrap();
        assert_eq!(*work.challenge, harder);
        assert_eq!(tasker.get_work(), None);
    }

    #[test]
    fn store_errors_mean_nothing_new() {
        let mut tasker = ChallengeTasker::new(Arc::new(FailingStore), [1; 20]);
        assert_eq!(tasker.get_work(), None);
    }

    #[test]
    fn publish_reports_changes() {
        let store = SharedChallenge::new();
        assert!(store.publish(challenge(1, 5)));
        assert!(!store.publish(challenge(1, 5)));
        assert!(store.publish(challenge(1, 6)));
        store.clear();
        assert_eq!(store.current_challenge().unwrap(), None);
    }
}
