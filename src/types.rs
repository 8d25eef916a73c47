// src/types.rs
//! Values passed between the coordinator and its collaborators

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Length of an account address in bytes
pub const ADDRESS_LEN: usize = 20;

/// Miner account address
pub type Address = [u8; ADDRESS_LEN];

/// Current mining challenge as published by the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// 32-byte challenge the nonce is searched against
    #[serde(with = "hex_bytes32")]
    pub challenge: [u8; 32],
    /// Required divisor of the digest
    pub difficulty: u64,
    /// Data request the challenge belongs to
    pub request_id: u64,
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.. (difficulty {}, request {})",
            hex::encode(&self.challenge[..6]),
            self.difficulty,
            self.request_id
        )
    }
}

/// One unit of work handed to the execution group
///
/// Cheap to clone, the challenge itself is shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    /// Challenge to solve
    pub challenge: Arc<Challenge>,
    /// Address mixed into every hash
    pub public_address: Address,
}

impl WorkUnit {
    /// Builds a work unit for `challenge` mined by `public_address`
    pub fn new(challenge: Challenge, public_address: Address) -> Self {
        WorkUnit {
            challenge: Arc::new(challenge),
            public_address,
        }
    }
}

/// A nonce that satisfies a work unit's difficulty
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    /// Work unit the nonce solves
    pub work: WorkUnit,
    /// Winning nonce
    pub nonce: u64,
    /// Digest produced by the nonce
    pub digest: [u8; 32],
}

/// Message on the coordinator → execution group channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Start working this unit, preempting the current one
    Work(WorkUnit),
    /// Finish up and emit [`MiningOutcome::Stopped`]
    Stop,
}

/// Message on the execution group → coordinator channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiningOutcome {
    /// A solution was found
    Found(Solution),
    /// The group has stopped for good; always its last message
    Stopped,
}

mod hex_bytes32 {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let mut out = [0u8; 32];
        hex::decode_to_slice(s.trim_start_matches("0x"), &mut out).map_err(D::Error::custom)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_accepts_prefixed_hex() {
        let json = format!(
            r#"{{"challenge":"0x{}","difficulty":7,"request_id":3}}"#,
            "ab".repeat(32)
        );
        let c: Challenge = serde_json::from_str(&json).unwrap();
        assert_eq!(c.challenge, [0xab; 32]);
        assert_eq!(c.difficulty, 7);
        assert_eq!(c.request_id, 3);
    }

    #[test]
    fn challenge_rejects_short_hex() {
        let json = r#"{"challenge":"abcd","difficulty":1,"request_id":1}"#;
        assert!(serde_json::from_str::<Challenge>(json).is_err());
    }
}
