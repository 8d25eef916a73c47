// src/miner/algorithm/mod.rs
//! Proof-of-work hashing
//!
//! The execution group only depends on the [`Algorithm`] trait, the digest
//! check against a difficulty is shared by every implementation.

/// Keccak-256 followed by SHA-256
pub mod keccak;

pub use keccak::KeccakSha256;

use crate::types::Address;

/// Common interface for all mining algorithms
///
/// Implementations must be cheap to call from many threads at once.
pub trait Algorithm: Send + Sync {
    /// Compute the digest for a challenge, miner address and nonce
    fn hash(&self, challenge: &[u8; 32], address: &Address, nonce: u64) -> [u8; 32];

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Whether `digest`, read as a big-endian 256-bit integer, is a multiple of `difficulty`
///
/// A difficulty of zero is never met.
pub fn meets_difficulty(digest: &[u8; 32], difficulty: u64) -> bool {
    if difficulty == 0 {
        return false;
    }
    let divisor = difficulty as u128;
    let remainder = digest
        .iter()
        .fold(0u128, |rem, &byte| ((rem << 8) | byte as u128) % divisor);
    remainder == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_one_always_met() {
        assert!(meets_difficulty(&[0xff; 32], 1));
    }

    #[test]
    fn zero_difficulty_never_met() {
        assert!(!meets_difficulty(&[0; 32], 0));
    }

    #[test]
    fn remainder_uses_whole_digest() {
        // 0x0100 = 256
        let mut digest = [0u8; 32];
        digest[30] = 1;
        assert!(meets_difficulty(&digest, 256));
        assert!(meets_difficulty(&digest, 16));
        assert!(!meets_difficulty(&digest, 3));

        // 2^248 is divisible by 2^63 but not by 3
        let mut high = [0u8; 32];
        high[0] = 1;
        assert!(meets_difficulty(&high, 1 << 63));
        assert!(!meets_difficulty(&high, 3));
    }

    #[test]
    fn large_difficulty_does_not_overflow() {
        let digest = [0xff; 32];
        // 2^256 - 1 = 3 * 5 * 17 * 257 * 641 * 65537 * ...
        assert!(meets_difficulty(&digest, 3 * 5 * 17 * 257 * 641 * 65537));
        assert!(!meets_difficulty(&digest, u64::MAX - 1));
    }
}
