// src/miner/algorithm/keccak.rs
use crate::miner::algorithm::Algorithm;
use crate::types::Address;
use sha2::Sha256;
use sha3::{Digest, Keccak256};

/// `sha256(keccak256(challenge ‖ address ‖ nonce_be))`
#[derive(Debug, Clone, Copy, Default)]
pub struct KeccakSha256;

impl Algorithm for KeccakSha256 {
    fn hash(&self, challenge: &[u8; 32], address: &Address, nonce: u64) -> [u8; 32] {
        let inner = Keccak256::new()
            .chain_update(challenge)
            .chain_update(address)
            .chain_update(nonce.to_be_bytes())
            .finalize();
        Sha256::digest(inner).into()
    }

    fn name(&self) -> &'static str {
        "keccak256+sha256"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn keccak_of_empty_input_matches_reference() {
        // Sanity check that Keccak256 is the pre-standard variant
        let empty = Keccak256::digest(b"");
        assert_eq!(
            empty.as_slice(),
            hex!("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470")
        );
    }

    #[test]
    fn digest_is_layered_hash_of_inputs() {
        let challenge = [7u8; 32];
        let address = [9u8; 20];
        let mut buf = Vec::new();
        buf.extend_from_slice(&challenge);
        buf.extend_from_slice(&address);
        buf.extend_from_slice(&42u64.to_be_bytes());
        let expected: [u8; 32] = Sha256::digest(Keccak256::digest(&buf)).into();

        assert_eq!(KeccakSha256.hash(&challenge, &address, 42), expected);
    }

    #[test]
    fn nonce_changes_digest() {
        let a = KeccakSha256.hash(&[1; 32], &[2; 20], 1);
        let b = KeccakSha256.hash(&[1; 32], &[2; 20], 2);
        assert_ne!(a, b);
    }
}
