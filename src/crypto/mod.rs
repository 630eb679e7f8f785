//! Cryptographic operations for Algorand keys and addresses.
//!
//! This module provides:
//! - Random ed25519 key generation
//! - Algorand address encoding with SHA-512/256 checksums
//! - Claim proofs over order keys

mod address;
mod keypair;

pub use address::{Address, AddressError, ADDRESS_TEXT_LEN};
pub use keypair::{verify, verify_proof, Keypair, PROOF_PREFIX};

use sha2::{Digest, Sha512_256};

/// SHA-512/256 of the concatenated parts.
pub fn sha512_256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha512_256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}
