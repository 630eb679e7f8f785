//! Ed25519 keypair generation and ownership proofs.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use super::Address;

/// Domain separator prepended to an order key before signing a claim proof.
pub const PROOF_PREFIX: &[u8] = b"AVMV";

/// An ed25519 keypair and its derived Algorand address.
///
/// The secret is zeroized when the keypair is dropped and is never printed.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
    address: Address,
}

impl Keypair {
    /// Generates a new random keypair.
    #[inline]
    pub fn generate() -> Self {
        let seed: [u8; 32] = rand::random();
        Self::from_seed(seed)
    }

    /// Builds a keypair from a 32-byte ed25519 seed.
    #[inline]
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let address = Address::from_bytes(signing_key.verifying_key().to_bytes());

        Self {
            signing_key,
            address,
        }
    }

    /// Returns a reference to the derived address.
    #[inline]
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Signs arbitrary bytes.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Signs `"AVMV" || order_key`, proving possession of this address.
    pub fn sign_proof(&self, order_key: &[u8]) -> [u8; 64] {
        self.sign(&proof_message(order_key))
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

fn proof_message(order_key: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(PROOF_PREFIX.len() + order_key.len());
    message.extend_from_slice(PROOF_PREFIX);
    message.extend_from_slice(order_key);
    message
}

/// Checks a claim proof against the claimed address.
pub fn verify_proof(address: &Address, order_key: &[u8], proof: &[u8; 64]) -> bool {
    verify(address, &proof_message(order_key), proof)
}

/// Checks an ed25519 signature made by `address` over `message`.
pub fn verify(address: &Address, message: &[u8], signature: &[u8; 64]) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(address.as_bytes()) else {
        return false;
    };
    verifying_key
        .verify(message, &Signature::from_bytes(signature))
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let a = Keypair::generate();
        let b = Keypair::generate();
        assert_ne!(a.address(), b.address());
    }

    #[test]
    fn test_deterministic_address() {
        let a = Keypair::from_seed([42u8; 32]);
        let b = Keypair::from_seed([42u8; 32]);
        assert_eq!(a.address(), b.address());
    }

    #[test]
    fn test_proof_verifies() {
        let keypair = Keypair::from_seed([1u8; 32]);
        let order_key = b"order-key-bytes".to_vec();
        let proof = keypair.sign_proof(&order_key);
        assert!(verify_proof(keypair.address(), &order_key, &proof));
    }

    #[test]
    fn test_proof_rejects_mutated_key() {
        let keypair = Keypair::from_seed([1u8; 32]);
        let order_key = vec![0u8; 56];
        let proof = keypair.sign_proof(&order_key);

        for i in 0..order_key.len() {
            let mut mutated = order_key.clone();
            mutated[i] ^= 0x01;
            assert!(!verify_proof(keypair.address(), &mutated, &proof));
        }
    }

    #[test]
    fn test_proof_rejects_other_key() {
        let keypair = Keypair::from_seed([1u8; 32]);
        let other = Keypair::from_seed([2u8; 32]);
        let proof = other.sign_proof(b"key");
        assert!(!verify_proof(keypair.address(), b"key", &proof));
    }

    #[test]
    fn test_debug_hides_secret() {
        let keypair = Keypair::from_seed([9u8; 32]);
        let printed = format!("{:?}", keypair);
        assert!(printed.contains(&keypair.address().encode()));
        assert!(!printed.contains(&hex::encode([9u8; 32])));
    }
}
