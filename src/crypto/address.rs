//! Algorand address representation and utilities.

use std::fmt;
use std::str::FromStr;

use data_encoding::BASE32_NOPAD;
use sha2::{Digest, Sha512_256};

/// Length of the textual form of an address (base32 of key + checksum).
pub const ADDRESS_TEXT_LEN: usize = 58;

const CHECKSUM_LEN: usize = 4;

/// An Algorand address (32-byte ed25519 public key).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address([u8; 32]);

impl Address {
    /// The all-zero address.
    pub const ZERO: Address = Address([0u8; 32]);

    /// Creates an address from raw bytes.
    #[inline]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Creates an address from a slice, which must be exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, AddressError> {
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| AddressError::InvalidLength(bytes.len()))?;
        Ok(Self(bytes))
    }

    /// Returns the address as raw bytes.
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the 4-byte checksum appended to the textual form.
    fn checksum(&self) -> [u8; CHECKSUM_LEN] {
        let digest = Sha512_256::digest(self.0);
        let mut checksum = [0u8; CHECKSUM_LEN];
        checksum.copy_from_slice(&digest[digest.len() - CHECKSUM_LEN..]);
        checksum
    }

    /// Returns the 58-character base32 form.
    pub fn encode(&self) -> String {
        let mut raw = [0u8; 32 + CHECKSUM_LEN];
        raw[..32].copy_from_slice(&self.0);
        raw[32..].copy_from_slice(&self.checksum());
        BASE32_NOPAD.encode(&raw)
    }

    /// Parses and validates the 58-character base32 form.
    pub fn decode(text: &str) -> Result<Self, AddressError> {
        if text.len() != ADDRESS_TEXT_LEN {
            return Err(AddressError::InvalidLength(text.len()));
        }

        let raw = BASE32_NOPAD
            .decode(text.as_bytes())
            .map_err(|e| AddressError::InvalidEncoding(e.to_string()))?;
        if raw.len() != 32 + CHECKSUM_LEN {
            return Err(AddressError::InvalidLength(raw.len()));
        }

        let address = Self::from_slice(&raw[..32])?;
        if address.checksum() != raw[32..] {
            return Err(AddressError::ChecksumMismatch);
        }

        Ok(address)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.encode())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid address length: {0}")]
    InvalidLength(usize),
    #[error("Invalid address encoding: {0}")]
    InvalidEncoding(String),
    #[error("Address checksum mismatch")]
    ChecksumMismatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_address() {
        // The well-known zero address
        assert_eq!(
            Address::ZERO.encode(),
            "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAY5HFKQ"
        );
    }

    #[test]
    fn test_decode_roundtrip() {
        let addr = Address::from_bytes([7u8; 32]);
        let text = addr.encode();
        assert_eq!(text.len(), ADDRESS_TEXT_LEN);
        assert_eq!(Address::decode(&text).unwrap(), addr);
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut text = Address::from_bytes([7u8; 32]).encode();
        // Flip the last checksum character
        let last = text.pop().unwrap();
        text.push(if last == 'A' { 'B' } else { 'A' });
        assert!(Address::decode(&text).is_err());
    }

    #[test]
    fn test_invalid_length() {
        assert_eq!(
            Address::decode("ABC"),
            Err(AddressError::InvalidLength(3))
        );
    }
}
