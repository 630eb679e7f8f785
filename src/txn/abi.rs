//! ARC-4 ABI helpers for application calls.

use crate::crypto::sha512_256;

use super::TxnError;

/// An ABI method, identified by its signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Method {
    signature: &'static str,
}

impl Method {
    pub const fn new(signature: &'static str) -> Self {
        Self { signature }
    }

    pub fn signature(&self) -> &'static str {
        self.signature
    }

    /// First four bytes of the SHA-512/256 of the signature.
    pub fn selector(&self) -> [u8; 4] {
        let digest = sha512_256(&[self.signature.as_bytes()]);
        [digest[0], digest[1], digest[2], digest[3]]
    }
}

/// Encodes a dynamic `byte[]`: big-endian u16 length followed by the bytes.
pub fn encode_bytes(bytes: &[u8]) -> Result<Vec<u8>, TxnError> {
    let len = u16::try_from(bytes.len())
        .map_err(|_| TxnError::Encode(format!("byte[] of {} bytes is too long", bytes.len())))?;
    let mut out = Vec::with_capacity(2 + bytes.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(bytes);
    Ok(out)
}

/// Decodes a dynamic `byte[]` that must span the whole input.
pub fn decode_bytes(encoded: &[u8]) -> Option<&[u8]> {
    let (len, rest) = encoded.split_first_chunk::<2>()?;
    let len = u16::from_be_bytes(*len) as usize;
    (rest.len() == len).then_some(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_is_stable() {
        let method = Method::new("extra()void");
        assert_eq!(method.selector(), method.selector());
        assert_ne!(method.selector(), Method::new("extra()uint64").selector());
    }

    #[test]
    fn test_known_selector() {
        // add(uint64,uint64)uint128 is the ARC-4 reference example
        assert_eq!(
            Method::new("add(uint64,uint64)uint128").selector(),
            [0x8a, 0xa3, 0xb6, 0x1f]
        );
    }

    #[test]
    fn test_bytes_encoding() {
        let encoded = encode_bytes(b"abc").unwrap();
        assert_eq!(encoded, vec![0x00, 0x03, b'a', b'b', b'c']);
        assert_eq!(decode_bytes(&encoded), Some(&b"abc"[..]));
        assert_eq!(decode_bytes(&encoded[..4]), None);
    }
}
