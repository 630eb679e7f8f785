//! Pattern matching implementation.

use crate::crypto::{Address, ADDRESS_TEXT_LEN};

/// Characters that can appear in the textual form of an address.
const ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// A compiled prefix pattern for efficient matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    /// The prefix the textual address must start with
    prefix: String,
}

impl Pattern {
    /// Compiles a prefix, rejecting text no address can ever start with.
    pub fn new(prefix: impl Into<String>) -> Result<Self, PatternError> {
        let prefix = prefix.into();

        if prefix.is_empty() {
            return Err(PatternError::Empty);
        }

        if prefix.len() > ADDRESS_TEXT_LEN {
            return Err(PatternError::TooLong(prefix.len()));
        }

        if let Some(c) = prefix.chars().find(|c| !ALPHABET.contains(*c)) {
            return Err(PatternError::InvalidCharacter(c));
        }

        Ok(Self { prefix })
    }

    /// Returns the prefix string.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the prefix length in characters.
    pub fn len(&self) -> usize {
        self.prefix.len()
    }

    /// Always false for a compiled pattern.
    pub fn is_empty(&self) -> bool {
        self.prefix.is_empty()
    }

    /// Matches an address against this pattern.
    #[inline]
    pub fn matches(&self, address: &Address) -> bool {
        address.encode().starts_with(&self.prefix)
    }

    /// Returns the estimated difficulty (number of attempts to find a match).
    ///
    /// Each base32 character has 32 possible values, so a prefix of length n
    /// needs 32^n attempts on average.
    pub fn estimated_difficulty(&self) -> u64 {
        32u64.saturating_pow(self.prefix.len() as u32)
    }

    /// Returns a human-readable difficulty estimate.
    pub fn difficulty_description(&self) -> String {
        let diff = self.estimated_difficulty();
        match diff {
            0..=1_000 => "Very Easy (< 1 second)".into(),
            1_001..=1_000_000 => "Easy (seconds)".into(),
            1_000_001..=1_000_000_000 => "Medium (minutes)".into(),
            1_000_000_001..=1_000_000_000_000 => "Hard (hours)".into(),
            _ => "Very Hard (days or more)".into(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("Prefix cannot be empty")]
    Empty,
    #[error("Prefix cannot be longer than an address ({0} characters)")]
    TooLong(usize),
    #[error("Prefix contains {0:?}, which never appears in an address")]
    InvalidCharacter(char),
}
