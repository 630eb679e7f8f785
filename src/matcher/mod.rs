//! Prefix matching for Algorand addresses.

mod pattern;

pub use pattern::{Pattern, PatternError};
