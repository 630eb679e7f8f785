//! Orders posted to the marketplace and how they are discovered.
//!
//! - `codec`: record layouts (box names and the order tuple)
//! - `catalog`: scanning, filtering and reading orders from the ledger

mod catalog;
pub mod codec;

pub use catalog::{select, Catalog};
pub(crate) use catalog::unix_now;

use crate::crypto::Address;
use crate::ledger::LedgerError;

/// An order as seen in a storage scan, before its record is fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderHeader {
    /// Order key (box name without the namespace tag)
    pub key: Vec<u8>,
    /// Required prefix length in characters
    pub length: u64,
    /// Expiry in unix seconds, 0 for none
    pub validity: u64,
}

/// A fully decoded order record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub key: Vec<u8>,
    pub id: u64,
    /// Requester; receives authority over the vanity account once claimed
    pub owner: Address,
    pub prefix: Vec<u8>,
    pub mask: Vec<u8>,
    /// Address prefix to search for
    pub text: String,
    pub asset: u64,
    pub amount: u64,
    /// Expiry in unix seconds, 0 for none
    pub validity: u64,
}

impl Order {
    /// Whether the order has a non-zero expiry that lies before `now`.
    pub fn is_expired(&self, now: u64) -> bool {
        is_expired(self.validity, now)
    }
}

pub(crate) fn is_expired(validity: u64, now: u64) -> bool {
    validity > 0 && validity < now
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    /// The order record is gone: claimed by someone else or withdrawn.
    #[error("Order {} not found", hex::encode(.0))]
    NotFound(Vec<u8>),
    #[error("Malformed order record: {0}")]
    Decode(String),
    #[error("Order text has {actual} characters but its key declares {declared}")]
    LengthMismatch { declared: u64, actual: usize },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
