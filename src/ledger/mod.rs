//! Access to the ledger: application storage reads and group submission.
//!
//! The miner only needs a narrow slice of a node's API, captured by the
//! [`Ledger`] trait. [`AlgodClient`] talks to a real node; [`MemoryLedger`]
//! is an in-memory test backend that stands in for a node.

mod algod;
mod memory;

pub use algod::AlgodClient;
pub use memory::MemoryLedger;

use crate::txn::SignedTransaction;

/// Number of rounds a transaction stays valid after `first_valid`.
pub const VALIDITY_WINDOW: u64 = 1000;

/// Parameters needed to build transactions for the current round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestedParams {
    pub fee: u64,
    pub min_fee: u64,
    pub first_valid: u64,
    pub last_valid: u64,
    pub genesis_id: String,
    pub genesis_hash: [u8; 32],
}

/// Read access to application storage plus transaction submission.
pub trait Ledger: Send + Sync {
    /// Names of every box currently held by the application.
    fn box_names(&self, app_id: u64) -> Result<Vec<Vec<u8>>, LedgerError>;

    /// Value of a single box. Fails with [`LedgerError::NotFound`] when absent.
    fn box_value(&self, app_id: u64, name: &[u8]) -> Result<Vec<u8>, LedgerError>;

    fn suggested_params(&self) -> Result<SuggestedParams, LedgerError>;

    /// Compiles program source into bytecode.
    fn compile_program(&self, source: &str) -> Result<Vec<u8>, LedgerError>;

    /// Submits an atomic group, returning the id of its first transaction.
    fn send_group(&self, group: &[SignedTransaction]) -> Result<String, LedgerError>;

    /// Waits up to `rounds` rounds for a transaction to be confirmed,
    /// returning the confirmed round.
    fn wait_for_confirmation(&self, txid: &str, rounds: u64) -> Result<u64, LedgerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("Node returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Malformed response: {0}")]
    Decode(String),
    #[error("Transaction rejected: {0}")]
    Rejected(String),
    #[error("Transaction {txid} not confirmed after {rounds} rounds")]
    Timeout { txid: String, rounds: u64 },
}

impl LedgerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, LedgerError::NotFound(_))
    }
}
