//! Top-level error type.

use crate::crypto::Address;
use crate::fulfill::FulfillError;
use crate::ledger::LedgerError;
use crate::order::OrderError;
use crate::search::SearchError;

#[derive(Debug, thiserror::Error)]
pub enum MinerError {
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Fulfill(#[from] FulfillError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("Matched address {address} does not start with {prefix}")]
    PrefixMismatch { address: Address, prefix: String },
}

impl MinerError {
    /// Expected ends of a pursuit: the order went away or the search was
    /// called off.
    pub fn is_abandonment(&self) -> bool {
        matches!(
            self,
            MinerError::Search(SearchError::Abandoned) | MinerError::Order(OrderError::NotFound(_))
        )
    }
}
