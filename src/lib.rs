//! # algo_vanity
//!
//! Miner for the Algorand vanity address marketplace.
//!
//! Requesters post orders for addresses starting with a chosen prefix,
//! escrowing a bounty in a marketplace application. The miner discovers
//! orders, searches for a matching key, and claims the bounty with an atomic
//! group that proves key ownership and hands the account over to the
//! requester.
//!
//! ## Architecture
//!
//! - `crypto`: Key generation, address encoding and claim proofs
//! - `matcher`: Prefix patterns
//! - `worker`: Parallel key search threads
//! - `search`: Cancellable search contract and its engines
//! - `txn`: Transaction encoding, signing and grouping
//! - `ledger`: Node access (algod and in-memory)
//! - `order`: Order records and the catalog
//! - `fulfill`: Claim bundles
//! - `mining`: The discover, search, fulfill loop
//! - `config`: Runtime configuration

pub mod config;
pub mod crypto;
pub mod error;
pub mod fulfill;
pub mod ledger;
pub mod matcher;
pub mod miner;
pub mod mining;
pub mod order;
pub mod search;
pub mod txn;
pub mod worker;

pub use config::Config;
pub use crypto::{Address, Keypair};
pub use error::MinerError;
pub use matcher::Pattern;
pub use miner::Miner;
pub use mining::{CycleOutcome, MiningLoop, Settings};
pub use search::Generator;
pub use worker::{VanityResult, WorkerPool};
