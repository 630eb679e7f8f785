//! Runtime configuration for the miner.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::crypto::Address;
use crate::mining::Settings;

/// Key search backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GeneratorKind {
    /// In-process worker threads
    Native,
    /// External search tool run as a subprocess
    Command,
}

/// Algorand Vanity Address Marketplace Miner
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Algod node endpoint
    #[arg(long, env = "ALGOD_ADDRESS", default_value = "https://testnet-api.4160.nodely.dev")]
    pub algod: String,

    /// Algod API token
    #[arg(long, env = "ALGOD_TOKEN", default_value = "", hide_env_values = true)]
    pub algod_token: String,

    /// Marketplace application id
    #[arg(long, default_value = "742018771")]
    pub appid: u64,

    /// Address receiving the bounties
    #[arg(long = "addr", env = "REWARDS_ADDRESS")]
    pub rewards: String,

    /// Longest prefix to pursue (0 = no limit)
    #[arg(long, default_value = "0")]
    pub max_length: u64,

    /// Milliseconds to wait before rescanning when no order is eligible
    #[arg(long, default_value = "10000")]
    pub orders_interval: u64,

    /// Minimum milliseconds between order re-checks during a search
    #[arg(long, default_value = "30000")]
    pub expiry_interval: u64,

    /// Keys per worker batch (0 = size automatically)
    #[arg(short = 'b', long, default_value = "1000")]
    pub batch: u64,

    /// Number of worker threads (default: number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Key search backend
    #[arg(long, value_enum, default_value = "native")]
    pub generator: GeneratorKind,

    /// External search tool, used with `--generator command`
    #[arg(long)]
    pub generator_cmd: Option<PathBuf>,

    /// Extra arguments passed to the external search tool
    #[arg(long = "generator-arg", allow_hyphen_values = true)]
    pub generator_args: Vec<String>,

    /// TEAL template replacing the built-in subsidy program
    #[arg(long)]
    pub subsidy_program: Option<PathBuf>,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Returns the number of workers, defaulting to CPU count
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rewards_address()?;

        if self.workers == Some(0) {
            return Err(ConfigError::Invalid("--workers must be at least 1".into()));
        }

        if self.generator == GeneratorKind::Command && self.generator_cmd.is_none() {
            return Err(ConfigError::Invalid(
                "--generator command requires --generator-cmd".into(),
            ));
        }

        Ok(())
    }

    pub fn rewards_address(&self) -> Result<Address, ConfigError> {
        self.rewards
            .trim()
            .parse()
            .map_err(|e| ConfigError::RewardsAddress(format!("{}: {}", self.rewards, e)))
    }

    /// Prefix length cap, `None` when unlimited
    pub fn max_length(&self) -> Option<u64> {
        (self.max_length > 0).then_some(self.max_length)
    }

    pub fn orders_interval(&self) -> Duration {
        Duration::from_millis(self.orders_interval)
    }

    pub fn expiry_interval(&self) -> Duration {
        Duration::from_millis(self.expiry_interval)
    }

    /// Mining loop settings derived from the flags
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        Ok(Settings {
            rewards: self.rewards_address()?,
            max_length: self.max_length(),
            orders_interval: self.orders_interval(),
            expiry_interval: self.expiry_interval(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid rewards address {0}")]
    RewardsAddress(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
