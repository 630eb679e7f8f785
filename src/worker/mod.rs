//! Worker pool for parallel vanity key search.
//!
//! This module provides:
//! - Multi-threaded CPU workers
//! - Batched stop-flag checks
//! - Progress tracking

mod cpu;
mod pool;

pub use cpu::{measure_key_rate, CpuWorker, WorkerStats};
pub use pool::{VanityResult, WorkerPool};
