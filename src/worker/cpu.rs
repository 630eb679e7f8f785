//! CPU-based worker for vanity key search.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use crate::crypto::Keypair;
use crate::matcher::Pattern;

use super::VanityResult;

/// Statistics shared by the workers of one pool.
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Total keys generated
    pub keys_generated: AtomicU64,
    /// Matches found
    pub matches_found: AtomicU64,
}

impl WorkerStats {
    /// Creates new worker stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total keys generated.
    pub fn total_keys(&self) -> u64 {
        self.keys_generated.load(Ordering::Relaxed)
    }

    /// Returns the total matches found.
    pub fn total_matches(&self) -> u64 {
        self.matches_found.load(Ordering::Relaxed)
    }
}

/// A CPU worker that generates and tests keypairs.
pub struct CpuWorker {
    /// Worker ID
    id: usize,
    /// The pattern to match against
    pattern: Pattern,
    /// Keys generated between stop-flag checks
    batch_size: u64,
    /// Channel to send results
    result_tx: Sender<VanityResult>,
    /// Shared stop flag
    stop_flag: Arc<AtomicBool>,
    /// Worker statistics
    stats: Arc<WorkerStats>,
}

impl CpuWorker {
    /// Creates a new CPU worker.
    pub fn new(
        id: usize,
        pattern: Pattern,
        batch_size: u64,
        result_tx: Sender<VanityResult>,
        stop_flag: Arc<AtomicBool>,
        stats: Arc<WorkerStats>,
    ) -> Self {
        Self {
            id,
            pattern,
            batch_size: batch_size.max(1),
            result_tx,
            stop_flag,
            stats,
        }
    }

    /// Runs the worker loop.
    ///
    /// Generates keypairs and tests them against the pattern until:
    /// - A match is found and delivered
    /// - Stop flag is set
    /// - Channel is closed
    pub fn run(&self) {
        loop {
            if self.stop_flag.load(Ordering::Relaxed) {
                break;
            }

            for _ in 0..self.batch_size {
                let keypair = Keypair::generate();

                if self.pattern.matches(keypair.address()) {
                    self.stats.matches_found.fetch_add(1, Ordering::Relaxed);

                    let result = VanityResult {
                        keypair,
                        worker_id: self.id,
                    };

                    // A closed channel means the session is gone
                    if self.result_tx.send(result).is_err() {
                        return;
                    }
                    self.stop_flag.store(true, Ordering::Relaxed);
                    break;
                }
            }

            self.stats
                .keys_generated
                .fetch_add(self.batch_size, Ordering::Relaxed);
        }
    }
}

/// Measures how many keys one thread generates per second.
pub fn measure_key_rate(budget: Duration) -> f64 {
    let start = Instant::now();
    let mut keys = 0u64;

    // Always measure at least a few keys, even on a zero budget
    while keys < 16 || start.elapsed() < budget {
        let keypair = Keypair::generate();
        std::hint::black_box(keypair.address().encode());
        keys += 1;
    }

    keys as f64 / start.elapsed().as_secs_f64().max(f64::EPSILON)
}
