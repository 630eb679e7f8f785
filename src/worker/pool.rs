//! Worker pool management.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::crypto::Keypair;
use crate::matcher::Pattern;

use super::cpu::{CpuWorker, WorkerStats};

/// Result of a successful vanity key search.
#[derive(Debug)]
pub struct VanityResult {
    /// The matching keypair
    pub keypair: Keypair,
    /// The ID of the worker that found this result
    pub worker_id: usize,
}

/// Manages a pool of workers searching for one prefix.
///
/// Dropping the pool stops and joins every worker thread.
pub struct WorkerPool {
    num_workers: usize,
    /// Taken on shutdown so joining happens once
    handles: Option<Vec<JoinHandle<()>>>,
    /// Sized to the worker count so a worker never blocks on delivery
    result_rx: Receiver<VanityResult>,
    stop_flag: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
    start_time: Instant,
}

impl WorkerPool {
    /// Starts `num_workers` threads searching for `pattern`.
    pub fn new(num_workers: usize, pattern: Pattern, batch_size: u64) -> io::Result<Self> {
        let num_workers = num_workers.max(1);
        let (result_tx, result_rx) = bounded(num_workers);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(WorkerStats::new());

        let handles = Self::spawn_workers(
            num_workers,
            &pattern,
            batch_size,
            result_tx,
            &stop_flag,
            &stats,
        )?;

        Ok(Self {
            num_workers,
            handles: Some(handles),
            result_rx,
            stop_flag,
            stats,
            start_time: Instant::now(),
        })
    }

    /// Spawns worker threads, tearing down the ones already started on failure.
    fn spawn_workers(
        num_workers: usize,
        pattern: &Pattern,
        batch_size: u64,
        result_tx: Sender<VanityResult>,
        stop_flag: &Arc<AtomicBool>,
        stats: &Arc<WorkerStats>,
    ) -> io::Result<Vec<JoinHandle<()>>> {
        let mut handles = Vec::with_capacity(num_workers);

        for id in 0..num_workers {
            let worker = CpuWorker::new(
                id,
                pattern.clone(),
                batch_size,
                result_tx.clone(),
                stop_flag.clone(),
                stats.clone(),
            );

            let spawned = thread::Builder::new()
                .name(format!("vanity-worker-{}", id))
                .spawn(move || worker.run());

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    stop_flag.store(true, Ordering::Relaxed);
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(e);
                }
            }
        }

        Ok(handles)
    }

    /// Waits up to `timeout` for a match.
    pub fn wait_for_result(&self, timeout: Duration) -> Option<VanityResult> {
        self.result_rx.recv_timeout(timeout).ok()
    }

    pub fn try_recv(&self) -> Option<VanityResult> {
        self.result_rx.try_recv().ok()
    }

    /// Asks every worker to stop after its current batch.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }

    /// Stops and waits for all workers to complete.
    pub fn join(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop();
        if let Some(handles) = self.handles.take() {
            for handle in handles {
                let _ = handle.join();
            }
        }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Keys generated so far across all workers.
    pub fn total_keys(&self) -> u64 {
        self.stats.total_keys()
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average generation rate since the pool started.
    pub fn keys_per_second(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.total_keys() as f64 / elapsed
        } else {
            0.0
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
