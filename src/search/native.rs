//! In-process search engine built on the worker pool.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::{Generator, SearchError, DEFAULT_POLL_INTERVAL};
use crate::crypto::Keypair;
use crate::matcher::Pattern;
use crate::worker::{measure_key_rate, WorkerPool};

/// Work one thread should do between stop-flag checks.
const TARGET_BATCH_TIME: Duration = Duration::from_millis(100);

/// Owns the search threads' configuration and tracks live sessions.
pub struct Engine {
    workers: usize,
    poll_interval: Duration,
    live_sessions: Arc<AtomicUsize>,
    /// Optimized batch sizes per prefix length
    batch_cache: HashMap<usize, u64>,
}

impl Engine {
    pub fn new(workers: usize) -> Result<Self, SearchError> {
        if workers == 0 {
            return Err(SearchError::Engine("at least one worker is required".into()));
        }
        Ok(Self {
            workers,
            poll_interval: DEFAULT_POLL_INTERVAL,
            live_sessions: Arc::new(AtomicUsize::new(0)),
            batch_cache: HashMap::new(),
        })
    }

    /// Sets how long [`Session::poll`] waits for a result.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Picks a batch size for `pattern` by measuring this host's key rate.
    ///
    /// The result is cached per prefix length; later calls for the same
    /// length return immediately.
    pub fn optimize(&mut self, pattern: &Pattern, budget: Duration) -> u64 {
        *self.batch_cache.entry(pattern.len()).or_insert_with(|| {
            let rate = measure_key_rate(budget);
            let batch = ((rate * TARGET_BATCH_TIME.as_secs_f64()) as u64).max(1);
            info!(
                prefix_len = pattern.len(),
                keys_per_second = rate as u64,
                batch,
                "Optimized search batch size"
            );
            batch
        })
    }

    /// Starts a search session; it runs until dropped.
    pub fn new_session(&self, pattern: Pattern, batch_size: u64) -> Result<Session, SearchError> {
        let pool = WorkerPool::new(self.workers, pattern, batch_size)
            .map_err(|e| SearchError::Engine(format!("failed to spawn workers: {}", e)))?;
        self.live_sessions.fetch_add(1, Ordering::SeqCst);

        Ok(Session {
            pool: Some(pool),
            poll_interval: self.poll_interval,
            live_sessions: self.live_sessions.clone(),
        })
    }

    /// Number of sessions not yet released.
    pub fn live_sessions(&self) -> usize {
        self.live_sessions.load(Ordering::SeqCst)
    }
}

/// A running search. Dropping it stops and joins its workers.
pub struct Session {
    pool: Option<WorkerPool>,
    poll_interval: Duration,
    live_sessions: Arc<AtomicUsize>,
}

impl Session {
    /// Waits up to the poll interval for a match.
    pub fn poll(&self) -> Option<Keypair> {
        let pool = self.pool.as_ref()?;
        pool.wait_for_result(self.poll_interval).map(|result| {
            debug!(
                worker = result.worker_id,
                keys = pool.total_keys(),
                elapsed_ms = pool.elapsed().as_millis() as u64,
                "Session found a match"
            );
            result.keypair
        })
    }

    /// Current generation rate across the session's workers.
    pub fn keys_per_second(&self) -> f64 {
        self.pool.as_ref().map_or(0.0, WorkerPool::keys_per_second)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.join();
        }
        self.live_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

/// [`Generator`] running searches on an in-process [`Engine`].
pub struct NativeGenerator {
    engine: Engine,
    /// Fixed batch size; 0 optimizes per prefix length
    batch: u64,
    optimize_budget: Duration,
}

impl NativeGenerator {
    pub fn new(engine: Engine, batch: u64, optimize_budget: Duration) -> Self {
        Self {
            engine,
            batch,
            optimize_budget,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

impl Generator for NativeGenerator {
    fn generate(
        &mut self,
        prefix: &str,
        should_continue: &mut dyn FnMut() -> bool,
    ) -> Result<Keypair, SearchError> {
        let pattern = Pattern::new(prefix).map_err(|e| SearchError::Engine(e.to_string()))?;
        let batch = if self.batch == 0 {
            self.engine.optimize(&pattern, self.optimize_budget)
        } else {
            self.batch
        };

        info!(
            prefix,
            difficulty = %pattern.difficulty_description(),
            workers = self.engine.workers(),
            batch,
            "Starting search session"
        );
        let session = self.engine.new_session(pattern, batch)?;

        loop {
            if let Some(keypair) = session.poll() {
                info!(address = %keypair.address(), "Search found a matching address");
                return Ok(keypair);
            }

            debug!(keys_per_second = session.keys_per_second() as u64, "Search in progress");
            if !should_continue() {
                return Err(SearchError::Abandoned);
            }
        }
    }

    fn name(&self) -> &'static str {
        "native"
    }
}
