//! Vanity key search behind a cancellable, engine-agnostic contract.
//!
//! A [`Generator`] produces a keypair whose address starts with a prefix,
//! consulting a caller-supplied predicate between polls and abandoning the
//! search as soon as it returns `false`.
//!
//! - `native`: in-process worker pool sessions
//! - `command`: an external search tool driven as a subprocess

mod command;
mod native;

pub use command::CommandGenerator;
pub use native::{Engine, NativeGenerator, Session};

use std::time::{Duration, Instant};

use crate::crypto::Keypair;

/// Default wait for a result before consulting the caller again.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Searches for a keypair whose address starts with a prefix.
pub trait Generator {
    /// Runs the search until a match is found or `should_continue` returns
    /// `false`. All resources acquired for the search are released before
    /// returning, whatever the outcome.
    fn generate(
        &mut self,
        prefix: &str,
        should_continue: &mut dyn FnMut() -> bool,
    ) -> Result<Keypair, SearchError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

impl<G: Generator + ?Sized> Generator for Box<G> {
    fn generate(
        &mut self,
        prefix: &str,
        should_continue: &mut dyn FnMut() -> bool,
    ) -> Result<Keypair, SearchError> {
        (**self).generate(prefix, should_continue)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Search abandoned")]
    Abandoned,
    #[error("Search engine failure: {0}")]
    Engine(String),
}

/// Rate-limits an expensive validity check to once per interval.
///
/// Calls made before the interval has elapsed since the last check succeed
/// immediately; the next one runs the check and restarts the interval.
#[derive(Debug)]
pub struct ValidityCheck {
    interval: Duration,
    last: Instant,
}

impl ValidityCheck {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    pub fn should_continue(&mut self, check: impl FnOnce() -> bool) -> bool {
        if self.last.elapsed() < self.interval {
            return true;
        }
        let result = check();
        self.last = Instant::now();
        result
    }
}
