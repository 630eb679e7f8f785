//! Search delegated to an external benchmark-and-generate tool.
//!
//! The tool is invoked as `<program> [args] --prefix P --batch N` and must
//! print the 32-byte hex seed of a matching key as its last stdout line.
//! With no configured batch, `<program> [args] --benchmark --prefix P` is run
//! once per prefix length and its last stdout line is taken as the batch.

use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;
use tracing::{debug, info};
use zeroize::Zeroize;

use super::{Generator, SearchError, DEFAULT_POLL_INTERVAL};
use crate::crypto::Keypair;
use crate::matcher::Pattern;

pub struct CommandGenerator {
    program: PathBuf,
    args: Vec<String>,
    /// Fixed batch size; 0 benchmarks per prefix length
    batch: u64,
    poll_interval: Duration,
    batch_cache: HashMap<usize, u64>,
}

/// Longest wait for the tool's stdout to close once it has exited or been killed.
const OUTPUT_TIMEOUT: Duration = Duration::from_secs(5);

/// Kills and reaps the child if it is still running when dropped.
///
/// On unix the tool leads its own process group and the whole group is
/// killed, so helpers it forked do not outlive the search.
struct ChildGuard(Child);

impl ChildGuard {
    #[cfg(unix)]
    fn kill(&mut self) {
        if let Ok(pid) = libc::pid_t::try_from(self.0.id()) {
            // The child is not reaped yet, so its pid still names its group
            #[allow(unsafe_code)]
            unsafe {
                libc::kill(-pid, libc::SIGKILL);
            }
        }
        let _ = self.0.kill();
    }

    #[cfg(not(unix))]
    fn kill(&mut self) {
        let _ = self.0.kill();
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Ok(None) = self.0.try_wait() {
            self.kill();
        }
        let _ = self.0.wait();
    }
}

impl CommandGenerator {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, batch: u64) -> Self {
        Self {
            program: program.into(),
            args,
            batch,
            poll_interval: DEFAULT_POLL_INTERVAL,
            batch_cache: HashMap::new(),
        }
    }

    /// Sets how often the child is checked for completion.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).stdin(Stdio::null()).stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        command
    }

    fn batch_for(&mut self, pattern: &Pattern) -> Result<u64, SearchError> {
        if self.batch > 0 {
            return Ok(self.batch);
        }
        if let Some(batch) = self.batch_cache.get(&pattern.len()) {
            return Ok(*batch);
        }

        let output = self
            .command()
            .arg("--benchmark")
            .arg("--prefix")
            .arg(pattern.prefix())
            .output()
            .map_err(|e| SearchError::Engine(format!("failed to run benchmark: {}", e)))?;
        if !output.status.success() {
            return Err(SearchError::Engine(format!(
                "benchmark exited with {}",
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let batch = last_line(&stdout)
            .and_then(|line| line.parse::<u64>().ok())
            .filter(|batch| *batch > 0)
            .ok_or_else(|| SearchError::Engine("benchmark printed no batch size".into()))?;

        info!(prefix_len = pattern.len(), batch, "Benchmarked external search tool");
        self.batch_cache.insert(pattern.len(), batch);
        Ok(batch)
    }

    fn collect(
        status: ExitStatus,
        output: &Receiver<String>,
        pattern: &Pattern,
    ) -> Result<Keypair, SearchError> {
        if !status.success() {
            return Err(SearchError::Engine(format!("search tool exited with {}", status)));
        }

        let mut stdout = output
            .recv_timeout(OUTPUT_TIMEOUT)
            .map_err(|_| SearchError::Engine("search tool output was not closed".into()))?;
        let decoded = last_line(&stdout).and_then(|line| hex::decode(line).ok());
        stdout.zeroize();

        let Some(mut seed) = decoded else {
            return Err(SearchError::Engine("search tool printed no seed".into()));
        };
        let keypair = <[u8; 32]>::try_from(seed.as_slice()).map(Keypair::from_seed);
        seed.zeroize();

        let keypair =
            keypair.map_err(|_| SearchError::Engine("seed must be 32 bytes".into()))?;
        if !pattern.matches(keypair.address()) {
            return Err(SearchError::Engine(format!(
                "search tool returned {}, which does not start with {}",
                keypair.address(),
                pattern.prefix()
            )));
        }
        Ok(keypair)
    }
}

fn last_line(output: &str) -> Option<&str> {
    output.lines().map(str::trim).filter(|l| !l.is_empty()).last()
}

impl Generator for CommandGenerator {
    fn generate(
        &mut self,
        prefix: &str,
        should_continue: &mut dyn FnMut() -> bool,
    ) -> Result<Keypair, SearchError> {
        let pattern = Pattern::new(prefix).map_err(|e| SearchError::Engine(e.to_string()))?;
        let batch = self.batch_for(&pattern)?;

        info!(program = %self.program.display(), prefix, batch, "Starting external search");
        let child = self
            .command()
            .arg("--prefix")
            .arg(prefix)
            .arg("--batch")
            .arg(batch.to_string())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| SearchError::Engine(format!("failed to start search tool: {}", e)))?;
        let mut child = ChildGuard(child);

        // Drain stdout concurrently so a chatty tool cannot block on a full pipe
        let mut stdout = child
            .0
            .stdout
            .take()
            .ok_or_else(|| SearchError::Engine("search tool stdout unavailable".into()))?;
        let (output_tx, output_rx) = crossbeam_channel::bounded(1);
        thread::spawn(move || {
            let mut out = String::new();
            let _ = stdout.read_to_string(&mut out);
            if let Err(mut unsent) = output_tx.send(out) {
                unsent.0.zeroize();
            }
        });

        loop {
            thread::sleep(self.poll_interval);

            match child.0.try_wait() {
                Ok(Some(status)) => return Self::collect(status, &output_rx, &pattern),
                Ok(None) => debug!("External search still running"),
                Err(e) => {
                    return Err(SearchError::Engine(format!("failed to poll search tool: {}", e)))
                }
            }

            if !should_continue() {
                drop(child);
                // Killing the group closes stdout, letting the reader finish
                if let Ok(mut out) = output_rx.recv_timeout(OUTPUT_TIMEOUT) {
                    out.zeroize();
                }
                return Err(SearchError::Abandoned);
            }
        }
    }

    fn name(&self) -> &'static str {
        "command"
    }
}
