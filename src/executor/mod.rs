//! Execution contract and the state machine shared by every backend.
//!
//! A backend runs a script in some substrate (child process, in-process
//! call, remote dispatch) and drives one pass through the shared state
//! machine: `pending → running → {succeeded, failed, timed_out, errored}`.
//! While running, output is relayed line-by-line to the supplied log sink in
//! the order the underlying stream produced it. The [`Lifecycle`] helper
//! owns the transitions and the wall-clock measurement; consuming it to
//! build the result makes a second terminal transition unrepresentable.

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;

use crate::job::{ExecutionResult, ExecutionStatus};
use crate::logging::LogSink;

mod in_process;
mod subprocess;

pub use in_process::{InProcessExecutor, ScriptFn};
pub use subprocess::SubprocessExecutor;

/// Everything a backend needs to run one script.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecutionRequest {
    /// Locator of the script to run.
    pub script: Utf8PathBuf,
    /// Execution context the script runs in; inputs have been staged here.
    pub working_directory: Utf8PathBuf,
    /// Environment variables merged over the backend's own environment.
    pub environment: BTreeMap<String, String>,
    /// Wall-clock limit measured from entry into the running state; absent
    /// means unbounded.
    pub timeout: Option<Duration>,
}

/// Future returned by executor invocations.
pub type ExecutorFuture<'a> = Pin<Box<dyn Future<Output = ExecutionResult> + Send + 'a>>;

/// Capability to run a script and reach exactly one terminal state.
///
/// Implementations must preserve relay ordering per stream, honour the
/// timeout even when the substrate has no native cancellation (by actively
/// killing and reaping the execution unit), and fold every fault into the
/// returned [`ExecutionResult`] rather than propagating it.
pub trait Executor: Send + Sync {
    /// Runs the script described by `request`, relaying output to `sink`.
    fn execute<'a>(&'a self, request: &'a ExecutionRequest, sink: Arc<dyn LogSink>)
    -> ExecutorFuture<'a>;
}

/// Tracks one pass through the shared execution state machine.
#[derive(Debug)]
pub struct Lifecycle {
    origin: Instant,
    started: Option<Instant>,
}

impl Lifecycle {
    /// Creates a lifecycle in the pending state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            started: None,
        }
    }

    /// Enters the running state; the timeout and duration are measured from
    /// here. A second call has no effect.
    pub fn start(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    /// Returns `true` once the running state has been entered.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.started.is_some()
    }

    /// Performs the terminal transition, consuming the lifecycle so it can
    /// happen exactly once per invocation.
    #[must_use]
    pub fn finish(
        self,
        status: ExecutionStatus,
        exit_code: Option<i32>,
        output_tail: Option<String>,
        error_detail: Option<String>,
    ) -> ExecutionResult {
        let duration = self.started.unwrap_or(self.origin).elapsed();
        ExecutionResult {
            status,
            exit_code,
            duration,
            output_tail,
            error_detail,
            metadata: BTreeMap::new(),
        }
    }

    /// Terminal transition for a fault raised before or during invocation,
    /// without ever entering the running state.
    #[must_use]
    pub fn errored(self, detail: impl Into<String>) -> ExecutionResult {
        self.finish(ExecutionStatus::Errored, None, None, Some(detail.into()))
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps the last `limit` relayed lines for the result's output tail.
#[derive(Debug)]
pub struct TailBuffer {
    lines: VecDeque<String>,
    limit: usize,
}

impl TailBuffer {
    /// Creates a buffer retaining at most `limit` lines.
    #[must_use]
    pub const fn new(limit: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            limit,
        }
    }

    /// Appends a line, dropping the oldest once the limit is reached. A
    /// zero-limit buffer retains nothing.
    pub fn push(&mut self, line: &str) {
        if self.limit == 0 {
            return;
        }
        if self.lines.len() == self.limit {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_owned());
    }

    /// Joins the retained lines, or `None` when nothing was captured.
    #[must_use]
    pub fn into_tail(self) -> Option<String> {
        if self.lines.is_empty() {
            return None;
        }
        Some(Vec::from(self.lines).join("\n"))
    }
}

#[cfg(test)]
mod tests;
