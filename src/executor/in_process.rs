//! In-process backend: runs a caller-supplied function as the "script".
//!
//! Useful in tests and for embedding hosts that want orchestration without
//! a child process. The function runs on a blocking worker thread so the
//! timeout can be enforced from the async side; a timed-out function cannot
//! be killed, only abandoned, which matches the terminal contract because
//! the abandoned thread can no longer influence the result.

use std::fmt;
use std::sync::Arc;

use tokio::time::timeout;

use super::{ExecutionRequest, Executor, ExecutorFuture, Lifecycle};
use crate::job::{ExecutionResult, ExecutionStatus};
use crate::logging::LogSink;

/// The callable an [`InProcessExecutor`] runs.
///
/// Returns the exit code on completion or a failure description; both map to
/// modelled outcomes, never to a backend fault.
pub type ScriptFn =
    Arc<dyn Fn(&ExecutionRequest, &dyn LogSink) -> Result<i32, String> + Send + Sync>;

/// Runs a function in place of a script, inside the current process.
#[derive(Clone)]
pub struct InProcessExecutor {
    script: ScriptFn,
}

impl InProcessExecutor {
    /// Creates an executor that invokes `script` for every request.
    #[must_use]
    pub fn new(script: ScriptFn) -> Self {
        Self { script }
    }

    async fn run(&self, request: &ExecutionRequest, sink: Arc<dyn LogSink>) -> ExecutionResult {
        let mut lifecycle = Lifecycle::new();
        lifecycle.start();

        let script = Arc::clone(&self.script);
        let owned_request = request.clone();
        let handle = tokio::task::spawn_blocking(move || script(&owned_request, sink.as_ref()));

        let joined = match request.timeout {
            Some(limit) => match timeout(limit, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    // The worker thread cannot be killed; it is abandoned and
                    // its eventual return value discarded.
                    return lifecycle.finish(
                        ExecutionStatus::TimedOut,
                        None,
                        None,
                        Some(format!("script timed out after {limit:?}")),
                    );
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(Ok(0)) => lifecycle.finish(ExecutionStatus::Succeeded, Some(0), None, None),
            Ok(Ok(code)) => lifecycle.finish(ExecutionStatus::Failed, Some(code), None, None),
            Ok(Err(detail)) => {
                lifecycle.finish(ExecutionStatus::Failed, None, None, Some(detail))
            }
            Err(error) => lifecycle.finish(
                ExecutionStatus::Failed,
                None,
                None,
                Some(format!("script panicked: {error}")),
            ),
        }
    }
}

impl fmt::Debug for InProcessExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcessExecutor").finish_non_exhaustive()
    }
}

impl Executor for InProcessExecutor {
    fn execute<'a>(
        &'a self,
        request: &'a ExecutionRequest,
        sink: Arc<dyn LogSink>,
    ) -> ExecutorFuture<'a> {
        Box::pin(self.run(request, sink))
    }
}
