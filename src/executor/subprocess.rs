//! Child-process backend: runs the script under an interpreter.

use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{ChildStderr, ChildStdout, Command};
use tokio::time::timeout;

use super::{ExecutionRequest, Executor, ExecutorFuture, Lifecycle, TailBuffer};
use crate::job::ExecutionStatus;
use crate::logging::{LogLevel, LogRecord, LogSink};

/// Lines of relayed output retained for the result's tail.
const TAIL_LIMIT: usize = 200;

/// Runs scripts as child processes of the current one.
///
/// Stdout lines are relayed at info level and stderr lines at error level,
/// each stream in the order it produced them, interleaved by arrival. On
/// timeout the child is killed and reaped before the terminal transition.
#[derive(Clone, Debug)]
pub struct SubprocessExecutor {
    interpreter: String,
}

impl Default for SubprocessExecutor {
    fn default() -> Self {
        Self {
            interpreter: String::from("python3"),
        }
    }
}

impl SubprocessExecutor {
    /// Creates an executor using the default `python3` interpreter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the interpreter the script is passed to.
    #[must_use]
    pub fn with_interpreter(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    async fn run(
        &self,
        request: &ExecutionRequest,
        sink: Arc<dyn LogSink>,
    ) -> crate::job::ExecutionResult {
        let mut lifecycle = Lifecycle::new();

        let mut command = Command::new(&self.interpreter);
        command
            .arg(&request.script)
            .current_dir(&request.working_directory)
            .envs(&request.environment)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(error) => {
                return lifecycle.errored(format!(
                    "failed to start {}: {error}",
                    self.interpreter
                ));
            }
        };
        let Some(stdout) = child.stdout.take() else {
            return lifecycle.errored("child process stdout was not captured");
        };
        let Some(stderr) = child.stderr.take() else {
            return lifecycle.errored("child process stderr was not captured");
        };

        lifecycle.start();
        let mut tail = TailBuffer::new(TAIL_LIMIT);

        let relay_and_wait = async {
            relay_streams(stdout, stderr, sink.as_ref(), &mut tail).await;
            child.wait().await
        };
        let waited = match request.timeout {
            Some(limit) => match timeout(limit, relay_and_wait).await {
                Ok(result) => Some(result),
                Err(_) => None,
            },
            None => Some(relay_and_wait.await),
        };

        let Some(wait_result) = waited else {
            if let Err(error) = child.kill().await {
                tracing::debug!(%error, "failed to kill timed-out script");
            }
            let limit = request.timeout.unwrap_or_default();
            return lifecycle.finish(
                ExecutionStatus::TimedOut,
                None,
                tail.into_tail(),
                Some(format!("script timed out after {limit:?}")),
            );
        };

        match wait_result {
            Ok(status) => match status.code() {
                Some(0) => lifecycle.finish(ExecutionStatus::Succeeded, Some(0), tail.into_tail(), None),
                Some(code) => {
                    lifecycle.finish(ExecutionStatus::Failed, Some(code), tail.into_tail(), None)
                }
                None => lifecycle.finish(
                    ExecutionStatus::Failed,
                    None,
                    tail.into_tail(),
                    Some(String::from("script terminated by signal")),
                ),
            },
            Err(error) => lifecycle.finish(
                ExecutionStatus::Errored,
                None,
                tail.into_tail(),
                Some(format!("failed to await script: {error}")),
            ),
        }
    }
}

/// Relays both streams until they close, preserving per-stream ordering and
/// interleaving by arrival.
async fn relay_streams(
    stdout: ChildStdout,
    stderr: ChildStderr,
    sink: &dyn LogSink,
    tail: &mut TailBuffer,
) {
    let mut out_lines = BufReader::new(stdout).lines();
    let mut err_lines = BufReader::new(stderr).lines();
    let mut out_open = true;
    let mut err_open = true;

    while out_open || err_open {
        tokio::select! {
            line = next(&mut out_lines), if out_open => match line {
                Some(text) => relay_line(sink, tail, LogLevel::Info, &text),
                None => out_open = false,
            },
            line = next(&mut err_lines), if err_open => match line {
                Some(text) => relay_line(sink, tail, LogLevel::Error, &text),
                None => err_open = false,
            },
        }
    }
}

// A read error ends the stream so the sibling stream keeps relaying, but it
// is logged rather than conflated with a clean close.
pub(super) async fn next<R>(lines: &mut Lines<BufReader<R>>) -> Option<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    match lines.next_line().await {
        Ok(line) => line,
        Err(error) => {
            tracing::debug!(%error, "output stream read failed; treating as end of stream");
            None
        }
    }
}

fn relay_line(sink: &dyn LogSink, tail: &mut TailBuffer, level: LogLevel, text: &str) {
    tail.push(text);
    if let Err(error) = sink.emit(&LogRecord::new(level, text)) {
        tracing::debug!(%error, "log sink rejected relayed line");
    }
}

impl Executor for SubprocessExecutor {
    fn execute<'a>(
        &'a self,
        request: &'a ExecutionRequest,
        sink: Arc<dyn LogSink>,
    ) -> ExecutorFuture<'a> {
        Box::pin(self.run(request, sink))
    }
}
