//! End-to-end orchestration of one job.
//!
//! The orchestrator validates the configuration, provisions an execution
//! context, stages inputs, invokes the executor, stages outputs, and
//! releases everything it created. The blocking and streaming run modes
//! share one pipeline: [`JobOrchestrator::run`] drains the event stream
//! produced by [`JobOrchestrator::run_streaming`], so their semantics cannot
//! drift apart. Cleanup runs on every path and never overrides the run's
//! terminal status.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::executor::{ExecutionRequest, Executor};
use crate::job::{ConfigError, ExecutionResult, ExecutionStatus, JobConfig};
use crate::logging::{ChannelSink, FanOutSink, LogLevel, LogRecord, LogSink};
use crate::staging::{FileStagingCoordinator, OutputDisposition};
use crate::transfer::TransferError;

/// One push event observed while a job runs.
#[derive(Clone, Debug, PartialEq)]
pub enum JobEvent {
    /// A log record relayed or emitted during the run.
    Log(LogRecord),
    /// The terminal result; always the final event of a stream.
    Completed(ExecutionResult),
}

impl From<LogRecord> for JobEvent {
    fn from(record: LogRecord) -> Self {
        Self::Log(record)
    }
}

/// Consumer half of a streaming run.
///
/// Yields one [`JobEvent::Log`] per record emitted during staging and
/// execution, in emission order, and ends with a single
/// [`JobEvent::Completed`]. The orchestrator's own lifecycle records go to
/// the caller-supplied sink only and never appear here. Dropping the stream
/// does not interrupt the job: staging release and context cleanup still
/// run to completion on the spawned task.
#[derive(Debug)]
pub struct JobEventStream {
    receiver: mpsc::UnboundedReceiver<JobEvent>,
}

impl JobEventStream {
    /// Receives the next event, or `None` once the stream is exhausted.
    pub async fn next(&mut self) -> Option<JobEvent> {
        self.receiver.recv().await
    }
}

/// Runs jobs end to end: staging, execution, publication, and cleanup.
pub struct JobOrchestrator<E> {
    executor: Arc<E>,
    staging: Arc<FileStagingCoordinator>,
    sink: Arc<dyn LogSink>,
}

impl<E: std::fmt::Debug> std::fmt::Debug for JobOrchestrator<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobOrchestrator")
            .field("executor", &self.executor)
            .field("staging", &self.staging)
            .finish_non_exhaustive()
    }
}

impl<E> JobOrchestrator<E>
where
    E: Executor + 'static,
{
    /// Creates an orchestrator from its three collaborators.
    #[must_use]
    pub fn new(executor: E, staging: FileStagingCoordinator, sink: Arc<dyn LogSink>) -> Self {
        Self {
            executor: Arc::new(executor),
            staging: Arc::new(staging),
            sink,
        }
    }

    /// Validates `config` without side effects: structural validation plus a
    /// routing check of every locator against the registered providers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first violation found.
    pub fn validate(&self, config: &JobConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let router = self.staging.router();
        for requirement in &config.file_requirements {
            check_routable(router.recognised(&requirement.source))?;
        }
        for output in &config.file_outputs {
            check_routable(router.recognised(&output.destination))?;
        }
        Ok(())
    }

    /// Runs the job to completion and returns its terminal result.
    ///
    /// Implemented by draining the streaming pipeline, so the two run modes
    /// observe identical semantics.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation rejects the configuration;
    /// every post-validation fault is folded into the returned
    /// [`ExecutionResult`] instead.
    pub async fn run(&self, config: JobConfig) -> Result<ExecutionResult, ConfigError> {
        let mut stream = self.run_streaming(config)?;
        while let Some(event) = stream.next().await {
            if let JobEvent::Completed(result) = event {
                return Ok(result);
            }
        }
        Ok(ExecutionResult::errored(
            "job task ended without a terminal result",
            Duration::ZERO,
        ))
    }

    /// Starts the job and returns a stream of its events.
    ///
    /// The job runs on a spawned task; the returned stream yields log events
    /// as they happen and terminates with [`JobEvent::Completed`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation rejects the configuration
    /// before anything is staged or spawned.
    pub fn run_streaming(&self, config: JobConfig) -> Result<JobEventStream, ConfigError> {
        self.validate(&config)?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let mut fan_out = FanOutSink::new();
        fan_out.register(Arc::clone(&self.sink));
        fan_out.register(Arc::new(ChannelSink::<JobEvent>::new(sender.clone())));
        let relay: Arc<dyn LogSink> = Arc::new(fan_out);
        let caller = Arc::clone(&self.sink);

        let executor = Arc::clone(&self.executor);
        let staging = Arc::clone(&self.staging);
        tokio::spawn(async move {
            let result = execute_job(executor.as_ref(), &staging, &caller, &relay, config).await;
            if sender.send(JobEvent::Completed(result)).is_err() {
                tracing::debug!("job event consumer dropped before completion");
            }
            // The caller's sink outlives this run; dropping the sender is
            // what ends the stream.
        });

        Ok(JobEventStream { receiver })
    }
}

/// Runs one validated job. Every fault after this point becomes a terminal
/// [`ExecutionResult`]; staged files and an ephemeral context are released
/// on all paths.
///
/// `relay` carries staging records and the executor's relayed output, so
/// the streaming mode observes them; the orchestrator's own lifecycle and
/// cleanup records go to `caller` only.
async fn execute_job<E: Executor>(
    executor: &E,
    staging: &FileStagingCoordinator,
    caller: &Arc<dyn LogSink>,
    relay: &Arc<dyn LogSink>,
    config: JobConfig,
) -> ExecutionResult {
    let run_id = Uuid::new_v4();
    let context = match provision_context(&config, run_id).await {
        Ok(context) => context,
        Err(detail) => {
            let result = ExecutionResult::errored(detail, Duration::ZERO);
            return finalise(caller.as_ref(), run_id, &config, result);
        }
    };
    emit(
        caller.as_ref(),
        run_id,
        LogLevel::Info,
        format!("job started: {}", config.script),
    );

    let mut staged = match staging
        .stage_inputs(&config.file_requirements, &context.root, relay.as_ref())
        .await
    {
        Ok(staged) => staged,
        Err(error) => {
            let result = ExecutionResult::errored(error.to_string(), Duration::ZERO);
            context.remove(caller.as_ref(), run_id).await;
            return finalise(caller.as_ref(), run_id, &config, result);
        }
    };

    let request = ExecutionRequest {
        script: config.script.clone(),
        working_directory: context.root.clone(),
        environment: config.environment.clone(),
        timeout: config.timeout,
    };
    let mut result = executor.execute(&request, Arc::clone(relay)).await;

    if matches!(
        result.status,
        ExecutionStatus::Succeeded | ExecutionStatus::Failed
    ) {
        publish_outputs(
            staging,
            relay.as_ref(),
            run_id,
            &config,
            &context.root,
            &mut result,
        )
        .await;
    }

    staging.release(&mut staged, relay.as_ref()).await;
    context.remove(caller.as_ref(), run_id).await;
    finalise(caller.as_ref(), run_id, &config, result)
}

/// Uploads declared outputs and escalates the first required failure to an
/// `errored` status, keeping the exit code and output tail intact.
async fn publish_outputs(
    staging: &FileStagingCoordinator,
    sink: &dyn LogSink,
    run_id: Uuid,
    config: &JobConfig,
    context_root: &Utf8Path,
    result: &mut ExecutionResult,
) {
    let outcomes = staging
        .stage_outputs(&config.file_outputs, context_root)
        .await;
    let mut escalation = None;
    for outcome in outcomes {
        let OutputDisposition::Failed(failure) = outcome.disposition else {
            continue;
        };
        if outcome.output.required {
            if escalation.is_none() {
                escalation = Some(failure.to_string());
            }
            emit(
                sink,
                run_id,
                LogLevel::Error,
                format!("output staging failed: {failure}"),
            );
        } else {
            emit(
                sink,
                run_id,
                LogLevel::Warning,
                format!("optional output skipped: {failure}"),
            );
        }
    }
    if let Some(detail) = escalation {
        result.status = ExecutionStatus::Errored;
        result.error_detail = Some(detail);
    }
}

/// Echoes the configured metadata onto the result and emits the completion
/// record before handing the result back.
fn finalise(
    sink: &dyn LogSink,
    run_id: Uuid,
    config: &JobConfig,
    mut result: ExecutionResult,
) -> ExecutionResult {
    result.metadata = config.metadata.clone();
    let level = if result.is_success() {
        LogLevel::Info
    } else {
        LogLevel::Error
    };
    let mut message = format!("job finished: {}", result.status);
    if let Some(detail) = &result.error_detail {
        message.push_str(": ");
        message.push_str(detail);
    }
    emit(sink, run_id, level, message);
    result
}

/// The directory a job executes in, removed afterwards when this run
/// created it.
struct ExecutionContext {
    root: Utf8PathBuf,
    ephemeral: bool,
}

impl ExecutionContext {
    async fn remove(&self, sink: &dyn LogSink, run_id: Uuid) {
        if !self.ephemeral {
            return;
        }
        if let Err(error) = tokio::fs::remove_dir_all(&self.root).await {
            if error.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(root = %self.root, %error, "failed to remove execution context");
                emit(
                    sink,
                    run_id,
                    LogLevel::Warning,
                    format!("failed to remove execution context {}: {error}", self.root),
                );
            }
        }
    }
}

async fn provision_context(config: &JobConfig, run_id: Uuid) -> Result<ExecutionContext, String> {
    if let Some(directory) = &config.working_directory {
        return Ok(ExecutionContext {
            root: directory.clone(),
            ephemeral: false,
        });
    }
    let base = Utf8PathBuf::from_path_buf(std::env::temp_dir())
        .map_err(|path| format!("temporary directory is not UTF-8: {}", path.display()))?;
    let root = base.join(format!("stagehand-{run_id}"));
    tokio::fs::create_dir_all(&root)
        .await
        .map_err(|error| format!("failed to create execution context {root}: {error}"))?;
    Ok(ExecutionContext {
        root,
        ephemeral: true,
    })
}

fn check_routable(checked: Result<(), TransferError>) -> Result<(), ConfigError> {
    checked.map_err(|error| match error {
        TransferError::UnknownScheme { scheme } => ConfigError::UnroutableScheme { scheme },
        other => ConfigError::Validation(other.to_string()),
    })
}

fn emit(sink: &dyn LogSink, run_id: Uuid, level: LogLevel, message: String) {
    let mut metadata = BTreeMap::new();
    metadata.insert(
        String::from("run_id"),
        Value::String(run_id.to_string()),
    );
    let record = LogRecord::new(level, message).with_metadata(metadata);
    if let Err(error) = sink.emit(&record) {
        tracing::debug!(%error, "log sink rejected lifecycle record");
    }
}
