//! Staging of declared inputs and outputs around one execution.
//!
//! The coordinator materialises a job's input files before execution, uploads
//! its declared outputs afterwards, and owns the release of everything it
//! created. Independent transfers proceed concurrently; ordering between
//! them is not observable. Release is idempotent and never raises: cleanup
//! must not mask the job's primary result.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tokio::task::JoinSet;

use crate::job::{FileOutput, FileRequirement};
use crate::logging::{LogLevel, LogRecord, LogSink};
use crate::transfer::{ProviderRouter, TransferError};

/// Errors surfaced while staging files around one run.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum StagingError {
    /// Raised when a required input's source does not exist.
    #[error("required file missing: {destination}")]
    RequiredInputMissing {
        /// Declared destination of the missing input.
        destination: Utf8PathBuf,
    },
    /// Raised when a required input transfer fails.
    #[error("required input {destination} failed: {source}")]
    InputTransfer {
        /// Declared destination of the failing input.
        destination: Utf8PathBuf,
        /// Underlying transfer error.
        #[source]
        source: TransferError,
    },
    /// Raised against an output whose required source file is absent.
    #[error("required output missing: {source_path}")]
    RequiredOutputMissing {
        /// Declared source path of the missing output.
        source_path: Utf8PathBuf,
    },
    /// Raised against an output whose upload failed.
    #[error("output upload to {destination} failed: {source}")]
    OutputTransfer {
        /// Declared destination locator of the failing output.
        destination: String,
        /// Underlying transfer error.
        #[source]
        source: TransferError,
    },
    /// Raised when a staging worker task is lost (for example, it panicked).
    #[error("staging worker failed: {message}")]
    Worker {
        /// Description of the lost worker.
        message: String,
    },
}

/// Bookkeeping of local paths created while staging inputs.
///
/// Owned by the coordinator for the duration of one run and used to drive
/// release; the recorded paths are not part of the public contract.
#[derive(Debug, Default)]
pub struct StagedFileSet {
    files: Vec<Utf8PathBuf>,
    released: bool,
}

impl StagedFileSet {
    fn record(&mut self, path: Utf8PathBuf) {
        self.files.push(path);
    }

    /// Returns how many files are recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` when no files are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// How one declared output fared during output staging.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OutputDisposition {
    /// The output existed and was uploaded.
    Uploaded,
    /// The optional output's source file was absent; skipped silently.
    SkippedOptional,
    /// The output could not be staged.
    Failed(StagingError),
}

/// Per-output outcome returned by [`FileStagingCoordinator::stage_outputs`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OutputOutcome {
    /// The declared output this outcome refers to.
    pub output: FileOutput,
    /// What happened to it.
    pub disposition: OutputDisposition,
}

/// Materialises inputs, persists outputs, and releases staged resources.
#[derive(Clone, Debug)]
pub struct FileStagingCoordinator {
    router: Arc<ProviderRouter>,
}

impl FileStagingCoordinator {
    /// Creates a coordinator routing transfers through `router`.
    #[must_use]
    pub fn new(router: ProviderRouter) -> Self {
        Self {
            router: Arc::new(router),
        }
    }

    /// Returns the provider router, so callers can pre-validate locators.
    #[must_use]
    pub fn router(&self) -> &ProviderRouter {
        &self.router
    }

    /// Stages every requirement into `context_root`, concurrently.
    ///
    /// A failed optional transfer is reported on `sink` and staging
    /// continues. A failed required transfer aborts the call: every file
    /// staged so far is released before the error is returned, and no
    /// executor invocation should follow.
    ///
    /// # Errors
    ///
    /// Returns [`StagingError`] for the first required requirement whose
    /// transfer failed.
    pub async fn stage_inputs(
        &self,
        requirements: &[FileRequirement],
        context_root: &Utf8Path,
        sink: &dyn LogSink,
    ) -> Result<StagedFileSet, StagingError> {
        let mut staged = StagedFileSet::default();
        if requirements.is_empty() {
            return Ok(staged);
        }

        let mut tasks = JoinSet::new();
        for (index, requirement) in requirements.iter().enumerate() {
            let router = Arc::clone(&self.router);
            let source = requirement.source.clone();
            let destination = context_root.join(&requirement.destination);
            tasks.spawn(async move {
                let result = router.fetch(&source, &destination).await;
                (index, destination, result)
            });
        }

        let mut outcomes = Vec::with_capacity(requirements.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(error) => {
                    self.release(&mut staged, sink).await;
                    return Err(StagingError::Worker {
                        message: error.to_string(),
                    });
                }
            }
        }
        outcomes.sort_by_key(|(index, _, _)| *index);

        let mut first_required_failure = None;
        for (index, destination, result) in outcomes {
            let Some(requirement) = requirements.get(index) else {
                continue;
            };
            match result {
                Ok(()) => staged.record(destination),
                Err(error) if requirement.required => {
                    if first_required_failure.is_none() {
                        first_required_failure = Some(input_failure(requirement, error));
                    }
                }
                Err(error) => {
                    emit(
                        sink,
                        LogLevel::Warning,
                        format!(
                            "optional input skipped: {}: {error}",
                            requirement.destination
                        ),
                    );
                }
            }
        }

        if let Some(failure) = first_required_failure {
            emit(sink, LogLevel::Error, format!("input staging failed: {failure}"));
            self.release(&mut staged, sink).await;
            return Err(failure);
        }
        Ok(staged)
    }

    /// Uploads every declared output from `context_root`, concurrently,
    /// returning one outcome per output in declaration order.
    ///
    /// A missing required source is reported against that output without
    /// aborting sibling uploads; a missing optional source is skipped
    /// silently.
    pub async fn stage_outputs(
        &self,
        outputs: &[FileOutput],
        context_root: &Utf8Path,
    ) -> Vec<OutputOutcome> {
        let mut tasks = JoinSet::new();
        for (index, output) in outputs.iter().enumerate() {
            let router = Arc::clone(&self.router);
            let declared = output.clone();
            let source = context_root.join(&output.source);
            tasks.spawn(async move {
                let disposition = stage_one_output(&router, &declared, &source).await;
                (
                    index,
                    OutputOutcome {
                        output: declared,
                        disposition,
                    },
                )
            });
        }

        let mut outcomes = Vec::with_capacity(outputs.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(error) => {
                    tracing::error!(%error, "output staging worker lost");
                }
            }
        }
        outcomes.sort_by_key(|(index, _)| *index);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }

    /// Removes every file recorded in `staged`. Idempotent: a second call
    /// has no further effect. Removal errors are reported on `sink` and via
    /// `tracing`, never raised, so cleanup cannot override the run's primary
    /// result.
    pub async fn release(&self, staged: &mut StagedFileSet, sink: &dyn LogSink) {
        if staged.released {
            return;
        }
        for path in &staged.files {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                Err(error) => {
                    tracing::warn!(%path, %error, "failed to remove staged file");
                    emit(
                        sink,
                        LogLevel::Warning,
                        format!("failed to remove staged file {path}: {error}"),
                    );
                }
            }
        }
        staged.released = true;
    }
}

async fn stage_one_output(
    router: &ProviderRouter,
    output: &FileOutput,
    source: &Utf8Path,
) -> OutputDisposition {
    let exists = tokio::fs::try_exists(source).await.unwrap_or(false);
    if !exists {
        if output.required {
            return OutputDisposition::Failed(StagingError::RequiredOutputMissing {
                source_path: output.source.clone(),
            });
        }
        return OutputDisposition::SkippedOptional;
    }
    match router.store(source, &output.destination).await {
        Ok(()) => OutputDisposition::Uploaded,
        Err(error) => OutputDisposition::Failed(StagingError::OutputTransfer {
            destination: output.destination.clone(),
            source: error,
        }),
    }
}

fn input_failure(requirement: &FileRequirement, error: TransferError) -> StagingError {
    match error {
        TransferError::MissingSource { .. } => StagingError::RequiredInputMissing {
            destination: requirement.destination.clone(),
        },
        other => StagingError::InputTransfer {
            destination: requirement.destination.clone(),
            source: other,
        },
    }
}

fn emit(sink: &dyn LogSink, level: LogLevel, message: String) {
    if let Err(error) = sink.emit(&LogRecord::new(level, message)) {
        tracing::debug!(%error, "log sink rejected staging record");
    }
}
