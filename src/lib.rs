//! Stagehand runs scripted jobs end to end: it stages declared input files
//! from heterogeneous sources into an execution context, executes the
//! script under an optional timeout while relaying its output line-by-line
//! to pluggable log sinks, uploads the declared outputs, and releases
//! everything it created regardless of how the run ended.
//!
//! The crate is organised around small, substitutable seams:
//!
//! - [`job`] describes the work: configuration, file declarations, and the
//!   terminal [`ExecutionResult`].
//! - [`transfer`] moves files between locators and local paths, routed by
//!   scheme prefix.
//! - [`staging`] materialises inputs before a run, publishes outputs after
//!   it, and owns release of the staged files.
//! - [`executor`] runs the script and drives the shared execution state
//!   machine; a child-process backend and an in-process backend ship with
//!   the crate.
//! - [`logging`] defines the sink contract and the stock sinks, including
//!   the channel sink the streaming run mode is built on.
//! - [`orchestrator`] ties the pieces together and exposes the blocking and
//!   streaming run modes with identical semantics.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use stagehand::{
//!     ConsoleSink, FileRequirement, FileStagingCoordinator, JobConfig, JobOrchestrator,
//!     ProviderRouter, SubprocessExecutor,
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = JobConfig::builder()
//!     .script("analysis.py")
//!     .requirement(FileRequirement::new("https://example.com/data.csv", "data.csv"))
//!     .build()?;
//!
//! let orchestrator = JobOrchestrator::new(
//!     SubprocessExecutor::new(),
//!     FileStagingCoordinator::new(ProviderRouter::with_defaults()),
//!     Arc::new(ConsoleSink::new()),
//! );
//! let result = orchestrator.run(config).await?;
//! println!("{}", result.status);
//! # Ok(())
//! # }
//! ```

pub mod executor;
pub mod job;
pub mod logging;
pub mod orchestrator;
pub mod staging;
pub mod test_support;
pub mod transfer;

pub use executor::{
    ExecutionRequest, Executor, ExecutorFuture, InProcessExecutor, Lifecycle, ScriptFn,
    SubprocessExecutor, TailBuffer,
};
pub use job::{
    ConfigError, ExecutionResult, ExecutionStatus, FileOutput, FileRequirement, JobConfig,
    JobConfigBuilder,
};
pub use logging::{
    ChannelSink, ConsoleSink, FanOutSink, LevelFilterSink, LogLevel, LogRecord, LogSink, SinkError,
};
pub use orchestrator::{JobEvent, JobEventStream, JobOrchestrator};
pub use staging::{
    FileStagingCoordinator, OutputDisposition, OutputOutcome, StagedFileSet, StagingError,
};
pub use transfer::{
    FileProvider, HttpFileProvider, LocalFileProvider, ProviderFuture, ProviderRouter,
    TransferError,
};
