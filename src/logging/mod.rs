//! Log records and the sink contract used to observe a run.
//!
//! Sinks are transport-polymorphic observers: the orchestrator and the
//! executors hand each record to a [`LogSink`] and forget it. The fan-out
//! sink forwards every record to an ordered list of sinks so one broken
//! observer cannot abort a job, and the level filter is a decorator composed
//! in front of any other sink.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// Ordered log severity: `Debug < Info < Warning < Error`.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Diagnostic detail, usually filtered out.
    Debug,
    /// Routine lifecycle events and relayed stdout lines.
    Info,
    /// Recoverable problems, such as a skipped optional file.
    Warning,
    /// Failures and relayed stderr lines.
    Error,
}

impl LogLevel {
    /// Returns the uppercase name used when formatting records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One log emission. Ephemeral: handed to the sink and then discarded.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogRecord {
    /// Severity of the record.
    pub level: LogLevel,
    /// Message text.
    pub message: String,
    /// Optional structured metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, Value>>,
}

impl LogRecord {
    /// Creates a record without metadata.
    #[must_use]
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            metadata: None,
        }
    }

    /// Attaches structured metadata to the record.
    #[must_use]
    pub fn with_metadata(mut self, metadata: BTreeMap<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Errors surfaced by sink transports.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SinkError {
    /// Raised when the sink's transport has been closed.
    #[error("log sink closed")]
    Closed,
    /// Raised when delivery fails for a transport-specific reason.
    #[error("log sink delivery failed: {0}")]
    Delivery(String),
}

/// Destination for log records, polymorphic over transport.
///
/// Implementations must be safe to share across concurrently running jobs,
/// and `emit` must not block: the executors relay output lines through the
/// sink on the execution path, so a stalled sink stalls the relay.
pub trait LogSink: Send + Sync {
    /// Delivers one record.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the transport rejects the record. Callers
    /// composing sinks (the fan-out) record the failure and continue.
    fn emit(&self, record: &LogRecord) -> Result<(), SinkError>;

    /// Closes the sink and releases transport resources.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the transport cannot be closed cleanly.
    fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Forwards every record to an ordered list of sinks.
///
/// A failing sink is recorded and skipped, never propagated, so one broken
/// observer cannot abort the job. `close` is aggregated the same way.
#[derive(Clone, Default)]
pub struct FanOutSink {
    sinks: Vec<Arc<dyn LogSink>>,
}

impl FanOutSink {
    /// Creates an empty fan-out.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sink; records are forwarded in registration order.
    pub fn register(&mut self, sink: Arc<dyn LogSink>) {
        self.sinks.push(sink);
    }

    /// Returns how many sinks are registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Returns `true` when no sinks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl fmt::Debug for FanOutSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanOutSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl LogSink for FanOutSink {
    fn emit(&self, record: &LogRecord) -> Result<(), SinkError> {
        for sink in &self.sinks {
            if let Err(error) = sink.emit(record) {
                tracing::debug!(%error, "log sink rejected record");
            }
        }
        Ok(())
    }

    fn close(&self) -> Result<(), SinkError> {
        for sink in &self.sinks {
            if let Err(error) = sink.close() {
                tracing::warn!(%error, "log sink failed to close");
            }
        }
        Ok(())
    }
}

/// Decorator that forwards only records at or above a minimum level.
#[derive(Clone)]
pub struct LevelFilterSink {
    minimum: LogLevel,
    inner: Arc<dyn LogSink>,
}

impl LevelFilterSink {
    /// Wraps `inner`, dropping records below `minimum`.
    #[must_use]
    pub fn new(minimum: LogLevel, inner: Arc<dyn LogSink>) -> Self {
        Self { minimum, inner }
    }
}

impl fmt::Debug for LevelFilterSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LevelFilterSink")
            .field("minimum", &self.minimum)
            .finish()
    }
}

impl LogSink for LevelFilterSink {
    fn emit(&self, record: &LogRecord) -> Result<(), SinkError> {
        if record.level >= self.minimum {
            self.inner.emit(record)?;
        }
        Ok(())
    }

    fn close(&self) -> Result<(), SinkError> {
        self.inner.close()
    }
}

/// Sink that writes formatted records to standard output.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    /// Creates a console sink.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl LogSink for ConsoleSink {
    fn emit(&self, record: &LogRecord) -> Result<(), SinkError> {
        let mut handle = std::io::stdout().lock();
        let written = match &record.metadata {
            Some(metadata) => {
                let rendered = serde_json::to_string(metadata)
                    .map_err(|error| SinkError::Delivery(error.to_string()))?;
                writeln!(handle, "[{}] {} {rendered}", record.level, record.message)
            }
            None => writeln!(handle, "[{}] {}", record.level, record.message),
        };
        written.map_err(|error| SinkError::Delivery(error.to_string()))
    }
}

/// Sink that pushes records into an unbounded channel.
///
/// This is the push-event transport: the streaming run mode is built on it,
/// and any consumer holding the receiving half observes records as they are
/// produced. Once the receiver is dropped the channel is closed and further
/// emissions return [`SinkError::Closed`].
#[derive(Clone, Debug)]
pub struct ChannelSink<T = LogRecord> {
    sender: mpsc::UnboundedSender<T>,
}

impl<T> ChannelSink<T> {
    /// Wraps the sending half of a channel.
    #[must_use]
    pub const fn new(sender: mpsc::UnboundedSender<T>) -> Self {
        Self { sender }
    }
}

impl<T> LogSink for ChannelSink<T>
where
    T: From<LogRecord> + Send + 'static,
{
    fn emit(&self, record: &LogRecord) -> Result<(), SinkError> {
        self.sender
            .send(T::from(record.clone()))
            .map_err(|_| SinkError::Closed)
    }
}
