//! Test doubles shared by the unit and behavioural test suites.
//!
//! These are deliberately minimal: a sink that records what it was given, a
//! sink that always fails, and a provider that refuses every transfer.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use camino::Utf8Path;

use crate::logging::{LogLevel, LogRecord, LogSink, SinkError};
use crate::transfer::{FileProvider, ProviderFuture, TransferError};

/// Sink that stores every record it receives, for later assertion.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<LogRecord>>,
    close_calls: AtomicUsize,
}

impl RecordingSink {
    /// Creates an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every record received so far.
    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Returns every message received so far, in emission order.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.records()
            .into_iter()
            .map(|record| record.message)
            .collect()
    }

    /// Returns the messages received at exactly `level`.
    #[must_use]
    pub fn messages_at(&self, level: LogLevel) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|record| record.level == level)
            .map(|record| record.message)
            .collect()
    }

    /// Returns how many times `close` was called.
    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl LogSink for RecordingSink {
    fn emit(&self, record: &LogRecord) -> Result<(), SinkError> {
        self.records
            .lock()
            .map_err(|_| SinkError::Delivery(String::from("recording sink poisoned")))?
            .push(record.clone());
        Ok(())
    }

    fn close(&self) -> Result<(), SinkError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Sink whose every emission fails, for fan-out isolation tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailingSink;

impl LogSink for FailingSink {
    fn emit(&self, _record: &LogRecord) -> Result<(), SinkError> {
        Err(SinkError::Delivery(String::from("sink always fails")))
    }

    fn close(&self) -> Result<(), SinkError> {
        Err(SinkError::Delivery(String::from("sink always fails")))
    }
}

/// Provider that refuses every transfer, for routing and failure tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct RefusingProvider;

impl RefusingProvider {
    fn refuse(locator: &str) -> Result<(), TransferError> {
        Err(TransferError::Failed {
            locator: locator.to_owned(),
            message: String::from("provider refused the transfer"),
        })
    }
}

impl FileProvider for RefusingProvider {
    fn fetch<'a>(&'a self, source: &'a str, _destination: &'a Utf8Path) -> ProviderFuture<'a, ()> {
        Box::pin(async move { Self::refuse(source) })
    }

    fn store<'a>(&'a self, _source: &'a Utf8Path, destination: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move { Self::refuse(destination) })
    }
}
