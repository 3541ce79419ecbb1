//! Job descriptions and terminal execution results.
//!
//! A job pairs a script locator with the files it consumes and produces, an
//! environment, and an optional timeout. Configurations are immutable once
//! built; the builder rejects blank fields and invalid combinations before
//! any side effect occurs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Declares an input file the script expects to find in its execution
/// context.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileRequirement {
    /// Source locator, disambiguated by scheme prefix (`s3://`, `http://`,
    /// `https://`); an unprefixed value is a local filesystem path.
    pub source: String,
    /// Relative path, inside the execution context, where the script expects
    /// the file.
    pub destination: Utf8PathBuf,
    /// When `true` (the default), a failed transfer aborts the run.
    pub required: bool,
}

impl FileRequirement {
    /// Creates a required file requirement.
    #[must_use]
    pub fn new(source: impl Into<String>, destination: impl Into<Utf8PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            required: true,
        }
    }

    /// Marks the requirement as optional: a failed transfer is recorded but
    /// does not abort the run.
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Declares an output file the script is expected to have written, and where
/// to upload it after execution.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileOutput {
    /// Relative path, inside the execution context, where the script writes
    /// the file.
    pub source: Utf8PathBuf,
    /// Destination locator, disambiguated by scheme prefix; an unprefixed
    /// value is a local filesystem path.
    pub destination: String,
    /// When `true` (the default), a missing or failed upload surfaces as a
    /// staging failure against this output.
    pub required: bool,
}

impl FileOutput {
    /// Creates a required file output.
    #[must_use]
    pub fn new(source: impl Into<Utf8PathBuf>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            required: true,
        }
    }

    /// Marks the output as optional: a missing source file is skipped
    /// silently and an upload failure is recorded but not escalated.
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Immutable description of one unit of work.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JobConfig {
    /// Locator of the script to run.
    pub script: Utf8PathBuf,
    /// Execution context override. When absent the orchestrator creates a
    /// disposable context and removes it afterwards.
    pub working_directory: Option<Utf8PathBuf>,
    /// Environment variables merged over the backend's own environment.
    pub environment: BTreeMap<String, String>,
    /// Wall-clock limit measured from the moment execution starts; absent
    /// means unbounded.
    pub timeout: Option<Duration>,
    /// Input files staged before execution.
    pub file_requirements: Vec<FileRequirement>,
    /// Output files uploaded after execution.
    pub file_outputs: Vec<FileOutput>,
    /// Caller-supplied metadata echoed onto the [`ExecutionResult`].
    pub metadata: BTreeMap<String, Value>,
}

impl JobConfig {
    /// Starts a builder for a [`JobConfig`].
    #[must_use]
    pub fn builder() -> JobConfigBuilder {
        JobConfigBuilder::default()
    }

    /// Validates the configuration, returning a descriptive error when a
    /// field is blank, a context-relative path is absolute, or two
    /// requirements share a destination.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.script.as_str().trim().is_empty() {
            return Err(ConfigError::Validation(String::from("script")));
        }
        let mut destinations = BTreeSet::new();
        for requirement in &self.file_requirements {
            if requirement.source.trim().is_empty() {
                return Err(ConfigError::Validation(String::from("requirement source")));
            }
            if requirement.destination.as_str().trim().is_empty() {
                return Err(ConfigError::Validation(String::from(
                    "requirement destination",
                )));
            }
            if requirement.destination.is_absolute() {
                return Err(ConfigError::AbsoluteDestination {
                    destination: requirement.destination.clone(),
                });
            }
            if !destinations.insert(requirement.destination.clone()) {
                return Err(ConfigError::DuplicateDestination {
                    destination: requirement.destination.clone(),
                });
            }
        }
        for output in &self.file_outputs {
            if output.source.as_str().trim().is_empty() {
                return Err(ConfigError::Validation(String::from("output source")));
            }
            if output.source.is_absolute() {
                return Err(ConfigError::AbsoluteDestination {
                    destination: output.source.clone(),
                });
            }
            if output.destination.trim().is_empty() {
                return Err(ConfigError::Validation(String::from("output destination")));
            }
        }
        Ok(())
    }
}

/// Builder for [`JobConfig`] that defers validation to construction.
#[derive(Clone, Debug, Default)]
pub struct JobConfigBuilder {
    script: Utf8PathBuf,
    working_directory: Option<Utf8PathBuf>,
    environment: BTreeMap<String, String>,
    timeout: Option<Duration>,
    file_requirements: Vec<FileRequirement>,
    file_outputs: Vec<FileOutput>,
    metadata: BTreeMap<String, Value>,
}

impl JobConfigBuilder {
    /// Sets the script locator.
    #[must_use]
    pub fn script(mut self, value: impl Into<Utf8PathBuf>) -> Self {
        self.script = value.into();
        self
    }

    /// Overrides the execution context directory.
    #[must_use]
    pub fn working_directory(mut self, value: impl Into<Utf8PathBuf>) -> Self {
        self.working_directory = Some(value.into());
        self
    }

    /// Adds one environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Sets the execution timeout.
    #[must_use]
    pub const fn timeout(mut self, value: Duration) -> Self {
        self.timeout = Some(value);
        self
    }

    /// Adds a file requirement.
    #[must_use]
    pub fn requirement(mut self, value: FileRequirement) -> Self {
        self.file_requirements.push(value);
        self
    }

    /// Adds a file output.
    #[must_use]
    pub fn output(mut self, value: FileOutput) -> Self {
        self.file_outputs.push(value);
        self
    }

    /// Adds one metadata entry echoed onto the result.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Builds and validates the [`JobConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails; see
    /// [`JobConfig::validate`].
    pub fn build(self) -> Result<JobConfig, ConfigError> {
        let config = JobConfig {
            script: self.script,
            working_directory: self.working_directory,
            environment: self.environment,
            timeout: self.timeout,
            file_requirements: self.file_requirements,
            file_outputs: self.file_outputs,
            metadata: self.metadata,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Errors raised by configuration validation, before any side effect.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Raised when a required field is missing or blank.
    #[error("missing or empty field: {0}")]
    Validation(String),
    /// Raised when a path that must be context-relative is absolute.
    #[error("path must be relative to the execution context: {destination}")]
    AbsoluteDestination {
        /// Offending path.
        destination: Utf8PathBuf,
    },
    /// Raised when two requirements stage to the same destination.
    #[error("duplicate requirement destination: {destination}")]
    DuplicateDestination {
        /// Destination declared more than once.
        destination: Utf8PathBuf,
    },
    /// Raised when a locator carries a scheme no provider is registered for.
    #[error("no file provider registered for scheme {scheme}://")]
    UnroutableScheme {
        /// Unrecognised scheme prefix.
        scheme: String,
    },
}

/// Terminal status of one run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The script ran to completion with a zero exit code.
    Succeeded,
    /// The script ran to completion with a nonzero exit code, or faulted
    /// while running. A script failure is a modelled outcome, not an
    /// orchestrator error.
    Failed,
    /// The configured timeout elapsed and the execution unit was terminated.
    TimedOut,
    /// Staging failed or the backend faulted before execution could start.
    Errored,
}

impl ExecutionStatus {
    /// Returns the snake_case name used in logs and serialised results.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Errored => "errored",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one run, created exactly once when the executor reaches a
/// terminal state.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExecutionResult {
    /// Terminal status.
    pub status: ExecutionStatus,
    /// Exit code, present only when the backend models one.
    pub exit_code: Option<i32>,
    /// Wall-clock duration of the run.
    pub duration: Duration,
    /// Bounded tail of the output relayed during execution.
    pub output_tail: Option<String>,
    /// Detail for `errored`, `timed_out`, and faulted `failed` outcomes.
    pub error_detail: Option<String>,
    /// Metadata echoed from the [`JobConfig`].
    pub metadata: BTreeMap<String, Value>,
}

impl ExecutionResult {
    /// Builds an `errored` result carrying a failure description.
    #[must_use]
    pub fn errored(detail: impl Into<String>, duration: Duration) -> Self {
        Self {
            status: ExecutionStatus::Errored,
            exit_code: None,
            duration,
            output_tail: None,
            error_detail: Some(detail.into()),
            metadata: BTreeMap::new(),
        }
    }

    /// Returns `true` when the run succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, ExecutionStatus::Succeeded)
    }
}

#[cfg(test)]
mod tests;
