//! Error types for the stagetest framework.
//!
//! Each collaborator seam has its own error enum; `StagetestError` wraps
//! them for callers that only need one type.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for stagetest operations.
#[derive(Debug, Error)]
pub enum StagetestError {
    /// A state store operation failed.
    #[error("{0}")]
    State(#[from] StateError),

    /// The provisioning collaborator failed.
    #[error("{0}")]
    Provisioning(#[from] ProvisioningError),

    /// The resource protocol collaborator failed.
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// An expected value did not match what was observed.
    #[error("{0}")]
    Assertion(#[from] AssertionFailure),

    /// Configuration could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// None of the environment variables carrying a required value were set.
    #[error("None of the environment variables [{}] are set", candidates.join(", "))]
    MissingEnvironment {
        /// The variables that were consulted.
        candidates: Vec<String>,
    },

    /// One or more non-skipped stages failed.
    #[error("Stages failed: {}", failed.join(", "))]
    StagesFailed {
        /// Names of the failed stages, in execution order.
        failed: Vec<String>,
    },

    /// IO error outside the state store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the file-backed state store.
#[derive(Debug, Error)]
pub enum StateError {
    /// Reading or writing the backing file failed.
    #[error("Storage error at {}: {source}", path.display())]
    Storage {
        /// The file or directory involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// No value was ever saved under the key.
    #[error("No value saved for key '{key}' (expected at {})", path.display())]
    NotFound {
        /// The requested key.
        key: String,
        /// Where the value would have been.
        path: PathBuf,
    },

    /// The stored bytes do not deserialize into the requested type.
    #[error("Corrupt data for key '{key}' at {}: {reason}", path.display())]
    CorruptData {
        /// The requested key.
        key: String,
        /// The file holding the value.
        path: PathBuf,
        /// Deserializer message.
        reason: String,
    },

    /// The key cannot be used as a single file name.
    #[error("Invalid state key '{key}': {reason}")]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// Why the key was rejected.
        reason: &'static str,
    },
}

impl StateError {
    /// Returns true if this is a `NotFound` error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if this is a `CorruptData` error.
    #[must_use]
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::CorruptData { .. })
    }
}

/// Errors raised by the provisioning collaborator.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// The provisioning binary could not be started.
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        /// The command line that was attempted.
        command: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provisioning command exited unsuccessfully.
    #[error("'{command}' exited with {status}: {stderr}")]
    CommandFailed {
        /// The command line that failed.
        command: String,
        /// Exit status description.
        status: String,
        /// Captured standard error.
        stderr: String,
    },

    /// The output document could not be parsed.
    #[error("Failed to parse provisioning outputs: {0}")]
    OutputParse(String),

    /// A declared output is missing.
    #[error("Output '{key}' not found")]
    OutputMissing {
        /// The requested output name.
        key: String,
    },

    /// A declared output has a different type than requested.
    #[error("Output '{key}' is not a {expected}: got {actual}")]
    OutputType {
        /// The requested output name.
        key: String,
        /// The requested type.
        expected: &'static str,
        /// The value actually found.
        actual: String,
    },

    /// A retryable-error pattern is not a valid regex.
    #[error("Invalid retryable error pattern '{pattern}': {reason}")]
    InvalidRetryPattern {
        /// The offending pattern.
        pattern: String,
        /// Regex compiler message.
        reason: String,
    },
}

impl ProvisioningError {
    /// Creates a missing output error.
    #[must_use]
    pub fn output_missing(key: impl Into<String>) -> Self {
        Self::OutputMissing { key: key.into() }
    }
}

/// Errors raised by the resource protocol collaborator.
#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    /// Opening a connection failed.
    #[error("Failed to open connection to {target}: {reason}")]
    Open {
        /// Host (never the credentials) that was targeted.
        target: String,
        /// Driver message.
        reason: String,
    },

    /// The connection was opened but the resource does not answer.
    #[error("Failed to ping {target}: {reason}")]
    Ping {
        /// Host that was pinged.
        target: String,
        /// Driver message.
        reason: String,
    },

    /// A statement was rejected.
    #[error("Statement failed ({statement}): {reason}")]
    Statement {
        /// The statement text.
        statement: String,
        /// Driver message.
        reason: String,
    },
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        /// The config file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid TOML for the schema.
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// A field holds an unusable value.
    #[error("Invalid config field '{field}': {reason}")]
    Invalid {
        /// The field path, e.g. `skip.prefix`.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },
}

/// One expected/actual pair that did not match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// What was compared.
    pub subject: String,
    /// The expected value.
    pub expected: String,
    /// The observed value.
    pub actual: String,
}

/// Raised when one or more checks inside a stage failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct AssertionFailure {
    /// All mismatches found by the check.
    pub mismatches: Vec<Mismatch>,
}

impl AssertionFailure {
    /// Creates a failure for a single mismatch.
    #[must_use]
    pub fn single(
        subject: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            mismatches: vec![Mismatch {
                subject: subject.into(),
                expected: expected.into(),
                actual: actual.into(),
            }],
        }
    }
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Assertion failed:")?;
        for m in &self.mismatches {
            write!(
                f,
                " [{}: expected {:?}, got {:?}]",
                m.subject, m.expected, m.actual
            )?;
        }
        Ok(())
    }
}

/// Collects equality checks and turns them into one `AssertionFailure`.
#[derive(Debug, Default)]
pub struct Checks {
    mismatches: Vec<Mismatch>,
}

impl Checks {
    /// Creates an empty check set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a mismatch if `expected != actual`.
    pub fn equal<T>(&mut self, subject: &str, expected: &T, actual: &T) -> &mut Self
    where
        T: PartialEq + fmt::Display + ?Sized,
    {
        if expected != actual {
            self.mismatches.push(Mismatch {
                subject: subject.to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
        self
    }

    /// Returns the number of recorded mismatches.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.mismatches.len()
    }

    /// Finishes the check set.
    pub fn finish(self) -> Result<(), AssertionFailure> {
        if self.mismatches.is_empty() {
            Ok(())
        } else {
            Err(AssertionFailure {
                mismatches: self.mismatches,
            })
        }
    }
}
