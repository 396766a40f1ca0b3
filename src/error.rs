//! Error types and the non-fatal error-record taxonomy.
//!
//! Two tiers, per spec §7:
//!
//! * [`EngineError`] — fatal, returned to a caller directly (construction
//!   failure, shutdown-deadline-exceeded).
//! * [`ErrorRecord`] — non-fatal, surfaced through the metrics counters and
//!   the user error callback; producers are never blocked or informed
//!   synchronously about these.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for fallible, caller-visible operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Fatal errors returned directly to a caller.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown sink scheme: {0}")]
    UnknownScheme(String),

    #[error("sink not found: {0}")]
    SinkNotFound(String),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("shutdown deadline exceeded after {0:?}")]
    DeadlineExceeded(std::time::Duration),

    #[error("engine is closed")]
    Closed,
}

/// Origin tag for a non-fatal [`ErrorRecord`], per spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorSource {
    Channel,
    Write,
    Rotate,
    Compress,
    Format,
    Filter,
    Config,
    Lifecycle,
}

impl ErrorSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSource::Channel => "channel",
            ErrorSource::Write => "write",
            ErrorSource::Rotate => "rotate",
            ErrorSource::Compress => "compress",
            ErrorSource::Format => "format",
            ErrorSource::Filter => "filter",
            ErrorSource::Config => "config",
            ErrorSource::Lifecycle => "lifecycle",
        }
    }
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity attached to an [`ErrorRecord`]; escalates with the level of the
/// record that triggered it (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Low,
    Warn,
    Medium,
    High,
    Critical,
}

/// A single non-fatal error, reported via the metrics error ring and the
/// user error callback (C10).
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub source: ErrorSource,
    pub destination: String,
    pub message: String,
    pub timestamp: chrono::DateTime<chrono::Local>,
    pub severity: Severity,
    pub context: HashMap<String, String>,
    pub cause: Option<String>,
}

impl ErrorRecord {
    pub fn new(source: ErrorSource, destination: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source,
            destination: destination.into(),
            message: message.into(),
            timestamp: chrono::Local::now(),
            severity: Severity::Medium,
            context: HashMap::new(),
            cause: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn path_destination(path: &std::path::Path) -> String {
        path.display().to_string()
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.source, self.destination, self.message)
    }
}

/// Helper so call sites that only have a `PathBuf` can build a destination tag
/// without allocating twice.
pub(crate) fn dest_of(path: &PathBuf) -> String {
    path.display().to_string()
}
