//! External configuration surface (spec §6) plus `sink://` URI parsing.
//!
//! Deliberately a plain struct, not a fluent builder — the builder/
//! functional-options ergonomics layer is named out of scope (spec §1).
//! Callers construct an [`EngineConfig`] with [`EngineConfig::default`] and
//! assign fields directly, then pass it to [`crate::engine::Engine::open`].

use std::path::PathBuf;
use std::time::Duration;

use log::LevelFilter;

use crate::env::env_or;
use crate::error::EngineError;
use crate::filter::FilterChain;
use crate::formatter::{Formatter, JsonFormatter, TextFormatter};
use crate::metrics::ErrorCallback;
use crate::redact::RedactionPolicy;
use crate::rotation::RotationConfig;
use crate::sampling::Sampler;
use crate::sink::{DEFAULT_FLUSH_INTERVAL, DEFAULT_FLUSH_SIZE};

/// Default ingestion queue capacity, overridden by `OMNI_CHANNEL_SIZE`
/// (spec §6) or by [`EngineConfig::channel_size`].
pub const DEFAULT_CHANNEL_SIZE: usize = 100;

/// `file://<path>` or `syslog://...`. Unknown schemes are rejected at
/// add-sink time (spec §6).
#[derive(Debug, Clone)]
pub enum SinkUri {
    File(PathBuf),
    #[cfg(feature = "syslog")]
    Syslog(String),
}

impl SinkUri {
    pub fn parse(uri: &str) -> Result<Self, EngineError> {
        if let Some(path) = uri.strip_prefix("file://") {
            return Ok(SinkUri::File(PathBuf::from(path)));
        }
        #[cfg(feature = "syslog")]
        if uri.starts_with("syslog://") {
            return Ok(SinkUri::Syslog(uri.to_string()));
        }
        Err(EngineError::UnknownScheme(uri.to_string()))
    }
}

/// Per-sink batching thresholds (spec §4.3).
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    pub flush_interval: Duration,
    pub flush_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { flush_interval: DEFAULT_FLUSH_INTERVAL, flush_size: DEFAULT_FLUSH_SIZE }
    }
}

/// Text or JSON output (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    Text,
    Json,
}

/// One sink to open at startup. Additional sinks can be added later through
/// `Engine::add_sink`.
pub struct SinkConfig {
    pub uri: String,
    pub rotation: RotationConfig,
    pub batch: BatchConfig,
}

impl SinkConfig {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            uri: format!("file://{}", path.into().display()),
            rotation: RotationConfig::default(),
            batch: BatchConfig::default(),
        }
    }

    pub fn with_rotation(mut self, rotation: RotationConfig) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }
}

/// The full external configuration surface (spec §6). Every field here maps
/// 1:1 onto a named option in the spec.
pub struct EngineConfig {
    pub level: LevelFilter,
    pub format: FormatKind,
    pub sinks: Vec<SinkConfig>,
    pub compression_workers: usize,
    pub compression_queue_size: usize,
    /// `<= 0` rejected at construction (spec §4.9); `None` falls back to
    /// `OMNI_CHANNEL_SIZE` or [`DEFAULT_CHANNEL_SIZE`].
    pub channel_size: Option<usize>,
    pub sampler: Sampler,
    pub filters: FilterChain,
    pub redaction: Option<RedactionPolicy>,
    pub global_fields: crate::record::FieldMap,
    /// Spec §6 `stack-trace` option: capture a backtrace on every
    /// `error()` call, truncated to `stack_trace_buffer_size` bytes.
    pub stack_trace: bool,
    pub stack_trace_buffer_size: usize,
    pub error_handler: Option<ErrorCallback>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            format: FormatKind::Text,
            sinks: Vec::new(),
            compression_workers: 1,
            compression_queue_size: 16,
            channel_size: None,
            sampler: Sampler::default(),
            filters: FilterChain::default(),
            redaction: None,
            global_fields: crate::record::FieldMap::new(),
            stack_trace: false,
            stack_trace_buffer_size: 4096,
            error_handler: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves the effective queue capacity: explicit field, then
    /// `OMNI_CHANNEL_SIZE`, then [`DEFAULT_CHANNEL_SIZE`] (spec §6).
    pub fn resolve_channel_size(&self) -> Result<usize, EngineError> {
        let size: usize = match self.channel_size {
            Some(n) => n,
            None => env_or("OMNI_CHANNEL_SIZE", DEFAULT_CHANNEL_SIZE).into(),
        };
        if size == 0 {
            return Err(EngineError::InvalidConfig("channel-size must be > 0".to_string()));
        }
        Ok(size)
    }

    pub fn formatter(&self) -> Formatter {
        match self.format {
            FormatKind::Text => Formatter::Text(TextFormatter::default()),
            FormatKind::Json => Formatter::Json(JsonFormatter::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_uri_parses_file_scheme() {
        match SinkUri::parse("file:///var/log/app.log").unwrap() {
            SinkUri::File(p) => assert_eq!(p, PathBuf::from("/var/log/app.log")),
            #[allow(unreachable_patterns)]
            _ => panic!("expected file variant"),
        }
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let err = SinkUri::parse("udp://127.0.0.1:999").unwrap_err();
        assert!(matches!(err, EngineError::UnknownScheme(_)));
    }

    #[test]
    fn zero_channel_size_is_rejected() {
        let mut config = EngineConfig::new();
        config.channel_size = Some(0);
        assert!(config.resolve_channel_size().is_err());
    }

    #[test]
    fn positive_channel_size_is_accepted() {
        let mut config = EngineConfig::new();
        config.channel_size = Some(42);
        assert_eq!(config.resolve_channel_size().unwrap(), 42);
    }
}
