#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]

//! # omnilog
//!
//! A process-safe, high-throughput structured logging engine: async
//! ingestion, sink rotation with advisory file locking, background gzip
//! compression, and a policy layer (level gate, user filters, sampling,
//! redaction) that runs before a record ever reaches the ingestion queue.
//!
//! ## Layout
//!
//! * [`Engine`] is the single entry point: open it with an [`EngineConfig`],
//!   log through `trace`/`debug`/`info`/`warn`/`error` (or the lazy/raw/
//!   structured/synchronous variants), and call [`Engine::shutdown`] once to
//!   drain the ingestion queue and close every sink.
//! * [`sink`] holds one target each: a file with an advisory lock and
//!   rotation, or a handoff to an [`ExternalWriter`](sink::ExternalWriter)
//!   such as the optional syslog backend.
//! * [`formatter`] renders a record to text or JSON; [`redact`] strips
//!   sensitive fields/patterns before a sink ever sees them.
//! * [`metrics`] exposes the counters and bounded error ring every component
//!   reports into; a caller can poll [`Engine::metrics`] or install a
//!   callback via [`EngineConfig::error_handler`].
//!
//! ## Example
//!
//! ```no_run
//! use omnilog::{Engine, EngineConfig, SinkConfig};
//!
//! let mut config = EngineConfig::new();
//! config.sinks.push(SinkConfig::file("/tmp/app.log"));
//! let engine = Engine::open(config).expect("open engine");
//!
//! engine.info("service started");
//! engine.error("could not reach upstream");
//!
//! engine.shutdown(std::time::Duration::from_secs(5)).expect("shutdown");
//! ```

#[macro_use]
extern crate enum_dispatch;

mod buffer_pool;
mod compression;
pub mod config;
mod dispatcher;
mod engine;
mod env;
pub mod error;
pub mod filter;
pub mod formatter;
mod level;
pub mod metrics;
pub mod record;
pub mod redact;
pub mod rotation;
pub mod sampling;
pub mod sink;
#[cfg(feature = "syslog")]
#[cfg_attr(docsrs, doc(cfg(feature = "syslog")))]
mod syslog;
mod time;

pub use config::{BatchConfig, EngineConfig, FormatKind, SinkConfig, SinkUri};
pub use engine::Engine;
pub use error::{EngineError, ErrorRecord, ErrorSource, Result, Severity};
pub use filter::{FilterChain, FilterPredicate};
pub use level::{Level, LevelFilter};
pub use metrics::{ErrorCallback, Metrics, MetricsSnapshot};
pub use record::{FieldMap, LazyFormat, StructuredEntry};
pub use redact::RedactionPolicy;
pub use rotation::{CompressionKind, RotationConfig};
pub use sampling::Sampler;
pub use sink::{ExternalWriter, Sink, SinkTrait};

#[cfg(feature = "syslog")]
#[cfg_attr(docsrs, doc(cfg(feature = "syslog")))]
pub use syslog::{SyslogAddr, SyslogConfig};

#[cfg(test)]
mod tests;
