//! Ingress API (C9) and lifecycle (C11): the crate's single entry point.
//!
//! An [`Engine`] owns the ingestion queue's send half, the engine-wide
//! policy state, the sink list, the background dispatcher, the compression
//! pool, and an optional retention-cleanup timer. Producers never touch the
//! dispatcher thread or any sink directly.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use crossfire::MTx;
use log::{Level, LevelFilter};
use parking_lot::{Mutex, RwLock};

use crate::buffer_pool::BufferPool;
use crate::compression::CompressionPool;
use crate::config::{EngineConfig, SinkConfig};
use crate::dispatcher::{self, Dispatcher, GlobalFields, SinkList};
use crate::error::{EngineError, ErrorRecord, ErrorSource, Result, Severity};
use crate::filter::{passes_level_gate, FilterChain};
use crate::formatter::Formatter;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::record::{CompletionSignal, FieldMap, LazyFormat, Record, StructuredEntry};
use crate::redact::RedactionPolicy;
use crate::rotation::CompressionKind;
use crate::sampling::{Sampler, SamplerTrait};
use crate::sink::{Sink, SinkTrait};

#[cfg(feature = "syslog")]
use crate::config::SinkUri;
#[cfg(feature = "syslog")]
use crate::sink::ExternalSink;
#[cfg(feature = "syslog")]
use crate::syslog::{SyslogConfig, SyslogWriter};

/// Wall-clock interval between age-based retention sweeps (spec §4.11). Kept
/// coarse because rotation already prunes inline on every rename; this timer
/// only matters for sinks that sit idle past `max-retention-age`.
const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Policy state behind the engine-wide lock (spec §5): level, sampler,
/// filters. Reads happen on every producer call, so this is a `RwLock`
/// rather than a single mutex shared with the hot sink-write path.
struct PolicyState {
    level: LevelFilter,
    sampler: Sampler,
    filters: FilterChain,
}

struct RetentionCleanup {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl RetentionCleanup {
    fn start(sinks: Arc<SinkList>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = stop.clone();
        let handle = thread::spawn(move || loop {
            for _ in 0..(RETENTION_SWEEP_INTERVAL.as_millis() / 100).max(1) {
                if stop_for_thread.load(Ordering::SeqCst) {
                    return;
                }
                thread::sleep(Duration::from_millis(100));
            }
            for sink in sinks.load().iter() {
                sink.sweep_retention();
            }
        });
        Self { stop, handle: Some(handle) }
    }

    fn stop_and_join(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// The process-safe, high-throughput logging engine core. Cheap to clone
/// (wrap in `Arc`) since every field is itself a shared, internally
/// synchronized handle.
pub struct Engine {
    closed: Arc<AtomicBool>,
    shutdown_started: Arc<AtomicBool>,
    /// `None` once shutdown has dropped the real sender, so the dispatcher
    /// sees the channel disconnect and exits after draining it.
    tx: Mutex<Option<MTx<Record>>>,
    policy: RwLock<PolicyState>,
    redaction: Option<Arc<RedactionPolicy>>,
    global_fields: Arc<GlobalFields>,
    formatter: Arc<Formatter>,
    sinks: Arc<SinkList>,
    metrics: Arc<Metrics>,
    buffer_pool: Arc<BufferPool>,
    dispatcher: Mutex<Option<Dispatcher>>,
    compression_pool: Mutex<Option<CompressionPool>>,
    retention_cleanup: Mutex<Option<RetentionCleanup>>,
    stack_trace: bool,
    stack_trace_buffer_size: usize,
}

fn build_sink(config: &SinkConfig, compression_tx: Option<crate::compression::CompressionSender>, metrics: Arc<Metrics>) -> Result<Sink> {
    #[cfg(feature = "syslog")]
    {
        match SinkUri::parse(&config.uri)? {
            SinkUri::File(path) => {
                let file = crate::sink::FileSink::open(
                    path,
                    config.rotation.clone(),
                    compression_tx,
                    config.batch.flush_interval,
                    config.batch.flush_size,
                    metrics,
                )?;
                Ok(Sink::File(file))
            }
            SinkUri::Syslog(uri) => {
                let syslog_config = SyslogConfig::from_uri(&uri)?;
                let writer = SyslogWriter::connect(&syslog_config)?;
                Ok(Sink::External(ExternalSink::new(uri, Box::new(writer))))
            }
        }
    }
    #[cfg(not(feature = "syslog"))]
    {
        match crate::config::SinkUri::parse(&config.uri)? {
            crate::config::SinkUri::File(path) => {
                let file = crate::sink::FileSink::open(
                    path,
                    config.rotation.clone(),
                    compression_tx,
                    config.batch.flush_interval,
                    config.batch.flush_size,
                    metrics,
                )?;
                Ok(Sink::File(file))
            }
        }
    }
}

/// Escalating severity for a channel-full drop, per spec §4.9 ("medium for
/// info, high for error").
fn channel_drop_severity(level: Level) -> Severity {
    match level {
        Level::Error => Severity::High,
        Level::Warn => Severity::Medium,
        Level::Info => Severity::Medium,
        Level::Debug | Level::Trace => Severity::Low,
    }
}

impl Engine {
    /// Opens the engine: parses and opens every configured sink, starts the
    /// dispatcher, the compression pool (if any sink enables compression),
    /// and the retention-cleanup timer (if any sink sets a max age).
    /// Construction failure (spec §7 "fatal") is returned directly.
    pub fn open(config: EngineConfig) -> Result<Arc<Engine>> {
        let channel_size = config.resolve_channel_size()?;
        let stack_trace = config.stack_trace;
        let stack_trace_buffer_size = config.stack_trace_buffer_size;
        let metrics = Arc::new(Metrics::new());
        let formatter = Arc::new(config.formatter());
        if let Some(cb) = config.error_handler {
            metrics.set_callback(Some(cb));
        }

        let needs_compression = config.sinks.iter().any(|s| s.rotation.compression != CompressionKind::None);
        let compression_pool = if needs_compression {
            Some(CompressionPool::start(config.compression_workers, config.compression_queue_size, metrics.clone()))
        } else {
            None
        };
        let compression_tx = compression_pool.as_ref().map(|p| p.sender().clone());

        let mut opened = Vec::with_capacity(config.sinks.len());
        for sink_config in &config.sinks {
            let sink = build_sink(sink_config, compression_tx.clone(), metrics.clone())?;
            opened.push(Arc::new(sink));
        }
        let needs_retention_sweep = config.sinks.iter().any(|s| s.rotation.max_age.is_some());

        let sinks: Arc<SinkList> = Arc::new(ArcSwap::new(Arc::new(opened)));
        let global_fields = Arc::new(ArcSwap::new(Arc::new(config.global_fields)));
        let redaction = config.redaction.map(Arc::new);
        let buffer_pool = Arc::new(BufferPool::new());

        let (tx, rx) = crossfire::mpmc::bounded_blocking(channel_size);
        let dispatcher = dispatcher::spawn(
            rx,
            sinks.clone(),
            formatter.clone(),
            global_fields.clone(),
            redaction.clone(),
            buffer_pool.clone(),
            metrics.clone(),
        );

        let retention_cleanup = if needs_retention_sweep { Some(RetentionCleanup::start(sinks.clone())) } else { None };

        Ok(Arc::new(Engine {
            closed: Arc::new(AtomicBool::new(false)),
            shutdown_started: Arc::new(AtomicBool::new(false)),
            tx: Mutex::new(Some(tx)),
            policy: RwLock::new(PolicyState { level: config.level, sampler: config.sampler, filters: config.filters }),
            redaction,
            global_fields,
            formatter,
            sinks,
            metrics,
            buffer_pool,
            dispatcher: Mutex::new(Some(dispatcher)),
            compression_pool: Mutex::new(compression_pool),
            retention_cleanup: Mutex::new(retention_cleanup),
            stack_trace,
            stack_trace_buffer_size,
        }))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn recent_errors(&self) -> Vec<ErrorRecord> {
        self.metrics.recent_errors()
    }

    pub fn set_level(&self, level: LevelFilter) {
        self.policy.write().level = level;
    }

    pub fn level(&self) -> LevelFilter {
        self.policy.read().level
    }

    /// Merges one key into the process-wide global field map (spec §4.7),
    /// effective for the next record the dispatcher formats.
    pub fn set_global_field(&self, key: impl Into<String>, value: serde_json::Value) {
        let current = self.global_fields.load();
        let mut next = (**current).clone();
        next.insert(key.into(), value);
        self.global_fields.store(Arc::new(next));
    }

    /// Adds a sink at runtime. Serialized through the engine-wide lock so
    /// concurrent add/remove calls cannot race each other; the dispatcher
    /// keeps reading its existing snapshot until this swap completes.
    pub fn add_sink(&self, config: SinkConfig) -> Result<()> {
        let _guard = self.policy.write();
        let compression_tx =
            self.compression_pool.lock().as_ref().map(|p| p.sender().clone());
        let sink = Arc::new(build_sink(&config, compression_tx, self.metrics.clone())?);
        let mut next: Vec<Arc<Sink>> = (**self.sinks.load()).clone();
        next.push(sink);
        self.sinks.store(Arc::new(next));
        Ok(())
    }

    /// Removes a sink by name (its URI), flushing and closing it first.
    pub fn remove_sink(&self, name: &str) -> Result<()> {
        let _guard = self.policy.write();
        let current = self.sinks.load();
        let mut next = Vec::with_capacity(current.len());
        let mut found = false;
        for sink in current.iter() {
            if sink.name() == name {
                sink.close();
                found = true;
            } else {
                next.push(sink.clone());
            }
        }
        if !found {
            return Err(EngineError::SinkNotFound(name.to_string()));
        }
        self.sinks.store(Arc::new(next));
        Ok(())
    }

    /// Spec §6 `stack-trace` option: captures the current thread's backtrace,
    /// truncated to `stack_trace_buffer_size` bytes on a UTF-8 boundary.
    fn capture_stack_trace(&self) -> Option<String> {
        if !self.stack_trace {
            return None;
        }
        let trace = format!("{:?}", backtrace::Backtrace::new());
        if trace.len() <= self.stack_trace_buffer_size {
            return Some(trace);
        }
        let mut end = self.stack_trace_buffer_size;
        while end > 0 && !trace.is_char_boundary(end) {
            end -= 1;
        }
        Some(trace[..end].to_string())
    }

    pub fn set_sink_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        for sink in self.sinks.load().iter() {
            if sink.name() == name {
                sink.set_enabled(enabled);
                return Ok(());
            }
        }
        Err(EngineError::SinkNotFound(name.to_string()))
    }

    // ---- Ingress API (C9) ----

    pub fn trace(&self, message: impl Into<String>) {
        self.submit(Record::from_args(Level::Trace, message));
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.submit(Record::from_args(Level::Debug, message));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.submit(Record::from_args(Level::Info, message));
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.submit(Record::from_args(Level::Warn, message));
    }

    pub fn error(&self, message: impl Into<String>) {
        let mut record = Record::from_args(Level::Error, message);
        if let Some(trace) = self.capture_stack_trace() {
            record = record.with_stack_trace(trace);
        }
        self.submit(record);
    }

    /// The lazy-format variant (spec §4.2): `render` is invoked by the
    /// dispatcher, not the caller, so a disabled/filtered-out record never
    /// pays the formatting cost.
    pub fn log_fmt(&self, level: Level, render: LazyFormat) {
        self.submit(Record::from_format(level, render));
    }

    /// Pre-encoded bytes, written through as-is after redaction.
    pub fn log_raw(&self, level: Level, bytes: Vec<u8>) {
        self.submit(Record::from_raw(level, bytes));
    }

    /// Structured-entry variant.
    pub fn log_entry(&self, level: Level, entry: StructuredEntry) {
        self.submit(Record::from_entry(level, entry));
    }

    pub fn with_fields(&self, level: Level, message: impl Into<String>, fields: FieldMap) {
        self.submit(Record::from_args(level, message).with_fields(fields));
    }

    /// Synchronous flush request (spec §4.8 step 4, §5): blocks the calling
    /// thread until every enabled sink that accepted this record has
    /// flushed. Returns `false` if the record was dropped (closed or queue
    /// full) rather than delivered.
    pub fn log_sync(&self, level: Level, message: impl Into<String>) -> bool {
        let (signal, rx) = CompletionSignal::pair();
        let record = Record::from_args(level, message).with_completion(signal);
        if !self.submit(record) {
            return false;
        }
        rx.recv().is_ok()
    }

    /// Runs the full policy pipeline (spec §4.6) and attempts a non-blocking
    /// enqueue. Returns `true` if the record was handed to the queue (not
    /// necessarily yet written — only "dropped" covers the at-most-once
    /// guarantee on failure).
    fn submit(&self, mut record: Record) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }

        let policy = self.policy.read();
        if !passes_level_gate(record.level, policy.level) {
            drop(policy);
            self.metrics.record_filtered();
            return false;
        }

        if !policy.filters.is_empty() {
            let message = record.preview_and_materialize_lazy().unwrap_or("").to_string();
            if !policy.filters.allows(record.level, &message, &record.fields, &self.metrics) {
                drop(policy);
                self.metrics.record_filtered();
                return false;
            }
        }

        if !policy.sampler.sample(&record.fields) {
            drop(policy);
            self.metrics.record_sampled_out();
            return false;
        }
        drop(policy);

        let tx_guard = self.tx.lock();
        let tx = match tx_guard.as_ref() {
            Some(tx) => tx,
            None => return false,
        };
        match tx.try_send(record) {
            Ok(()) => true,
            Err(err) => {
                self.metrics.record_dropped();
                self.metrics.report_error(
                    ErrorRecord::new(ErrorSource::Channel, "ingress-queue", "queue full, record dropped")
                        .with_severity(channel_drop_severity(err.into_inner().level)),
                );
                false
            }
        }
    }

    /// Graceful shutdown (spec §4.11). The first caller's deadline wins
    /// (spec §9 open question); concurrent callers observe the closed state
    /// and return immediately.
    pub fn shutdown(&self, deadline: Duration) -> Result<()> {
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let start = Instant::now();
        self.closed.store(true, Ordering::SeqCst);
        // Drop the one real sender so the dispatcher observes a disconnect
        // once the queue drains, rather than polling `stop` forever.
        self.tx.lock().take();

        let dispatcher = self.dispatcher.lock().take();
        let dispatcher_ok = match dispatcher {
            Some(d) => d.join_bounded(deadline.saturating_sub(start.elapsed())),
            None => true,
        };

        for sink in self.sinks.load().iter() {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                let _ = sink.flush();
                sink.close();
            }));
            if outcome.is_err() {
                self.metrics.report_error(
                    ErrorRecord::new(ErrorSource::Lifecycle, sink.name(), "panic while closing sink")
                        .with_severity(Severity::High),
                );
            }
        }

        if let Some(cleanup) = self.retention_cleanup.lock().take() {
            cleanup.stop_and_join();
        }

        if let Some(pool) = self.compression_pool.lock().take() {
            pool.shutdown(deadline.saturating_sub(start.elapsed()));
        }

        if !dispatcher_ok {
            return Err(EngineError::DeadlineExceeded(deadline));
        }
        Ok(())
    }
}
