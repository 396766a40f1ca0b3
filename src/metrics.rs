//! Metrics counters and the error surface (C10).
//!
//! Counters are plain atomics so any thread can bump them without locking.
//! The error surface has two modes, both always active: a synchronous
//! callback invoked from the reporting site, and a bounded ring of the most
//! recent errors an operator can drain with [`Metrics::recent_errors`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use log::Level;

use crate::error::ErrorRecord;

const ERROR_RING_CAPACITY: usize = 64;

/// Point-in-time copy of all counters, safe to hand to a caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub logged_trace: u64,
    pub logged_debug: u64,
    pub logged_info: u64,
    pub logged_warn: u64,
    pub logged_error: u64,
    pub messages_dropped: u64,
    pub messages_filtered: u64,
    pub messages_sampled_out: u64,
    pub bytes_written: u64,
    pub rotation_count: u64,
    pub error_count: u64,
    pub errors_channel: u64,
    pub errors_write: u64,
    pub errors_rotate: u64,
    pub errors_compress: u64,
    pub errors_format: u64,
    pub errors_filter: u64,
    pub errors_config: u64,
    pub errors_lifecycle: u64,
}

impl MetricsSnapshot {
    pub fn logged_total(&self) -> u64 {
        self.logged_trace + self.logged_debug + self.logged_info + self.logged_warn + self.logged_error
    }
}

/// An error callback invoked synchronously from the reporting site. Must
/// never panic; a panicking callback is caught and discarded (spec §4.10).
pub type ErrorCallback = Box<dyn Fn(&ErrorRecord) + Send + Sync>;

/// Counters plus the dual-mode error surface, shared by every component via
/// an `Arc`.
pub struct Metrics {
    logged_trace: AtomicU64,
    logged_debug: AtomicU64,
    logged_info: AtomicU64,
    logged_warn: AtomicU64,
    logged_error: AtomicU64,
    messages_dropped: AtomicU64,
    messages_filtered: AtomicU64,
    messages_sampled_out: AtomicU64,
    bytes_written: AtomicU64,
    rotation_count: AtomicU64,
    error_count: AtomicU64,
    errors_channel: AtomicU64,
    errors_write: AtomicU64,
    errors_rotate: AtomicU64,
    errors_compress: AtomicU64,
    errors_format: AtomicU64,
    errors_filter: AtomicU64,
    errors_config: AtomicU64,
    errors_lifecycle: AtomicU64,
    error_ring: Mutex<Vec<ErrorRecord>>,
    callback: Mutex<Option<ErrorCallback>>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            logged_trace: AtomicU64::new(0),
            logged_debug: AtomicU64::new(0),
            logged_info: AtomicU64::new(0),
            logged_warn: AtomicU64::new(0),
            logged_error: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            messages_filtered: AtomicU64::new(0),
            messages_sampled_out: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            rotation_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            errors_channel: AtomicU64::new(0),
            errors_write: AtomicU64::new(0),
            errors_rotate: AtomicU64::new(0),
            errors_compress: AtomicU64::new(0),
            errors_format: AtomicU64::new(0),
            errors_filter: AtomicU64::new(0),
            errors_config: AtomicU64::new(0),
            errors_lifecycle: AtomicU64::new(0),
            error_ring: Mutex::new(Vec::with_capacity(ERROR_RING_CAPACITY)),
            callback: Mutex::new(None),
        }
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the error callback. `None` is the "silent" mode used in
    /// tests; passing a function that writes to stderr gives the "stderr"
    /// mode spec §4.10 describes.
    pub fn set_callback(&self, callback: Option<ErrorCallback>) {
        *self.callback.lock().unwrap() = callback;
    }

    pub fn stderr_callback() -> ErrorCallback {
        Box::new(|err: &ErrorRecord| {
            eprintln!("{err}");
        })
    }

    pub fn record_logged(&self, level: Level) {
        let counter = match level {
            Level::Trace => &self.logged_trace,
            Level::Debug => &self.logged_debug,
            Level::Info => &self.logged_info,
            Level::Warn => &self.logged_warn,
            Level::Error => &self.logged_error,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_filtered(&self) {
        self.messages_filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sampled_out(&self) {
        self.messages_sampled_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes_written(&self, n: u64) {
        self.bytes_written.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_rotation(&self) {
        self.rotation_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Surfaces a non-fatal error: bumps the per-source + total counters,
    /// pushes onto the bounded ring, and invokes the callback. Never panics,
    /// regardless of what the callback does.
    pub fn report_error(&self, err: ErrorRecord) {
        use crate::error::ErrorSource::*;
        self.error_count.fetch_add(1, Ordering::Relaxed);
        let counter = match err.source {
            Channel => &self.errors_channel,
            Write => &self.errors_write,
            Rotate => &self.errors_rotate,
            Compress => &self.errors_compress,
            Format => &self.errors_format,
            Filter => &self.errors_filter,
            Config => &self.errors_config,
            Lifecycle => &self.errors_lifecycle,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut ring) = self.error_ring.lock() {
            if ring.len() >= ERROR_RING_CAPACITY {
                ring.remove(0);
            }
            ring.push(err.clone());
        }

        let guard = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            if let Ok(cb) = self.callback.lock() {
                if let Some(cb) = cb.as_ref() {
                    cb(&err);
                }
            }
        }));
        if guard.is_err() {
            // A panicking callback must not take the engine down with it.
        }
    }

    pub fn recent_errors(&self) -> Vec<ErrorRecord> {
        self.error_ring.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            logged_trace: self.logged_trace.load(Ordering::Relaxed),
            logged_debug: self.logged_debug.load(Ordering::Relaxed),
            logged_info: self.logged_info.load(Ordering::Relaxed),
            logged_warn: self.logged_warn.load(Ordering::Relaxed),
            logged_error: self.logged_error.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            messages_filtered: self.messages_filtered.load(Ordering::Relaxed),
            messages_sampled_out: self.messages_sampled_out.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            rotation_count: self.rotation_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            errors_channel: self.errors_channel.load(Ordering::Relaxed),
            errors_write: self.errors_write.load(Ordering::Relaxed),
            errors_rotate: self.errors_rotate.load(Ordering::Relaxed),
            errors_compress: self.errors_compress.load(Ordering::Relaxed),
            errors_format: self.errors_format.load(Ordering::Relaxed),
            errors_filter: self.errors_filter.load(Ordering::Relaxed),
            errors_config: self.errors_config.load(Ordering::Relaxed),
            errors_lifecycle: self.errors_lifecycle.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorSource;

    #[test]
    fn counters_accumulate() {
        let m = Metrics::new();
        m.record_logged(Level::Info);
        m.record_logged(Level::Error);
        m.record_dropped();
        let snap = m.snapshot();
        assert_eq!(snap.logged_info, 1);
        assert_eq!(snap.logged_error, 1);
        assert_eq!(snap.messages_dropped, 1);
    }

    #[test]
    fn error_ring_is_bounded() {
        let m = Metrics::new();
        for i in 0..(ERROR_RING_CAPACITY * 2) {
            m.report_error(ErrorRecord::new(ErrorSource::Write, "sink", format!("boom {i}")));
        }
        assert_eq!(m.recent_errors().len(), ERROR_RING_CAPACITY);
        assert_eq!(m.snapshot().error_count as usize, ERROR_RING_CAPACITY * 2);
    }

    #[test]
    fn panicking_callback_is_caught() {
        let m = Metrics::new();
        m.set_callback(Some(Box::new(|_: &ErrorRecord| panic!("callback boom"))));
        m.report_error(ErrorRecord::new(ErrorSource::Filter, "f", "bad filter"));
        assert_eq!(m.snapshot().errors_filter, 1);
    }
}
