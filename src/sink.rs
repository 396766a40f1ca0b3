//! Sink (C3): one output target, file-with-lock or handoff to an external
//! protocol writer.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use enum_dispatch::enum_dispatch;
use parking_lot::Mutex;

use crate::compression::CompressionSender;
use crate::error::{ErrorRecord, ErrorSource, Severity};
use crate::metrics::Metrics;
use crate::rotation::{RotationConfig, Rotator};

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_FLUSH_SIZE: usize = 8 * 1024;

#[enum_dispatch]
pub trait SinkTrait {
    fn name(&self) -> &str;

    /// Writes bytes under the sink's own mutex, rotating first if needed.
    /// Never called from a producer thread — only the dispatcher calls this.
    fn write(&self, bytes: &[u8]) -> io::Result<()>;

    fn flush(&self) -> io::Result<()>;

    /// Idempotent: flushes, releases the lock, closes the file.
    fn close(&self);

    fn set_enabled(&self, enabled: bool);

    fn is_enabled(&self) -> bool;

    /// Runs the age-based retention sweep outside of a rotation (spec
    /// §4.11 periodic cleanup task). No-op for sinks with nothing to prune.
    fn sweep_retention(&self) {}
}

#[enum_dispatch(SinkTrait)]
pub enum Sink {
    File(FileSink),
    External(ExternalSink),
}

struct FileInner {
    writer: Option<BufWriter<File>>,
    size: u64,
    buffered: usize,
    last_flush: Instant,
}

/// A file target with an advisory lock held for the lifetime of the open
/// file descriptor, a buffered writer, and rotation/retention wiring.
pub struct FileSink {
    name: String,
    path: PathBuf,
    enabled: AtomicBool,
    inner: Mutex<FileInner>,
    rotator: Rotator,
    compression_tx: Option<CompressionSender>,
    flush_interval: Duration,
    flush_size: usize,
    metrics: Arc<Metrics>,
}

/// Acquires the exclusive whole-file advisory lock used to serialize writers
/// across OS processes (spec §4.3 process-safety contract). Held for as long
/// as the file descriptor stays open; released on close, rotate, or process
/// exit.
fn open_locked(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = OpenOptions::new().append(true).create(true).open(path)?;
    let rc = unsafe { libc::flock(file.as_raw_fd() as libc::c_int, libc::LOCK_EX) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(file)
}

fn unlock(file: &File) {
    unsafe {
        libc::flock(file.as_raw_fd() as libc::c_int, libc::LOCK_UN);
    }
}

impl FileSink {
    pub fn open(
        path: PathBuf, rotation: RotationConfig, compression_tx: Option<CompressionSender>,
        flush_interval: Duration, flush_size: usize, metrics: Arc<Metrics>,
    ) -> io::Result<Self> {
        let file = open_locked(&path)?;
        let size = file.metadata()?.len();
        let capacity = if flush_size == 0 { DEFAULT_FLUSH_SIZE } else { flush_size };
        let writer = BufWriter::with_capacity(capacity, file);
        Ok(Self {
            name: path.display().to_string(),
            rotator: Rotator::new(path.clone(), rotation),
            path,
            enabled: AtomicBool::new(true),
            inner: Mutex::new(FileInner { writer: Some(writer), size, buffered: 0, last_flush: Instant::now() }),
            compression_tx,
            flush_interval,
            flush_size,
            metrics,
        })
    }

    fn flush_locked(&self, inner: &mut FileInner) -> io::Result<()> {
        if let Some(writer) = inner.writer.as_mut() {
            writer.flush()?;
        }
        inner.buffered = 0;
        inner.last_flush = Instant::now();
        Ok(())
    }

    /// Rotation protocol (spec §4.4): flush, release lock + close fd, rename,
    /// reopen fresh, reset the size counter. A failure here is best-effort —
    /// the caller keeps writing to the still-open file until the next record.
    fn do_rotate(&self, inner: &mut FileInner) -> io::Result<()> {
        if let Some(writer) = inner.writer.as_mut() {
            writer.flush()?;
        }
        if let Some(writer) = inner.writer.take() {
            match writer.into_inner() {
                Ok(file) => {
                    unlock(&file);
                    drop(file);
                }
                Err(err) => return Err(err.into_error()),
            }
        }

        self.rotator
            .rotate(&self.metrics, self.compression_tx.as_ref())
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        let fresh = open_locked(&self.path)?;
        let capacity = if self.flush_size == 0 { DEFAULT_FLUSH_SIZE } else { self.flush_size };
        inner.writer = Some(BufWriter::with_capacity(capacity, fresh));
        inner.size = 0;
        inner.buffered = 0;
        Ok(())
    }
}

impl SinkTrait for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, bytes: &[u8]) -> io::Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        let mut inner = self.inner.lock();

        if self.rotator.should_rotate(inner.size, bytes.len() as u64) {
            if let Err(e) = self.do_rotate(&mut inner) {
                self.metrics.report_error(
                    ErrorRecord::new(ErrorSource::Rotate, &self.name, e.to_string()).with_severity(Severity::High),
                );
            }
        }

        let writer = match inner.writer.as_mut() {
            Some(w) => w,
            None => return Err(io::Error::new(io::ErrorKind::Other, "sink closed")),
        };
        writer.write_all(bytes)?;
        inner.size += bytes.len() as u64;
        inner.buffered += bytes.len();
        self.metrics.record_bytes_written(bytes.len() as u64);

        let threshold = self.flush_size * 3 / 4;
        let size_triggered = self.flush_size > 0 && inner.buffered >= threshold;
        let interval_triggered = !self.flush_interval.is_zero() && inner.last_flush.elapsed() >= self.flush_interval;
        if size_triggered || interval_triggered {
            self.flush_locked(&mut inner)?;
        }
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        let mut inner = self.inner.lock();
        self.flush_locked(&mut inner)
    }

    fn close(&self) {
        let mut inner = self.inner.lock();
        let _ = self.flush_locked(&mut inner);
        if let Some(writer) = inner.writer.take() {
            if let Ok(file) = writer.into_inner() {
                unlock(&file);
            }
        }
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn sweep_retention(&self) {
        self.rotator.run_retention(&self.metrics);
    }
}

/// Contract an external-protocol backend (e.g. syslog) implements to plug
/// into the sink model without the dispatcher knowing its wire format.
pub trait ExternalWriter: Send {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
}

/// A sink that hands formatted bytes off to an external protocol writer
/// (spec §4.3: "kind: external-protocol"). No file, no advisory lock — the
/// writer owns its own transport.
pub struct ExternalSink {
    name: String,
    enabled: AtomicBool,
    writer: Mutex<Box<dyn ExternalWriter>>,
}

impl ExternalSink {
    pub fn new(name: impl Into<String>, writer: Box<dyn ExternalWriter>) -> Self {
        Self { name: name.into(), enabled: AtomicBool::new(true), writer: Mutex::new(writer) }
    }
}

impl SinkTrait for ExternalSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, bytes: &[u8]) -> io::Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.writer.lock().write(bytes)
    }

    fn flush(&self) -> io::Result<()> {
        self.writer.lock().flush()
    }

    fn close(&self) {
        let _ = self.writer.lock().flush();
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_sink_writes_append_and_count_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let metrics = Arc::new(Metrics::new());
        let sink =
            FileSink::open(path.clone(), RotationConfig::default(), None, Duration::ZERO, 0, metrics.clone())
                .unwrap();

        sink.write(b"line one\n").unwrap();
        sink.write(b"line two\n").unwrap();
        sink.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "line one\nline two\n");
        assert_eq!(metrics.snapshot().bytes_written, "line one\nline two\n".len() as u64);
    }

    #[test]
    fn disabled_sink_silently_skips_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let metrics = Arc::new(Metrics::new());
        let sink =
            FileSink::open(path.clone(), RotationConfig::default(), None, Duration::ZERO, 0, metrics).unwrap();
        sink.set_enabled(false);
        sink.write(b"should not appear\n").unwrap();
        sink.flush().unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "");
    }

    #[test]
    fn rotation_renames_active_file_past_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let metrics = Arc::new(Metrics::new());
        let rotation = RotationConfig { max_size: 10, max_files: 5, ..Default::default() };
        let sink = FileSink::open(path.clone(), rotation, None, Duration::ZERO, 0, metrics.clone()).unwrap();

        for _ in 0..5 {
            sink.write(b"0123456789\n").unwrap();
        }
        sink.flush().unwrap();

        assert!(metrics.snapshot().rotation_count >= 4);
        let rotated: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(rotated.len() > 1);
    }

    #[test]
    fn close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let metrics = Arc::new(Metrics::new());
        let sink = FileSink::open(path, RotationConfig::default(), None, Duration::ZERO, 0, metrics).unwrap();
        sink.close();
        sink.close();
    }
}
