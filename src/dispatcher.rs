//! Single background dispatcher (C8): drains the ingestion queue and fans
//! out formatted bytes to every enabled sink.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use arc_swap::ArcSwap;
use crossfire::{MRx, RecvTimeoutError};

use crate::buffer_pool::BufferPool;
use crate::error::{ErrorRecord, ErrorSource, Severity};
use crate::formatter::{FormatInput, Formatter, FormatterTrait};
use crate::metrics::Metrics;
use crate::record::{FieldMap, Payload, Record};
use crate::redact::RedactionPolicy;
use crate::sink::{Sink, SinkTrait};

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Shared, hot-swappable view of the enabled sinks. The dispatcher reads a
/// fresh snapshot on every record; add/remove sink operations on the
/// lifecycle path swap a new `Vec` in without blocking the dispatcher.
pub type SinkList = ArcSwap<Vec<Arc<Sink>>>;

/// Hot-swappable process-wide field map, so `Engine::set_global_field` takes
/// effect on the next record without the dispatcher ever blocking on it.
pub type GlobalFields = ArcSwap<FieldMap>;

pub struct Dispatcher {
    handle: Option<thread::JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

#[allow(clippy::too_many_arguments)]
pub fn spawn(
    rx: MRx<Record>, sinks: Arc<SinkList>, formatter: Arc<Formatter>, global_fields: Arc<GlobalFields>,
    redaction: Option<Arc<RedactionPolicy>>, buffer_pool: Arc<BufferPool>, metrics: Arc<Metrics>,
) -> Dispatcher {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_for_thread = stop.clone();
    let handle = thread::spawn(move || {
        dispatch_loop(rx, sinks, formatter, global_fields, redaction, buffer_pool, metrics, stop_for_thread);
    });
    Dispatcher { handle: Some(handle), stop }
}

impl Dispatcher {
    /// Signals the loop to stop once the queue drains, and joins it, bounded
    /// by `deadline`. Returns `false` if the deadline elapsed first.
    pub fn join_bounded(mut self, deadline: Duration) -> bool {
        let handle = match self.handle.take() {
            Some(h) => h,
            None => return true,
        };
        let start = std::time::Instant::now();
        while !handle.is_finished() {
            if start.elapsed() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        let _ = handle.join();
        true
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

#[allow(clippy::too_many_arguments)]
fn dispatch_loop(
    rx: MRx<Record>, sinks: Arc<SinkList>, formatter: Arc<Formatter>, global_fields: Arc<GlobalFields>,
    redaction: Option<Arc<RedactionPolicy>>, buffer_pool: Arc<BufferPool>, metrics: Arc<Metrics>,
    stop: Arc<AtomicBool>,
) {
    loop {
        match rx.recv_timeout(IDLE_POLL_INTERVAL) {
            Ok(record) => {
                let fields = global_fields.load();
                process_one(record, &sinks, &formatter, &fields, redaction.as_deref(), &buffer_pool, &metrics);
            }
            Err(RecvTimeoutError::Timeout) => {
                if stop.load(Ordering::SeqCst) {
                    return;
                }
            }
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn process_one(
    record: Record, sinks: &SinkList, formatter: &Formatter, global_fields: &FieldMap,
    redaction: Option<&RedactionPolicy>, buffer_pool: &BufferPool, metrics: &Metrics,
) {
    let completion = record.completion.clone();
    let timer = record.timer();
    let file = record.file;
    let line = record.line;
    let stack_trace = record.stack_trace.clone();

    let (message, raw, structured, level, fields) = record.render_message();
    let snapshot = sinks.load();
    if snapshot.is_empty() {
        resolve_completion(completion);
        return;
    }

    let bytes = if let Some(raw) = raw {
        raw
    } else {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            encode(
                formatter,
                global_fields,
                level,
                &timer,
                &message,
                &fields,
                file,
                line,
                stack_trace.as_deref(),
                structured.as_ref(),
            )
        }));
        match outcome {
            Ok(mut encoded) => {
                if let Some(policy) = redaction {
                    let text = String::from_utf8_lossy(&encoded).into_owned();
                    let redacted = policy.redact_text(level, &text);
                    encoded = redacted.into_bytes();
                }
                encoded.push(b'\n');
                encoded
            }
            Err(_) => {
                metrics.report_error(
                    ErrorRecord::new(ErrorSource::Format, "formatter", "formatter panicked")
                        .with_severity(Severity::Medium),
                );
                let mut buf = buffer_pool.acquire();
                buf.extend_from_slice(message.as_bytes());
                buf.push(b'\n');
                let out = buf.clone();
                buffer_pool.release(buf);
                out
            }
        }
    };

    for sink in snapshot.iter() {
        if !sink.is_enabled() {
            continue;
        }
        let outcome = catch_unwind(AssertUnwindSafe(|| sink.write(&bytes)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                metrics.report_error(
                    ErrorRecord::new(ErrorSource::Write, sink.name(), e.to_string()).with_severity(Severity::High),
                );
            }
            Err(_) => {
                metrics.report_error(
                    ErrorRecord::new(ErrorSource::Write, sink.name(), "sink write panicked")
                        .with_severity(Severity::High),
                );
            }
        }
    }

    if completion.is_some() {
        for sink in snapshot.iter() {
            if sink.is_enabled() {
                let _ = sink.flush();
            }
        }
    }
    metrics.record_logged(level);
    resolve_completion(completion);
}

#[allow(clippy::too_many_arguments)]
fn encode(
    formatter: &Formatter, global_fields: &FieldMap, level: log::Level, timer: &crate::time::Timer, message: &str,
    fields: &FieldMap, file: Option<&'static str>, line: Option<u32>, stack_trace: Option<&str>,
    structured: Option<&crate::record::StructuredEntry>,
) -> Vec<u8> {
    if let Some(entry) = structured {
        let input = FormatInput {
            level,
            timer,
            message: &entry.message,
            fields: &entry.fields,
            file: entry.file.as_deref().or(file),
            line: entry.line.or(line),
            stack_trace: entry.stack_trace.as_deref().or(stack_trace),
        };
        formatter.format(&input, global_fields)
    } else {
        let input = FormatInput { level, timer, message, fields, file, line, stack_trace };
        formatter.format(&input, global_fields)
    }
}

fn resolve_completion(completion: Option<Arc<Option<crate::record::CompletionSignal>>>) {
    if let Some(arc) = completion {
        if let Ok(mut inner) = Arc::try_unwrap(arc).map_err(|_| ()) {
            if let Some(signal) = inner.take() {
                signal.resolve();
            }
        }
    }
}
