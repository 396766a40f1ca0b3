//! The in-flight log record (C2).
//!
//! A [`Record`] is built on the producer thread, travels through the
//! ingestion queue, and is consumed exactly once by the dispatcher. Exactly
//! one of the four [`Payload`] variants is populated; the record is
//! immutable after construction.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Local};
use log::Level;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::time::Timer;

/// A key-value field map. `BTreeMap` because insertion order is irrelevant
/// (spec §3) but deterministic iteration makes tests and JSON output stable.
pub type FieldMap = BTreeMap<String, Value>;

/// A pre-formed structured view, used by [`Payload::Structured`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredEntry {
    pub level_name: String,
    pub message: String,
    pub timestamp: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub stack_trace: Option<String>,
    pub fields: FieldMap,
}

impl StructuredEntry {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level_name: level.to_string(),
            message: message.into(),
            timestamp: Local::now().to_rfc3339(),
            file: None,
            line: None,
            stack_trace: None,
            fields: FieldMap::new(),
        }
    }

    pub fn with_fields(mut self, fields: FieldMap) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_location(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    pub fn with_stack_trace(mut self, trace: impl Into<String>) -> Self {
        self.stack_trace = Some(trace.into());
        self
    }
}

/// The lazily-evaluated closure used by [`Payload::Lazy`]. `std::fmt::Arguments`
/// cannot be owned across the queue boundary, so the producer instead captures
/// its format call in an owned, `'static` closure; the dispatcher invokes it
/// exactly once, at format time.
pub type LazyFormat = Box<dyn FnOnce() -> String + Send + 'static>;

/// Exactly one of these is populated per [`Record`] (spec §3 invariant).
pub enum Payload {
    /// Message already materialized at the call site.
    Eager(String),
    /// Format template + arguments, deferred to the dispatcher. Both this and
    /// `Eager` MUST yield identical final bytes for equivalent input.
    Lazy(LazyFormat),
    /// Pre-encoded bytes, written through as-is (after redaction, if enabled).
    Raw(Vec<u8>),
    /// A fully structured entry, typically destined for the JSON formatter.
    Structured(StructuredEntry),
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Eager(s) => f.debug_tuple("Eager").field(s).finish(),
            Payload::Lazy(_) => f.write_str("Lazy(..)"),
            Payload::Raw(b) => f.debug_tuple("Raw").field(&b.len()).finish(),
            Payload::Structured(e) => f.debug_tuple("Structured").field(e).finish(),
        }
    }
}

/// A completion signal for a synchronous flush request (spec §4.8 step 4):
/// the dispatcher resolves it only after every enabled sink holding the
/// record has flushed. Low-frequency by construction (one per `log_sync`
/// call), so a plain `std::sync::mpsc` rendezvous channel is used rather
/// than the hot-path `crossfire` queue.
pub struct CompletionSignal {
    tx: std::sync::mpsc::SyncSender<()>,
}

impl CompletionSignal {
    pub fn pair() -> (CompletionSignal, std::sync::mpsc::Receiver<()>) {
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        (CompletionSignal { tx }, rx)
    }

    /// Resolves the signal. Best-effort: if the waiter has already given up,
    /// this is a no-op.
    pub fn resolve(self) {
        let _ = self.tx.send(());
    }
}

/// An in-flight log record, queued from producer to dispatcher.
#[derive(Debug)]
pub struct Record {
    pub level: Level,
    pub timestamp: DateTime<Local>,
    pub payload: Payload,
    pub fields: FieldMap,
    pub file: Option<&'static str>,
    pub line: Option<u32>,
    pub stack_trace: Option<String>,
    #[allow(clippy::type_complexity)]
    pub completion: Option<Arc<Option<CompletionSignal>>>,
}

impl std::fmt::Debug for CompletionSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CompletionSignal")
    }
}

impl Record {
    fn base(level: Level, payload: Payload) -> Self {
        Self {
            level,
            timestamp: Local::now(),
            payload,
            fields: FieldMap::new(),
            file: None,
            line: None,
            stack_trace: None,
            completion: None,
        }
    }

    pub fn from_args(level: Level, message: impl Into<String>) -> Self {
        Self::base(level, Payload::Eager(message.into()))
    }

    pub fn from_format(level: Level, render: LazyFormat) -> Self {
        Self::base(level, Payload::Lazy(render))
    }

    pub fn from_raw(level: Level, bytes: Vec<u8>) -> Self {
        Self::base(level, Payload::Raw(bytes))
    }

    pub fn from_entry(level: Level, entry: StructuredEntry) -> Self {
        Self::base(level, Payload::Structured(entry))
    }

    pub fn with_fields(mut self, fields: FieldMap) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_location(mut self, file: &'static str, line: u32) -> Self {
        self.file = Some(file);
        self.line = Some(line);
        self
    }

    pub fn with_completion(mut self, signal: CompletionSignal) -> Self {
        self.completion = Some(Arc::new(Some(signal)));
        self
    }

    /// Attaches a pre-captured stack trace (spec §6 `stack-trace` option).
    /// Only meaningful for `Eager`/`Lazy`/`Raw` payloads — a `Structured`
    /// payload carries its own `stack_trace` field instead.
    pub fn with_stack_trace(mut self, trace: String) -> Self {
        self.stack_trace = Some(trace);
        self
    }

    /// Materializes the message, consuming a `Lazy` payload if present.
    /// `Eager`/`Raw`/`Structured` payloads already carry their final text.
    pub fn render_message(self) -> (String, Option<Vec<u8>>, Option<StructuredEntry>, Level, FieldMap) {
        match self.payload {
            Payload::Eager(msg) => (msg, None, None, self.level, self.fields),
            Payload::Lazy(render) => (render(), None, None, self.level, self.fields),
            Payload::Raw(bytes) => (String::new(), Some(bytes), None, self.level, self.fields),
            Payload::Structured(entry) => (String::new(), None, Some(entry), self.level, self.fields),
        }
    }

    /// Snapshot of the timer used for formatting, matching the teacher's
    /// [`Timer`] wrapper around the record's captured timestamp.
    pub fn timer(&self) -> Timer {
        Timer::from(self.timestamp)
    }

    /// Materializes a `Lazy` payload in place so a user filter can inspect
    /// the rendered message before the record is queued, without the
    /// dispatcher ever rendering it a second time. `Raw`/`Structured`
    /// payloads have no single rendered message; callers treat `None` as
    /// "nothing to check".
    pub fn preview_and_materialize_lazy(&mut self) -> Option<&str> {
        if matches!(self.payload, Payload::Lazy(_)) {
            if let Payload::Lazy(render) = std::mem::replace(&mut self.payload, Payload::Eager(String::new())) {
                self.payload = Payload::Eager(render());
            }
        }
        match &self.payload {
            Payload::Eager(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eager_and_lazy_render_identically() {
        let eager = Record::from_args(Level::Info, format!("value={}", 42));
        let lazy = Record::from_format(Level::Info, Box::new(|| format!("value={}", 42)));

        let (eager_msg, ..) = eager.render_message();
        let (lazy_msg, ..) = lazy.render_message();
        assert_eq!(eager_msg, lazy_msg);
    }

    #[test]
    fn exactly_one_payload_variant() {
        let r = Record::from_raw(Level::Warn, b"raw bytes".to_vec());
        match r.payload {
            Payload::Raw(ref b) => assert_eq!(b, b"raw bytes"),
            _ => panic!("expected raw payload"),
        }
    }
}
