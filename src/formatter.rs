//! Pluggable encoder from Record to bytes (C7).

use enum_dispatch::enum_dispatch;
use log::Level;

use crate::record::FieldMap;
use crate::time::Timer;

pub struct TimeFormatter<'a> {
    pub now: &'a Timer,
    pub fmt_str: &'a str,
}

impl<'a> TimeFormatter<'a> {
    #[inline(always)]
    fn time_str(&self) -> String {
        self.now.format(self.fmt_str).to_string()
    }
}

/// Everything a formatter needs to turn one record into bytes. Built by the
/// dispatcher from a [`crate::record::Record`] after its payload has been
/// rendered.
pub struct FormatInput<'a> {
    pub level: Level,
    pub timer: &'a Timer,
    pub message: &'a str,
    pub fields: &'a FieldMap,
    pub file: Option<&'a str>,
    pub line: Option<u32>,
    pub stack_trace: Option<&'a str>,
}

#[enum_dispatch]
pub trait FormatterTrait {
    /// Renders one record, given the process-wide global fields (merged in
    /// with per-record fields taking precedence). Output does not include a
    /// trailing newline; callers append one per spec §6 (text lines and JSON
    /// records are both single-line, newline-terminated).
    fn format(&self, input: &FormatInput, global_fields: &FieldMap) -> Vec<u8>;
}

#[enum_dispatch(FormatterTrait)]
pub enum Formatter {
    Text(TextFormatter),
    Json(JsonFormatter),
}

/// `[<timestamp>] [<LEVEL>] <message>`. Either bracketed segment can be
/// suppressed independently.
pub struct TextFormatter {
    pub time_fmt: &'static str,
    pub show_timestamp: bool,
    pub show_level: bool,
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self { time_fmt: "%Y-%m-%d %H:%M:%S%.6f", show_timestamp: true, show_level: true }
    }
}

impl FormatterTrait for TextFormatter {
    fn format(&self, input: &FormatInput, _global_fields: &FieldMap) -> Vec<u8> {
        let mut out = String::new();
        if self.show_timestamp {
            let time = TimeFormatter { now: input.timer, fmt_str: self.time_fmt };
            out.push('[');
            out.push_str(&time.time_str());
            out.push_str("] ");
        }
        if self.show_level {
            out.push('[');
            out.push_str(&input.level.to_string().to_uppercase());
            out.push_str("] ");
        }
        out.push_str(input.message);
        out.into_bytes()
    }
}

/// Object with `timestamp`, `level`, `message`, optional `fields` (global
/// merged with per-record, per-record winning), optional `file`/`line`,
/// optional `stack_trace`.
#[derive(Default)]
pub struct JsonFormatter {
    pub time_fmt: &'static str,
}

impl FormatterTrait for JsonFormatter {
    fn format(&self, input: &FormatInput, global_fields: &FieldMap) -> Vec<u8> {
        let mut obj = serde_json::Map::new();
        let time_fmt = if self.time_fmt.is_empty() { "%+" } else { self.time_fmt };
        let time = TimeFormatter { now: input.timer, fmt_str: time_fmt };
        obj.insert("timestamp".to_string(), serde_json::Value::String(time.time_str()));
        obj.insert("level".to_string(), serde_json::Value::String(input.level.to_string()));
        obj.insert("message".to_string(), serde_json::Value::String(input.message.to_string()));

        if !global_fields.is_empty() || !input.fields.is_empty() {
            let mut merged = global_fields.clone();
            for (k, v) in input.fields.iter() {
                merged.insert(k.clone(), v.clone());
            }
            obj.insert("fields".to_string(), serde_json::Value::Object(merged.into_iter().collect()));
        }
        if let Some(file) = input.file {
            obj.insert("file".to_string(), serde_json::Value::String(file.to_string()));
        }
        if let Some(line) = input.line {
            obj.insert("line".to_string(), serde_json::Value::Number(line.into()));
        }
        if let Some(trace) = input.stack_trace {
            obj.insert("stack_trace".to_string(), serde_json::Value::String(trace.to_string()));
        }

        serde_json::to_vec(&obj).unwrap_or_else(|_| input.message.to_string().into_bytes())
    }
}
