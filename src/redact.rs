//! Redaction (C6, step 5).
//!
//! Runs after formatting, on the dispatcher, so structure-aware rules can
//! operate on the final payload (spec §4.6 rationale).

use std::collections::HashSet;

use log::Level;
use regex::Regex;

use crate::record::FieldMap;

const DEFAULT_REPLACEMENT: &str = "***REDACTED***";

/// Key names and regex patterns to redact, plus the levels it applies to.
pub struct RedactionPolicy {
    field_names: HashSet<String>,
    patterns: Vec<Regex>,
    replacement: String,
    /// Levels at which redaction is skipped (e.g. `trace` during local
    /// debugging, where the operator wants raw values).
    skip_levels: HashSet<Level>,
}

impl Default for RedactionPolicy {
    fn default() -> Self {
        Self {
            field_names: HashSet::new(),
            patterns: Vec::new(),
            replacement: DEFAULT_REPLACEMENT.to_string(),
            skip_levels: HashSet::new(),
        }
    }
}

impl RedactionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field_names(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.field_names.extend(names);
        self
    }

    pub fn with_patterns(mut self, patterns: Vec<Regex>) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn with_replacement(mut self, replacement: impl Into<String>) -> Self {
        self.replacement = replacement.into();
        self
    }

    pub fn skip_for_level(mut self, level: Level) -> Self {
        self.skip_levels.insert(level);
        self
    }

    fn applies_to(&self, level: Level) -> bool {
        !self.skip_levels.contains(&level)
    }

    /// Replaces any pattern match in `text` with the replacement token.
    pub fn redact_text(&self, level: Level, text: &str) -> String {
        if !self.applies_to(level) || self.patterns.is_empty() {
            return text.to_string();
        }
        let mut out = text.to_string();
        for pattern in &self.patterns {
            out = pattern.replace_all(&out, self.replacement.as_str()).into_owned();
        }
        out
    }

    /// Redacts by field name, in place, plus runs pattern redaction over any
    /// remaining string-valued fields.
    pub fn redact_fields(&self, level: Level, fields: &mut FieldMap) {
        if !self.applies_to(level) {
            return;
        }
        for (key, value) in fields.iter_mut() {
            if self.field_names.contains(key) {
                *value = serde_json::Value::String(self.replacement.clone());
                continue;
            }
            if let serde_json::Value::String(s) = value {
                if !self.patterns.is_empty() {
                    let mut redacted = s.clone();
                    for pattern in &self.patterns {
                        redacted = pattern.replace_all(&redacted, self.replacement.as_str()).into_owned();
                    }
                    *s = redacted;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_named_field() {
        let policy = RedactionPolicy::new().with_field_names(["password".to_string()]);
        let mut fields = FieldMap::new();
        fields.insert("password".to_string(), json!("hunter2"));
        fields.insert("user".to_string(), json!("alice"));
        policy.redact_fields(Level::Info, &mut fields);
        assert_eq!(fields["password"], json!(DEFAULT_REPLACEMENT));
        assert_eq!(fields["user"], json!("alice"));
    }

    #[test]
    fn redacts_pattern_in_text() {
        let email = Regex::new(r"[\w.+-]+@[\w-]+\.[\w.-]+").unwrap();
        let policy = RedactionPolicy::new().with_patterns(vec![email]);
        let out = policy.redact_text(Level::Info, "contact alice@example.com now");
        assert_eq!(out, format!("contact {DEFAULT_REPLACEMENT} now"));
    }

    #[test]
    fn skips_configured_level() {
        let email = Regex::new(r"[\w.+-]+@[\w-]+\.[\w.-]+").unwrap();
        let policy = RedactionPolicy::new().with_patterns(vec![email]).skip_for_level(Level::Trace);
        let out = policy.redact_text(Level::Trace, "contact alice@example.com now");
        assert_eq!(out, "contact alice@example.com now");
    }
}
