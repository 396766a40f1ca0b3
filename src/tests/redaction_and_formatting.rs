//! Redaction applied to the formatter's encoded bytes, exercised end to end
//! through the engine rather than `RedactionPolicy` in isolation.

use std::time::Duration;

use crate::config::{EngineConfig, FormatKind, SinkConfig};
use crate::engine::Engine;
use crate::redact::RedactionPolicy;
use crate::record::FieldMap;

#[test]
fn redaction_masks_fields_in_json_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");

    let policy = RedactionPolicy::new().with_patterns(vec![
        regex::Regex::new(r#""password":"[^"]*""#).unwrap(),
        regex::Regex::new(r"\d{16}").unwrap(),
    ]);

    let mut config = EngineConfig::new();
    config.format = FormatKind::Json;
    config.redaction = Some(policy);
    config.sinks.push(SinkConfig::file(&path));
    let engine = Engine::open(config).unwrap();

    let mut fields = FieldMap::new();
    fields.insert("password".to_string(), serde_json::json!("hunter2"));
    fields.insert("card".to_string(), serde_json::json!("card 1234567812345678 on file"));
    engine.with_fields(log::Level::Info, "checkout", fields);
    engine.shutdown(Duration::from_secs(5)).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(!contents.contains("hunter2"));
    assert!(!contents.contains("1234567812345678"));
    assert!(contents.contains("***REDACTED***"));
}
