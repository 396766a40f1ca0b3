//! S1 (spec §8): info level, text format, single file sink.

use std::time::Duration;

use omnilog::{EngineConfig, SinkConfig};

#[test]
fn two_records_appear_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");

    let mut config = EngineConfig::new();
    config.sinks.push(SinkConfig::file(&path));
    let engine = omnilog::Engine::open(config).unwrap();

    engine.info("hello");
    assert!(engine.log_sync(omnilog::Level::Error, "boom"));
    engine.shutdown(Duration::from_secs(5)).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("[INFO]") && lines[0].contains("hello"));
    assert!(lines[1].contains("[ERROR]") && lines[1].contains("boom"));
}
