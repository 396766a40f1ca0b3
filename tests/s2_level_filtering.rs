//! S2 (spec §8): level=warn drops below-threshold records without counting
//! them as queue-dropped.

use std::time::Duration;

use omnilog::{EngineConfig, LevelFilter, SinkConfig};

#[test]
fn only_warn_and_above_reach_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");

    let mut config = EngineConfig::new();
    config.level = LevelFilter::Warn;
    config.sinks.push(SinkConfig::file(&path));
    let engine = omnilog::Engine::open(config).unwrap();

    engine.debug("d");
    engine.info("i");
    assert!(engine.log_sync(omnilog::Level::Warn, "w"));
    assert!(engine.log_sync(omnilog::Level::Error, "e"));
    engine.shutdown(Duration::from_secs(5)).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("w"));
    assert!(lines[1].contains("e"));

    let snap = engine.metrics();
    assert_eq!(snap.messages_dropped, 0);
    assert_eq!(snap.messages_filtered, 2);
}
