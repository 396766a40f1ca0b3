//! Level gate, user filters, and sampling composed through the engine
//! rather than exercised in isolation.

use std::time::Duration;

use log::{Level, LevelFilter};

use crate::config::{EngineConfig, SinkConfig};
use crate::engine::Engine;
use crate::sampling::{FirstNSampler, Sampler};

#[test]
fn filter_runs_after_level_gate_and_before_sampling() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");

    let mut config = EngineConfig::new();
    config.level = LevelFilter::Info;
    // n=0: the sampler's first observation is already past its cap, so
    // everything that reaches it is rejected.
    config.sampler = Sampler::FirstN(FirstNSampler::head(0, None));
    config.filters.push(Box::new(|_, msg, _| !msg.contains("drop-me")));
    config.sinks.push(SinkConfig::file(&path));
    let engine = Engine::open(config).unwrap();

    // Below the level gate: counted as filtered, never reaches the user filter.
    engine.debug("drop-me below level");
    // Rejected by the user filter: counted as filtered, never reaches sampling.
    engine.info("please drop-me");
    // Passes level + filter, rejected by the zero-probability sampler.
    engine.info("sampled out");

    engine.shutdown(Duration::from_secs(5)).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.is_empty());

    let snap = engine.metrics();
    assert_eq!(snap.messages_filtered, 2);
    assert_eq!(snap.messages_sampled_out, 1);
}

#[test]
fn lazy_payload_is_rendered_once_for_filter_and_write() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");

    let mut config = EngineConfig::new();
    config.filters.push(Box::new(|_, msg, _| msg.contains("keep")));
    config.sinks.push(SinkConfig::file(&path));
    let engine = Engine::open(config).unwrap();

    let render_calls = Arc::new(AtomicUsize::new(0));
    let counted = render_calls.clone();
    engine.log_fmt(
        Level::Info,
        Box::new(move || {
            counted.fetch_add(1, Ordering::SeqCst);
            "keep this line".to_string()
        }),
    );
    engine.shutdown(Duration::from_secs(5)).unwrap();

    assert_eq!(render_calls.load(Ordering::SeqCst), 1);
    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("keep this line"));
}
