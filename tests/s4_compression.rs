//! S4 (spec §8): same as S3 but with gzip compression enabled — rotated
//! artifacts end in `.gz` and no uncompressed rotated file remains once the
//! compression queue has drained.

use std::io::Read;
use std::time::Duration;

use flate2::read::GzDecoder;
use omnilog::{CompressionKind, EngineConfig, RotationConfig, SinkConfig};

#[test]
fn rotated_files_are_compressed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");

    let rotation =
        RotationConfig { max_size: 100, max_files: 2, max_age: None, compression: CompressionKind::Gzip };
    let mut config = EngineConfig::new();
    config.sinks.push(SinkConfig::file(&path).with_rotation(rotation));
    let engine = omnilog::Engine::open(config).unwrap();

    let message = "x".repeat(26);
    for _ in 0..50 {
        engine.info(message.clone());
    }
    // Shutdown drains both the dispatcher and the compression pool before
    // returning, so every rotated file is either compressed or abandoned
    // within the deadline — never left half-written.
    engine.shutdown(Duration::from_secs(5)).unwrap();

    let mut plain_rotated = 0;
    let mut gz_rotated = 0;
    for entry in std::fs::read_dir(dir.path()).unwrap() {
        let entry = entry.unwrap();
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == "app.log" {
            continue;
        }
        if name.ends_with(".gz") {
            gz_rotated += 1;
            let file = std::fs::File::open(entry.path()).unwrap();
            let mut decoder = GzDecoder::new(file);
            let mut contents = String::new();
            decoder.read_to_string(&mut contents).unwrap();
            assert!(!contents.is_empty());
            assert!(contents.contains(&message));
        } else {
            plain_rotated += 1;
        }
    }

    assert_eq!(plain_rotated, 0, "no uncompressed rotated file should remain");
    assert!(gz_rotated >= 1);
}
