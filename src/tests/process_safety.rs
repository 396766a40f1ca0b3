//! Advisory-lock contract (spec §4.3): a sink reopening the same path after
//! `close()` succeeds, and the active file descriptor is exclusively locked
//! for the sink's lifetime.

use std::os::unix::io::AsRawFd;
use std::sync::Arc;
use std::time::Duration;

use crate::metrics::Metrics;
use crate::rotation::RotationConfig;
use crate::sink::{FileSink, SinkTrait};

#[test]
fn reopen_after_close_reacquires_the_lock() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    let metrics = Arc::new(Metrics::new());

    let first =
        FileSink::open(path.clone(), RotationConfig::default(), None, Duration::ZERO, 0, metrics.clone()).unwrap();
    first.write(b"from first\n").unwrap();
    first.close();

    let second = FileSink::open(path.clone(), RotationConfig::default(), None, Duration::ZERO, 0, metrics).unwrap();
    second.write(b"from second\n").unwrap();
    second.flush().unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents, "from first\nfrom second\n");
}

#[test]
fn a_second_open_while_the_first_is_live_blocks_until_released() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    let metrics = Arc::new(Metrics::new());

    let first =
        FileSink::open(path.clone(), RotationConfig::default(), None, Duration::ZERO, 0, metrics.clone()).unwrap();

    // Opening a second handle on the locked file and trying a non-blocking
    // probe must observe the lock still held.
    let raw = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    let rc = unsafe { libc::flock(raw.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    assert_ne!(rc, 0, "flock should fail while the sink still holds the lock");

    first.close();

    let rc_after_close = unsafe { libc::flock(raw.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    assert_eq!(rc_after_close, 0, "lock must be released on close");
    unsafe {
        libc::flock(raw.as_raw_fd(), libc::LOCK_UN);
    }
}
