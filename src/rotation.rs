//! Size-triggered rotation and retention pruning (C4).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Local;

use crate::compression::{CompressionSender, CompressionTask};
use crate::error::{ErrorRecord, ErrorSource};
use crate::metrics::Metrics;

/// gzip today; `None` disables compression entirely. A sum type rather than
/// a bool so a third backend can be added without a breaking signature
/// change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    None,
    Gzip,
}

#[derive(Debug, Clone)]
pub struct RotationConfig {
    /// Bytes; `<= 0` disables rotation entirely.
    pub max_size: i64,
    /// Count; `<= 0` disables count-based pruning.
    pub max_files: i64,
    /// `None` or non-positive disables age-based pruning.
    pub max_age: Option<Duration>,
    pub compression: CompressionKind,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self { max_size: 0, max_files: 0, max_age: None, compression: CompressionKind::None }
    }
}

impl RotationConfig {
    pub fn rotation_enabled(&self) -> bool {
        self.max_size > 0
    }
}

/// Owns the rename/reopen-signal/prune protocol for one sink's active file.
/// Does not itself hold the open file handle — that stays with the sink, so
/// the rotator never races a write in flight.
pub struct Rotator {
    config: RotationConfig,
    base_path: PathBuf,
    tie_break: AtomicU64,
}

impl Rotator {
    pub fn new(base_path: PathBuf, config: RotationConfig) -> Self {
        Self { config, base_path, tie_break: AtomicU64::new(0) }
    }

    pub fn config(&self) -> &RotationConfig {
        &self.config
    }

    /// Spec §4.4: triggered after a write if `size + next_entry_size > max_size`.
    pub fn should_rotate(&self, current_size: u64, next_entry_size: u64) -> bool {
        self.config.max_size > 0 && (current_size as i64 + next_entry_size as i64) > self.config.max_size
    }

    /// Renames the active file to `<base>.<suffix>`, enqueues it for
    /// compression if enabled, and prunes retained files. Does not reopen
    /// the fresh file at the original path — the caller (the sink) does
    /// that immediately after, once its writer and lock have been released
    /// for the rename.
    pub fn rotate(
        &self, metrics: &Metrics, compression_tx: Option<&CompressionSender>,
    ) -> std::io::Result<PathBuf> {
        let suffix = self.next_suffix();
        let rotated_path = self.rotated_path(&suffix);
        std::fs::rename(&self.base_path, &rotated_path)?;
        metrics.record_rotation();

        if self.config.compression != CompressionKind::None {
            if let Some(tx) = compression_tx {
                if tx.try_send(CompressionTask { path: rotated_path.clone() }).is_err() {
                    // Queue full: compression loss is tolerable, log loss is not
                    // (spec §4.4 step 5).
                    metrics.report_error(
                        ErrorRecord::new(
                            ErrorSource::Compress,
                            crate::error::ErrorRecord::path_destination(&rotated_path),
                            "compression queue full, leaving file uncompressed",
                        )
                        .with_severity(crate::error::Severity::Low),
                    );
                }
            }
        }

        if let Err(e) = self.prune(metrics) {
            metrics.report_error(
                ErrorRecord::new(ErrorSource::Rotate, self.base_path.display().to_string(), e.to_string())
                    .with_severity(crate::error::Severity::Warn),
            );
        }

        Ok(rotated_path)
    }

    /// Prunes retained files outside of a rotation, for the periodic
    /// age-based retention-cleanup task (spec §4.11). A no-op when only
    /// count-based pruning is configured, since that already runs inline
    /// with each rotation.
    pub fn run_retention(&self, metrics: &Metrics) {
        if self.config.max_age.is_some() {
            let _ = self.prune(metrics);
        }
    }

    fn next_suffix(&self) -> String {
        let n = self.tie_break.fetch_add(1, Ordering::Relaxed);
        format!("{}-{:06}", Local::now().format("%Y%m%d%H%M%S"), n)
    }

    fn rotated_path(&self, suffix: &str) -> PathBuf {
        let mut s = self.base_path.as_os_str().to_owned();
        s.push(".");
        s.push(suffix);
        PathBuf::from(s)
    }

    /// Lists `<base>.*`, sorts ascending (suffix format sorts lexicographically
    /// in chronological order), and deletes the oldest entries past the
    /// count/age retention limits.
    fn prune(&self, metrics: &Metrics) -> std::io::Result<()> {
        let mut files = self.list_rotated_files()?;
        if files.is_empty() {
            return Ok(());
        }
        files.sort_by(|a, b| a.1.cmp(&b.1));

        if self.config.max_files > 0 {
            let max_files = self.config.max_files as usize;
            while files.len() > max_files {
                let (path, _) = files.remove(0);
                self.delete(&path, metrics);
            }
        }

        if let Some(max_age) = self.config.max_age {
            if max_age > Duration::ZERO {
                let now = std::time::SystemTime::now();
                files.retain(|(path, _)| {
                    let keep = match std::fs::metadata(path).and_then(|m| m.modified()) {
                        Ok(modified) => now.duration_since(modified).map(|age| age <= max_age).unwrap_or(true),
                        Err(_) => true,
                    };
                    if !keep {
                        self.delete(path, metrics);
                    }
                    keep
                });
            }
        }

        Ok(())
    }

    fn delete(&self, path: &Path, metrics: &Metrics) {
        if let Err(e) = std::fs::remove_file(path) {
            metrics.report_error(
                ErrorRecord::new(ErrorSource::Rotate, path.display().to_string(), e.to_string())
                    .with_severity(crate::error::Severity::Low),
            );
        }
    }

    fn list_rotated_files(&self) -> std::io::Result<Vec<(PathBuf, String)>> {
        let dir = self.base_path.parent().unwrap_or_else(|| Path::new("."));
        let base_name = self.base_path.file_name().unwrap_or_default().to_string_lossy().into_owned();
        let prefix = format!("{base_name}.");

        let mut out = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(suffix) = name.strip_prefix(&prefix) {
                out.push((entry.path(), suffix.to_string()));
            }
        }
        Ok(out)
    }
}
