//! # Size-triggered log rotation tied to process signaling.
//!
//! A log file that grows past the size threshold is renamed to
//! `<base>-<unix-seconds>` and the owning process receives SIGUSR1, the
//! conventional "reopen your log file" request the worker contract
//! documents. Rotations beyond the retention count are pruned, oldest
//! first.
//!
//! ## Rules
//! - A crossing rotates exactly once: after the rename the base path is
//!   absent until the owner reopens it, so the next tick sees no file.
//! - Exactly one reopen signal per rotation.
//! - At most `retention` rotated files remain per base path.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::{info, warn};

use crate::events::{Bus, Event, EventKind};

/// Rotates `path` if it exceeds `max_size`, signaling `pid` to reopen.
///
/// Missing files and I/O failures are logged and skipped; rotation is
/// best-effort maintenance, never fatal.
pub(crate) fn rotate_log(path: &Path, pid: u32, max_size: u64, retention: usize, bus: &Bus) {
    let size = match fs::metadata(path) {
        Ok(md) => md.len(),
        Err(_) => return,
    };
    if size <= max_size {
        return;
    }

    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let rotated = rotated_name(path, stamp);
    if let Err(e) = fs::rename(path, &rotated) {
        warn!(path = %path.display(), error = %e, "log rotation rename failed");
        return;
    }
    info!(path = %path.display(), pid, "log rotated");
    bus.publish(Event::now(EventKind::LogRotated).with_path(path).with_pid(pid));

    if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGUSR1) {
        warn!(pid, error = %e, "log reopen signal failed");
    }

    if let Err(e) = prune_rotations(path, retention) {
        warn!(path = %path.display(), error = %e, "pruning rotated logs failed");
    }
}

/// `<base>-<stamp>` in the same directory.
fn rotated_name(path: &Path, stamp: u64) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!("-{stamp}"));
    path.with_file_name(name)
}

/// Deletes the oldest rotations of `path` beyond `retention`.
///
/// Rotation suffixes are unix seconds of equal width, so lexicographic
/// order is chronological order.
pub(crate) fn prune_rotations(path: &Path, retention: usize) -> io::Result<()> {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    let base = match path.file_name().and_then(|n| n.to_str()) {
        Some(b) => b,
        None => return Ok(()),
    };
    let prefix = format!("{base}-");

    let mut rotated: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            if name.starts_with(&prefix) {
                rotated.push(entry.path());
            }
        }
    }
    rotated.sort();

    if rotated.len() > retention {
        let excess = rotated.len() - retention;
        for old in &rotated[..excess] {
            fs::remove_file(old)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_small_file_is_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = dir.path().join("streamvisor.log");
        fs::write(&log, b"short").expect("write");

        let bus = Bus::new(8);
        rotate_log(&log, std::process::id(), 1024, 3, &bus);
        assert!(log.exists());
        assert_eq!(fs::read_dir(dir.path()).expect("dir").count(), 1);
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bus = Bus::new(8);
        rotate_log(&dir.path().join("absent.log"), std::process::id(), 1024, 3, &bus);
    }

    #[test]
    fn test_prune_keeps_newest_rotations() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = dir.path().join("streamvisor.log");
        for stamp in [1_700_000_001u64, 1_700_000_002, 1_700_000_003, 1_700_000_004] {
            fs::write(rotated_name(&log, stamp), b"old").expect("write");
        }

        prune_rotations(&log, 2).expect("prune");
        assert!(!rotated_name(&log, 1_700_000_001).exists());
        assert!(!rotated_name(&log, 1_700_000_002).exists());
        assert!(rotated_name(&log, 1_700_000_003).exists());
        assert!(rotated_name(&log, 1_700_000_004).exists());
    }

    #[tokio::test]
    async fn test_oversized_log_rotates_and_signals_owner() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = dir.path().join("streamvisor.log");
        fs::write(&log, vec![b'x'; 2048]).expect("write");

        // A throwaway child stands in for the log's owner; SIGUSR1's default
        // disposition terminates it, which proves delivery.
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .expect("spawn sleep");
        let pid = child.id().expect("pid");

        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        rotate_log(&log, pid, 1024, 3, &bus);

        assert!(!log.exists(), "base path must be renamed away");
        let rotations = fs::read_dir(dir.path())
            .expect("dir")
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .is_some_and(|n| n.starts_with("streamvisor.log-"))
            })
            .count();
        assert_eq!(rotations, 1);

        let ev = rx.recv().await.expect("event");
        assert_eq!(ev.kind, EventKind::LogRotated);
        assert_eq!(ev.pid, Some(pid));

        let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
            .await
            .expect("child exits")
            .expect("wait");
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(status.signal(), Some(Signal::SIGUSR1 as i32));
    }
}
