//! # Out-of-band payload channel.
//!
//! Job descriptions can be far larger than an argument vector comfortably
//! carries, so the worker receives only its job's **name** and the payload's
//! **byte length** on argv and reads the document itself from a named
//! segment published here before the process is created.
//!
//! ## Ordering contract
//! ```text
//! publish(name, bytes) ──► spawn(worker) ──► worker reads locate(name)
//! ```
//! `publish` returns only after the segment is fully written, so the worker
//! can never observe a partial document.
//!
//! The transport is deliberately abstract: [`ShmChannel`] backs it with a
//! file under a shared-memory directory (`/dev/shm` in production), and a
//! temp-directory channel serves tests the same way.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Named handoff of job description bytes to worker processes.
pub trait PayloadChannel: Send + Sync + 'static {
    /// Publishes `bytes` under `name`, replacing any previous payload.
    ///
    /// The segment is complete when this returns.
    fn publish(&self, name: &str, bytes: &[u8]) -> io::Result<()>;

    /// Removes the segment for `name`. A missing segment is not an error.
    fn remove(&self, name: &str) -> io::Result<()>;

    /// Path a worker reads the payload from.
    fn locate(&self, name: &str) -> PathBuf;
}

/// Payload channel backed by files in a shared-memory directory.
///
/// With the default root of `/dev/shm` the segment is a POSIX shared-memory
/// object in everything but API: workers open it by name and read exactly
/// the advertised number of bytes.
#[derive(Debug, Clone)]
pub struct ShmChannel {
    root: PathBuf,
}

impl ShmChannel {
    /// Creates a channel rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl PayloadChannel for ShmChannel {
    fn publish(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;
        fs::write(self.locate(name), bytes)
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        match fs::remove_file(self.locate(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn locate(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_then_read_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let chan = ShmChannel::new(dir.path());

        let doc = br#"{"name": "cam1", "is_live": true}"#;
        chan.publish("cam1", doc).expect("publish");

        let read = fs::read(chan.locate("cam1")).expect("read");
        assert_eq!(read, doc);
    }

    #[test]
    fn test_publish_replaces_previous_payload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let chan = ShmChannel::new(dir.path());

        chan.publish("cam1", b"old").expect("publish");
        chan.publish("cam1", b"new-longer-payload").expect("publish");
        let read = fs::read(chan.locate("cam1")).expect("read");
        assert_eq!(read, b"new-longer-payload");
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let chan = ShmChannel::new(dir.path());

        chan.publish("cam1", b"doc").expect("publish");
        chan.remove("cam1").expect("remove");
        assert!(!chan.locate("cam1").exists());
        chan.remove("cam1").expect("second remove is a no-op");
    }
}
