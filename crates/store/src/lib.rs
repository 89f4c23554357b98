// SPDX-License-Identifier: MIT
//! Filesystem-backed append-only byte log.
//!
//! Mirrors the original `_cache()`/`_send_cache()` pair from `aesdsocket.c`:
//! every append reopens the file with `O_WRONLY|O_APPEND|O_CREAT`, every
//! snapshot read reopens it `O_RDONLY`, and nothing here holds a descriptor
//! across calls. The thing actually being serialized is the *path*, not a
//! file handle — callers are expected to hold an external lock (the file
//! mutex in `aesd-server`) across an append/snapshot pair; this crate has no
//! internal locking of its own.

#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors produced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Mode new store files are created with, matching the C original's
/// `open(writefile, O_WRONLY | O_APPEND | O_CREAT, 0644)`.
const CREATE_MODE: u32 = 0o644;

/// Buffer size used for both append-file reads during snapshot streaming,
/// matching the original's `BUFFER_SIZE`.
const BUFFER_SIZE: usize = 1024;

/// A monotonically growing byte log backed by a single file path.
#[derive(Debug, Clone)]
pub struct AppendStore {
    path: PathBuf,
}

impl AppendStore {
    /// Creates a store bound to `path`. Does not touch the filesystem —
    /// the file is created lazily by the first [`AppendStore::append`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path this store reads from and appends to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `bytes` to the store, opening the file write+append+create
    /// (mode 0644 on first creation) and closing it again before
    /// returning.
    ///
    /// A short write (the OS wrote fewer bytes than requested) is logged
    /// and *not* retried — this mirrors the original's
    /// `"partial write to %s, %d/%d bytes written"` diagnostic. The
    /// returned `Ok(actual_len)` tells the caller exactly how many bytes
    /// landed on disk so a subsequent snapshot is understood to reflect
    /// only that much.
    pub fn append(&self, bytes: &[u8]) -> Result<usize, StoreError> {
        let mut file = OpenOptions::new()
            .write(true)
            .append(true)
            .create(true)
            .mode(CREATE_MODE)
            .open(&self.path)?;

        let written = write_partial(&mut file, bytes)?;
        if written != bytes.len() {
            tracing::warn!(
                path = %self.path.display(),
                requested = bytes.len(),
                written,
                "partial write to store"
            );
        } else {
            tracing::debug!(path = %self.path.display(), written, "wrote to store");
        }

        Ok(written)
    }

    /// Streams the store's full current contents to `sink`, reopening the
    /// file read-only and reading it in fixed-size chunks. A short
    /// underlying write into `sink` is looped internally so no bytes are
    /// lost, mirroring the original's inner `total_bytes_sent` loop around
    /// `send()`.
    pub fn send_snapshot(&self, sink: &mut impl Write) -> Result<(), StoreError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut buffer = [0u8; BUFFER_SIZE];
        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            sink.write_all(&buffer[..bytes_read])?;
        }
        Ok(())
    }

    /// Deletes the store file. A missing file is not treated as an error —
    /// there is nothing to clean up — matching the original's
    /// best-effort `remove(CACHE_FILE)` at shutdown.
    pub fn remove(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove store file");
                Err(e.into())
            }
        }
    }
}

/// Writes as much of `bytes` as the OS will accept in one `write` call,
/// without looping to force a full write — a short write is a legitimate,
/// non-fatal outcome here (see [`AppendStore::append`]), unlike
/// `Write::write_all`.
fn write_partial(file: &mut File, bytes: &[u8]) -> io::Result<usize> {
    if bytes.is_empty() {
        return Ok(0);
    }
    file.write(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_creates_file_and_writes_bytes() {
        let dir = tempdir().unwrap();
        let store = AppendStore::new(dir.path().join("data"));

        let written = store.append(b"hello\n").unwrap();
        assert_eq!(written, 6);

        let contents = fs::read(store.path()).unwrap();
        assert_eq!(contents, b"hello\n");
    }

    #[test]
    fn successive_appends_accumulate_in_order() {
        let dir = tempdir().unwrap();
        let store = AppendStore::new(dir.path().join("data"));

        store.append(b"A\n").unwrap();
        store.append(b"B\n").unwrap();

        let contents = fs::read(store.path()).unwrap();
        assert_eq!(contents, b"A\nB\n");
    }

    #[test]
    fn send_snapshot_streams_full_contents() {
        let dir = tempdir().unwrap();
        let store = AppendStore::new(dir.path().join("data"));
        store.append(b"hello\n").unwrap();

        let mut sink = Vec::new();
        store.send_snapshot(&mut sink).unwrap();
        assert_eq!(sink, b"hello\n");
    }

    #[test]
    fn send_snapshot_of_nonexistent_store_is_empty() {
        let dir = tempdir().unwrap();
        let store = AppendStore::new(dir.path().join("never-written"));

        let mut sink = Vec::new();
        store.send_snapshot(&mut sink).unwrap();
        assert!(sink.is_empty());
    }

    #[test]
    fn send_snapshot_spans_multiple_read_buffers() {
        let dir = tempdir().unwrap();
        let store = AppendStore::new(dir.path().join("data"));

        let record = vec![b'x'; BUFFER_SIZE * 3 + 17];
        store.append(&record).unwrap();

        let mut sink = Vec::new();
        store.send_snapshot(&mut sink).unwrap();
        assert_eq!(sink.len(), record.len());
        assert_eq!(sink, record);
    }

    #[test]
    fn remove_of_missing_file_is_not_an_error() {
        let dir = tempdir().unwrap();
        let store = AppendStore::new(dir.path().join("never-created"));

        store.remove().unwrap();
    }

    #[test]
    fn remove_deletes_an_existing_file() {
        let dir = tempdir().unwrap();
        let store = AppendStore::new(dir.path().join("data"));
        store.append(b"x\n").unwrap();
        assert!(store.path().exists());

        store.remove().unwrap();
        assert!(!store.path().exists());
    }
}
