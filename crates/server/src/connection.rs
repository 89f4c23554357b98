// SPDX-License-Identifier: MIT
//! Per-client protocol handler: runs on a pool worker, frames the inbound
//! stream on `\n`, appends each completed record to the store, then
//! replies with the store's full current contents.
//!
//! Exactly one record is handled per connection — after the first
//! newline the connection closes (spec §4.5). This single-record-per-
//! connection semantics is load-bearing for the protocol's testable
//! properties and must not change without updating the integration suite
//! alongside it.

#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::io::Read;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;

use aesd_store::AppendStore;
use parking_lot::Mutex;

use crate::framing::FramingBuffer;
use crate::signal::RunFlag;

/// Size of the per-read stage buffer, matching the original's
/// `BUFFER_SIZE`.
const STAGE_BUFFER_SIZE: usize = 1024;

/// Handles one accepted connection to completion. Never panics across the
/// pool worker boundary and never terminates the process — any I/O
/// failure here results only in this connection's teardown (spec §7).
pub fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    store: Arc<AppendStore>,
    file_lock: Arc<Mutex<()>>,
    run_flag: RunFlag,
) {
    let addr = peer.to_string();
    let mut framing = FramingBuffer::new();
    let mut stage = [0u8; STAGE_BUFFER_SIZE];
    let mut closed_gracefully = false;

    'outer: while run_flag.is_running() {
        let bytes_read = match stream.read(&mut stage) {
            Ok(0) => {
                closed_gracefully = true;
                break;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(addr = %addr, error = %e, "connection read failed, tearing down");
                return;
            }
        };

        for &byte in &stage[..bytes_read] {
            match framing.feed(byte) {
                Ok(None) => {}
                Ok(Some(record)) => {
                    let _file_guard = file_lock.lock();
                    if let Err(e) = store.append(&record) {
                        tracing::warn!(addr = %addr, error = %e, "failed to append record");
                        return;
                    }
                    if let Err(e) = store.send_snapshot(&mut stream) {
                        tracing::warn!(addr = %addr, error = %e, "failed to send snapshot");
                        return;
                    }
                    drop(_file_guard);
                    closed_gracefully = true;
                    break 'outer;
                }
                Err(e) => {
                    tracing::warn!(addr = %addr, error = %e, "tearing down oversized connection");
                    return;
                }
            }
        }
    }

    if closed_gracefully {
        tracing::info!("Closed connection from {addr}");
    }
    let _ = stream.shutdown(std::net::Shutdown::Both);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    use aesd_store::AppendStore;
    use tempfile::tempdir;

    fn spawn_handler(
        listener: TcpListener,
        store: Arc<AppendStore>,
    ) -> thread::JoinHandle<()> {
        let file_lock = Arc::new(Mutex::new(()));
        let run_flag = RunFlag::new();
        thread::spawn(move || {
            let (stream, peer) = listener.accept().unwrap();
            handle_connection(stream, peer, store, file_lock, run_flag);
        })
    }

    #[test]
    fn single_record_round_trips_through_the_store() {
        let dir = tempdir().unwrap();
        let store = Arc::new(AppendStore::new(dir.path().join("data")));

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handler = spawn_handler(listener, Arc::clone(&store));

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"hello\n").unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).unwrap();
        handler.join().unwrap();

        assert_eq!(reply, b"hello\n");
        assert_eq!(std::fs::read(store.path()).unwrap(), b"hello\n");
    }

    #[test]
    fn reply_reflects_prior_store_contents_ahead_of_the_new_record() {
        let dir = tempdir().unwrap();
        let store = Arc::new(AppendStore::new(dir.path().join("data")));
        store.append(b"earlier\n").unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handler = spawn_handler(listener, Arc::clone(&store));

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"later\n").unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).unwrap();
        handler.join().unwrap();

        assert_eq!(reply, b"earlier\nlater\n");
    }

    #[test]
    fn client_closing_without_a_newline_writes_no_record() {
        let dir = tempdir().unwrap();
        let store = Arc::new(AppendStore::new(dir.path().join("data")));

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handler = spawn_handler(listener, Arc::clone(&store));

        let client = TcpStream::connect(addr).unwrap();
        drop(client);
        handler.join().unwrap();

        assert!(!store.path().exists());
    }
}
