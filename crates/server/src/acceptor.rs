// SPDX-License-Identifier: MIT
//! Single-threaded acceptor loop: binds, listens, accepts, and dispatches
//! a connection handler per accepted socket (spec §4.6).
//!
//! The listener is put in non-blocking mode and polled on a short
//! interval rather than left in a blocking `accept()` call. Rust's
//! standard library retries `EINTR` internally for `accept()`, unlike the
//! original C program (which installs its signal handler with no
//! `SA_RESTART`, so a blocked `accept()` is interrupted directly) — a
//! blocking accept here would not reliably notice a flipped run flag
//! until the next connection arrived. Polling a non-blocking listener
//! gets the same "shutdown observed at the next I/O boundary" contract
//! without depending on syscall-interrupt semantics std does not expose
//! control over (see DESIGN.md).

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use aesd_pool::Pool;
use aesd_store::AppendStore;
use parking_lot::Mutex;

use crate::connection::handle_connection;
use crate::signal::RunFlag;

/// How often the acceptor polls a non-blocking listener for a pending
/// connection while otherwise idle.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs the acceptor loop until `run_flag` is cleared. Returns once the
/// loop has exited so `main` can proceed to tear the pool down.
pub fn run_acceptor(
    listener: TcpListener,
    pool: Pool,
    store: Arc<AppendStore>,
    file_lock: Arc<Mutex<()>>,
    run_flag: RunFlag,
) -> std::io::Result<()> {
    listener.set_nonblocking(true)?;

    while run_flag.is_running() {
        match listener.accept() {
            Ok((stream, peer)) => {
                let addr = peer.to_string();
                tracing::info!("Accepted connection from {addr}");

                let store = Arc::clone(&store);
                let file_lock = Arc::clone(&file_lock);
                let run_flag = run_flag.clone();
                let dispatched = pool.dispatch(move || {
                    handle_connection(stream, peer, store, file_lock, run_flag);
                });
                if let Err(e) = dispatched {
                    tracing::warn!(addr = %addr, error = %e, "failed to dispatch connection handler");
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                if !run_flag.is_running() {
                    break;
                }
                tracing::warn!(error = %e, "accept() failed, continuing");
            }
        }
    }

    Ok(())
}
