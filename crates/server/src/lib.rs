// SPDX-License-Identifier: MIT
//! `aesdsocket`: a long-running TCP append-and-echo server built on the
//! dynamic thread pool in `aesd-pool` and the append-only store in
//! `aesd-store`.
//!
//! The binary entry point (`src/main.rs`) is a thin shell around
//! [`run`]: parse `-d`, resolve [`ServerConfig`], initialize logging,
//! optionally daemonize, then hand off to this crate.

// Crate-wide default is "deny" rather than "forbid", specifically so
// `daemonize.rs` can locally re-allow `unsafe_code` for its audited
// `fork()` call; see that module's doc comment.
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod acceptor;
pub mod config;
#[cfg(unix)]
pub mod daemonize;
pub mod error;
pub mod framing;
pub mod signal;
pub mod ticker;

mod connection;

use std::net::TcpListener;
use std::sync::Arc;

use aesd_pool::Pool;
use aesd_store::AppendStore;
use parking_lot::Mutex;

pub use config::ServerConfig;
pub use error::ServerError;
pub use signal::RunFlag;

/// Runs the server to completion: binds the listener, starts the pool and
/// the timestamp ticker, runs the acceptor loop until `run_flag` clears,
/// then tears everything down (spec §4.8's `main` teardown sequence:
/// destroy the pool, drop the file mutex, delete the store file, drop the
/// listener).
pub fn run(config: ServerConfig, run_flag: RunFlag) -> Result<(), ServerError> {
    let listener = TcpListener::bind(&config.listen_addr)?;
    tracing::info!(addr = %config.listen_addr, "socket bound successfully");

    let store = Arc::new(AppendStore::new(&config.store_path));
    let file_lock = Arc::new(Mutex::new(()));
    let pool = Pool::new();

    // The ticker is dispatched into the pool just like a connection
    // handler (spec §4.7), so its own entry is what keeps `live_count()`
    // non-empty for as long as it runs — `Pool::shutdown` joins it along
    // with every other worker once the acceptor loop below has stopped.
    {
        let ticker_pool = pool.clone();
        let store = Arc::clone(&store);
        let file_lock = Arc::clone(&file_lock);
        let run_flag = run_flag.clone();
        let interval = config.timestamp_interval;
        pool.dispatch(move || ticker::run_ticker(ticker_pool, store, file_lock, interval, run_flag))?;
    }

    let acceptor_result =
        acceptor::run_acceptor(listener, pool.clone(), Arc::clone(&store), Arc::clone(&file_lock), run_flag.clone());

    if !run_flag.is_running() {
        tracing::info!("Caught signal, exiting");
    }

    pool.shutdown();

    if let Err(e) = store.remove() {
        tracing::warn!(error = %e, "failed to remove store file at shutdown");
    }

    acceptor_result?;
    Ok(())
}
