// SPDX-License-Identifier: MIT
//! `aesdsocket` binary entry point: parse `-d`, optionally daemonize,
//! initialize logging, install the signal handler, then hand off to
//! [`aesd_server::run`].
//!
//! CLI parsing is a small hand-rolled argument scan rather than a full
//! argument-parsing framework (spec §6's explicit non-goal — elaborate CLI
//! surfaces are out of scope, the ambient stack below is not).

use aesd_server::{RunFlag, ServerConfig};

fn main() {
    let daemonize = parse_daemonize_flag(std::env::args().skip(1));

    // Must run before logging or any thread exists: see
    // `daemonize::daemonize`'s safety comment for why fork has to happen
    // first in this process.
    #[cfg(unix)]
    if daemonize {
        if let Err(e) = aesd_server::daemonize::daemonize() {
            eprintln!("aesdsocket: failed to daemonize: {e}");
            std::process::exit(1);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(ServerConfig::log_filter()))
        .init();

    let run_flag = RunFlag::new();
    if let Err(e) = run_flag.install() {
        tracing::error!(error = %e, "failed to install signal handler");
        std::process::exit(1);
    }

    let config = ServerConfig::from_env(daemonize);

    match aesd_server::run(config, run_flag) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            tracing::error!(error = %e, "aesdsocket exiting on error");
            std::process::exit(1);
        }
    }
}

/// Scans args for a bare `-d`, matching the original's `is_daemon` (any
/// occurrence of the flag, not strict getopt-style positioning).
fn parse_daemonize_flag<I: Iterator<Item = String>>(mut args: I) -> bool {
    args.any(|arg| arg == "-d")
}
