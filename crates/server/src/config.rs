// SPDX-License-Identifier: MIT
//! Server configuration resolved once at startup from environment
//! variables, modeled on the teacher daemon's `crates/daemon/src/env.rs`.
//!
//! This exists so the integration suite in `tests/specs.rs` can run many
//! server instances concurrently without colliding on the default store
//! path or port (spec's observable defaults are otherwise unchanged).

use std::path::PathBuf;
use std::time::Duration;

/// Default bind address, matching spec §6's observable default.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:9000";

/// Default store path, matching spec §6.
pub const DEFAULT_STORE_PATH: &str = "/var/tmp/aesdsocketdata";

/// Default timestamp ticker period, matching spec §4.7.
pub const DEFAULT_TIMESTAMP_INTERVAL_MS: u64 = 10_000;

/// Resolved server configuration, threaded into the acceptor, connection
/// handlers, and ticker instead of being re-read per call.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub store_path: PathBuf,
    pub timestamp_interval: Duration,
    pub daemonize: bool,
}

impl ServerConfig {
    /// Resolves configuration from the environment. `daemonize` comes from
    /// CLI argument parsing rather than the environment — it is the one
    /// knob spec §6 puts on the command line (`-d`).
    pub fn from_env(daemonize: bool) -> Self {
        Self {
            listen_addr: parse_listen_addr(std::env::var("AESD_LISTEN_ADDR").ok()),
            store_path: parse_store_path(std::env::var("AESD_STORE_PATH").ok()),
            timestamp_interval: parse_timestamp_interval(
                std::env::var("AESD_TIMESTAMP_INTERVAL_MS").ok(),
            ),
            daemonize,
        }
    }

    /// Log filter directive, forwarded to `tracing_subscriber::EnvFilter`.
    pub fn log_filter() -> String {
        std::env::var("AESD_LOG").unwrap_or_else(|_| "info".to_string())
    }
}

fn parse_listen_addr(value: Option<String>) -> String {
    value.unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
}

fn parse_store_path(value: Option<String>) -> PathBuf {
    value.map(PathBuf::from).unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH))
}

fn parse_timestamp_interval(value: Option<String>) -> Duration {
    value
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_millis(DEFAULT_TIMESTAMP_INTERVAL_MS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        unset = { None, DEFAULT_LISTEN_ADDR },
        overridden = { Some("127.0.0.1:9100".to_string()), "127.0.0.1:9100" },
    )]
    fn listen_addr_resolution(input: Option<String>, expected: &str) {
        assert_eq!(parse_listen_addr(input), expected);
    }

    #[parameterized(
        unset = { None, DEFAULT_STORE_PATH },
        overridden = { Some("/tmp/store-under-test".to_string()), "/tmp/store-under-test" },
    )]
    fn store_path_resolution(input: Option<String>, expected: &str) {
        assert_eq!(parse_store_path(input), PathBuf::from(expected));
    }

    #[parameterized(
        unset = { None, DEFAULT_TIMESTAMP_INTERVAL_MS },
        overridden = { Some("250".to_string()), 250 },
        unparseable_falls_back_to_default = { Some("not-a-number".to_string()), DEFAULT_TIMESTAMP_INTERVAL_MS },
    )]
    fn timestamp_interval_resolution(input: Option<String>, expected_ms: u64) {
        assert_eq!(parse_timestamp_interval(input), Duration::from_millis(expected_ms));
    }
}
