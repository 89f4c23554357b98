// SPDX-License-Identifier: MIT
//! Process-wide run flag, the Rust analogue of the original's
//! `volatile sig_atomic_t RUN`.
//!
//! `signal_hook::flag::register` is exactly the "write one atomic from a
//! signal context" primitive spec §9 calls for — already audited and
//! already async-signal-safe, so there is no reason to hand-roll a
//! `sigaction` wrapper over raw `libc`/`nix` the way a from-scratch
//! C-to-Rust port might. The handler performs no I/O and no logging (spec
//! §7/§8): the "Caught signal, exiting" line is logged once by the
//! acceptor loop on the first iteration where it observes the flag has
//! flipped, never from within the signal context itself.

#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use signal_hook::consts::{SIGINT, SIGTERM};

use crate::error::ServerError;

/// The process-wide shutdown sentinel. Clones share the same underlying
/// flag, so any clone observes a signal handled through any other.
#[derive(Clone)]
pub struct RunFlag {
    shutdown: Arc<AtomicBool>,
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl RunFlag {
    pub fn new() -> Self {
        Self { shutdown: Arc::new(AtomicBool::new(false)) }
    }

    /// Installs the shared handler for `SIGINT` and `SIGTERM`. Must be
    /// called once, before the acceptor loop starts.
    pub fn install(&self) -> Result<(), ServerError> {
        for signal in [SIGTERM, SIGINT] {
            signal_hook::flag::register(signal, Arc::clone(&self.shutdown))
                .map_err(|e| ServerError::System(format!("sigaction: {e}")))?;
        }
        Ok(())
    }

    /// `true` until a signal has been observed.
    pub fn is_running(&self) -> bool {
        !self.shutdown.load(Ordering::Relaxed)
    }

    /// Requests shutdown without an actual signal — used by tests and by
    /// any caller driving the same teardown path programmatically.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Blocks for up to `timeout`, waking early and returning as soon as
    /// the flag flips. Polls in short slices instead of a single
    /// uncancellable `sleep` — the practical, testable version of spec
    /// §9's "a condition-variable wait bounded by 10s" refinement over the
    /// original's `sleep(10)` (see DESIGN.md for why a poll loop stands in
    /// for an actual `Condvar`: the flag this waits on is only ever set
    /// from a signal handler, which cannot safely notify a condvar).
    pub fn wait_timeout(&self, timeout: Duration) {
        const POLL_INTERVAL: Duration = Duration::from_millis(100);
        let mut waited = Duration::ZERO;
        while waited < timeout {
            if !self.is_running() {
                return;
            }
            let step = POLL_INTERVAL.min(timeout - waited);
            thread::sleep(step);
            waited += step;
        }
    }
}
