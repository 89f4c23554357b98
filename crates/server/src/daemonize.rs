// SPDX-License-Identifier: MIT
//! Double-fork daemonization, gated behind the `-d` flag: `fork`, detach
//! the session, redirect stdio to `/dev/null`, `fork` again to shed
//! session leadership.
//!
//! `fork()` is the one place in this crate where the workspace-wide
//! `unsafe_code = "forbid"` lint is relaxed (spec §4.9). Forking hands back
//! two threads of control sharing one heap, and most of the standard
//! library — the allocator, `tracing`'s thread-locals — gives no guarantee
//! about surviving that split between the two returns of `fork`. Calling
//! this before any other thread, mutex, or logger has been set up is what
//! makes it sound here: the process is still single-threaded, so there is
//! nothing mid-acquisition for the child to inherit in a broken state.

#![allow(unsafe_code)]

use std::path::Path;

use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use nix::unistd::{chdir, close, dup2, fork, setsid, ForkResult};

use crate::error::ServerError;

/// Runs the fork/setsid/chdir/stdio-redirect/fork dance described in spec
/// §4.9. Only the grandchild returns `Ok(())` from this function; the
/// original process and the intermediate child both exit directly,
/// matching the original's `daemonize()`.
pub fn daemonize() -> Result<(), ServerError> {
    match first_fork()? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    setsid().map_err(|e| ServerError::System(format!("setsid(): {e}")))?;
    chdir("/").map_err(|e| ServerError::System(format!("chdir(/): {e}")))?;
    redirect_stdio_to_dev_null()?;

    match second_fork()? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => Ok(()),
    }
}

fn first_fork() -> Result<ForkResult, ServerError> {
    // SAFETY: called as the very first thing in `main`, before the pool,
    // the acceptor, or any background thread exists — single-threaded.
    unsafe { fork() }.map_err(|e| ServerError::System(format!("fork(): {e}")))
}

fn second_fork() -> Result<ForkResult, ServerError> {
    // SAFETY: the intermediate child above has not spawned any thread
    // either; still single-threaded at this point.
    unsafe { fork() }.map_err(|e| ServerError::System(format!("fork(): {e}")))
}

fn redirect_stdio_to_dev_null() -> Result<(), ServerError> {
    let devnull = open(Path::new("/dev/null"), OFlag::O_RDWR, Mode::empty())
        .map_err(|e| ServerError::System(format!("open(/dev/null): {e}")))?;

    for fd in 0..=2 {
        dup2(devnull, fd).map_err(|e| ServerError::System(format!("dup2({fd}): {e}")))?;
    }
    if devnull > 2 {
        close(devnull).map_err(|e| ServerError::System(format!("close(/dev/null fd): {e}")))?;
    }
    Ok(())
}
