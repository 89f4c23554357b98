// SPDX-License-Identifier: MIT
//! Uniform error taxonomy for the server binary, mirroring the teacher's
//! per-crate-boundary `thiserror` enums (`LifecycleError`, `WalError`,
//! `SnapshotError`) with `#[from]` conversions at each seam.

use thiserror::Error;

/// Errors that can abort startup or a top-level server operation.
///
/// Per spec §7: a failure here becomes a non-zero process exit, logged
/// once in `main`. Nothing at this level ever aborts a single connection —
/// connection-level failures are handled and logged inside
/// [`crate::connection::handle_connection`] without reaching here.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] aesd_store::StoreError),

    #[error("pool error: {0}")]
    Pool(#[from] aesd_pool::PoolError),

    #[error("system call failed: {0}")]
    System(String),
}
