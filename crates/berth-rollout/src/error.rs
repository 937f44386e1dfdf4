//! Reconciler error types.

use std::time::Duration;

use thiserror::Error;

use berth_core::AppRef;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("deploy of {app} failed: {reason}")]
    DeployFailed { app: AppRef, reason: String },

    /// The workload may still become ready later.
    #[error("{app} not ready within {timeout:?}")]
    NotReadyInTime { app: AppRef, timeout: Duration },

    #[error("wait for {app} cancelled")]
    Cancelled { app: AppRef },

    #[error("teardown of {app} incomplete: {reason}")]
    TeardownFailed { app: AppRef, reason: String },
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
