//! Staging pipeline error types.

use thiserror::Error;

use berth_core::AppRef;
use berth_substrate::{ClusterError, StagerError};

#[derive(Debug, Error)]
pub enum StageError {
    /// The origin cannot be built (container image, or no origin at all).
    #[error("application {app} has a {kind} origin and cannot be staged")]
    NotStageable { app: AppRef, kind: &'static str },

    #[error("build cache error: {0}")]
    Cache(#[from] ClusterError),

    #[error(transparent)]
    Stager(#[from] StagerError),

    /// The caller stopped waiting; the run keeps going.
    #[error("staging run {run_id} wait cancelled")]
    Cancelled { run_id: String },
}

pub type StageResult<T> = Result<T, StageError>;
