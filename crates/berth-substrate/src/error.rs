//! Substrate error types.

use thiserror::Error;

pub type ClusterResult<T> = Result<T, ClusterError>;

/// Failures reported by the cluster substrate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClusterError {
    #[error("cluster resource not found: {0}")]
    NotFound(String),

    #[error("cluster resource already exists: {0}")]
    Conflict(String),

    #[error("cluster rejected request: {0}")]
    Rejected(String),

    #[error("cluster unavailable: {0}")]
    Unavailable(String),
}

pub type StagerResult<T> = Result<T, StagerError>;

/// Failures reported by the staging substrate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StagerError {
    #[error("staging request rejected: {0}")]
    Rejected(String),

    #[error("staging run {run_id} failed: {reason}")]
    BuildFailed { run_id: String, reason: String },

    #[error("unknown staging run: {0}")]
    UnknownRun(String),

    #[error("staging backend unavailable: {0}")]
    Unavailable(String),
}
