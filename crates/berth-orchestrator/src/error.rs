//! Orchestrator error types.

use std::time::Duration;

use thiserror::Error;

use berth_core::{EntityKind, NameError};
use berth_registry::RegistryError;
use berth_rollout::ReconcileError;
use berth_stage::StageError;
use berth_state::StateError;
use berth_substrate::ClusterError;

/// Errors returned by lifecycle operations.
///
/// Validation failures (`NotFound`, `AlreadyExists`, `BadRequest`, `Multi`)
/// are returned before anything is written.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: EntityKind, name: String },

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: EntityKind, name: String },

    #[error("{0}")]
    BadRequest(String),

    /// Independent validation failures, reported together.
    #[error("{}", join_messages(.0))]
    Multi(Vec<OrchestratorError>),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("staging failed: {0}")]
    StagingFailed(String),

    #[error("deploy failed: {0}")]
    DeployFailed(String),

    /// The workload may still become ready later.
    #[error("application '{app}' not ready within {timeout:?}")]
    NotReadyInTime { app: String, timeout: Duration },

    /// The caller stopped waiting; the external job keeps going.
    #[error("operation cancelled")]
    Cancelled,

    /// Delete removed the bindings but the workload is still (partly) there.
    /// The record is kept; repeating the delete finishes the job.
    #[error("teardown of {app} incomplete ({reason}); unbound configurations: [{}]", unbound.join(", "))]
    TeardownIncomplete {
        app: String,
        reason: String,
        unbound: Vec<String>,
    },

    /// A multi-step write failed and undoing its earlier steps failed too.
    /// Re-issuing the operation converges.
    #[error("{operation} failed ({cause}) and could not be undone: {}", leftover.join(", "))]
    Inconsistent {
        operation: String,
        cause: String,
        leftover: Vec<String>,
    },
}

impl OrchestratorError {
    pub fn not_found(kind: EntityKind, name: impl Into<String>) -> Self {
        OrchestratorError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        OrchestratorError::BadRequest(message.into())
    }

    /// Whether the caller can fix this by changing the request.
    pub fn is_client_error(&self) -> bool {
        match self {
            OrchestratorError::NotFound { .. }
            | OrchestratorError::AlreadyExists { .. }
            | OrchestratorError::BadRequest(_) => true,
            OrchestratorError::Multi(errors) => errors.iter().all(Self::is_client_error),
            _ => false,
        }
    }
}

fn join_messages(errors: &[OrchestratorError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<RegistryError> for OrchestratorError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound { kind, name } => OrchestratorError::NotFound { kind, name },
            RegistryError::AlreadyExists { kind, name } => {
                OrchestratorError::AlreadyExists { kind, name }
            }
            RegistryError::InvalidName(e) => e.into(),
            RegistryError::Multi(errors) => {
                OrchestratorError::Multi(errors.into_iter().map(Into::into).collect())
            }
            RegistryError::State(e) => e.into(),
            RegistryError::Cluster(e) => e.into(),
        }
    }
}

impl From<StageError> for OrchestratorError {
    fn from(e: StageError) -> Self {
        match e {
            StageError::NotStageable { .. } => OrchestratorError::BadRequest(e.to_string()),
            StageError::Cache(e) => OrchestratorError::Internal(format!("build cache: {e}")),
            StageError::Stager(e) => OrchestratorError::StagingFailed(e.to_string()),
            StageError::Cancelled { .. } => OrchestratorError::Cancelled,
        }
    }
}

impl From<ReconcileError> for OrchestratorError {
    fn from(e: ReconcileError) -> Self {
        match e {
            ReconcileError::DeployFailed { .. } => OrchestratorError::DeployFailed(e.to_string()),
            ReconcileError::NotReadyInTime { app, timeout } => OrchestratorError::NotReadyInTime {
                app: app.name,
                timeout,
            },
            ReconcileError::Cancelled { .. } => OrchestratorError::Cancelled,
            ReconcileError::TeardownFailed { .. } => OrchestratorError::Internal(e.to_string()),
        }
    }
}

impl From<NameError> for OrchestratorError {
    fn from(e: NameError) -> Self {
        OrchestratorError::BadRequest(e.to_string())
    }
}

impl From<StateError> for OrchestratorError {
    fn from(e: StateError) -> Self {
        OrchestratorError::Internal(format!("state store: {e}"))
    }
}

impl From<ClusterError> for OrchestratorError {
    fn from(e: ClusterError) -> Self {
        OrchestratorError::Internal(format!("cluster: {e}"))
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
