//! Registry error types.

use thiserror::Error;

use berth_core::{EntityKind, NameError};
use berth_state::StateError;
use berth_substrate::ClusterError;

/// Errors raised by the registry, configuration store, and ledger.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: EntityKind, name: String },

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: EntityKind, name: String },

    #[error(transparent)]
    InvalidName(#[from] NameError),

    /// Several independent validation failures, reported together.
    #[error("{}", join_messages(.0))]
    Multi(Vec<RegistryError>),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),
}

impl RegistryError {
    pub fn not_found(kind: EntityKind, name: impl Into<String>) -> Self {
        RegistryError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn already_exists(kind: EntityKind, name: impl Into<String>) -> Self {
        RegistryError::AlreadyExists {
            kind,
            name: name.into(),
        }
    }
}

fn join_messages(errors: &[RegistryError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type RegistryResult<T> = Result<T, RegistryError>;
