//! berth-orchestrator: the application lifecycle core.
//!
//! Composes the registry, binding ledger, staging pipeline and deployment
//! reconciler into the lifecycle operations: create, push, update, restage,
//! bind/unbind, environment edits, configuration replacement, delete and
//! running-wait, plus the namespace, configuration and service surfaces
//! around them.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator
//!   ├── Namespaces / ApplicationRegistry / ConfigurationStore / ServiceRecords
//!   ├── BindingLedger ── Cluster (secret labelling)
//!   ├── StagingPipeline ── Cluster (build cache) + Stager
//!   └── Reconciler ── Cluster (deployments, ingresses)
//! ```
//!
//! Every mutating operation validates first, then mutates. Whether a running
//! workload has to roll is decided in one place, [`restart::needs_restart`],
//! from the desired state before and after the mutation. Multi-step writes
//! go through a [`compensation::CompensationLog`] so that a failed later step
//! undoes the earlier ones.

pub mod bindings;
pub mod compensation;
pub mod configurations;
pub mod environment;
pub mod error;
pub mod namespaces;
pub mod orchestrator;
pub mod requests;
pub mod restart;
pub mod services;

pub use compensation::CompensationLog;
pub use configurations::ConfigurationDetails;
pub use error::{OrchestratorError, OrchestratorResult};
pub use orchestrator::{AppDetails, Orchestrator, OrchestratorSettings};
pub use requests::{CreateRequest, PushRequest, UpdateRequest};
pub use restart::{DesiredState, Restart, needs_restart};
pub use services::ServiceDetails;
