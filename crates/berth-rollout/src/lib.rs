//! berth-rollout: reconciles a desired snapshot onto the cluster.
//!
//! The reconciler owns no durable state. It is handed a snapshot (image,
//! instances, environment, mounted configurations, routes, generation stamp),
//! creates or updates the deployment, converges the ingresses, and waits for
//! readiness within a bounded timeout.
//!
//! # Components
//!
//! - **`controller`**: rollout phase tracking for one readiness wait
//! - **`reconciler`**: cluster-facing apply/wait/teardown

pub mod controller;
pub mod error;
pub mod reconciler;

pub use controller::{Rollout, RolloutPhase};
pub use error::{ReconcileError, ReconcileResult};
pub use reconciler::{DesiredSnapshot, Reconciler};
