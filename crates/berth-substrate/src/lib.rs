//! berth-substrate: the black-box operations the control plane consumes.
//!
//! The orchestrator never talks to a cluster or a build system directly. It
//! goes through two object-safe traits:
//!
//! - **[`Cluster`]**: deployments, ingresses, build-cache volumes, service
//!   provisioning, and service credential secrets.
//! - **[`Stager`]**: submits a staging run and waits for its image.
//!
//! Both return boxed futures so they can live behind `Arc<dyn …>` and be
//! swapped for a real backend. [`memory`] provides in-process
//! implementations used by standalone mode and tests; they record every call
//! in an event journal and support fault injection.

pub mod cluster;
pub mod error;
pub mod memory;
pub mod stager;

use std::future::Future;
use std::pin::Pin;

pub use cluster::{Cluster, DeploymentSpec, DeploymentStatus, IngressSpec, Secret};
pub use error::{ClusterError, ClusterResult, StagerError, StagerResult};
pub use memory::{ClusterEvent, ClusterOp, MemoryCluster, MemoryStager, StagerEvent};
pub use stager::{CacheHandle, Stager, StagingRequest};

/// Boxed, `Send` future returned by substrate operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
