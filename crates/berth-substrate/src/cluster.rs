//! Cluster substrate contract.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use berth_core::AppRef;

use crate::BoxFuture;
use crate::error::ClusterResult;

/// Desired workload, as handed to the cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentSpec {
    pub app: AppRef,
    /// Cluster resource name (see [`AppRef::resource_name`]).
    pub name: String,
    pub image: String,
    pub replicas: u32,
    pub environment: BTreeMap<String, String>,
    /// Configuration names mounted into the pods.
    pub configurations: Vec<String>,
    pub app_chart: String,
    /// User on whose behalf the rollout happens.
    pub user: String,
    pub stage_id: Option<String>,
    /// Forces a new rollout when nothing else changed.
    pub generation: Option<u64>,
}

/// Observed rollout state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentStatus {
    pub desired: u32,
    pub ready: u32,
}

impl DeploymentStatus {
    pub fn is_ready(&self) -> bool {
        self.ready == self.desired
    }
}

/// One route of an application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngressSpec {
    pub app: AppRef,
    /// Cluster resource name (see [`AppRef::route_resource_name`]).
    pub name: String,
    /// Host with optional path, e.g. `app.example.org/api`.
    pub route: String,
    /// Deployment the route points at.
    pub backend: String,
}

/// Credential secret backing a provisioned service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Secret {
    pub name: String,
    pub data: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

/// Primitive cluster operations the control plane consumes.
///
/// Implementations must be idempotent where the name says so:
/// `*_delete` of an absent object returns `Ok(false)`.
pub trait Cluster: Send + Sync {
    fn deployment_exists<'a>(&'a self, namespace: &'a str, name: &'a str)
    -> BoxFuture<'a, ClusterResult<bool>>;

    fn deployment_create<'a>(&'a self, spec: &'a DeploymentSpec) -> BoxFuture<'a, ClusterResult<()>>;

    fn deployment_update<'a>(&'a self, spec: &'a DeploymentSpec) -> BoxFuture<'a, ClusterResult<()>>;

    fn deployment_delete<'a>(&'a self, namespace: &'a str, name: &'a str)
    -> BoxFuture<'a, ClusterResult<bool>>;

    /// `None` when no such deployment exists.
    fn deployment_status<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, ClusterResult<Option<DeploymentStatus>>>;

    /// Create or replace the ingress for one route.
    fn ingress_create<'a>(&'a self, spec: &'a IngressSpec) -> BoxFuture<'a, ClusterResult<()>>;

    fn ingress_delete<'a>(&'a self, namespace: &'a str, name: &'a str)
    -> BoxFuture<'a, ClusterResult<bool>>;

    fn pvc_exists<'a>(&'a self, namespace: &'a str, name: &'a str) -> BoxFuture<'a, ClusterResult<bool>>;

    fn pvc_create<'a>(&'a self, namespace: &'a str, name: &'a str) -> BoxFuture<'a, ClusterResult<()>>;

    fn pvc_delete<'a>(&'a self, namespace: &'a str, name: &'a str) -> BoxFuture<'a, ClusterResult<bool>>;

    /// Provision a catalog offering; the substrate creates its credential secrets.
    fn service_provision<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
        catalog_service: &'a str,
    ) -> BoxFuture<'a, ClusterResult<()>>;

    fn service_deprovision<'a>(&'a self, namespace: &'a str, name: &'a str)
    -> BoxFuture<'a, ClusterResult<bool>>;

    /// Credential secrets belonging to a provisioned service.
    fn service_secrets<'a>(
        &'a self,
        namespace: &'a str,
        service: &'a str,
    ) -> BoxFuture<'a, ClusterResult<Vec<Secret>>>;

    /// Merge labels into a secret.
    fn secret_label<'a>(
        &'a self,
        namespace: &'a str,
        secret: &'a str,
        labels: &'a BTreeMap<String, String>,
    ) -> BoxFuture<'a, ClusterResult<()>>;
}
