//! In-process substrates.
//!
//! `MemoryCluster` and `MemoryStager` keep their state behind a tokio
//! `RwLock`, journal every mutating call, and can be told to fail specific
//! operations or to stall rollouts/builds. Standalone mode runs on them; the
//! test suites use the journals to assert exactly which collaborator calls a
//! lifecycle operation made.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use berth_core::{AppRef, Origin, resource_name};

use crate::BoxFuture;
use crate::cluster::{Cluster, DeploymentSpec, DeploymentStatus, IngressSpec, Secret};
use crate::error::{ClusterError, ClusterResult, StagerError, StagerResult};
use crate::stager::{Stager, StagingRequest};

/// Label carried by every service credential secret.
pub const SERVICE_LABEL: &str = "berth.io/service";

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

// ── Cluster ───────────────────────────────────────────────────────

/// Cluster operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClusterOp {
    DeploymentCreate,
    DeploymentUpdate,
    DeploymentDelete,
    DeploymentStatus,
    IngressCreate,
    IngressDelete,
    PvcCreate,
    PvcDelete,
    ServiceProvision,
    ServiceDeprovision,
    ServiceSecrets,
    SecretLabel,
}

/// Journal entry for a mutating cluster call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterEvent {
    DeploymentCreated {
        namespace: String,
        name: String,
        replicas: u32,
        generation: Option<u64>,
    },
    DeploymentUpdated {
        namespace: String,
        name: String,
        replicas: u32,
        generation: Option<u64>,
    },
    DeploymentDeleted {
        namespace: String,
        name: String,
    },
    IngressCreated {
        namespace: String,
        name: String,
        route: String,
    },
    IngressDeleted {
        namespace: String,
        name: String,
    },
    PvcCreated {
        namespace: String,
        name: String,
    },
    PvcDeleted {
        namespace: String,
        name: String,
    },
    ServiceProvisioned {
        namespace: String,
        name: String,
        catalog_service: String,
    },
    ServiceDeprovisioned {
        namespace: String,
        name: String,
    },
    SecretLabeled {
        namespace: String,
        secret: String,
    },
}

impl ClusterEvent {
    /// Whether this event is a deployment create or update.
    pub fn is_rollout(&self) -> bool {
        matches!(
            self,
            ClusterEvent::DeploymentCreated { .. } | ClusterEvent::DeploymentUpdated { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Once,
    Always,
}

#[derive(Debug)]
struct StoredDeployment {
    spec: DeploymentSpec,
    ready: u32,
}

#[derive(Debug)]
struct StoredSecret {
    service: String,
    secret: Secret,
}

#[derive(Debug, Default)]
struct ClusterState {
    deployments: BTreeMap<Key, StoredDeployment>,
    ingresses: BTreeMap<Key, IngressSpec>,
    pvcs: BTreeSet<Key>,
    services: BTreeMap<Key, String>,
    secrets: BTreeMap<Key, StoredSecret>,
    /// Secret name suffixes created per catalog offering.
    catalog_secrets: BTreeMap<String, Vec<String>>,
    faults: BTreeMap<ClusterOp, Fault>,
    stalled: bool,
    events: Vec<ClusterEvent>,
}

impl ClusterState {
    fn check_fault(&mut self, op: ClusterOp) -> ClusterResult<()> {
        match self.faults.get(&op).copied() {
            Some(Fault::Always) => Err(ClusterError::Unavailable(format!("injected failure: {op:?}"))),
            Some(Fault::Once) => {
                self.faults.remove(&op);
                Err(ClusterError::Unavailable(format!("injected failure: {op:?}")))
            }
            None => Ok(()),
        }
    }

    fn ready_for(&self, replicas: u32) -> u32 {
        if self.stalled { 0 } else { replicas }
    }
}

/// In-memory cluster. Rollouts become ready immediately unless stalled.
#[derive(Clone, Default)]
pub struct MemoryCluster {
    state: Arc<RwLock<ClusterState>>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provisioning `catalog_service` creates one secret per suffix
    /// (default: a single `creds` secret).
    pub async fn set_catalog_secrets(&self, catalog_service: &str, suffixes: &[&str]) {
        let mut state = self.state.write().await;
        state.catalog_secrets.insert(
            catalog_service.to_string(),
            suffixes.iter().map(|s| s.to_string()).collect(),
        );
    }

    /// Make `op` fail until [`clear_faults`](Self::clear_faults).
    pub async fn fail(&self, op: ClusterOp) {
        self.state.write().await.faults.insert(op, Fault::Always);
    }

    /// Make the next `op` fail.
    pub async fn fail_once(&self, op: ClusterOp) {
        self.state.write().await.faults.insert(op, Fault::Once);
    }

    pub async fn clear_faults(&self) {
        self.state.write().await.faults.clear();
    }

    /// While stalled, new rollouts report zero ready replicas.
    pub async fn set_stalled(&self, stalled: bool) {
        self.state.write().await.stalled = stalled;
    }

    /// Complete a stalled rollout.
    pub async fn mark_ready(&self, namespace: &str, name: &str) {
        let mut state = self.state.write().await;
        if let Some(dep) = state.deployments.get_mut(&key(namespace, name)) {
            dep.ready = dep.spec.replicas;
        }
    }

    pub async fn events(&self) -> Vec<ClusterEvent> {
        self.state.read().await.events.clone()
    }

    pub async fn clear_events(&self) {
        self.state.write().await.events.clear();
    }

    pub async fn deployment(&self, namespace: &str, name: &str) -> Option<DeploymentSpec> {
        let state = self.state.read().await;
        state
            .deployments
            .get(&key(namespace, name))
            .map(|d| d.spec.clone())
    }

    pub async fn has_pvc(&self, namespace: &str, name: &str) -> bool {
        self.state.read().await.pvcs.contains(&key(namespace, name))
    }

    /// Routes served in a namespace, sorted.
    pub async fn routes(&self, namespace: &str) -> Vec<String> {
        let state = self.state.read().await;
        let mut routes: Vec<String> = state
            .ingresses
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, ing)| ing.route.clone())
            .collect();
        routes.sort();
        routes
    }

    pub async fn has_service(&self, namespace: &str, name: &str) -> bool {
        self.state.read().await.services.contains_key(&key(namespace, name))
    }
}

impl Cluster for MemoryCluster {
    fn deployment_exists<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, ClusterResult<bool>> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(state.deployments.contains_key(&key(namespace, name)))
        })
    }

    fn deployment_create<'a>(&'a self, spec: &'a DeploymentSpec) -> BoxFuture<'a, ClusterResult<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.check_fault(ClusterOp::DeploymentCreate)?;
            let k = key(&spec.app.namespace, &spec.name);
            if state.deployments.contains_key(&k) {
                return Err(ClusterError::Conflict(format!("deployment {}", spec.name)));
            }
            let ready = state.ready_for(spec.replicas);
            state.deployments.insert(
                k,
                StoredDeployment {
                    spec: spec.clone(),
                    ready,
                },
            );
            state.events.push(ClusterEvent::DeploymentCreated {
                namespace: spec.app.namespace.clone(),
                name: spec.name.clone(),
                replicas: spec.replicas,
                generation: spec.generation,
            });
            debug!(deployment = %spec.name, replicas = spec.replicas, "memory deployment created");
            Ok(())
        })
    }

    fn deployment_update<'a>(&'a self, spec: &'a DeploymentSpec) -> BoxFuture<'a, ClusterResult<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.check_fault(ClusterOp::DeploymentUpdate)?;
            let ready = state.ready_for(spec.replicas);
            let Some(dep) = state.deployments.get_mut(&key(&spec.app.namespace, &spec.name)) else {
                return Err(ClusterError::NotFound(format!("deployment {}", spec.name)));
            };
            dep.spec = spec.clone();
            dep.ready = ready;
            state.events.push(ClusterEvent::DeploymentUpdated {
                namespace: spec.app.namespace.clone(),
                name: spec.name.clone(),
                replicas: spec.replicas,
                generation: spec.generation,
            });
            debug!(deployment = %spec.name, replicas = spec.replicas, "memory deployment updated");
            Ok(())
        })
    }

    fn deployment_delete<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, ClusterResult<bool>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.check_fault(ClusterOp::DeploymentDelete)?;
            let existed = state.deployments.remove(&key(namespace, name)).is_some();
            if existed {
                state.events.push(ClusterEvent::DeploymentDeleted {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                });
            }
            Ok(existed)
        })
    }

    fn deployment_status<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, ClusterResult<Option<DeploymentStatus>>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.check_fault(ClusterOp::DeploymentStatus)?;
            Ok(state
                .deployments
                .get(&key(namespace, name))
                .map(|d| DeploymentStatus {
                    desired: d.spec.replicas,
                    ready: d.ready,
                }))
        })
    }

    fn ingress_create<'a>(&'a self, spec: &'a IngressSpec) -> BoxFuture<'a, ClusterResult<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.check_fault(ClusterOp::IngressCreate)?;
            state
                .ingresses
                .insert(key(&spec.app.namespace, &spec.name), spec.clone());
            state.events.push(ClusterEvent::IngressCreated {
                namespace: spec.app.namespace.clone(),
                name: spec.name.clone(),
                route: spec.route.clone(),
            });
            Ok(())
        })
    }

    fn ingress_delete<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, ClusterResult<bool>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.check_fault(ClusterOp::IngressDelete)?;
            let existed = state.ingresses.remove(&key(namespace, name)).is_some();
            if existed {
                state.events.push(ClusterEvent::IngressDeleted {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                });
            }
            Ok(existed)
        })
    }

    fn pvc_exists<'a>(&'a self, namespace: &'a str, name: &'a str) -> BoxFuture<'a, ClusterResult<bool>> {
        Box::pin(async move { Ok(self.state.read().await.pvcs.contains(&key(namespace, name))) })
    }

    fn pvc_create<'a>(&'a self, namespace: &'a str, name: &'a str) -> BoxFuture<'a, ClusterResult<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.check_fault(ClusterOp::PvcCreate)?;
            if !state.pvcs.insert(key(namespace, name)) {
                return Err(ClusterError::Conflict(format!("volume claim {name}")));
            }
            state.events.push(ClusterEvent::PvcCreated {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
            Ok(())
        })
    }

    fn pvc_delete<'a>(&'a self, namespace: &'a str, name: &'a str) -> BoxFuture<'a, ClusterResult<bool>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.check_fault(ClusterOp::PvcDelete)?;
            let existed = state.pvcs.remove(&key(namespace, name));
            if existed {
                state.events.push(ClusterEvent::PvcDeleted {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                });
            }
            Ok(existed)
        })
    }

    fn service_provision<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
        catalog_service: &'a str,
    ) -> BoxFuture<'a, ClusterResult<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.check_fault(ClusterOp::ServiceProvision)?;
            let k = key(namespace, name);
            if state.services.contains_key(&k) {
                return Err(ClusterError::Conflict(format!("service {name}")));
            }
            state.services.insert(k, catalog_service.to_string());

            let suffixes = state
                .catalog_secrets
                .get(catalog_service)
                .cloned()
                .unwrap_or_else(|| vec!["creds".to_string()]);
            for suffix in suffixes {
                let secret_name = {
                    let plain = format!("{name}-{suffix}");
                    if plain.len() <= berth_core::MAX_NAME_LEN {
                        plain
                    } else {
                        resource_name(&[name, &suffix])
                    }
                };
                let data = BTreeMap::from([
                    ("host".to_string(), format!("{name}.{namespace}.svc")),
                    ("username".to_string(), name.to_string()),
                    (
                        "password".to_string(),
                        resource_name(&[namespace, name, &suffix]),
                    ),
                ]);
                let labels = BTreeMap::from([(SERVICE_LABEL.to_string(), name.to_string())]);
                state.secrets.insert(
                    key(namespace, &secret_name),
                    StoredSecret {
                        service: name.to_string(),
                        secret: Secret {
                            name: secret_name.clone(),
                            data,
                            labels,
                        },
                    },
                );
            }
            state.events.push(ClusterEvent::ServiceProvisioned {
                namespace: namespace.to_string(),
                name: name.to_string(),
                catalog_service: catalog_service.to_string(),
            });
            Ok(())
        })
    }

    fn service_deprovision<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, ClusterResult<bool>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.check_fault(ClusterOp::ServiceDeprovision)?;
            let existed = state.services.remove(&key(namespace, name)).is_some();
            state
                .secrets
                .retain(|(ns, _), stored| !(ns == namespace && stored.service == name));
            if existed {
                state.events.push(ClusterEvent::ServiceDeprovisioned {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                });
            }
            Ok(existed)
        })
    }

    fn service_secrets<'a>(
        &'a self,
        namespace: &'a str,
        service: &'a str,
    ) -> BoxFuture<'a, ClusterResult<Vec<Secret>>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.check_fault(ClusterOp::ServiceSecrets)?;
            if !state.services.contains_key(&key(namespace, service)) {
                return Err(ClusterError::NotFound(format!("service {service}")));
            }
            Ok(state
                .secrets
                .iter()
                .filter(|((ns, _), stored)| ns == namespace && stored.service == service)
                .map(|(_, stored)| stored.secret.clone())
                .collect())
        })
    }

    fn secret_label<'a>(
        &'a self,
        namespace: &'a str,
        secret: &'a str,
        labels: &'a BTreeMap<String, String>,
    ) -> BoxFuture<'a, ClusterResult<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.check_fault(ClusterOp::SecretLabel)?;
            let Some(stored) = state.secrets.get_mut(&key(namespace, secret)) else {
                return Err(ClusterError::NotFound(format!("secret {secret}")));
            };
            stored
                .secret
                .labels
                .extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
            state.events.push(ClusterEvent::SecretLabeled {
                namespace: namespace.to_string(),
                secret: secret.to_string(),
            });
            Ok(())
        })
    }
}

// ── Stager ────────────────────────────────────────────────────────

/// Journal entry for a staging submission.
#[derive(Debug, Clone, PartialEq)]
pub struct StagerEvent {
    pub run_id: String,
    pub app: AppRef,
    pub origin: Origin,
    pub cache_claim: String,
    pub builder_image: String,
}

#[derive(Debug)]
struct Run {
    outcome: StagerResult<String>,
}

#[derive(Debug, Default)]
struct StagerState {
    runs: BTreeMap<String, Run>,
    events: Vec<StagerEvent>,
    failure: Option<String>,
    rejecting: bool,
    held: bool,
}

/// In-memory build backend producing `registry.berth.local/<ns>/<app>:<run>`.
#[derive(Clone, Default)]
pub struct MemoryStager {
    state: Arc<RwLock<StagerState>>,
}

impl MemoryStager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds submitted from now on fail with `reason`.
    pub async fn set_failure(&self, reason: Option<&str>) {
        self.state.write().await.failure = reason.map(str::to_string);
    }

    /// Refuse submissions outright.
    pub async fn set_rejecting(&self, rejecting: bool) {
        self.state.write().await.rejecting = rejecting;
    }

    /// While held, waits never complete.
    pub async fn set_held(&self, held: bool) {
        self.state.write().await.held = held;
    }

    pub async fn events(&self) -> Vec<StagerEvent> {
        self.state.read().await.events.clone()
    }
}

impl Stager for MemoryStager {
    fn submit<'a>(&'a self, request: &'a StagingRequest) -> BoxFuture<'a, StagerResult<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            if state.rejecting {
                return Err(StagerError::Rejected("builder offline".to_string()));
            }
            let outcome = match &state.failure {
                Some(reason) => Err(StagerError::BuildFailed {
                    run_id: request.run_id.clone(),
                    reason: reason.clone(),
                }),
                None => Ok(format!(
                    "registry.berth.local/{}/{}:{}",
                    request.app.namespace, request.app.name, request.run_id
                )),
            };
            state.runs.insert(request.run_id.clone(), Run { outcome });
            state.events.push(StagerEvent {
                run_id: request.run_id.clone(),
                app: request.app.clone(),
                origin: request.origin.clone(),
                cache_claim: request.cache.claim.clone(),
                builder_image: request.builder_image.clone(),
            });
            debug!(run_id = %request.run_id, app = %request.app, "memory staging run submitted");
            Ok(())
        })
    }

    fn wait<'a>(&'a self, _namespace: &'a str, run_id: &'a str) -> BoxFuture<'a, StagerResult<String>> {
        Box::pin(async move {
            let (outcome, held) = {
                let state = self.state.read().await;
                let outcome = state
                    .runs
                    .get(run_id)
                    .map(|run| run.outcome.clone())
                    .ok_or_else(|| StagerError::UnknownRun(run_id.to_string()))?;
                (outcome, state.held)
            };
            if held {
                std::future::pending::<()>().await;
            }
            outcome
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(replicas: u32) -> DeploymentSpec {
        let app = AppRef::new("workspace", "app1").unwrap();
        DeploymentSpec {
            name: app.resource_name(),
            app,
            image: "nginx".to_string(),
            replicas,
            environment: BTreeMap::new(),
            configurations: Vec::new(),
            app_chart: "standard".to_string(),
            user: "admin".to_string(),
            stage_id: None,
            generation: None,
        }
    }

    #[tokio::test]
    async fn deployment_lifecycle() {
        let cluster = MemoryCluster::new();
        let spec = spec(2);
        cluster.deployment_create(&spec).await.unwrap();
        assert!(cluster.deployment_exists("workspace", &spec.name).await.unwrap());
        assert!(matches!(
            cluster.deployment_create(&spec).await,
            Err(ClusterError::Conflict(_))
        ));

        let status = cluster
            .deployment_status("workspace", &spec.name)
            .await
            .unwrap()
            .unwrap();
        assert!(status.is_ready());
        assert_eq!(status.desired, 2);

        assert!(cluster.deployment_delete("workspace", &spec.name).await.unwrap());
        assert!(!cluster.deployment_delete("workspace", &spec.name).await.unwrap());
        assert!(
            cluster
                .deployment_status("workspace", &spec.name)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn stalled_rollouts_until_marked_ready() {
        let cluster = MemoryCluster::new();
        cluster.set_stalled(true).await;
        let spec = spec(3);
        cluster.deployment_create(&spec).await.unwrap();
        let status = cluster
            .deployment_status("workspace", &spec.name)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.ready, 0);

        cluster.mark_ready("workspace", &spec.name).await;
        let status = cluster
            .deployment_status("workspace", &spec.name)
            .await
            .unwrap()
            .unwrap();
        assert!(status.is_ready());
    }

    #[tokio::test]
    async fn fail_once_then_recovers() {
        let cluster = MemoryCluster::new();
        cluster.fail_once(ClusterOp::PvcCreate).await;
        assert!(cluster.pvc_create("ns", "cache").await.is_err());
        cluster.pvc_create("ns", "cache").await.unwrap();
        assert!(cluster.has_pvc("ns", "cache").await);
    }

    #[tokio::test]
    async fn service_secrets_follow_catalog() {
        let cluster = MemoryCluster::new();
        cluster.set_catalog_secrets("postgres", &["creds", "tls"]).await;
        cluster.service_provision("ns", "pg", "postgres").await.unwrap();

        let secrets = cluster.service_secrets("ns", "pg").await.unwrap();
        let names: Vec<&str> = secrets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["pg-creds", "pg-tls"]);

        let labels = BTreeMap::from([("berth.io/configuration".to_string(), "true".to_string())]);
        cluster.secret_label("ns", "pg-creds", &labels).await.unwrap();
        let secrets = cluster.service_secrets("ns", "pg").await.unwrap();
        assert_eq!(secrets[0].labels.len(), 2);

        assert!(cluster.service_deprovision("ns", "pg").await.unwrap());
        assert!(cluster.service_secrets("ns", "pg").await.is_err());
    }

    #[tokio::test]
    async fn stager_produces_image_per_run() {
        let stager = MemoryStager::new();
        let request = StagingRequest {
            run_id: "run-1".to_string(),
            app: AppRef::new("ns", "app").unwrap(),
            origin: Origin::Path {
                path: "/blobs/1".to_string(),
            },
            cache: crate::CacheHandle {
                namespace: "ns".to_string(),
                claim: "cache".to_string(),
            },
            builder_image: "builder".to_string(),
            user: "admin".to_string(),
        };
        stager.submit(&request).await.unwrap();
        let image = stager.wait("ns", "run-1").await.unwrap();
        assert_eq!(image, "registry.berth.local/ns/app:run-1");
        assert!(matches!(
            stager.wait("ns", "run-2").await,
            Err(StagerError::UnknownRun(_))
        ));
    }

    #[tokio::test]
    async fn stager_failure_is_reported_on_wait() {
        let stager = MemoryStager::new();
        stager.set_failure(Some("compile error")).await;
        let request = StagingRequest {
            run_id: "run-9".to_string(),
            app: AppRef::new("ns", "app").unwrap(),
            origin: Origin::Path {
                path: "/blobs/9".to_string(),
            },
            cache: crate::CacheHandle {
                namespace: "ns".to_string(),
                claim: "cache".to_string(),
            },
            builder_image: "builder".to_string(),
            user: "admin".to_string(),
        };
        stager.submit(&request).await.unwrap();
        assert!(matches!(
            stager.wait("ns", "run-9").await,
            Err(StagerError::BuildFailed { .. })
        ));
    }
}
