//! Deployment Reconciler.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use berth_core::{AppRef, CancelSignal};
use berth_substrate::{Cluster, DeploymentSpec, DeploymentStatus, IngressSpec};

use crate::controller::{Rollout, RolloutPhase};
use crate::error::{ReconcileError, ReconcileResult};

/// Everything the cluster workload should reflect.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredSnapshot {
    pub app: AppRef,
    pub image: String,
    pub instances: u32,
    pub environment: BTreeMap<String, String>,
    /// Mounted configuration names.
    pub configurations: Vec<String>,
    pub routes: Vec<String>,
    pub app_chart: String,
    pub user: String,
    pub stage_id: Option<String>,
    /// Forces a rollout when nothing else in the snapshot changed.
    pub generation: Option<u64>,
}

#[derive(Clone)]
pub struct Reconciler {
    cluster: Arc<dyn Cluster>,
    timeout: Duration,
    poll_interval: Duration,
}

impl Reconciler {
    pub fn new(cluster: Arc<dyn Cluster>, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            cluster,
            timeout,
            poll_interval,
        }
    }

    /// Create or update the workload and converge its routes.
    ///
    /// Returns once the cluster accepted the deployment write; the returned
    /// rollout is then handed to [`wait_ready`](Self::wait_ready).
    /// `previous_routes` are the routes served before this call; ingresses
    /// for routes no longer desired are removed.
    pub async fn apply(
        &self,
        snapshot: &DesiredSnapshot,
        previous_routes: &[String],
    ) -> ReconcileResult<Rollout> {
        let app = &snapshot.app;
        let deployment = app.resource_name();
        let spec = DeploymentSpec {
            app: app.clone(),
            name: deployment.clone(),
            image: snapshot.image.clone(),
            replicas: snapshot.instances,
            environment: snapshot.environment.clone(),
            configurations: snapshot.configurations.clone(),
            app_chart: snapshot.app_chart.clone(),
            user: snapshot.user.clone(),
            stage_id: snapshot.stage_id.clone(),
            generation: snapshot.generation,
        };

        let mut rollout = Rollout::new(
            app,
            &deployment,
            &snapshot.image,
            snapshot.instances,
            snapshot.generation,
            self.timeout,
        );
        rollout.stage_id = snapshot.stage_id.clone();
        rollout.routes = snapshot.routes.clone();
        rollout.start();

        let applied = match self
            .cluster
            .deployment_exists(&app.namespace, &deployment)
            .await
        {
            Ok(true) => self.cluster.deployment_update(&spec).await,
            Ok(false) => self.cluster.deployment_create(&spec).await,
            Err(e) => Err(e),
        };
        if let Err(e) = applied {
            rollout.fail(&e.to_string());
            return Err(deploy_failed(app, e));
        }
        rollout.applied();

        self.converge_routes(app, &deployment, &snapshot.routes, previous_routes)
            .await?;

        info!(
            app = %app,
            image = %snapshot.image,
            replicas = snapshot.instances,
            generation = ?snapshot.generation,
            "rollout applied"
        );
        Ok(rollout)
    }

    async fn converge_routes(
        &self,
        app: &AppRef,
        deployment: &str,
        desired: &[String],
        previous: &[String],
    ) -> ReconcileResult<()> {
        for route in desired {
            let ingress = IngressSpec {
                app: app.clone(),
                name: app.route_resource_name(route),
                route: route.clone(),
                backend: deployment.to_string(),
            };
            self.cluster
                .ingress_create(&ingress)
                .await
                .map_err(|e| deploy_failed(app, e))?;
        }
        for route in previous.iter().filter(|r| !desired.contains(r)) {
            self.cluster
                .ingress_delete(&app.namespace, &app.route_resource_name(route))
                .await
                .map_err(|e| deploy_failed(app, e))?;
            debug!(app = %app, %route, "stale route removed");
        }
        Ok(())
    }

    /// Block until an existing workload reports every desired replica ready.
    pub async fn wait_running(&self, app: &AppRef, cancel: &CancelSignal) -> ReconcileResult<DeploymentStatus> {
        let deployment = app.resource_name();
        let status = self.status(app).await?.ok_or_else(|| ReconcileError::DeployFailed {
            app: app.clone(),
            reason: format!("deployment {deployment} does not exist"),
        })?;
        let mut rollout = Rollout::new(app, &deployment, "", status.desired, None, self.timeout);
        rollout.applied();
        self.wait_ready(&mut rollout, cancel).await
    }

    /// Poll until every desired replica of `rollout` is ready, the timeout
    /// passes, or `cancel` fires. Neither of the latter touches the rollout
    /// on the cluster.
    pub async fn wait_ready(
        &self,
        rollout: &mut Rollout,
        cancel: &CancelSignal,
    ) -> ReconcileResult<DeploymentStatus> {
        let app = rollout.app.clone();
        loop {
            let status = match self
                .cluster
                .deployment_status(&app.namespace, &rollout.deployment)
                .await
            {
                Ok(Some(status)) => status,
                Ok(None) => {
                    let reason = format!("deployment {} disappeared", rollout.deployment);
                    rollout.fail(&reason);
                    return Err(ReconcileError::DeployFailed { app, reason });
                }
                Err(e) => {
                    rollout.fail(&e.to_string());
                    return Err(deploy_failed(&app, e));
                }
            };

            match rollout.observe(&status) {
                RolloutPhase::Ready => return Ok(status),
                RolloutPhase::TimedOut { .. } => {
                    return Err(ReconcileError::NotReadyInTime {
                        app,
                        timeout: self.timeout,
                    });
                }
                _ => {}
            }

            let pause = self.poll_interval.min(rollout.remaining());
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = cancel.cancelled() => {
                    rollout.abandon();
                    debug!(app = %app, "readiness wait cancelled, rollout continues");
                    return Err(ReconcileError::Cancelled { app });
                }
            }
        }
    }

    /// Observed replica counts, `None` when no deployment exists.
    pub async fn status(&self, app: &AppRef) -> ReconcileResult<Option<DeploymentStatus>> {
        self.cluster
            .deployment_status(&app.namespace, &app.resource_name())
            .await
            .map_err(|e| deploy_failed(app, e))
    }

    /// Remove the workload and its routes.
    ///
    /// Every step is attempted even when an earlier one fails; the failures
    /// are reported together.
    pub async fn teardown(&self, app: &AppRef, routes: &[String]) -> ReconcileResult<()> {
        let mut failures = Vec::new();
        for route in routes {
            if let Err(e) = self
                .cluster
                .ingress_delete(&app.namespace, &app.route_resource_name(route))
                .await
            {
                warn!(app = %app, %route, error = %e, "route removal failed");
                failures.push(format!("route {route}: {e}"));
            }
        }
        match self
            .cluster
            .deployment_delete(&app.namespace, &app.resource_name())
            .await
        {
            Ok(existed) => debug!(app = %app, existed, "deployment removed"),
            Err(e) => {
                warn!(app = %app, error = %e, "deployment removal failed");
                failures.push(format!("deployment: {e}"));
            }
        }

        if failures.is_empty() {
            info!(app = %app, "workload torn down");
            Ok(())
        } else {
            Err(ReconcileError::TeardownFailed {
                app: app.clone(),
                reason: failures.join("; "),
            })
        }
    }
}

fn deploy_failed(app: &AppRef, e: impl std::fmt::Display) -> ReconcileError {
    ReconcileError::DeployFailed {
        app: app.clone(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::cancel_pair;
    use berth_state::WorkloadRef;
    use berth_substrate::{ClusterEvent, ClusterOp, MemoryCluster};

    fn reconciler(cluster: &MemoryCluster, timeout: Duration) -> Reconciler {
        Reconciler::new(Arc::new(cluster.clone()), timeout, Duration::from_millis(5))
    }

    async fn deploy(
        reconciler: &Reconciler,
        snapshot: &DesiredSnapshot,
        previous_routes: &[String],
        cancel: &CancelSignal,
    ) -> ReconcileResult<WorkloadRef> {
        let mut rollout = reconciler.apply(snapshot, previous_routes).await?;
        reconciler.wait_ready(&mut rollout, cancel).await?;
        Ok(rollout.workload())
    }

    fn snapshot(instances: u32, routes: &[&str]) -> DesiredSnapshot {
        DesiredSnapshot {
            app: AppRef::new("workspace", "app1").unwrap(),
            image: "registry.berth.local/workspace/app1:abc".to_string(),
            instances,
            environment: BTreeMap::new(),
            configurations: Vec::new(),
            routes: routes.iter().map(|r| r.to_string()).collect(),
            app_chart: "standard".to_string(),
            user: "admin".to_string(),
            stage_id: Some("abc".to_string()),
            generation: None,
        }
    }

    #[tokio::test]
    async fn first_apply_creates_then_updates() {
        let cluster = MemoryCluster::new();
        let reconciler = reconciler(&cluster, Duration::from_secs(1));

        let never = CancelSignal::never();
        let workload = deploy(&reconciler, &snapshot(2, &["app1.berth.local"]), &[], &never)
            .await
            .unwrap();
        assert_eq!(workload.deployment, snapshot(2, &[]).app.resource_name());

        let mut next = snapshot(3, &["app1.berth.local"]);
        next.generation = Some(42);
        let previous = vec!["app1.berth.local".to_string()];
        let workload = deploy(&reconciler, &next, &previous, &never).await.unwrap();
        assert_eq!(workload.generation, Some(42));

        let rollouts: Vec<ClusterEvent> = cluster
            .events()
            .await
            .into_iter()
            .filter(ClusterEvent::is_rollout)
            .collect();
        assert_eq!(rollouts.len(), 2);
        assert!(matches!(rollouts[0], ClusterEvent::DeploymentCreated { replicas: 2, .. }));
        assert!(matches!(
            rollouts[1],
            ClusterEvent::DeploymentUpdated {
                replicas: 3,
                generation: Some(42),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn stale_routes_are_removed() {
        let cluster = MemoryCluster::new();
        let reconciler = reconciler(&cluster, Duration::from_secs(1));
        let never = CancelSignal::never();
        let both = snapshot(1, &["a.example.org", "b.example.org"]);
        deploy(&reconciler, &both, &[], &never).await.unwrap();
        deploy(&reconciler, &snapshot(1, &["b.example.org"]), &both.routes, &never)
            .await
            .unwrap();
        assert_eq!(cluster.routes("workspace").await, vec!["b.example.org"]);
    }

    #[tokio::test]
    async fn stalled_rollout_times_out() {
        let cluster = MemoryCluster::new();
        cluster.set_stalled(true).await;
        let reconciler = reconciler(&cluster, Duration::from_millis(30));
        let err = deploy(&reconciler, &snapshot(1, &[]), &[], &CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::NotReadyInTime { .. }));
        // The deployment itself stays in place.
        let name = snapshot(1, &[]).app.resource_name();
        assert!(cluster.deployment("workspace", &name).await.is_some());
    }

    #[tokio::test]
    async fn cluster_failure_is_deploy_failed() {
        let cluster = MemoryCluster::new();
        cluster.fail(ClusterOp::DeploymentCreate).await;
        let reconciler = reconciler(&cluster, Duration::from_secs(1));
        let err = deploy(&reconciler, &snapshot(1, &[]), &[], &CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::DeployFailed { .. }));
    }

    #[tokio::test]
    async fn cancel_stops_waiting() {
        let cluster = MemoryCluster::new();
        cluster.set_stalled(true).await;
        let reconciler = reconciler(&cluster, Duration::from_secs(30));
        let (handle, signal) = cancel_pair();

        let task = {
            let reconciler = reconciler.clone();
            tokio::spawn(async move { deploy(&reconciler, &snapshot(1, &[]), &[], &signal).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, ReconcileError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn wait_running_on_missing_deployment_fails() {
        let cluster = MemoryCluster::new();
        let reconciler = reconciler(&cluster, Duration::from_secs(1));
        let app = AppRef::new("workspace", "app1").unwrap();
        assert!(matches!(
            reconciler.wait_running(&app, &CancelSignal::never()).await,
            Err(ReconcileError::DeployFailed { .. })
        ));
    }

    #[tokio::test]
    async fn teardown_attempts_every_step() {
        let cluster = MemoryCluster::new();
        let reconciler = reconciler(&cluster, Duration::from_secs(1));
        let routed = snapshot(1, &["a.example.org"]);
        deploy(&reconciler, &routed, &[], &CancelSignal::never())
            .await
            .unwrap();

        cluster.fail_once(ClusterOp::IngressDelete).await;
        let app = snapshot(1, &[]).app;
        let err = reconciler
            .teardown(&app, &["a.example.org".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::TeardownFailed { .. }));
        assert!(cluster.deployment("workspace", &app.resource_name()).await.is_none());

        reconciler
            .teardown(&app, &["a.example.org".to_string()])
            .await
            .unwrap();
        assert!(cluster.routes("workspace").await.is_empty());
    }
}
