//! Staging pipeline.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use berth_core::{AppRef, CancelSignal, Origin};
use berth_substrate::{CacheHandle, Cluster, Stager, StagingRequest};

use crate::error::{StageError, StageResult};

/// Result of a successful staging run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub image: String,
    pub stage_id: String,
}

#[derive(Clone)]
pub struct StagingPipeline {
    cluster: Arc<dyn Cluster>,
    stager: Arc<dyn Stager>,
    default_builder: String,
}

impl StagingPipeline {
    pub fn new(cluster: Arc<dyn Cluster>, stager: Arc<dyn Stager>, default_builder: &str) -> Self {
        Self {
            cluster,
            stager,
            default_builder: default_builder.to_string(),
        }
    }

    /// The cache handle of `app`, creating its volume claim if needed.
    pub async fn ensure_cache(&self, app: &AppRef) -> StageResult<CacheHandle> {
        let claim = app.resource_name();
        if !self.cluster.pvc_exists(&app.namespace, &claim).await? {
            self.cluster.pvc_create(&app.namespace, &claim).await?;
            info!(app = %app, %claim, "build cache created");
        }
        Ok(CacheHandle {
            namespace: app.namespace.clone(),
            claim,
        })
    }

    /// Build `origin` into an image.
    ///
    /// Cancelling only abandons the wait; the submitted run is not aborted.
    pub async fn stage(
        &self,
        app: &AppRef,
        origin: &Origin,
        builder_image: Option<&str>,
        user: &str,
        cancel: &CancelSignal,
    ) -> StageResult<StageOutcome> {
        if !origin.is_stageable() {
            return Err(StageError::NotStageable {
                app: app.clone(),
                kind: origin.kind(),
            });
        }

        let cache = self.ensure_cache(app).await?;
        let run_id = Uuid::new_v4().simple().to_string();
        if cancel.is_cancelled() {
            return Err(StageError::Cancelled { run_id });
        }

        let request = StagingRequest {
            run_id: run_id.clone(),
            app: app.clone(),
            origin: origin.clone(),
            cache,
            builder_image: builder_image.unwrap_or(&self.default_builder).to_string(),
            user: user.to_string(),
        };
        self.stager.submit(&request).await?;
        debug!(app = %app, stage_id = %run_id, builder = %request.builder_image, "staging run submitted");

        let image = tokio::select! {
            result = self.stager.wait(&app.namespace, &run_id) => result?,
            _ = cancel.cancelled() => {
                warn!(app = %app, stage_id = %run_id, "staging wait cancelled, run continues");
                return Err(StageError::Cancelled { run_id });
            }
        };

        info!(app = %app, stage_id = %run_id, %image, "application staged");
        Ok(StageOutcome {
            image,
            stage_id: run_id,
        })
    }

    /// Delete the build cache of `app`. Returns whether it existed.
    pub async fn discard_cache(&self, app: &AppRef) -> StageResult<bool> {
        let existed = self
            .cluster
            .pvc_delete(&app.namespace, &app.resource_name())
            .await?;
        if existed {
            info!(app = %app, "build cache discarded");
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::cancel_pair;
    use berth_substrate::{ClusterEvent, ClusterOp, MemoryCluster, MemoryStager, StagerError};

    fn pipeline() -> (MemoryCluster, MemoryStager, StagingPipeline) {
        let cluster = MemoryCluster::new();
        let stager = MemoryStager::new();
        let pipeline = StagingPipeline::new(
            Arc::new(cluster.clone()),
            Arc::new(stager.clone()),
            "paketobuildpacks/builder:full",
        );
        (cluster, stager, pipeline)
    }

    fn app() -> AppRef {
        AppRef::new("workspace", "app1").unwrap()
    }

    fn source() -> Origin {
        Origin::Git {
            repository: "https://example.org/app1.git".to_string(),
            revision: None,
        }
    }

    #[tokio::test]
    async fn cache_is_created_once_and_reused() {
        let (cluster, stager, pipeline) = pipeline();
        let first = pipeline
            .stage(&app(), &source(), None, "admin", &CancelSignal::never())
            .await
            .unwrap();
        let second = pipeline
            .stage(&app(), &source(), Some("custom/builder"), "admin", &CancelSignal::never())
            .await
            .unwrap();
        assert_ne!(first.stage_id, second.stage_id);

        let created = cluster
            .events()
            .await
            .into_iter()
            .filter(|e| matches!(e, ClusterEvent::PvcCreated { .. }))
            .count();
        assert_eq!(created, 1);

        let runs = stager.events().await;
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].cache_claim, runs[1].cache_claim);
        assert_eq!(runs[0].builder_image, "paketobuildpacks/builder:full");
        assert_eq!(runs[1].builder_image, "custom/builder");
    }

    #[tokio::test]
    async fn container_origin_is_refused_without_side_effects() {
        let (cluster, stager, pipeline) = pipeline();
        let origin = Origin::Container {
            image: "nginx:latest".to_string(),
        };
        let err = pipeline
            .stage(&app(), &origin, None, "admin", &CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::NotStageable { kind: "container", .. }));
        assert!(cluster.events().await.is_empty());
        assert!(stager.events().await.is_empty());
    }

    #[tokio::test]
    async fn build_failure_propagates() {
        let (_, stager, pipeline) = pipeline();
        stager.set_failure(Some("buildpack detect failed")).await;
        let err = pipeline
            .stage(&app(), &source(), None, "admin", &CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StageError::Stager(StagerError::BuildFailed { .. })
        ));
    }

    #[tokio::test]
    async fn cache_failure_propagates() {
        let (cluster, _, pipeline) = pipeline();
        cluster.fail_once(ClusterOp::PvcCreate).await;
        let err = pipeline
            .stage(&app(), &source(), None, "admin", &CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Cache(_)));
    }

    #[tokio::test]
    async fn cancelling_the_wait_leaves_run_submitted() {
        let (_, stager, pipeline) = pipeline();
        stager.set_held(true).await;
        let (handle, signal) = cancel_pair();

        let task = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                pipeline
                    .stage(&app(), &source(), None, "admin", &signal)
                    .await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        handle.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, StageError::Cancelled { .. }));
        assert_eq!(stager.events().await.len(), 1);
    }

    #[tokio::test]
    async fn discard_cache_removes_claim() {
        let (cluster, _, pipeline) = pipeline();
        pipeline.ensure_cache(&app()).await.unwrap();
        assert!(cluster.has_pvc("workspace", &app().resource_name()).await);
        assert!(pipeline.discard_cache(&app()).await.unwrap());
        assert!(!pipeline.discard_cache(&app()).await.unwrap());
    }
}
