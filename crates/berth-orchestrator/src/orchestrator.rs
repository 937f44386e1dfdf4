//! Application Lifecycle Orchestrator.
//!
//! Application states, as seen from here:
//!
//! ```text
//! Absent → Created (no workload) → Staged (image, no workload) → Running ⇄ Running → Absent
//! ```
//!
//! Container-origin applications go from `Created` straight to `Running`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use berth_core::{
    AppRef, BerthConfig, CancelSignal, EntityKind, Origin, generation_stamp, validate_env_name,
};
use berth_registry::{
    Application, ApplicationRegistry, BindingLedger, ConfigurationStore, Namespaces,
    ServiceRecords, content_digest,
};
use berth_rollout::{DesiredSnapshot, Reconciler};
use berth_stage::StagingPipeline;
use berth_state::{AppRecord, ConfigurationOrigin, StateStore, WorkloadRef};
use berth_substrate::{Cluster, DeploymentStatus, Stager};

use crate::compensation::CompensationLog;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::requests::{CreateRequest, PushRequest, UpdateRequest};
use crate::restart::{DesiredState, Restart, needs_restart};

pub(crate) const CHART_FROZEN: &str = "Unable to change app chart of active application";
const CONTAINER_RESTAGE: &str = "Unable to restage container-based application";

/// Defaults and limits applied by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub default_instances: u32,
    /// Default routes are `<app>.<domain>`.
    pub domain: String,
    pub app_charts: Vec<String>,
    pub default_app_chart: String,
    pub builder_image: String,
    pub deploy_timeout: Duration,
    pub poll_interval: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &BerthConfig) -> Self {
        Self {
            default_instances: config.apps.default_instances,
            domain: config.apps.domain.clone(),
            app_charts: config.apps.app_charts.clone(),
            default_app_chart: config.apps.default_app_chart.clone(),
            builder_image: config.staging.builder_image.clone(),
            deploy_timeout: config.deploy_timeout(),
            poll_interval: config.poll_interval(),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&BerthConfig::default())
    }
}

/// An application with its observed workload status.
#[derive(Debug, Clone, Serialize)]
pub struct AppDetails {
    #[serde(flatten)]
    pub application: Application,
    /// `None` while no workload exists.
    pub status: Option<DeploymentStatus>,
}

#[derive(Clone)]
pub struct Orchestrator {
    pub(crate) namespaces: Namespaces,
    pub(crate) registry: ApplicationRegistry,
    pub(crate) configurations: ConfigurationStore,
    pub(crate) services: ServiceRecords,
    pub(crate) ledger: BindingLedger,
    pub(crate) pipeline: StagingPipeline,
    pub(crate) reconciler: Reconciler,
    pub(crate) cluster: Arc<dyn Cluster>,
    pub(crate) settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        store: StateStore,
        cluster: Arc<dyn Cluster>,
        stager: Arc<dyn Stager>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            namespaces: Namespaces::new(store.clone()),
            registry: ApplicationRegistry::new(store.clone()),
            configurations: ConfigurationStore::new(store.clone()),
            services: ServiceRecords::new(store.clone()),
            ledger: BindingLedger::new(store, cluster.clone()),
            pipeline: StagingPipeline::new(cluster.clone(), stager, &settings.builder_image),
            reconciler: Reconciler::new(
                cluster.clone(),
                settings.deploy_timeout,
                settings.poll_interval,
            ),
            cluster,
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    // ── Shared steps ───────────────────────────────────────────────

    /// Validate the reference and require its namespace.
    pub fn app_ref(&self, namespace: &str, name: &str) -> OrchestratorResult<AppRef> {
        let app = AppRef::new(namespace, name)?;
        self.namespaces.require(namespace)?;
        Ok(app)
    }

    pub(crate) fn require_app(&self, app: &AppRef) -> OrchestratorResult<Application> {
        self.namespaces.require(&app.namespace)?;
        Ok(self.registry.require(app)?)
    }

    pub(crate) fn desired_state(&self, app: &Application) -> OrchestratorResult<DesiredState> {
        let mut digests = BTreeMap::new();
        for name in &app.configurations {
            let digest = match self.configurations.get(&app.record.namespace, name)? {
                Some(cfg) => content_digest(&cfg.values),
                None => String::new(),
            };
            digests.insert(name.clone(), digest);
        }
        Ok(DesiredState {
            instances: app.record.instances,
            environment: app.record.environment.clone(),
            configurations: app.configurations.iter().cloned().collect(),
            digests,
            routes: app.record.routes.clone(),
            app_chart: app.record.app_chart.clone(),
        })
    }

    pub(crate) fn check_chart(&self, chart: &str) -> OrchestratorResult<()> {
        if self.settings.app_charts.iter().any(|c| c == chart) {
            Ok(())
        } else {
            Err(OrchestratorError::not_found(EntityKind::AppChart, chart))
        }
    }

    /// Every named configuration and service must exist. All missing names
    /// are reported together.
    pub(crate) fn preflight(
        &self,
        namespace: &str,
        configurations: &[String],
        services: &[String],
    ) -> OrchestratorResult<()> {
        let mut missing = Vec::new();
        for name in services {
            if self.services.get(namespace, name)?.is_none() {
                missing.push(OrchestratorError::not_found(EntityKind::Service, name));
            }
        }
        for name in configurations {
            if !self.configurations.exists(namespace, name)? {
                missing.push(OrchestratorError::not_found(EntityKind::Configuration, name));
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(OrchestratorError::Multi(missing))
        }
    }

    /// A configuration generated by a service the application is still bound
    /// to can only leave the binding set through unbinding that service.
    pub(crate) fn check_service_bindings_kept<'a>(
        &self,
        current: &Application,
        removed: impl IntoIterator<Item = &'a String>,
    ) -> OrchestratorResult<()> {
        let namespace = &current.record.namespace;
        for name in removed {
            let Some(cfg) = self.configurations.get(namespace, name)? else {
                continue;
            };
            if let ConfigurationOrigin::Service { service } = &cfg.origin {
                if current.record.services.contains(service) {
                    return Err(OrchestratorError::bad_request(format!(
                        "configuration '{name}' belongs to bound service '{service}'; unbind the service instead"
                    )));
                }
            }
        }
        Ok(())
    }

    fn default_routes(&self, app: &AppRef) -> Vec<String> {
        vec![format!("{}.{}", app.name, self.settings.domain)]
    }

    /// Roll the workload to the stored desired state and wait for readiness.
    ///
    /// The workload reference is recorded as soon as the cluster accepted the
    /// rollout, so a readiness timeout still leaves a running-wait possible.
    pub(crate) async fn deploy(
        &self,
        app: &AppRef,
        user: &str,
        generation: Option<u64>,
        cancel: &CancelSignal,
    ) -> OrchestratorResult<WorkloadRef> {
        let current = self.require_app(app)?;
        let record = &current.record;
        let image = record
            .image
            .clone()
            .or_else(|| record.workload.as_ref().map(|w| w.image.clone()))
            .ok_or_else(|| {
                OrchestratorError::bad_request(format!(
                    "application '{}' has no image to deploy",
                    app.name
                ))
            })?;
        let previous_routes = record
            .workload
            .as_ref()
            .map(|w| w.routes.clone())
            .unwrap_or_default();

        let snapshot = DesiredSnapshot {
            app: app.clone(),
            image,
            instances: record.instances,
            environment: record.environment.clone(),
            configurations: current.configurations.clone(),
            routes: record.routes.clone(),
            app_chart: record.app_chart.clone(),
            user: user.to_string(),
            stage_id: record.stage_id.clone(),
            generation,
        };

        let mut rollout = self.reconciler.apply(&snapshot, &previous_routes).await?;
        let workload = rollout.workload();
        self.registry.set_workload(app, Some(workload.clone()))?;
        self.reconciler.wait_ready(&mut rollout, cancel).await?;

        info!(
            namespace = %app.namespace,
            app = %app.name,
            image = %workload.image,
            stage_id = ?workload.stage_id,
            generation = ?generation,
            "application deployed"
        );
        Ok(workload)
    }

    /// Compare `before` with the stored desired state and roll the workload
    /// with a fresh generation stamp if they differ. Applications without a
    /// workload are never deployed here.
    pub(crate) async fn converge(
        &self,
        app: &AppRef,
        before: &DesiredState,
        user: &str,
        cancel: &CancelSignal,
    ) -> OrchestratorResult<Restart> {
        let current = self.require_app(app)?;
        let restart = needs_restart(before, &self.desired_state(&current)?);
        if !current.has_workload() {
            debug!(app = %app, ?restart, "no workload, nothing to restart");
            return Ok(restart);
        }
        if restart.is_needed() {
            debug!(app = %app, ?restart, "restarting workload");
            self.deploy(app, user, Some(generation_stamp()), cancel).await?;
        }
        Ok(restart)
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Create an application without a workload.
    ///
    /// Every named configuration and service is checked before anything is
    /// written; a failure after the record exists undoes the record and any
    /// bindings made.
    pub async fn create(
        &self,
        namespace: &str,
        request: CreateRequest,
        user: &str,
    ) -> OrchestratorResult<Application> {
        let app = self.app_ref(namespace, &request.name)?;
        validate_environment(&request.environment)?;
        let chart = request
            .app_chart
            .clone()
            .unwrap_or_else(|| self.settings.default_app_chart.clone());
        self.check_chart(&chart)?;
        if self.registry.exists(&app)? {
            return Err(OrchestratorError::AlreadyExists {
                kind: EntityKind::Application,
                name: app.name,
            });
        }
        self.preflight(namespace, &request.configurations, &request.services)?;

        let instances = request.instances.unwrap_or(self.settings.default_instances);
        let routes = request
            .routes
            .clone()
            .unwrap_or_else(|| self.default_routes(&app));

        let mut log = CompensationLog::new(format!("create application {app}"));
        log.check(
            self.registry
                .create(&app, user, self.settings.default_instances, &chart),
        )?;
        {
            let registry = self.registry.clone();
            let app = app.clone();
            log.record("application record", move || registry.delete(&app).map(|_| ()));
        }
        log.check(self.registry.scaling_set(&app, instances))?;
        log.check(
            self.registry
                .bound_services_set(&app, &request.services, true),
        )?;
        log.check(
            self.registry
                .environment_set(&app, &request.environment, true),
        )?;
        log.check(self.registry.set_routes(&app, &routes))?;

        let mut names = request.configurations.clone();
        for service in &request.services {
            let generated = self.ledger.label_service_secrets(namespace, service).await;
            names.extend(log.check(generated)?);
        }
        {
            let ledger = self.ledger.clone();
            let app = app.clone();
            log.record("configuration bindings", move || {
                ledger.remove_all(&app.namespace, &app.name).map(|_| ())
            });
        }
        log.check(self.ledger.create_binding(namespace, &app.name, &names))?;
        log.commit();

        info!(%namespace, app = %app.name, instances, services = ?request.services, "application configured");
        self.require_app(&app)
    }

    /// Create-if-absent, stage (unless the origin is a container image), deploy.
    pub async fn push(
        &self,
        namespace: &str,
        name: &str,
        request: PushRequest,
        user: &str,
        cancel: &CancelSignal,
    ) -> OrchestratorResult<Application> {
        let app = self.app_ref(namespace, name)?;
        validate_environment(&request.environment)?;
        if let Some(chart) = &request.app_chart {
            self.check_chart(chart)?;
        }

        let existing = self.registry.lookup(&app)?;
        let origin = match (&request.origin, &existing) {
            (Some(origin), _) => origin.clone(),
            (None, Some(current)) => current.record.origin.clone(),
            (None, None) => Origin::None,
        };
        if origin == Origin::None {
            return Err(OrchestratorError::bad_request(format!(
                "application '{name}' has no origin to push"
            )));
        }

        match existing {
            None => {
                let create = CreateRequest {
                    name: name.to_string(),
                    instances: request.instances,
                    configurations: request.configurations.clone(),
                    services: request.services.clone(),
                    environment: request.environment.clone(),
                    app_chart: request.app_chart.clone(),
                    routes: request.routes.clone(),
                };
                self.create(namespace, create, user).await?;
            }
            Some(current) => self.apply_push_update(&current, &request).await?,
        }

        self.registry.set_origin(&app, &origin)?;
        if let Some(builder) = &request.builder_image {
            self.registry.set_builder_image(&app, Some(builder))?;
        }

        let (image, stage_id) = match &origin {
            Origin::Container { image } => (image.clone(), None),
            _ => {
                let record = self.require_app(&app)?.record;
                let outcome = self
                    .pipeline
                    .stage(&app, &origin, record.builder_image.as_deref(), user, cancel)
                    .await?;
                (outcome.image, Some(outcome.stage_id))
            }
        };
        self.registry.record_image(&app, &image, stage_id.as_deref())?;

        self.deploy(&app, user, None, cancel).await?;
        self.require_app(&app)
    }

    /// Re-push of an existing application: explicit fields win, omitted
    /// ones keep their current value.
    async fn apply_push_update(
        &self,
        current: &Application,
        request: &PushRequest,
    ) -> OrchestratorResult<()> {
        let app = current.app_ref();
        if let Some(chart) = &request.app_chart {
            if *chart != current.record.app_chart && current.has_workload() {
                return Err(OrchestratorError::bad_request(CHART_FROZEN));
            }
        }
        self.preflight(&app.namespace, &request.configurations, &request.services)?;

        if let Some(instances) = request.instances {
            self.registry.scaling_set(&app, instances)?;
        }
        if !request.environment.is_empty() {
            self.registry
                .environment_set(&app, &request.environment, false)?;
        }
        if let Some(chart) = &request.app_chart {
            self.registry.set_app_chart(&app, chart)?;
        }
        if let Some(routes) = &request.routes {
            self.registry.set_routes(&app, routes)?;
        }
        if !request.configurations.is_empty() {
            self.ledger
                .create_binding(&app.namespace, &app.name, &request.configurations)?;
        }
        for service in &request.services {
            self.bind_service_records(&app, service).await?;
        }
        Ok(())
    }

    /// Change any subset of instances, environment, bound configurations,
    /// app chart and routes. A running workload is rolled if the desired
    /// state changed.
    pub async fn update(
        &self,
        app: &AppRef,
        request: UpdateRequest,
        user: &str,
        cancel: &CancelSignal,
    ) -> OrchestratorResult<Application> {
        let current = self.require_app(app)?;
        if let Some(chart) = &request.app_chart {
            if current.has_workload() {
                return Err(OrchestratorError::bad_request(CHART_FROZEN));
            }
            self.check_chart(chart)?;
        }
        if let Some(environment) = &request.environment {
            validate_environment(environment)?;
        }
        if let Some(configurations) = &request.configurations {
            self.preflight(&app.namespace, configurations, &[])?;
            let dropped = current
                .configurations
                .iter()
                .filter(|c| !configurations.contains(c));
            self.check_service_bindings_kept(&current, dropped)?;
        }
        let before = self.desired_state(&current)?;

        if let Some(instances) = request.instances {
            self.registry.scaling_set(app, instances)?;
        }
        if let Some(environment) = &request.environment {
            self.registry.environment_set(app, environment, false)?;
        }
        if let Some(chart) = &request.app_chart {
            self.registry.set_app_chart(app, chart)?;
        }
        if let Some(routes) = &request.routes {
            self.registry.set_routes(app, routes)?;
        }
        if let Some(wanted) = &request.configurations {
            let added: Vec<String> = wanted
                .iter()
                .filter(|c| !current.configurations.contains(c))
                .cloned()
                .collect();
            self.ledger
                .create_binding(&app.namespace, &app.name, &added)?;
            for stale in current.configurations.iter().filter(|c| !wanted.contains(c)) {
                self.ledger.remove_binding(&app.namespace, &app.name, stale)?;
            }
        }

        let restart = self.converge(app, &before, user, cancel).await?;
        info!(namespace = %app.namespace, app = %app.name, ?restart, "application updated");
        self.require_app(app)
    }

    /// Stage the recorded origin again, reusing the build cache, and deploy.
    pub async fn restage(
        &self,
        app: &AppRef,
        user: &str,
        cancel: &CancelSignal,
    ) -> OrchestratorResult<Application> {
        let current = self.require_app(app)?;
        let origin = &current.record.origin;
        match origin {
            Origin::Container { .. } => {
                return Err(OrchestratorError::bad_request(CONTAINER_RESTAGE));
            }
            Origin::None => {
                return Err(OrchestratorError::bad_request(format!(
                    "Unable to restage application '{}' without an origin",
                    app.name
                )));
            }
            Origin::Git { .. } | Origin::Path { .. } => {}
        }

        let outcome = self
            .pipeline
            .stage(
                app,
                origin,
                current.record.builder_image.as_deref(),
                user,
                cancel,
            )
            .await?;
        self.registry
            .record_image(app, &outcome.image, Some(&outcome.stage_id))?;
        self.deploy(app, user, None, cancel).await?;
        self.require_app(app)
    }

    /// Remove the workload and routes, every binding, the build cache and the
    /// record. Returns the configuration names that were unbound.
    ///
    /// Bindings are removed even when the workload teardown fails; the record
    /// is then kept so that repeating the call finishes the job, and the
    /// unbound names travel in [`OrchestratorError::TeardownIncomplete`].
    pub async fn delete(&self, app: &AppRef) -> OrchestratorResult<Vec<String>> {
        let current = self.require_app(app)?;
        let mut routes = current.record.routes.clone();
        if let Some(workload) = &current.record.workload {
            for route in &workload.routes {
                if !routes.contains(route) {
                    routes.push(route.clone());
                }
            }
        }

        let teardown = self.reconciler.teardown(app, &routes).await;
        let unbound = self.ledger.remove_all(&app.namespace, &app.name)?;
        if let Err(e) = teardown {
            warn!(app = %app, error = %e, unbound = ?unbound, "workload teardown incomplete, record kept");
            return Err(OrchestratorError::TeardownIncomplete {
                app: app.to_string(),
                reason: e.to_string(),
                unbound,
            });
        }

        self.pipeline.discard_cache(app).await?;
        self.registry.delete(app)?;
        info!(namespace = %app.namespace, app = %app.name, unbound = ?unbound, "application deleted");
        Ok(unbound)
    }

    /// Block until every desired replica of an existing workload is ready.
    pub async fn wait_for_running(
        &self,
        app: &AppRef,
        cancel: &CancelSignal,
    ) -> OrchestratorResult<DeploymentStatus> {
        let current = self.require_app(app)?;
        if !current.has_workload() {
            return Err(OrchestratorError::bad_request(format!(
                "application '{}' has no workload",
                app.name
            )));
        }
        Ok(self.reconciler.wait_running(app, cancel).await?)
    }

    /// The record, bound configurations and observed workload status.
    pub async fn show(&self, app: &AppRef) -> OrchestratorResult<AppDetails> {
        let application = self.require_app(app)?;
        let status = if application.has_workload() {
            self.reconciler.status(app).await?
        } else {
            None
        };
        Ok(AppDetails {
            application,
            status,
        })
    }

    pub fn list(&self, namespace: &str) -> OrchestratorResult<Vec<AppRecord>> {
        self.namespaces.require(namespace)?;
        Ok(self.registry.list(namespace)?)
    }

    /// Clear workload references whose deployment the cluster no longer has,
    /// e.g. after a restart against a fresh cluster. The image is kept, so a
    /// restage or push deploys again. Returns the applications affected.
    pub async fn forget_lost_workloads(&self) -> OrchestratorResult<Vec<AppRef>> {
        let mut forgotten = Vec::new();
        for namespace in self.namespaces.list()? {
            for record in self.registry.list(&namespace.name)? {
                if record.workload.is_none() {
                    continue;
                }
                let app = AppRef::new(&record.namespace, &record.name)?;
                if self
                    .cluster
                    .deployment_exists(&app.namespace, &app.resource_name())
                    .await?
                {
                    continue;
                }
                self.registry.set_workload(&app, None)?;
                warn!(app = %app, "workload reference dropped, deployment not found");
                forgotten.push(app);
            }
        }
        Ok(forgotten)
    }
}

pub(crate) fn validate_environment(vars: &BTreeMap<String, String>) -> OrchestratorResult<()> {
    for name in vars.keys() {
        validate_env_name(name)?;
    }
    Ok(())
}
