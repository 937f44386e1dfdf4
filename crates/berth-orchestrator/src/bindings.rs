//! Bind and unbind configurations and services.
//!
//! A bind or unbind that changes what a running workload mounts rolls the
//! workload through the restart predicate, like any other mutation.

use tracing::info;

use berth_core::{AppRef, CancelSignal};

use crate::compensation::CompensationLog;
use crate::error::OrchestratorResult;
use crate::orchestrator::Orchestrator;

impl Orchestrator {
    /// Bind configurations to an application. Unknown names are all
    /// reported together and nothing is bound. Returns the new bindings.
    pub async fn bind_configurations(
        &self,
        app: &AppRef,
        names: &[String],
        user: &str,
        cancel: &CancelSignal,
    ) -> OrchestratorResult<Vec<String>> {
        let current = self.require_app(app)?;
        let before = self.desired_state(&current)?;
        let created = self
            .ledger
            .create_binding(&app.namespace, &app.name, names)?;
        self.converge(app, &before, user, cancel).await?;
        Ok(created)
    }

    /// Idempotent; returns whether a binding was removed.
    pub async fn unbind_configuration(
        &self,
        app: &AppRef,
        configuration: &str,
        user: &str,
        cancel: &CancelSignal,
    ) -> OrchestratorResult<bool> {
        let current = self.require_app(app)?;
        self.configurations.require(&app.namespace, configuration)?;
        self.check_service_bindings_kept(&current, [&configuration.to_string()])?;
        let before = self.desired_state(&current)?;
        let removed = self
            .ledger
            .remove_binding(&app.namespace, &app.name, configuration)?;
        self.converge(app, &before, user, cancel).await?;
        if removed {
            info!(namespace = %app.namespace, app = %app.name, %configuration, "configuration unbound");
        }
        Ok(removed)
    }

    /// Bind a service: its credential secrets become configurations bound to
    /// the application, then the service is recorded on the application.
    /// Returns the service's configuration names.
    pub async fn bind_service(
        &self,
        app: &AppRef,
        service: &str,
        user: &str,
        cancel: &CancelSignal,
    ) -> OrchestratorResult<Vec<String>> {
        let current = self.require_app(app)?;
        self.services.require(&app.namespace, service)?;
        let before = self.desired_state(&current)?;
        let names = self.bind_service_records(app, service).await?;
        self.converge(app, &before, user, cancel).await?;
        Ok(names)
    }

    /// The two-store part of a service bind. If recording the service on the
    /// application fails, the configuration bindings made here are undone.
    pub(crate) async fn bind_service_records(
        &self,
        app: &AppRef,
        service: &str,
    ) -> OrchestratorResult<Vec<String>> {
        let names = self
            .ledger
            .label_service_secrets(&app.namespace, service)
            .await?;

        let mut log = CompensationLog::new(format!("bind service {service} to {app}"));
        let created = log.check(self.ledger.create_binding(&app.namespace, &app.name, &names))?;
        for configuration in created {
            let ledger = self.ledger.clone();
            let app = app.clone();
            log.record(format!("binding {configuration}"), move || {
                ledger
                    .remove_binding(&app.namespace, &app.name, &configuration)
                    .map(|_| ())
            });
        }
        log.check(
            self.registry
                .bound_services_set(app, &[service.to_string()], false),
        )?;
        log.commit();

        info!(namespace = %app.namespace, app = %app.name, %service, configurations = ?names, "service bound");
        Ok(names)
    }

    /// Remove the service and the bindings of every configuration it
    /// generated. Returns those configuration names.
    pub async fn unbind_service(
        &self,
        app: &AppRef,
        service: &str,
        user: &str,
        cancel: &CancelSignal,
    ) -> OrchestratorResult<Vec<String>> {
        let current = self.require_app(app)?;
        self.services.require(&app.namespace, service)?;
        let before = self.desired_state(&current)?;
        let names = self.unbind_service_records(app, service)?;
        self.converge(app, &before, user, cancel).await?;
        Ok(names)
    }

    pub(crate) fn unbind_service_records(
        &self,
        app: &AppRef,
        service: &str,
    ) -> OrchestratorResult<Vec<String>> {
        let names: Vec<String> = self
            .configurations
            .list_for_service(&app.namespace, service)?
            .into_iter()
            .map(|c| c.name)
            .collect();
        for name in &names {
            self.ledger.remove_binding(&app.namespace, &app.name, name)?;
        }
        self.registry.bound_services_unset(app, service)?;
        info!(namespace = %app.namespace, app = %app.name, %service, "service unbound");
        Ok(names)
    }
}
