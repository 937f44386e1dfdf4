//! Service operations.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::info;

use berth_core::{AppRef, CancelSignal};
use berth_state::ServiceRecord;

use crate::compensation::CompensationLog;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::orchestrator::Orchestrator;

/// A service with its generated configurations and bound applications.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceDetails {
    #[serde(flatten)]
    pub record: ServiceRecord,
    pub configurations: Vec<String>,
    pub bound_applications: Vec<String>,
}

impl Orchestrator {
    /// Record the service and have the cluster provision it. A failed
    /// provision removes the record again.
    pub async fn create_service(
        &self,
        namespace: &str,
        name: &str,
        catalog_service: &str,
        user: &str,
    ) -> OrchestratorResult<ServiceRecord> {
        self.namespaces.require(namespace)?;
        if catalog_service.is_empty() {
            return Err(OrchestratorError::bad_request("catalog service must not be empty"));
        }

        let mut log = CompensationLog::new(format!("create service {namespace}/{name}"));
        let record = log.check(self.services.create(namespace, name, catalog_service, user))?;
        {
            let services = self.services.clone();
            let (namespace, name) = (namespace.to_string(), name.to_string());
            log.record("service record", move || {
                services.delete(&namespace, &name).map(|_| ())
            });
        }
        let provisioned = self
            .cluster
            .service_provision(namespace, name, catalog_service)
            .await;
        log.check(provisioned)?;
        log.commit();

        info!(%namespace, service = %name, %catalog_service, "service provisioned");
        Ok(record)
    }

    pub fn show_service(&self, namespace: &str, name: &str) -> OrchestratorResult<ServiceDetails> {
        self.namespaces.require(namespace)?;
        let record = self.services.require(namespace, name)?;
        let configurations = self
            .configurations
            .list_for_service(namespace, name)?
            .into_iter()
            .map(|c| c.name)
            .collect();
        let bound_applications = self.service_bound_apps(namespace, name)?.into_iter().collect();
        Ok(ServiceDetails {
            record,
            configurations,
            bound_applications,
        })
    }

    pub fn list_services(&self, namespace: &str) -> OrchestratorResult<Vec<ServiceRecord>> {
        self.namespaces.require(namespace)?;
        Ok(self.services.list(namespace)?)
    }

    /// Deprovision a service and drop its generated configurations. While
    /// bound this fails unless `unbind` is set. Returns the applications
    /// that were unbound.
    pub async fn delete_service(
        &self,
        namespace: &str,
        name: &str,
        unbind: bool,
        user: &str,
        cancel: &CancelSignal,
    ) -> OrchestratorResult<Vec<String>> {
        self.namespaces.require(namespace)?;
        self.services.require(namespace, name)?;

        let bound: Vec<String> = self.service_bound_apps(namespace, name)?.into_iter().collect();
        if !bound.is_empty() && !unbind {
            return Err(OrchestratorError::bad_request(format!(
                "service '{name}' is bound to applications: {}",
                bound.join(", ")
            )));
        }
        for app_name in &bound {
            let app = AppRef::new(namespace, app_name)?;
            self.unbind_service(&app, name, user, cancel).await?;
        }

        self.cluster.service_deprovision(namespace, name).await?;
        for configuration in self.configurations.list_for_service(namespace, name)? {
            self.configurations.delete(namespace, &configuration.name)?;
        }
        self.services.delete(namespace, name)?;
        info!(%namespace, service = %name, unbound = ?bound, "service deleted");
        Ok(bound)
    }

    /// Applications that record the service or mount any of its
    /// configurations.
    fn service_bound_apps(&self, namespace: &str, service: &str) -> OrchestratorResult<BTreeSet<String>> {
        let mut apps: BTreeSet<String> = self
            .registry
            .list(namespace)?
            .into_iter()
            .filter(|a| a.services.contains(service))
            .map(|a| a.name)
            .collect();
        for configuration in self.configurations.list_for_service(namespace, service)? {
            apps.extend(self.ledger.bound_applications(namespace, &configuration.name)?);
        }
        Ok(apps)
    }
}
