//! Configuration operations and their restart triggers.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use berth_core::{AppRef, CancelSignal};
use berth_state::{ConfigurationOrigin, ConfigurationRecord};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::orchestrator::Orchestrator;
use crate::restart::DesiredState;

/// A configuration with the applications bound to it.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigurationDetails {
    #[serde(flatten)]
    pub record: ConfigurationRecord,
    pub bound_applications: Vec<String>,
}

impl Orchestrator {
    pub fn create_configuration(
        &self,
        namespace: &str,
        name: &str,
        values: BTreeMap<String, String>,
    ) -> OrchestratorResult<ConfigurationRecord> {
        self.namespaces.require(namespace)?;
        Ok(self
            .configurations
            .create(namespace, name, values, ConfigurationOrigin::User)?)
    }

    pub fn show_configuration(
        &self,
        namespace: &str,
        name: &str,
    ) -> OrchestratorResult<ConfigurationDetails> {
        self.namespaces.require(namespace)?;
        let record = self.configurations.require(namespace, name)?;
        let bound_applications = self.ledger.bound_applications(namespace, name)?;
        Ok(ConfigurationDetails {
            record,
            bound_applications,
        })
    }

    pub fn list_configurations(&self, namespace: &str) -> OrchestratorResult<Vec<ConfigurationDetails>> {
        self.namespaces.require(namespace)?;
        self.configurations
            .list(namespace)?
            .into_iter()
            .map(|record| {
                let bound_applications = self.ledger.bound_applications(namespace, &record.name)?;
                Ok(ConfigurationDetails {
                    record,
                    bound_applications,
                })
            })
            .collect()
    }

    /// Replace the values. When the content changed, every bound application
    /// with a workload is rolled so its pods remount the new values.
    /// Returns whether the content changed.
    pub async fn replace_configuration(
        &self,
        namespace: &str,
        name: &str,
        values: BTreeMap<String, String>,
        user: &str,
        cancel: &CancelSignal,
    ) -> OrchestratorResult<bool> {
        self.namespaces.require(namespace)?;
        self.configurations.require(namespace, name)?;
        let running = self.running_bound_apps(namespace, name)?;
        let changed = self.configurations.replace(namespace, name, values)?;
        if changed {
            self.restart_bound(running, user, cancel).await?;
        }
        info!(%namespace, configuration = %name, changed, "configuration replaced");
        Ok(changed)
    }

    /// Set and remove individual keys, then restart like
    /// [`replace_configuration`](Self::replace_configuration).
    pub async fn update_configuration(
        &self,
        namespace: &str,
        name: &str,
        set: &BTreeMap<String, String>,
        remove: &[String],
        user: &str,
        cancel: &CancelSignal,
    ) -> OrchestratorResult<bool> {
        self.namespaces.require(namespace)?;
        self.configurations.require(namespace, name)?;
        let running = self.running_bound_apps(namespace, name)?;
        let changed = self.configurations.update(namespace, name, set, remove)?;
        if changed {
            self.restart_bound(running, user, cancel).await?;
        }
        info!(%namespace, configuration = %name, changed, "configuration updated");
        Ok(changed)
    }

    /// Delete a user configuration. While bound this fails unless `unbind`
    /// is set, in which case every binding is removed first. Returns the
    /// applications that were unbound.
    pub async fn delete_configuration(
        &self,
        namespace: &str,
        name: &str,
        unbind: bool,
        user: &str,
        cancel: &CancelSignal,
    ) -> OrchestratorResult<Vec<String>> {
        self.namespaces.require(namespace)?;
        let record = self.configurations.require(namespace, name)?;
        if let ConfigurationOrigin::Service { service } = &record.origin {
            return Err(OrchestratorError::bad_request(format!(
                "configuration '{name}' belongs to service '{service}'; delete the service instead"
            )));
        }

        let bound = self.ledger.bound_applications(namespace, name)?;
        if !bound.is_empty() && !unbind {
            return Err(OrchestratorError::bad_request(format!(
                "configuration '{name}' is bound to applications: {}",
                bound.join(", ")
            )));
        }
        for app_name in &bound {
            let app = AppRef::new(namespace, app_name)?;
            self.unbind_configuration(&app, name, user, cancel).await?;
        }

        self.configurations.delete(namespace, name)?;
        Ok(bound)
    }

    /// Desired states of the applications bound to `configuration` that
    /// currently have a workload.
    fn running_bound_apps(
        &self,
        namespace: &str,
        configuration: &str,
    ) -> OrchestratorResult<Vec<(AppRef, DesiredState)>> {
        let mut running = Vec::new();
        for app_name in self.ledger.bound_applications(namespace, configuration)? {
            let app = AppRef::new(namespace, &app_name)?;
            let Some(current) = self.registry.lookup(&app)? else {
                continue;
            };
            if current.has_workload() {
                let before = self.desired_state(&current)?;
                running.push((app, before));
            }
        }
        Ok(running)
    }

    /// Roll each application. Every one is attempted; failures are
    /// reported together.
    async fn restart_bound(
        &self,
        apps: Vec<(AppRef, DesiredState)>,
        user: &str,
        cancel: &CancelSignal,
    ) -> OrchestratorResult<()> {
        let mut failures = Vec::new();
        for (app, before) in apps {
            if let Err(e) = self.converge(&app, &before, user, cancel).await {
                warn!(app = %app, error = %e, "restart after configuration change failed");
                failures.push(e);
            }
        }
        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(OrchestratorError::Multi(failures)),
        }
    }
}
