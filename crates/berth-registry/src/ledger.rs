//! Service Binding Ledger.
//!
//! Owns binding existence only. Configuration content lives in the
//! [`ConfigurationStore`]; a service's generated configurations are discovered
//! from the cluster at bind time and labelled there.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use berth_core::EntityKind;
use berth_state::{BindingRecord, StateStore};
use berth_substrate::Cluster;

use crate::configurations::ConfigurationStore;
use crate::error::{RegistryError, RegistryResult};

/// Label marking a secret as a usable configuration.
pub const CONFIGURATION_LABEL: &str = "berth.io/configuration";

#[derive(Clone)]
pub struct BindingLedger {
    store: StateStore,
    configurations: ConfigurationStore,
    cluster: Arc<dyn Cluster>,
}

impl BindingLedger {
    pub fn new(store: StateStore, cluster: Arc<dyn Cluster>) -> Self {
        Self {
            configurations: ConfigurationStore::new(store.clone()),
            store,
            cluster,
        }
    }

    /// Label the secrets backing `service` as configurations and return
    /// their names, sorted. Re-labelling is a no-op.
    pub async fn label_service_secrets(
        &self,
        namespace: &str,
        service: &str,
    ) -> RegistryResult<Vec<String>> {
        let secrets = self.cluster.service_secrets(namespace, service).await?;
        let labels = BTreeMap::from([(CONFIGURATION_LABEL.to_string(), service.to_string())]);

        let mut names = Vec::with_capacity(secrets.len());
        for secret in secrets {
            if secret.labels.get(CONFIGURATION_LABEL) != Some(&service.to_string()) {
                self.cluster
                    .secret_label(namespace, &secret.name, &labels)
                    .await?;
                debug!(%namespace, %service, secret = %secret.name, "secret labelled");
            }
            self.configurations
                .upsert_generated(namespace, &secret.name, service, &secret.data)?;
            names.push(secret.name);
        }
        names.sort();
        Ok(names)
    }

    /// Bind every configuration in `names` to `application`.
    ///
    /// All names are checked first; every missing one is reported in a single
    /// `Multi` error and nothing is written. Returns the bindings that did not
    /// exist before.
    pub fn create_binding(
        &self,
        namespace: &str,
        application: &str,
        names: &[String],
    ) -> RegistryResult<Vec<String>> {
        if !self
            .store
            .application_exists(&format!("{namespace}/{application}"))?
        {
            return Err(RegistryError::not_found(EntityKind::Application, application));
        }

        let mut missing = Vec::new();
        for name in names {
            if !self.configurations.exists(namespace, name)? {
                missing.push(RegistryError::not_found(EntityKind::Configuration, name));
            }
        }
        if !missing.is_empty() {
            return Err(RegistryError::Multi(missing));
        }

        let mut created = Vec::new();
        for name in names {
            let binding = BindingRecord {
                namespace: namespace.to_string(),
                application: application.to_string(),
                configuration: name.clone(),
            };
            if self.store.insert_binding(&binding)? {
                created.push(name.clone());
            }
        }
        info!(%namespace, app = %application, created = ?created, "configurations bound");
        Ok(created)
    }

    /// Idempotent. Returns whether a binding was removed.
    pub fn remove_binding(
        &self,
        namespace: &str,
        application: &str,
        configuration: &str,
    ) -> RegistryResult<bool> {
        let removed = self
            .store
            .delete_binding(namespace, application, configuration)?;
        debug!(%namespace, app = %application, %configuration, removed, "binding removed");
        Ok(removed)
    }

    /// Configuration names bound to an application, sorted.
    pub fn bound_configurations(&self, namespace: &str, application: &str) -> RegistryResult<Vec<String>> {
        Ok(self
            .store
            .list_bindings_for_app(namespace, application)?
            .into_iter()
            .map(|b| b.configuration)
            .collect())
    }

    /// Application names bound to a configuration, sorted.
    pub fn bound_applications(&self, namespace: &str, configuration: &str) -> RegistryResult<Vec<String>> {
        let mut apps: Vec<String> = self
            .store
            .list_bindings_for_configuration(namespace, configuration)?
            .into_iter()
            .map(|b| b.application)
            .collect();
        apps.sort();
        apps.dedup();
        Ok(apps)
    }

    /// Drop every binding of an application, returning the configuration names.
    pub fn remove_all(&self, namespace: &str, application: &str) -> RegistryResult<Vec<String>> {
        Ok(self
            .store
            .delete_bindings_for_app(namespace, application)?
            .into_iter()
            .map(|b| b.configuration)
            .collect())
    }
}
