//! Namespace operations.

use tracing::info;

use berth_core::CancelSignal;
use berth_state::NamespaceRecord;

use crate::error::OrchestratorResult;
use crate::orchestrator::Orchestrator;

impl Orchestrator {
    pub fn create_namespace(&self, name: &str, user: &str) -> OrchestratorResult<NamespaceRecord> {
        Ok(self.namespaces.create(name, user)?)
    }

    pub fn list_namespaces(&self) -> OrchestratorResult<Vec<NamespaceRecord>> {
        Ok(self.namespaces.list()?)
    }

    pub fn namespace_exists(&self, name: &str) -> OrchestratorResult<bool> {
        Ok(self.namespaces.exists(name)?)
    }

    /// Delete a namespace and everything in it: applications (through the
    /// regular delete), then services, then configurations.
    pub async fn delete_namespace(
        &self,
        name: &str,
        user: &str,
        cancel: &CancelSignal,
    ) -> OrchestratorResult<()> {
        self.namespaces.require(name)?;

        let apps = self.registry.list(name)?;
        for app in &apps {
            self.delete(&app.app_ref()).await?;
        }
        let services = self.services.list(name)?;
        for service in &services {
            self.delete_service(name, &service.name, true, user, cancel)
                .await?;
        }
        let configurations = self.configurations.list(name)?;
        for configuration in &configurations {
            self.configurations.delete(name, &configuration.name)?;
        }
        self.namespaces.delete(name)?;

        info!(
            namespace = %name,
            applications = apps.len(),
            services = services.len(),
            configurations = configurations.len(),
            "namespace deleted"
        );
        Ok(())
    }
}
