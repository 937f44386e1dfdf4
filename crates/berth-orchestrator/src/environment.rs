//! Environment variable edits.

use std::collections::BTreeMap;

use tracing::info;

use berth_core::{AppRef, CancelSignal};

use crate::error::OrchestratorResult;
use crate::orchestrator::{Orchestrator, validate_environment};
use crate::restart::Restart;

impl Orchestrator {
    /// Merge `vars` into the environment; a running workload is rolled with
    /// a fresh generation stamp when anything changed.
    pub async fn set_environment(
        &self,
        app: &AppRef,
        vars: &BTreeMap<String, String>,
        user: &str,
        cancel: &CancelSignal,
    ) -> OrchestratorResult<Restart> {
        validate_environment(vars)?;
        let current = self.require_app(app)?;
        let before = self.desired_state(&current)?;
        self.registry.environment_set(app, vars, false)?;
        let restart = self.converge(app, &before, user, cancel).await?;
        info!(namespace = %app.namespace, app = %app.name, count = vars.len(), ?restart, "environment set");
        Ok(restart)
    }

    /// Remove one variable. Absent names are not an error.
    pub async fn unset_environment(
        &self,
        app: &AppRef,
        name: &str,
        user: &str,
        cancel: &CancelSignal,
    ) -> OrchestratorResult<bool> {
        let current = self.require_app(app)?;
        let before = self.desired_state(&current)?;
        let removed = self.registry.environment_unset(app, name)?;
        if removed {
            self.converge(app, &before, user, cancel).await?;
        }
        Ok(removed)
    }

    pub fn list_environment(&self, app: &AppRef) -> OrchestratorResult<BTreeMap<String, String>> {
        Ok(self.require_app(app)?.record.environment)
    }
}
