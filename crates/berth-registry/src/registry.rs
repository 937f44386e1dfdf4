//! Application Registry: owns the canonical application record.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, info};

use berth_core::{AppRef, EntityKind, Origin, epoch_secs};
use berth_state::{AppRecord, StateStore, WorkloadRef};

use crate::error::{RegistryError, RegistryResult};

/// An application record joined with its configuration bindings.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Application {
    #[serde(flatten)]
    pub record: AppRecord,
    /// Bound configuration names, sorted.
    pub configurations: Vec<String>,
}

impl Application {
    pub fn app_ref(&self) -> AppRef {
        self.record.app_ref()
    }

    pub fn has_workload(&self) -> bool {
        self.record.workload.is_some()
    }
}

#[derive(Clone)]
pub struct ApplicationRegistry {
    store: StateStore,
}

impl ApplicationRegistry {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// Never fails for an absent application, only for store failures.
    pub fn exists(&self, app: &AppRef) -> RegistryResult<bool> {
        Ok(self.store.application_exists(&app.table_key())?)
    }

    /// The full record with bound configurations, or `None`.
    pub fn lookup(&self, app: &AppRef) -> RegistryResult<Option<Application>> {
        let Some(record) = self.store.get_application(&app.table_key())? else {
            return Ok(None);
        };
        let configurations = self
            .store
            .list_bindings_for_app(&app.namespace, &app.name)?
            .into_iter()
            .map(|b| b.configuration)
            .collect();
        Ok(Some(Application {
            record,
            configurations,
        }))
    }

    /// Like [`lookup`](Self::lookup), failing with `NotFound` when absent.
    pub fn require(&self, app: &AppRef) -> RegistryResult<Application> {
        self.lookup(app)?
            .ok_or_else(|| RegistryError::not_found(EntityKind::Application, &app.name))
    }

    pub fn list(&self, namespace: &str) -> RegistryResult<Vec<AppRecord>> {
        Ok(self.store.list_applications(namespace)?)
    }

    /// Create a record with no workload, empty environment and no bindings.
    pub fn create(
        &self,
        app: &AppRef,
        owner: &str,
        instances: u32,
        app_chart: &str,
    ) -> RegistryResult<AppRecord> {
        let record = AppRecord::new(app, owner, instances, app_chart, epoch_secs());
        if !self.store.insert_application(&record)? {
            return Err(RegistryError::already_exists(EntityKind::Application, &app.name));
        }
        info!(namespace = %app.namespace, app = %app.name, %owner, "application created");
        Ok(record)
    }

    /// Atomic read-modify-write of one record; bumps `updated_at`.
    fn modify<R>(&self, app: &AppRef, f: impl FnOnce(&mut AppRecord) -> R) -> RegistryResult<R> {
        let now = epoch_secs();
        self.store
            .update_application(&app.table_key(), |record| {
                let out = f(record);
                record.updated_at = now;
                out
            })?
            .ok_or_else(|| RegistryError::not_found(EntityKind::Application, &app.name))
    }

    pub fn scaling_set(&self, app: &AppRef, instances: u32) -> RegistryResult<()> {
        self.modify(app, |r| r.instances = instances)?;
        debug!(app = %app, instances, "desired instances set");
        Ok(())
    }

    /// Record bound service names; `replace_all` drops the previous set.
    pub fn bound_services_set(
        &self,
        app: &AppRef,
        names: &[String],
        replace_all: bool,
    ) -> RegistryResult<()> {
        self.modify(app, |r| {
            if replace_all {
                r.services = names.iter().cloned().collect();
            } else {
                r.services.extend(names.iter().cloned());
            }
        })?;
        debug!(app = %app, ?names, replace_all, "bound services set");
        Ok(())
    }

    /// Returns whether the service was recorded. Absent names are not an error.
    pub fn bound_services_unset(&self, app: &AppRef, name: &str) -> RegistryResult<bool> {
        let removed = self.modify(app, |r| r.services.remove(name))?;
        debug!(app = %app, service = %name, removed, "bound service unset");
        Ok(removed)
    }

    pub fn environment_set(
        &self,
        app: &AppRef,
        vars: &BTreeMap<String, String>,
        replace_all: bool,
    ) -> RegistryResult<()> {
        self.modify(app, |r| {
            if replace_all {
                r.environment = vars.clone();
            } else {
                r.environment
                    .extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        })?;
        debug!(app = %app, count = vars.len(), replace_all, "environment set");
        Ok(())
    }

    /// Returns whether the variable was present.
    pub fn environment_unset(&self, app: &AppRef, name: &str) -> RegistryResult<bool> {
        self.modify(app, |r| r.environment.remove(name).is_some())
    }

    pub fn set_app_chart(&self, app: &AppRef, chart: &str) -> RegistryResult<()> {
        self.modify(app, |r| r.app_chart = chart.to_string())
    }

    pub fn set_origin(&self, app: &AppRef, origin: &Origin) -> RegistryResult<()> {
        self.modify(app, |r| r.origin = origin.clone())
    }

    pub fn set_routes(&self, app: &AppRef, routes: &[String]) -> RegistryResult<()> {
        let mut deduped = BTreeSet::new();
        let routes: Vec<String> = routes
            .iter()
            .filter(|r| deduped.insert(r.as_str()))
            .cloned()
            .collect();
        self.modify(app, |r| r.routes = routes)
    }

    pub fn set_builder_image(&self, app: &AppRef, builder: Option<&str>) -> RegistryResult<()> {
        self.modify(app, |r| r.builder_image = builder.map(str::to_string))
    }

    /// Remember the image the next deploy should use.
    pub fn record_image(
        &self,
        app: &AppRef,
        image: &str,
        stage_id: Option<&str>,
    ) -> RegistryResult<()> {
        self.modify(app, |r| {
            r.image = Some(image.to_string());
            r.stage_id = stage_id.map(str::to_string);
        })?;
        debug!(app = %app, %image, ?stage_id, "image recorded");
        Ok(())
    }

    pub fn set_workload(&self, app: &AppRef, workload: Option<WorkloadRef>) -> RegistryResult<()> {
        self.modify(app, |r| r.workload = workload)
    }

    pub fn delete(&self, app: &AppRef) -> RegistryResult<bool> {
        let existed = self.store.delete_application(&app.table_key())?;
        if existed {
            info!(namespace = %app.namespace, app = %app.name, "application record deleted");
        }
        Ok(existed)
    }
}
