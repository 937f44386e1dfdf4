//! Provisioned service records.

use tracing::info;

use berth_core::{EntityKind, epoch_secs, validate_name};
use berth_state::{ServiceRecord, StateStore};

use crate::error::{RegistryError, RegistryResult};

#[derive(Clone)]
pub struct ServiceRecords {
    store: StateStore,
}

impl ServiceRecords {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    pub fn create(
        &self,
        namespace: &str,
        name: &str,
        catalog_service: &str,
        owner: &str,
    ) -> RegistryResult<ServiceRecord> {
        validate_name("service", name)?;
        let record = ServiceRecord {
            namespace: namespace.to_string(),
            name: name.to_string(),
            catalog_service: catalog_service.to_string(),
            owner: owner.to_string(),
            created_at: epoch_secs(),
        };
        if !self.store.insert_service(&record)? {
            return Err(RegistryError::already_exists(EntityKind::Service, name));
        }
        info!(%namespace, service = %name, %catalog_service, "service recorded");
        Ok(record)
    }

    pub fn get(&self, namespace: &str, name: &str) -> RegistryResult<Option<ServiceRecord>> {
        Ok(self.store.get_service(&format!("{namespace}/{name}"))?)
    }

    pub fn require(&self, namespace: &str, name: &str) -> RegistryResult<ServiceRecord> {
        self.get(namespace, name)?
            .ok_or_else(|| RegistryError::not_found(EntityKind::Service, name))
    }

    pub fn list(&self, namespace: &str) -> RegistryResult<Vec<ServiceRecord>> {
        Ok(self.store.list_services(namespace)?)
    }

    pub fn delete(&self, namespace: &str, name: &str) -> RegistryResult<bool> {
        Ok(self.store.delete_service(&format!("{namespace}/{name}"))?)
    }
}
