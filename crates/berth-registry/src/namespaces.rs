//! Namespace records.

use tracing::info;

use berth_core::{EntityKind, epoch_secs, validate_name};
use berth_state::{NamespaceRecord, StateStore};

use crate::error::{RegistryError, RegistryResult};

#[derive(Clone)]
pub struct Namespaces {
    store: StateStore,
}

impl Namespaces {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    pub fn create(&self, name: &str, owner: &str) -> RegistryResult<NamespaceRecord> {
        validate_name("namespace", name)?;
        let record = NamespaceRecord {
            name: name.to_string(),
            owner: owner.to_string(),
            created_at: epoch_secs(),
        };
        if !self.store.insert_namespace(&record)? {
            return Err(RegistryError::already_exists(EntityKind::Namespace, name));
        }
        info!(namespace = %name, %owner, "namespace created");
        Ok(record)
    }

    pub fn exists(&self, name: &str) -> RegistryResult<bool> {
        Ok(self.store.namespace_exists(name)?)
    }

    /// Fail with `NotFound(namespace)` unless `name` exists.
    pub fn require(&self, name: &str) -> RegistryResult<()> {
        if self.exists(name)? {
            Ok(())
        } else {
            Err(RegistryError::not_found(EntityKind::Namespace, name))
        }
    }

    pub fn list(&self) -> RegistryResult<Vec<NamespaceRecord>> {
        Ok(self.store.list_namespaces()?)
    }

    /// Remove the namespace record only; contents are the caller's concern.
    pub fn delete(&self, name: &str) -> RegistryResult<bool> {
        Ok(self.store.delete_namespace(name)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_is_unique() {
        let namespaces = Namespaces::new(StateStore::open_in_memory().unwrap());
        namespaces.create("workspace", "admin").unwrap();
        assert!(matches!(
            namespaces.create("workspace", "admin"),
            Err(RegistryError::AlreadyExists { .. })
        ));
        assert!(namespaces.require("workspace").is_ok());
        assert!(matches!(
            namespaces.require("missing"),
            Err(RegistryError::NotFound {
                kind: EntityKind::Namespace,
                ..
            })
        ));
    }

    #[test]
    fn rejects_invalid_names() {
        let namespaces = Namespaces::new(StateStore::open_in_memory().unwrap());
        assert!(matches!(
            namespaces.create("Bad_Name", "admin"),
            Err(RegistryError::InvalidName(_))
        ));
    }
}
