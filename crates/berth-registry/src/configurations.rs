//! Configuration Store: named key/value bundles scoped to a namespace.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use berth_core::{EntityKind, epoch_secs, validate_name};
use berth_state::{ConfigurationOrigin, ConfigurationRecord, StateStore};

use crate::error::{RegistryError, RegistryResult};

/// Stable digest of a configuration's values.
///
/// Workloads remount a configuration whenever this changes.
pub fn content_digest(values: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in values {
        hasher.update((key.len() as u64).to_be_bytes());
        hasher.update(key.as_bytes());
        hasher.update((value.len() as u64).to_be_bytes());
        hasher.update(value.as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

#[derive(Clone)]
pub struct ConfigurationStore {
    store: StateStore,
}

impl ConfigurationStore {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    pub fn create(
        &self,
        namespace: &str,
        name: &str,
        values: BTreeMap<String, String>,
        origin: ConfigurationOrigin,
    ) -> RegistryResult<ConfigurationRecord> {
        validate_name("configuration", name)?;
        let now = epoch_secs();
        let record = ConfigurationRecord {
            namespace: namespace.to_string(),
            name: name.to_string(),
            values,
            origin,
            created_at: now,
            updated_at: now,
        };
        if !self.store.insert_configuration(&record)? {
            return Err(RegistryError::already_exists(EntityKind::Configuration, name));
        }
        info!(%namespace, configuration = %name, "configuration created");
        Ok(record)
    }

    pub fn get(&self, namespace: &str, name: &str) -> RegistryResult<Option<ConfigurationRecord>> {
        Ok(self.store.get_configuration(&key(namespace, name))?)
    }

    pub fn require(&self, namespace: &str, name: &str) -> RegistryResult<ConfigurationRecord> {
        self.get(namespace, name)?
            .ok_or_else(|| RegistryError::not_found(EntityKind::Configuration, name))
    }

    pub fn exists(&self, namespace: &str, name: &str) -> RegistryResult<bool> {
        Ok(self.get(namespace, name)?.is_some())
    }

    pub fn list(&self, namespace: &str) -> RegistryResult<Vec<ConfigurationRecord>> {
        Ok(self.store.list_configurations(namespace)?)
    }

    /// Configurations generated from one service's credential secrets.
    pub fn list_for_service(
        &self,
        namespace: &str,
        service: &str,
    ) -> RegistryResult<Vec<ConfigurationRecord>> {
        Ok(self
            .list(namespace)?
            .into_iter()
            .filter(|c| matches!(&c.origin, ConfigurationOrigin::Service { service: s } if s == service))
            .collect())
    }

    /// Replace all values. Returns whether the content changed.
    pub fn replace(
        &self,
        namespace: &str,
        name: &str,
        values: BTreeMap<String, String>,
    ) -> RegistryResult<bool> {
        self.edit(namespace, name, |current| *current = values)
    }

    /// Set and remove individual keys. Returns whether the content changed.
    pub fn update(
        &self,
        namespace: &str,
        name: &str,
        set: &BTreeMap<String, String>,
        remove: &[String],
    ) -> RegistryResult<bool> {
        self.edit(namespace, name, |current| {
            for k in remove {
                current.remove(k);
            }
            current.extend(set.iter().map(|(k, v)| (k.clone(), v.clone())));
        })
    }

    fn edit(
        &self,
        namespace: &str,
        name: &str,
        f: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> RegistryResult<bool> {
        let now = epoch_secs();
        let changed = self
            .store
            .update_configuration(&key(namespace, name), |record| {
                let before = content_digest(&record.values);
                f(&mut record.values);
                let changed = content_digest(&record.values) != before;
                if changed {
                    record.updated_at = now;
                }
                changed
            })?
            .ok_or_else(|| RegistryError::not_found(EntityKind::Configuration, name))?;
        debug!(%namespace, configuration = %name, changed, "configuration edited");
        Ok(changed)
    }

    /// Create or refresh a service-generated configuration.
    /// Returns whether anything was written.
    pub fn upsert_generated(
        &self,
        namespace: &str,
        name: &str,
        service: &str,
        values: &BTreeMap<String, String>,
    ) -> RegistryResult<bool> {
        let origin = ConfigurationOrigin::Service {
            service: service.to_string(),
        };
        match self.get(namespace, name)? {
            Some(existing) if existing.values == *values && existing.origin == origin => Ok(false),
            Some(mut existing) => {
                existing.values = values.clone();
                existing.origin = origin;
                existing.updated_at = epoch_secs();
                self.store.put_configuration(&existing)?;
                Ok(true)
            }
            None => {
                self.create(namespace, name, values.clone(), origin)?;
                Ok(true)
            }
        }
    }

    pub fn delete(&self, namespace: &str, name: &str) -> RegistryResult<bool> {
        let existed = self.store.delete_configuration(&key(namespace, name))?;
        if existed {
            info!(%namespace, configuration = %name, "configuration deleted");
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn configurations() -> ConfigurationStore {
        ConfigurationStore::new(StateStore::open_in_memory().unwrap())
    }

    #[test]
    fn digest_distinguishes_key_value_boundaries() {
        assert_ne!(
            content_digest(&values(&[("ab", "c")])),
            content_digest(&values(&[("a", "bc")]))
        );
        assert_eq!(
            content_digest(&values(&[("a", "1"), ("b", "2")])),
            content_digest(&values(&[("b", "2"), ("a", "1")]))
        );
    }

    #[test]
    fn create_rejects_duplicates() {
        let configs = configurations();
        configs
            .create("ns", "db", values(&[("user", "u")]), ConfigurationOrigin::User)
            .unwrap();
        assert!(matches!(
            configs.create("ns", "db", BTreeMap::new(), ConfigurationOrigin::User),
            Err(RegistryError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn replace_reports_change() {
        let configs = configurations();
        configs
            .create("ns", "db", values(&[("user", "u")]), ConfigurationOrigin::User)
            .unwrap();
        assert!(!configs.replace("ns", "db", values(&[("user", "u")])).unwrap());
        assert!(configs.replace("ns", "db", values(&[("user", "v")])).unwrap());
        assert_eq!(
            configs.require("ns", "db").unwrap().values,
            values(&[("user", "v")])
        );
        assert!(matches!(
            configs.replace("ns", "missing", BTreeMap::new()),
            Err(RegistryError::NotFound { .. })
        ));
    }

    #[test]
    fn update_sets_and_removes() {
        let configs = configurations();
        configs
            .create(
                "ns",
                "db",
                values(&[("user", "u"), ("pass", "p")]),
                ConfigurationOrigin::User,
            )
            .unwrap();
        let changed = configs
            .update("ns", "db", &values(&[("host", "h")]), &["pass".to_string()])
            .unwrap();
        assert!(changed);
        assert_eq!(
            configs.require("ns", "db").unwrap().values,
            values(&[("host", "h"), ("user", "u")])
        );
    }

    #[test]
    fn upsert_generated_is_idempotent() {
        let configs = configurations();
        let data = values(&[("password", "x")]);
        assert!(configs.upsert_generated("ns", "pg-creds", "pg", &data).unwrap());
        assert!(!configs.upsert_generated("ns", "pg-creds", "pg", &data).unwrap());
        let generated = configs.list_for_service("ns", "pg").unwrap();
        assert_eq!(generated.len(), 1);
        assert_eq!(
            generated[0].origin,
            ConfigurationOrigin::Service {
                service: "pg".to_string()
            }
        );
    }
}
