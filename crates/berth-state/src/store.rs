//! StateStore: redb-backed state persistence for berth.
//!
//! Provides typed CRUD operations over namespaces, applications,
//! configurations, services, and bindings. All values are JSON-serialized
//! into redb's `&[u8]` value columns. The store supports both on-disk and
//! in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for table in [NAMESPACES, APPLICATIONS, CONFIGURATIONS, SERVICES, BINDINGS] {
            txn.open_table(table).map_err(map_err!(Table))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic row access ─────────────────────────────────────────

    fn put<T: Serialize>(&self, table: Table, key: &str, value: &T) -> StateResult<()> {
        let value = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Insert only if the key is absent. Returns false when it already existed.
    fn insert_new<T: Serialize>(&self, table: Table, key: &str, value: &T) -> StateResult<bool> {
        let value = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let inserted;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            inserted = table.get(key).map_err(map_err!(Read))?.is_none();
            if inserted {
                table
                    .insert(key, value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(inserted)
    }

    fn get<T: DeserializeOwned>(&self, table: Table, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn contains(&self, table: Table, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        Ok(table.get(key).map_err(map_err!(Read))?.is_some())
    }

    /// All rows whose key starts with `prefix`, in key order.
    fn list_prefix<T: DeserializeOwned>(&self, table: Table, prefix: &str) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let row: T =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(row);
            }
        }
        Ok(results)
    }

    /// Read-modify-write of one row inside a single write transaction.
    ///
    /// Returns `None` (and writes nothing) when the row does not exist.
    fn update<T, R>(
        &self,
        table: Table,
        key: &str,
        f: impl FnOnce(&mut T) -> R,
    ) -> StateResult<Option<R>>
    where
        T: Serialize + DeserializeOwned,
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let outcome;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            let current: Option<T> = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            outcome = match current {
                Some(mut row) => {
                    let result = f(&mut row);
                    let value = serde_json::to_vec(&row).map_err(map_err!(Serialize))?;
                    table
                        .insert(key, value.as_slice())
                        .map_err(map_err!(Write))?;
                    Some(result)
                }
                None => None,
            };
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(outcome)
    }

    fn delete(&self, table: Table, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    /// Delete every row under `prefix`, returning the removed rows.
    fn delete_prefix<T: DeserializeOwned>(&self, table: Table, prefix: &str) -> StateResult<Vec<T>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut removed = Vec::new();
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            // Collect keys first; the iterator borrows the table.
            let keys: Vec<String> = table
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| {
                    let (key, _) = entry.ok()?;
                    let k = key.value().to_string();
                    k.starts_with(prefix).then_some(k)
                })
                .collect();
            for key in &keys {
                if let Some(guard) = table.remove(key.as_str()).map_err(map_err!(Write))? {
                    let row: T =
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                    removed.push(row);
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(removed)
    }

    // ── Namespaces ─────────────────────────────────────────────────

    /// Create a namespace. Returns false if it already existed.
    pub fn insert_namespace(&self, ns: &NamespaceRecord) -> StateResult<bool> {
        let inserted = self.insert_new(NAMESPACES, &ns.name, ns)?;
        debug!(namespace = %ns.name, inserted, "namespace stored");
        Ok(inserted)
    }

    pub fn get_namespace(&self, name: &str) -> StateResult<Option<NamespaceRecord>> {
        self.get(NAMESPACES, name)
    }

    pub fn namespace_exists(&self, name: &str) -> StateResult<bool> {
        self.contains(NAMESPACES, name)
    }

    pub fn list_namespaces(&self) -> StateResult<Vec<NamespaceRecord>> {
        self.list_prefix(NAMESPACES, "")
    }

    pub fn delete_namespace(&self, name: &str) -> StateResult<bool> {
        let existed = self.delete(NAMESPACES, name)?;
        debug!(namespace = %name, existed, "namespace deleted");
        Ok(existed)
    }

    // ── Applications ───────────────────────────────────────────────

    /// Create an application record. Returns false if the key was taken.
    pub fn insert_application(&self, app: &AppRecord) -> StateResult<bool> {
        let key = app.table_key();
        let inserted = self.insert_new(APPLICATIONS, &key, app)?;
        debug!(%key, inserted, "application stored");
        Ok(inserted)
    }

    /// Insert or overwrite an application record.
    pub fn put_application(&self, app: &AppRecord) -> StateResult<()> {
        let key = app.table_key();
        self.put(APPLICATIONS, &key, app)?;
        debug!(%key, "application stored");
        Ok(())
    }

    /// Get an application by `{namespace}/{name}` key.
    pub fn get_application(&self, key: &str) -> StateResult<Option<AppRecord>> {
        self.get(APPLICATIONS, key)
    }

    pub fn application_exists(&self, key: &str) -> StateResult<bool> {
        self.contains(APPLICATIONS, key)
    }

    /// List the applications of one namespace.
    pub fn list_applications(&self, namespace: &str) -> StateResult<Vec<AppRecord>> {
        self.list_prefix(APPLICATIONS, &format!("{namespace}/"))
    }

    /// Atomically modify an application record.
    pub fn update_application<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut AppRecord) -> R,
    ) -> StateResult<Option<R>> {
        let outcome = self.update(APPLICATIONS, key, f)?;
        debug!(%key, found = outcome.is_some(), "application updated");
        Ok(outcome)
    }

    pub fn delete_application(&self, key: &str) -> StateResult<bool> {
        let existed = self.delete(APPLICATIONS, key)?;
        debug!(%key, existed, "application deleted");
        Ok(existed)
    }

    // ── Configurations ─────────────────────────────────────────────

    pub fn insert_configuration(&self, cfg: &ConfigurationRecord) -> StateResult<bool> {
        let key = cfg.table_key();
        let inserted = self.insert_new(CONFIGURATIONS, &key, cfg)?;
        debug!(%key, inserted, "configuration stored");
        Ok(inserted)
    }

    pub fn put_configuration(&self, cfg: &ConfigurationRecord) -> StateResult<()> {
        let key = cfg.table_key();
        self.put(CONFIGURATIONS, &key, cfg)?;
        debug!(%key, "configuration stored");
        Ok(())
    }

    pub fn get_configuration(&self, key: &str) -> StateResult<Option<ConfigurationRecord>> {
        self.get(CONFIGURATIONS, key)
    }

    pub fn list_configurations(&self, namespace: &str) -> StateResult<Vec<ConfigurationRecord>> {
        self.list_prefix(CONFIGURATIONS, &format!("{namespace}/"))
    }

    pub fn update_configuration<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut ConfigurationRecord) -> R,
    ) -> StateResult<Option<R>> {
        self.update(CONFIGURATIONS, key, f)
    }

    pub fn delete_configuration(&self, key: &str) -> StateResult<bool> {
        let existed = self.delete(CONFIGURATIONS, key)?;
        debug!(%key, existed, "configuration deleted");
        Ok(existed)
    }

    // ── Services ───────────────────────────────────────────────────

    pub fn insert_service(&self, svc: &ServiceRecord) -> StateResult<bool> {
        let key = svc.table_key();
        let inserted = self.insert_new(SERVICES, &key, svc)?;
        debug!(%key, inserted, "service stored");
        Ok(inserted)
    }

    pub fn get_service(&self, key: &str) -> StateResult<Option<ServiceRecord>> {
        self.get(SERVICES, key)
    }

    pub fn list_services(&self, namespace: &str) -> StateResult<Vec<ServiceRecord>> {
        self.list_prefix(SERVICES, &format!("{namespace}/"))
    }

    pub fn delete_service(&self, key: &str) -> StateResult<bool> {
        let existed = self.delete(SERVICES, key)?;
        debug!(%key, existed, "service deleted");
        Ok(existed)
    }

    // ── Bindings ───────────────────────────────────────────────────

    /// Record a binding. Returns false if it already existed.
    pub fn insert_binding(&self, binding: &BindingRecord) -> StateResult<bool> {
        self.insert_new(BINDINGS, &binding.table_key(), binding)
    }

    pub fn delete_binding(&self, namespace: &str, app: &str, configuration: &str) -> StateResult<bool> {
        self.delete(BINDINGS, &binding_key(namespace, app, configuration))
    }

    pub fn list_bindings_for_app(&self, namespace: &str, app: &str) -> StateResult<Vec<BindingRecord>> {
        self.list_prefix(BINDINGS, &format!("{namespace}/{app}/"))
    }

    pub fn list_bindings_for_configuration(
        &self,
        namespace: &str,
        configuration: &str,
    ) -> StateResult<Vec<BindingRecord>> {
        let bindings: Vec<BindingRecord> = self.list_prefix(BINDINGS, &format!("{namespace}/"))?;
        Ok(bindings
            .into_iter()
            .filter(|b| b.configuration == configuration)
            .collect())
    }

    /// Remove every binding of an application, returning what was removed.
    pub fn delete_bindings_for_app(&self, namespace: &str, app: &str) -> StateResult<Vec<BindingRecord>> {
        let removed: Vec<BindingRecord> =
            self.delete_prefix(BINDINGS, &format!("{namespace}/{app}/"))?;
        debug!(%namespace, %app, count = removed.len(), "bindings deleted");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::{AppRef, Origin};

    fn test_app(namespace: &str, name: &str) -> AppRecord {
        let app = AppRef::new(namespace, name).unwrap();
        AppRecord::new(&app, "admin", 1, "standard", 1000)
    }

    fn test_configuration(namespace: &str, name: &str) -> ConfigurationRecord {
        ConfigurationRecord {
            namespace: namespace.to_string(),
            name: name.to_string(),
            values: [("username".to_string(), "u".to_string())].into(),
            origin: ConfigurationOrigin::User,
            created_at: 1000,
            updated_at: 1000,
        }
    }

    fn binding(namespace: &str, app: &str, cfg: &str) -> BindingRecord {
        BindingRecord {
            namespace: namespace.to_string(),
            application: app.to_string(),
            configuration: cfg.to_string(),
        }
    }

    // ── Application CRUD ───────────────────────────────────────────

    #[test]
    fn application_insert_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let app = test_app("workspace", "app1");

        assert!(store.insert_application(&app).unwrap());
        let retrieved = store.get_application("workspace/app1").unwrap();

        assert_eq!(retrieved, Some(app));
    }

    #[test]
    fn application_insert_refuses_duplicate() {
        let store = StateStore::open_in_memory().unwrap();
        let mut app = test_app("workspace", "app1");
        assert!(store.insert_application(&app).unwrap());

        app.instances = 5;
        assert!(!store.insert_application(&app).unwrap());
        let stored = store.get_application("workspace/app1").unwrap().unwrap();
        assert_eq!(stored.instances, 1);
    }

    #[test]
    fn application_get_nonexistent_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get_application("nope/nothing").unwrap().is_none());
        assert!(!store.application_exists("nope/nothing").unwrap());
    }

    #[test]
    fn application_list_is_namespace_scoped() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_application(&test_app("ns1", "a")).unwrap();
        store.put_application(&test_app("ns1", "b")).unwrap();
        store.put_application(&test_app("ns10", "c")).unwrap();

        assert_eq!(store.list_applications("ns1").unwrap().len(), 2);
        assert_eq!(store.list_applications("ns10").unwrap().len(), 1);
    }

    #[test]
    fn application_update_in_place() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_application(&test_app("workspace", "app1")).unwrap();

        let old = store
            .update_application("workspace/app1", |app| {
                let old = app.instances;
                app.instances = 3;
                app.origin = Origin::Container {
                    image: "nginx".to_string(),
                };
                old
            })
            .unwrap();
        assert_eq!(old, Some(1));

        let stored = store.get_application("workspace/app1").unwrap().unwrap();
        assert_eq!(stored.instances, 3);
        assert!(stored.origin.is_container());
    }

    #[test]
    fn application_update_missing_writes_nothing() {
        let store = StateStore::open_in_memory().unwrap();
        let outcome = store
            .update_application("workspace/ghost", |app| app.instances = 9)
            .unwrap();
        assert!(outcome.is_none());
        assert!(store.get_application("workspace/ghost").unwrap().is_none());
    }

    #[test]
    fn application_delete() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_application(&test_app("workspace", "app1")).unwrap();

        assert!(store.delete_application("workspace/app1").unwrap());
        assert!(!store.delete_application("workspace/app1").unwrap());
    }

    // ── Configurations, services, namespaces ───────────────────────

    #[test]
    fn configuration_crud() {
        let store = StateStore::open_in_memory().unwrap();
        let cfg = test_configuration("workspace", "db");
        assert!(store.insert_configuration(&cfg).unwrap());
        assert!(!store.insert_configuration(&cfg).unwrap());

        store
            .update_configuration("workspace/db", |c| {
                c.values.insert("password".to_string(), "p".to_string());
            })
            .unwrap();
        let stored = store.get_configuration("workspace/db").unwrap().unwrap();
        assert_eq!(stored.values.len(), 2);

        assert_eq!(store.list_configurations("workspace").unwrap().len(), 1);
        assert!(store.delete_configuration("workspace/db").unwrap());
        assert!(store.get_configuration("workspace/db").unwrap().is_none());
    }

    #[test]
    fn service_crud() {
        let store = StateStore::open_in_memory().unwrap();
        let svc = ServiceRecord {
            namespace: "workspace".to_string(),
            name: "pg".to_string(),
            catalog_service: "postgresql-dev".to_string(),
            owner: "admin".to_string(),
            created_at: 1000,
        };
        assert!(store.insert_service(&svc).unwrap());
        assert_eq!(store.get_service("workspace/pg").unwrap(), Some(svc));
        assert_eq!(store.list_services("workspace").unwrap().len(), 1);
        assert!(store.delete_service("workspace/pg").unwrap());
    }

    #[test]
    fn namespace_crud() {
        let store = StateStore::open_in_memory().unwrap();
        let ns = NamespaceRecord {
            name: "workspace".to_string(),
            owner: "admin".to_string(),
            created_at: 1000,
        };
        assert!(store.insert_namespace(&ns).unwrap());
        assert!(!store.insert_namespace(&ns).unwrap());
        assert!(store.namespace_exists("workspace").unwrap());
        assert_eq!(store.list_namespaces().unwrap().len(), 1);
        assert!(store.delete_namespace("workspace").unwrap());
        assert!(!store.namespace_exists("workspace").unwrap());
    }

    // ── Bindings ───────────────────────────────────────────────────

    #[test]
    fn binding_insert_is_idempotent() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.insert_binding(&binding("ns", "app", "db")).unwrap());
        assert!(!store.insert_binding(&binding("ns", "app", "db")).unwrap());
        assert_eq!(store.list_bindings_for_app("ns", "app").unwrap().len(), 1);
    }

    #[test]
    fn bindings_by_app_and_configuration() {
        let store = StateStore::open_in_memory().unwrap();
        store.insert_binding(&binding("ns", "app", "db")).unwrap();
        store.insert_binding(&binding("ns", "app", "cache")).unwrap();
        store.insert_binding(&binding("ns", "app2", "db")).unwrap();
        store.insert_binding(&binding("ns", "app-x", "db")).unwrap();

        assert_eq!(store.list_bindings_for_app("ns", "app").unwrap().len(), 2);
        let bound: Vec<String> = store
            .list_bindings_for_configuration("ns", "db")
            .unwrap()
            .into_iter()
            .map(|b| b.application)
            .collect();
        // Byte order of keys: "app-x/" < "app/" < "app2/".
        assert_eq!(bound, vec!["app-x", "app", "app2"]);
    }

    #[test]
    fn delete_bindings_for_app_returns_removed() {
        let store = StateStore::open_in_memory().unwrap();
        store.insert_binding(&binding("ns", "app", "db")).unwrap();
        store.insert_binding(&binding("ns", "app", "cache")).unwrap();
        store.insert_binding(&binding("ns", "app2", "db")).unwrap();

        let removed = store.delete_bindings_for_app("ns", "app").unwrap();
        assert_eq!(removed.len(), 2);
        assert!(store.list_bindings_for_app("ns", "app").unwrap().is_empty());
        // app2 untouched
        assert_eq!(store.list_bindings_for_app("ns", "app2").unwrap().len(), 1);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put_application(&test_app("prod", "api")).unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        let app = store.get_application("prod/api").unwrap();
        assert_eq!(app.unwrap().name, "api");
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_namespaces().unwrap().is_empty());
        assert!(store.list_applications("any").unwrap().is_empty());
        assert!(store.list_bindings_for_app("any", "x").unwrap().is_empty());
        assert!(store.delete_bindings_for_app("any", "x").unwrap().is_empty());
        assert!(!store.delete_application("nope").unwrap());
        assert!(!store.delete_binding("a", "b", "c").unwrap());
    }
}
