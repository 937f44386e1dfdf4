//! Persisted record types.
//!
//! These are the logical rows of the control plane: namespaces, application
//! records (desired configuration plus the workload reference), configuration
//! bundles, provisioned services, and application ↔ configuration bindings.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use berth_core::{AppRef, Origin};

// ── Namespace ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamespaceRecord {
    pub name: String,
    pub owner: String,
    pub created_at: u64,
}

// ── Application ────────────────────────────────────────────────────

/// Canonical application record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppRecord {
    pub namespace: String,
    pub name: String,
    /// User who created the application.
    pub owner: String,
    /// Desired replica count.
    pub instances: u32,
    pub environment: BTreeMap<String, String>,
    /// Names of services bound to this application. Configuration bindings
    /// live in the bindings table.
    pub services: BTreeSet<String>,
    pub app_chart: String,
    pub origin: Origin,
    /// Hostnames (with optional path) routed to the workload.
    pub routes: Vec<String>,
    /// Builder image override used for staging.
    pub builder_image: Option<String>,
    /// Latest staged (or container) image, set before the first deploy.
    pub image: Option<String>,
    /// Latest staging run.
    pub stage_id: Option<String>,
    /// Present once a deploy has succeeded.
    pub workload: Option<WorkloadRef>,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Identity of the running workload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkloadRef {
    /// Cluster deployment name.
    pub deployment: String,
    pub image: String,
    pub stage_id: Option<String>,
    /// Generation stamp of the last forced rollout.
    pub generation: Option<u64>,
    /// Routes served by the last rollout.
    #[serde(default)]
    pub routes: Vec<String>,
    pub deployed_at: u64,
}

impl AppRecord {
    /// A fresh record: no workload, empty environment and bindings.
    pub fn new(app: &AppRef, owner: &str, instances: u32, app_chart: &str, now: u64) -> Self {
        Self {
            namespace: app.namespace.clone(),
            name: app.name.clone(),
            owner: owner.to_string(),
            instances,
            environment: BTreeMap::new(),
            services: BTreeSet::new(),
            app_chart: app_chart.to_string(),
            origin: Origin::None,
            routes: Vec::new(),
            builder_image: None,
            image: None,
            stage_id: None,
            workload: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn app_ref(&self) -> AppRef {
        AppRef {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }

    /// Build the composite key for the applications table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

// ── Configuration ─────────────────────────────────────────────────

/// Who produced a configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConfigurationOrigin {
    /// Created directly by a user.
    #[default]
    User,
    /// Generated from a provisioned service's credential secret.
    Service { service: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigurationRecord {
    pub namespace: String,
    pub name: String,
    pub values: BTreeMap<String, String>,
    pub origin: ConfigurationOrigin,
    pub created_at: u64,
    pub updated_at: u64,
}

impl ConfigurationRecord {
    /// Build the composite key for the configurations table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

// ── Service ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceRecord {
    pub namespace: String,
    pub name: String,
    /// Catalog offering this instance was provisioned from.
    pub catalog_service: String,
    pub owner: String,
    pub created_at: u64,
}

impl ServiceRecord {
    /// Build the composite key for the services table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

// ── Binding ───────────────────────────────────────────────────────

/// Existence of this row is the binding; it carries no attributes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BindingRecord {
    pub namespace: String,
    pub application: String,
    pub configuration: String,
}

impl BindingRecord {
    /// Build the composite key for the bindings table.
    pub fn table_key(&self) -> String {
        binding_key(&self.namespace, &self.application, &self.configuration)
    }
}

pub fn binding_key(namespace: &str, application: &str, configuration: &str) -> String {
    format!("{namespace}/{application}/{configuration}")
}
