//! Shared types used across berth crates.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::naming::resource_name;

/// Instance count applied when a request does not name one.
pub const DEFAULT_INSTANCES: u32 = 1;

/// Upper bound for every user-chosen name (DNS label length).
pub const MAX_NAME_LEN: usize = 63;

/// App chart used when none is requested.
pub const DEFAULT_APP_CHART: &str = "standard";

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").expect("static regex"));

static ENV_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"));

/// Rejected user input for a name-like field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} name '{name}': {reason}")]
pub struct NameError {
    pub kind: &'static str,
    pub name: String,
    pub reason: &'static str,
}

/// Validate a DNS-label-like name (namespaces, applications,
/// configurations, services). Leading digits are allowed.
pub fn validate_name(kind: &'static str, name: &str) -> Result<(), NameError> {
    let fail = |reason| {
        Err(NameError {
            kind,
            name: name.to_string(),
            reason,
        })
    };
    if name.is_empty() {
        return fail("must not be empty");
    }
    if name.len() > MAX_NAME_LEN {
        return fail("must be at most 63 characters");
    }
    if !NAME_RE.is_match(name) {
        return fail("must consist of lowercase alphanumerics and '-', starting and ending with an alphanumeric");
    }
    Ok(())
}

/// Validate an environment variable name.
pub fn validate_env_name(name: &str) -> Result<(), NameError> {
    if ENV_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(NameError {
            kind: "environment variable",
            name: name.to_string(),
            reason: "must match [A-Za-z_][A-Za-z0-9_]*",
        })
    }
}

/// Identity of an application: unique name within a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AppRef {
    pub namespace: String,
    pub name: String,
}

impl AppRef {
    /// Build a reference, validating both parts.
    pub fn new(namespace: &str, name: &str) -> Result<Self, NameError> {
        validate_name("namespace", namespace)?;
        validate_name("application", name)?;
        Ok(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    /// Composite key used by the state store (`{namespace}/{name}`).
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Cluster resource name for the deployment and build cache.
    pub fn resource_name(&self) -> String {
        resource_name(&[&self.namespace, &self.name])
    }

    /// Cluster resource name of the ingress serving `route`.
    pub fn route_resource_name(&self, route: &str) -> String {
        resource_name(&[&self.namespace, &self.name, route])
    }
}

impl fmt::Display for AppRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Kinds of named entities, used to label not-found and conflict errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Namespace,
    Application,
    Configuration,
    Service,
    AppChart,
    EnvironmentVariable,
}

impl EntityKind {
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Namespace => "namespace",
            EntityKind::Application => "application",
            EntityKind::Configuration => "configuration",
            EntityKind::Service => "service",
            EntityKind::AppChart => "app chart",
            EntityKind::EnvironmentVariable => "environment variable",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_leading_digits() {
        assert!(AppRef::new("workspace", "12monkeys").is_ok());
    }

    #[test]
    fn accepts_max_length_name() {
        let name = format!("app{}", "1234567890".repeat(6));
        assert_eq!(name.len(), 63);
        assert!(validate_name("application", &name).is_ok());
    }

    #[test]
    fn rejects_long_and_malformed_names() {
        let long = "a".repeat(64);
        assert!(validate_name("application", &long).is_err());
        assert!(validate_name("application", "").is_err());
        assert!(validate_name("application", "Upper").is_err());
        assert!(validate_name("application", "-lead").is_err());
        assert!(validate_name("application", "trail-").is_err());
        assert!(validate_name("application", "under_score").is_err());
    }

    #[test]
    fn env_names() {
        assert!(validate_env_name("MYVAR").is_ok());
        assert!(validate_env_name("_private1").is_ok());
        assert!(validate_env_name("1BAD").is_err());
        assert!(validate_env_name("BAD-NAME").is_err());
    }

    #[test]
    fn app_ref_keys() {
        let app = AppRef::new("ns", "app1").unwrap();
        assert_eq!(app.table_key(), "ns/app1");
        assert_eq!(app.to_string(), "ns/app1");
        assert_eq!(app.resource_name(), app.resource_name());
        assert_ne!(app.resource_name(), app.route_resource_name("app1.example.org"));
    }
}
