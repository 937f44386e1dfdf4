//! Operation payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use berth_core::Origin;

/// Payload of `CreateApplication`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CreateRequest {
    pub name: String,
    /// Defaults to the configured instance count.
    pub instances: Option<u32>,
    pub configurations: Vec<String>,
    pub services: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub app_chart: Option<String>,
    /// Defaults to `<app>.<domain>`.
    pub routes: Option<Vec<String>>,
}

/// Payload of `PushApplication`: create-if-absent, stage, deploy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PushRequest {
    /// Falls back to the origin recorded by the previous push.
    pub origin: Option<Origin>,
    /// Omitted keeps the current count on re-push.
    pub instances: Option<u32>,
    /// Merged into the current environment.
    pub environment: BTreeMap<String, String>,
    /// Added to the current bindings.
    pub configurations: Vec<String>,
    /// Added to the current bindings.
    pub services: Vec<String>,
    pub app_chart: Option<String>,
    pub builder_image: Option<String>,
    pub routes: Option<Vec<String>>,
}

/// Payload of `UpdateApplication`. Absent fields are left alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpdateRequest {
    pub instances: Option<u32>,
    /// Merged into the current environment.
    pub environment: Option<BTreeMap<String, String>>,
    /// The complete set of bound configurations.
    pub configurations: Option<Vec<String>>,
    pub app_chart: Option<String>,
    pub routes: Option<Vec<String>>,
}

impl UpdateRequest {
    pub fn is_empty(&self) -> bool {
        self == &UpdateRequest::default()
    }
}
