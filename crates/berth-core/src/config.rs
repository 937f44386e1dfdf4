//! berth.toml daemon configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{DEFAULT_APP_CHART, DEFAULT_INSTANCES};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BerthConfig {
    pub server: ServerConfig,
    pub deploy: DeployConfig,
    pub apps: AppsConfig,
    pub staging: StagingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeployConfig {
    /// Readiness wait for deploys and running-waits (e.g. "10m").
    pub timeout: String,
    /// How often rollout status is polled (e.g. "1s").
    pub poll_interval: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppsConfig {
    pub default_instances: u32,
    /// Default routes are `<app>.<domain>`.
    pub domain: String,
    pub app_charts: Vec<String>,
    pub default_app_chart: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StagingConfig {
    pub builder_image: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8443,
            data_dir: PathBuf::from("/var/lib/berth"),
        }
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            timeout: "10m".to_string(),
            poll_interval: "1s".to_string(),
        }
    }
}

impl Default for AppsConfig {
    fn default() -> Self {
        Self {
            default_instances: DEFAULT_INSTANCES,
            domain: "berth.local".to_string(),
            app_charts: vec![DEFAULT_APP_CHART.to_string()],
            default_app_chart: DEFAULT_APP_CHART.to_string(),
        }
    }
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            builder_image: "paketobuildpacks/builder:full".to_string(),
        }
    }
}

impl BerthConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BerthConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject settings that would only fail later at request time.
    pub fn validate(&self) -> anyhow::Result<()> {
        if parse_duration(&self.deploy.timeout).is_none() {
            anyhow::bail!("deploy.timeout: unparseable duration '{}'", self.deploy.timeout);
        }
        if parse_duration(&self.deploy.poll_interval).is_none() {
            anyhow::bail!(
                "deploy.poll_interval: unparseable duration '{}'",
                self.deploy.poll_interval
            );
        }
        if !self.apps.app_charts.contains(&self.apps.default_app_chart) {
            anyhow::bail!(
                "apps.default_app_chart '{}' is not listed in apps.app_charts",
                self.apps.default_app_chart
            );
        }
        Ok(())
    }

    pub fn deploy_timeout(&self) -> Duration {
        parse_duration(&self.deploy.timeout).unwrap_or(Duration::from_secs(600))
    }

    pub fn poll_interval(&self) -> Duration {
        parse_duration(&self.deploy.poll_interval).unwrap_or(Duration::from_secs(1))
    }
}

/// Parse a duration string like "5s", "500ms", "10m", or plain seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
