//! Restart predicate.
//!
//! The single rule deciding whether a running workload must roll after a
//! mutation. Callers capture the desired state before and after writing and
//! hand both here.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// What the running workload is expected to reflect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DesiredState {
    pub instances: u32,
    pub environment: BTreeMap<String, String>,
    pub configurations: BTreeSet<String>,
    /// Content digest per bound configuration.
    pub digests: BTreeMap<String, String>,
    pub routes: Vec<String>,
    pub app_chart: String,
}

/// Outcome of comparing two desired states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Restart {
    /// Nothing the workload reflects changed.
    None,
    /// The deployment spec itself differs.
    Redeploy,
    /// Only mounted configuration contents differ; the deployment spec is unchanged
    /// and a generation stamp is needed to roll.
    Remount,
}

impl Restart {
    pub fn is_needed(self) -> bool {
        self != Restart::None
    }
}

pub fn needs_restart(old: &DesiredState, new: &DesiredState) -> Restart {
    if old.instances != new.instances
        || old.environment != new.environment
        || old.configurations != new.configurations
        || old.routes != new.routes
        || old.app_chart != new.app_chart
    {
        Restart::Redeploy
    } else if old.digests != new.digests {
        Restart::Remount
    } else {
        Restart::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> DesiredState {
        DesiredState {
            instances: 1,
            environment: BTreeMap::from([("MYVAR".to_string(), "v1".to_string())]),
            configurations: BTreeSet::from(["db".to_string()]),
            digests: BTreeMap::from([("db".to_string(), "aaa".to_string())]),
            routes: vec!["app1.berth.local".to_string()],
            app_chart: "standard".to_string(),
        }
    }

    #[test]
    fn identical_states_need_nothing() {
        assert_eq!(needs_restart(&base(), &base()), Restart::None);
    }

    #[test]
    fn spec_changes_redeploy() {
        let mut scaled = base();
        scaled.instances = 0;
        assert_eq!(needs_restart(&base(), &scaled), Restart::Redeploy);

        let mut env = base();
        env.environment.insert("MYVAR".to_string(), "v2".to_string());
        assert_eq!(needs_restart(&base(), &env), Restart::Redeploy);

        let mut bound = base();
        bound.configurations.insert("cache".to_string());
        bound.digests.insert("cache".to_string(), "bbb".to_string());
        assert_eq!(needs_restart(&base(), &bound), Restart::Redeploy);

        let mut routed = base();
        routed.routes.push("api.example.org".to_string());
        assert_eq!(needs_restart(&base(), &routed), Restart::Redeploy);
    }

    #[test]
    fn content_change_remounts() {
        let mut changed = base();
        changed.digests.insert("db".to_string(), "ccc".to_string());
        assert_eq!(needs_restart(&base(), &changed), Restart::Remount);
        assert!(Restart::Remount.is_needed());
    }
}
