//! Rollout controller: tracks one rollout through its phases.
//!
//! A rollout starts when the reconciler issues the deployment write and ends
//! when the cluster reports every desired replica ready, the wait budget
//! runs out, the write fails, or the caller stops waiting.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use berth_core::{AppRef, epoch_secs};
use berth_state::WorkloadRef;
use berth_substrate::DeploymentStatus;

/// Current phase of a rollout.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RolloutPhase {
    /// Not started.
    Pending,
    /// Deployment write in flight.
    Applying,
    /// Waiting for replicas to become ready.
    WaitingReady { ready: u32, desired: u32 },
    /// Every desired replica is ready.
    Ready,
    /// The wait budget ran out; the cluster may still converge.
    TimedOut { ready: u32, desired: u32 },
    /// The deployment write or a status query failed.
    Failed { reason: String },
    /// The caller stopped waiting.
    Abandoned,
}

/// A rollout in progress.
#[derive(Debug, Clone)]
pub struct Rollout {
    pub app: AppRef,
    pub deployment: String,
    pub image: String,
    pub stage_id: Option<String>,
    pub routes: Vec<String>,
    pub desired: u32,
    pub generation: Option<u64>,
    pub phase: RolloutPhase,
    pub timeout: Duration,
    pub started_at: Option<Instant>,
}

impl Rollout {
    pub fn new(
        app: &AppRef,
        deployment: &str,
        image: &str,
        desired: u32,
        generation: Option<u64>,
        timeout: Duration,
    ) -> Self {
        Self {
            app: app.clone(),
            deployment: deployment.to_string(),
            image: image.to_string(),
            stage_id: None,
            routes: Vec::new(),
            desired,
            generation,
            phase: RolloutPhase::Pending,
            timeout,
            started_at: None,
        }
    }

    /// The workload this rollout puts in place.
    pub fn workload(&self) -> WorkloadRef {
        WorkloadRef {
            deployment: self.deployment.clone(),
            image: self.image.clone(),
            stage_id: self.stage_id.clone(),
            generation: self.generation,
            routes: self.routes.clone(),
            deployed_at: epoch_secs(),
        }
    }

    /// Start the rollout; the deployment write follows.
    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
        self.phase = RolloutPhase::Applying;
        debug!(app = %self.app, deployment = %self.deployment, generation = ?self.generation, "rollout started");
    }

    /// The deployment write was accepted.
    pub fn applied(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
        self.phase = RolloutPhase::WaitingReady {
            ready: 0,
            desired: self.desired,
        };
    }

    /// Feed one status observation and move to the next phase.
    pub fn observe(&mut self, status: &DeploymentStatus) -> &RolloutPhase {
        if self.is_terminal() {
            return &self.phase;
        }
        if status.is_ready() {
            self.phase = RolloutPhase::Ready;
            info!(app = %self.app, replicas = status.ready, "rollout ready");
        } else if self.elapsed() >= self.timeout {
            self.phase = RolloutPhase::TimedOut {
                ready: status.ready,
                desired: status.desired,
            };
            warn!(
                app = %self.app,
                ready = status.ready,
                desired = status.desired,
                timeout = ?self.timeout,
                "rollout not ready in time"
            );
        } else {
            self.phase = RolloutPhase::WaitingReady {
                ready: status.ready,
                desired: status.desired,
            };
        }
        &self.phase
    }

    pub fn fail(&mut self, reason: &str) {
        warn!(app = %self.app, %reason, "rollout failed");
        self.phase = RolloutPhase::Failed {
            reason: reason.to_string(),
        };
    }

    pub fn abandon(&mut self) {
        if !self.is_terminal() {
            self.phase = RolloutPhase::Abandoned;
        }
    }

    /// Time left before the wait budget runs out.
    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.elapsed())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.phase,
            RolloutPhase::Ready
                | RolloutPhase::TimedOut { .. }
                | RolloutPhase::Failed { .. }
                | RolloutPhase::Abandoned
        )
    }

    fn elapsed(&self) -> Duration {
        self.started_at.map(|t| t.elapsed()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rollout(timeout: Duration) -> Rollout {
        let app = AppRef::new("workspace", "app1").unwrap();
        Rollout::new(&app, "workspace-app1-0123456789", "nginx", 3, Some(7), timeout)
    }

    #[test]
    fn workload_reflects_rollout() {
        let mut rollout = rollout(Duration::from_secs(1));
        rollout.stage_id = Some("run-1".to_string());
        rollout.routes = vec!["app1.berth.local".to_string()];
        let workload = rollout.workload();
        assert_eq!(workload.deployment, "workspace-app1-0123456789");
        assert_eq!(workload.image, "nginx");
        assert_eq!(workload.generation, Some(7));
        assert_eq!(workload.routes, vec!["app1.berth.local"]);
    }

    #[test]
    fn becomes_ready_when_all_replicas_ready() {
        let mut rollout = rollout(Duration::from_secs(60));
        rollout.start();
        rollout.applied();
        assert_eq!(
            rollout.phase,
            RolloutPhase::WaitingReady {
                ready: 0,
                desired: 3
            }
        );

        let phase = rollout.observe(&DeploymentStatus {
            desired: 3,
            ready: 1,
        });
        assert_eq!(
            *phase,
            RolloutPhase::WaitingReady {
                ready: 1,
                desired: 3
            }
        );

        rollout.observe(&DeploymentStatus {
            desired: 3,
            ready: 3,
        });
        assert_eq!(rollout.phase, RolloutPhase::Ready);
        assert!(rollout.is_terminal());
    }

    #[test]
    fn times_out_when_budget_spent() {
        let mut rollout = rollout(Duration::ZERO);
        rollout.start();
        rollout.applied();
        rollout.observe(&DeploymentStatus {
            desired: 3,
            ready: 2,
        });
        assert_eq!(
            rollout.phase,
            RolloutPhase::TimedOut {
                ready: 2,
                desired: 3
            }
        );
        assert_eq!(rollout.remaining(), Duration::ZERO);
    }

    #[test]
    fn scale_to_zero_is_immediately_ready() {
        let mut rollout = rollout(Duration::from_secs(1));
        rollout.desired = 0;
        rollout.start();
        rollout.applied();
        rollout.observe(&DeploymentStatus {
            desired: 0,
            ready: 0,
        });
        assert_eq!(rollout.phase, RolloutPhase::Ready);
    }

    #[test]
    fn terminal_phases_stick() {
        let mut rollout = rollout(Duration::from_secs(60));
        rollout.start();
        rollout.fail("image pull error");
        rollout.abandon();
        rollout.observe(&DeploymentStatus {
            desired: 3,
            ready: 3,
        });
        assert!(matches!(rollout.phase, RolloutPhase::Failed { .. }));
    }
}
