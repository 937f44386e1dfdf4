//! Compensation log for multi-step writes.
//!
//! Each completed step registers an undo action. When a later step fails the
//! log runs the undos newest-first. If any undo fails too, the caller gets
//! [`OrchestratorError::Inconsistent`] naming what was left behind.

use tracing::{debug, warn};

use berth_registry::RegistryResult;

use crate::error::OrchestratorError;

type Undo = Box<dyn FnOnce() -> RegistryResult<()> + Send>;

pub struct CompensationLog {
    operation: String,
    steps: Vec<(String, Undo)>,
}

impl CompensationLog {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            steps: Vec::new(),
        }
    }

    /// Register the undo of a step that just completed.
    pub fn record(
        &mut self,
        step: impl Into<String>,
        undo: impl FnOnce() -> RegistryResult<()> + Send + 'static,
    ) {
        self.steps.push((step.into(), Box::new(undo)));
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Everything succeeded; drop the undos.
    pub fn commit(self) {
        debug!(operation = %self.operation, steps = self.steps.len(), "multi-step write committed");
    }

    /// Undo every recorded step and return the error to report for `cause`.
    pub fn unwind(self, cause: OrchestratorError) -> OrchestratorError {
        let mut leftover = Vec::new();
        for (step, undo) in self.steps.into_iter().rev() {
            match undo() {
                Ok(()) => debug!(operation = %self.operation, %step, "step undone"),
                Err(e) => {
                    warn!(operation = %self.operation, %step, error = %e, "undo failed");
                    leftover.push(step);
                }
            }
        }
        if leftover.is_empty() {
            cause
        } else {
            OrchestratorError::Inconsistent {
                operation: self.operation,
                cause: cause.to_string(),
                leftover,
            }
        }
    }

    /// Pass `result` through, unwinding the log on error.
    pub fn check<T, E>(&mut self, result: Result<T, E>) -> Result<T, OrchestratorError>
    where
        E: Into<OrchestratorError>,
    {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                let fresh = CompensationLog::new(self.operation.clone());
                let log = std::mem::replace(self, fresh);
                Err(log.unwind(e.into()))
            }
        }
    }
}
