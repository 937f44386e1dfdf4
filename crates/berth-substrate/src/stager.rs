//! Staging substrate contract.

use serde::{Deserialize, Serialize};

use berth_core::{AppRef, Origin};

use crate::BoxFuture;
use crate::error::StagerResult;

/// Persistent build cache of one application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheHandle {
    pub namespace: String,
    /// Volume claim name.
    pub claim: String,
}

/// One staging run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StagingRequest {
    pub run_id: String,
    pub app: AppRef,
    pub origin: Origin,
    pub cache: CacheHandle,
    pub builder_image: String,
    pub user: String,
}

/// Image build backend.
///
/// Submission and waiting are separate so that a caller abandoning the wait
/// does not abort the build.
pub trait Stager: Send + Sync {
    /// Start the run. Returns once the backend has accepted it.
    fn submit<'a>(&'a self, request: &'a StagingRequest) -> BoxFuture<'a, StagerResult<()>>;

    /// Wait for a submitted run and return the image reference it produced.
    fn wait<'a>(&'a self, namespace: &'a str, run_id: &'a str) -> BoxFuture<'a, StagerResult<String>>;
}
