//! berth-stage: turns an application origin into a deployable image.
//!
//! The pipeline owns the per-application build cache: a volume claim named
//! after the application's resource name, created on the first staging run
//! and reused by every later one. Only application deletion discards it.
//!
//! Container-image origins never stage; the pipeline refuses them before
//! touching the cache or the stager.

pub mod error;
pub mod pipeline;

pub use error::{StageError, StageResult};
pub use pipeline::{StageOutcome, StagingPipeline};
