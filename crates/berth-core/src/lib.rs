//! berth-core: shared vocabulary for the berth control plane.
//!
//! Everything here is pure: application references and name validation,
//! deterministic cluster resource naming, origin descriptors, generation
//! stamps, the cancellation signal threaded through blocking operations, and
//! the `berth.toml` daemon configuration.

pub mod cancel;
pub mod config;
pub mod naming;
pub mod origin;
pub mod stamp;
pub mod types;

pub use cancel::{CancelHandle, CancelSignal, cancel_pair};
pub use config::BerthConfig;
pub use naming::resource_name;
pub use origin::{Origin, OriginError};
pub use stamp::{epoch_secs, generation_stamp};
pub use types::*;
