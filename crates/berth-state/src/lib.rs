//! berth-state: embedded state store for berth.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for namespaces, applications, configurations, services, and
//! bindings.
//!
//! # Architecture
//!
//! All records are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{namespace}/{name}`, `{namespace}/{app}/{configuration}`)
//! enable prefix scans for related records. Every write is its own redb
//! write transaction, so each single-record update is atomic; sequences of
//! writes are not.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
