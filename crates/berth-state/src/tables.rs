//! redb table definitions for the berth state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized records).

use redb::TableDefinition;

/// Namespace records keyed by `{name}`.
pub const NAMESPACES: TableDefinition<&str, &[u8]> = TableDefinition::new("namespaces");

/// Application records keyed by `{namespace}/{name}`.
pub const APPLICATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("applications");

/// Configuration records keyed by `{namespace}/{name}`.
pub const CONFIGURATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("configurations");

/// Service records keyed by `{namespace}/{name}`.
pub const SERVICES: TableDefinition<&str, &[u8]> = TableDefinition::new("services");

/// Bindings keyed by `{namespace}/{application}/{configuration}`.
pub const BINDINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("bindings");
