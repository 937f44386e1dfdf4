//! berth-registry: durable domain records of the control plane.
//!
//! Four stores share one [`berth_state::StateStore`]:
//!
//! - **[`Namespaces`]**: isolation boundaries; everything else lives in one.
//! - **[`ApplicationRegistry`]**: the canonical application record. Setters
//!   are metadata-only; none of them touches a running workload.
//! - **[`ConfigurationStore`]** and **[`ServiceRecords`]**: named key/value
//!   bundles and provisioned catalog services.
//! - **[`BindingLedger`]**: which configurations are bound to which
//!   application, plus labelling of service credential secrets as
//!   configurations through the cluster substrate.
//!
//! Each single setter is one atomic store write. Sequencing several of them
//! is the orchestrator's business.

pub mod configurations;
pub mod error;
pub mod ledger;
pub mod namespaces;
pub mod registry;
pub mod services;

pub use configurations::{ConfigurationStore, content_digest};
pub use error::{RegistryError, RegistryResult};
pub use ledger::{BindingLedger, CONFIGURATION_LABEL};
pub use namespaces::Namespaces;
pub use registry::{Application, ApplicationRegistry};
pub use services::ServiceRecords;
