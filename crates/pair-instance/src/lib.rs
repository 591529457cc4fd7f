//! Instance lifecycle for pair
//!
//! One pairing instance is a constellation of seven Cluster API resources.
//! This crate expands an [`InstanceSpec`] into those resources, writes and
//! removes them in dependency order, and rebuilds instances by reading the
//! resources back. The spec itself survives only as an annotation bag
//! stamped on every resource.

#![deny(missing_docs)]

pub mod annotations;
pub mod config;
pub mod expander;
pub mod manager;
pub mod reconciler;
pub mod resources;
pub mod session;
pub mod spec;
pub mod status;
pub mod store;
pub mod validation;

pub use config::{InstanceDefaults, ManagerConfig};
pub use expander::TemplateExpander;
pub use manager::{InstanceManager, InstancePlan};
pub use reconciler::{ReconcileReport, Reconciler};
pub use resources::{ResourceDocument, ResourceKind, ResourceSet};
pub use session::{KubeSessionProbe, SessionProbe};
pub use spec::{
    Instance, InstanceFilter, InstancePhase, InstanceSpec, InstanceStatus, InstanceType,
    ResourceStatuses, SetupSpec,
};
pub use store::{KubeResourceStore, ResourceStore};
