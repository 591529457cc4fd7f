//! Common types for pair: errors, labels, templating and Kubernetes utilities

#![deny(missing_docs)]

pub mod error;
pub mod kube_utils;
pub mod leader_election;
pub mod template;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace instance resources are created in when none is configured
pub const DEFAULT_TARGET_NAMESPACE: &str = "sharingio-pair-instances";

/// Label key marking a resource as managed by pair
pub const OWNERSHIP_LABEL_KEY: &str = "io.sharing.pair";

/// Value of the ownership label on every instance resource
pub const OWNERSHIP_LABEL_VALUE: &str = "instance";

/// Label selector matching every instance resource
pub const OWNERSHIP_LABEL_SELECTOR: &str = "io.sharing.pair=instance";

/// Cluster API label tying machines and pools to their cluster
pub const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";

/// Field manager used for server-side writes
pub const FIELD_MANAGER: &str = "pair-instance-manager";
