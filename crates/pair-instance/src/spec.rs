//! Instance types: what a caller asks for and what a read gives back

use k8s_openapi::api::core::v1::PodStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of pairing environment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceType {
    /// A dedicated multi-node Kubernetes cluster
    Kubernetes,
    /// A plain shared environment; requires at least one guest
    Plain,
}

impl std::fmt::Display for InstanceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceType::Kubernetes => write!(f, "Kubernetes"),
            InstanceType::Plain => write!(f, "Plain"),
        }
    }
}

/// Who is pairing and what they are working on
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetupSpec {
    /// Owning user (GitHub login)
    pub user: String,
    /// Invited guests (GitHub logins)
    pub guests: Vec<String>,
    /// Repositories to clone: URLs, paths or bare `owner/repo`
    pub repos: Vec<String>,
    /// Timezone for the session environment
    pub timezone: String,
    /// Full name used for git commits
    pub fullname: String,
    /// Email used for git commits
    pub email: String,
}

/// Logical instance as supplied by a caller or rehydrated from annotations
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceSpec {
    /// Instance name; derived from the setup when empty
    pub name: String,
    /// Instance type. Not recorded on resources; reads report `Kubernetes`.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<InstanceType>,
    /// Session details
    pub setup: SetupSpec,
    /// Machine type for both roles
    pub node_size: String,
    /// Datacenter facility
    pub facility: String,
}

/// Coarse lifecycle state, recomputed on every read
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstancePhase {
    /// Only ever returned by create, before anything was read back
    Pending,
    /// Resources exist, session not up yet
    #[default]
    Provisioning,
    /// Interactive-session pod is running
    Provisioned,
    /// Cluster is being torn down
    Deleting,
}

impl std::fmt::Display for InstancePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InstancePhase::Pending => "Pending",
            InstancePhase::Provisioning => "Provisioning",
            InstancePhase::Provisioned => "Provisioned",
            InstancePhase::Deleting => "Deleting",
        };
        f.write_str(s)
    }
}

/// Raw status of each underlying resource, as the store reported it
///
/// `Value::Null` means the resource was absent (or not ours).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceStatuses {
    /// KubeadmControlPlane status
    pub control_plane: Value,
    /// Cluster status
    pub cluster: Value,
    /// PacketCluster status
    pub infra_cluster: Value,
    /// Interactive-session pod status inside the instance's own cluster
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_pod: Option<PodStatus>,
}

/// Phase plus the per-resource status bag
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceStatus {
    /// Derived phase
    pub phase: InstancePhase,
    /// Raw statuses the phase was derived from
    pub resources: ResourceStatuses,
}

/// An instance: spec plus derived status
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// Logical spec
    pub spec: InstanceSpec,
    /// Derived status
    pub status: InstanceStatus,
}

impl Instance {
    /// Instance as returned right after a create
    pub fn pending(spec: InstanceSpec) -> Self {
        Self {
            spec,
            status: InstanceStatus {
                phase: InstancePhase::Pending,
                resources: ResourceStatuses::default(),
            },
        }
    }
}

/// Filters for listing instances
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceFilter {
    /// Only instances whose `setup.user` equals this
    pub username: Option<String>,
}

impl InstanceFilter {
    /// Filter by owning user
    pub fn for_user(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_parses_from_camel_case_yaml() {
        let spec: InstanceSpec = serde_json::from_value(serde_json::json!({
            "type": "Kubernetes",
            "nodeSize": "c3.small.x86",
            "setup": {"user": "alice", "guests": ["bob"], "fullname": "Alice A"}
        }))
        .unwrap();
        assert_eq!(spec.instance_type, Some(InstanceType::Kubernetes));
        assert_eq!(spec.node_size, "c3.small.x86");
        assert_eq!(spec.setup.guests, vec!["bob"]);
        assert!(spec.name.is_empty());
        assert!(spec.setup.repos.is_empty());
    }

    #[test]
    fn missing_type_parses_as_none() {
        let spec: InstanceSpec =
            serde_json::from_value(serde_json::json!({"setup": {"user": "alice"}})).unwrap();
        assert_eq!(spec.instance_type, None);
    }

    #[test]
    fn unknown_type_is_rejected_by_the_parser() {
        let res: Result<InstanceSpec, _> =
            serde_json::from_value(serde_json::json!({"type": "VirtualMachine"}));
        assert!(res.is_err());
    }

    #[test]
    fn pending_instance_has_pending_phase_and_empty_statuses() {
        let i = Instance::pending(InstanceSpec::default());
        assert_eq!(i.status.phase, InstancePhase::Pending);
        assert_eq!(i.status.resources, ResourceStatuses::default());
    }

    #[test]
    fn default_phase_is_provisioning() {
        assert_eq!(InstancePhase::default(), InstancePhase::Provisioning);
        assert_eq!(InstancePhase::Deleting.to_string(), "Deleting");
    }
}
