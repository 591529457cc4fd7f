//! Defaults and settings for the lifecycle coordinator

use std::time::Duration;

use pair_common::DEFAULT_TARGET_NAMESPACE;

/// Kubernetes version installed on new instances (rendered with a `v` prefix)
pub const DEFAULT_KUBERNETES_VERSION: &str = "1.19.0";
/// Machine OS image
pub const DEFAULT_MACHINE_OS: &str = "ubuntu_20_04";
/// Billing cycle for provisioned machines
pub const DEFAULT_BILLING_CYCLE: &str = "hourly";
/// Machine type when the spec names none
pub const DEFAULT_NODE_SIZE: &str = "c1.small.x86";
/// Session timezone when the spec names none
pub const DEFAULT_TIMEZONE: &str = "Pacific/Auckland";
/// Pod network CIDR
pub const DEFAULT_POD_CIDR: &str = "10.244.0.0/16";
/// Service network CIDR
pub const DEFAULT_SERVICE_CIDR: &str = "10.96.0.0/12";
/// Deadline for the best-effort session pod lookup
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(2);

/// Static values every expanded resource set is built from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceDefaults {
    /// Kubernetes version, without the leading `v`
    pub kubernetes_version: String,
    /// Machine OS image
    pub machine_os: String,
    /// Billing cycle
    pub billing_cycle: String,
    /// Machine type applied when `nodeSize` is empty
    pub node_size: String,
    /// Timezone applied when `setup.timezone` is empty
    pub timezone: String,
    /// Pod CIDR block
    pub pod_cidr: String,
    /// Service CIDR block
    pub service_cidr: String,
    /// Cloud project the machines are billed to
    pub project_id: String,
    /// Worker pool size
    pub worker_replicas: u32,
}

impl Default for InstanceDefaults {
    fn default() -> Self {
        Self {
            kubernetes_version: DEFAULT_KUBERNETES_VERSION.to_string(),
            machine_os: DEFAULT_MACHINE_OS.to_string(),
            billing_cycle: DEFAULT_BILLING_CYCLE.to_string(),
            node_size: DEFAULT_NODE_SIZE.to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            pod_cidr: DEFAULT_POD_CIDR.to_string(),
            service_cidr: DEFAULT_SERVICE_CIDR.to_string(),
            project_id: String::new(),
            worker_replicas: 0,
        }
    }
}

impl InstanceDefaults {
    /// Kubernetes version as the control plane expects it (`v1.19.0`)
    pub fn versioned_kubernetes(&self) -> String {
        if self.kubernetes_version.starts_with('v') {
            self.kubernetes_version.clone()
        } else {
            format!("v{}", self.kubernetes_version)
        }
    }
}

/// Settings for an [`InstanceManager`](crate::InstanceManager)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Namespace every instance resource lives in
    pub namespace: String,
    /// Expansion defaults
    pub defaults: InstanceDefaults,
    /// Deadline for the session pod lookup on reads
    pub session_timeout: Duration,
    /// Most instances one user may hold; `None` means unlimited
    pub max_instances_per_user: Option<usize>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_TARGET_NAMESPACE.to_string(),
            defaults: InstanceDefaults::default(),
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            max_instances_per_user: None,
        }
    }
}

impl ManagerConfig {
    /// Config for the given namespace with default everything else
    pub fn for_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_published_values() {
        let d = InstanceDefaults::default();
        assert_eq!(d.machine_os, "ubuntu_20_04");
        assert_eq!(d.node_size, "c1.small.x86");
        assert_eq!(d.timezone, "Pacific/Auckland");
        assert_eq!(d.worker_replicas, 0);
        assert!(d.project_id.is_empty());
    }

    #[test]
    fn version_gets_a_single_v_prefix() {
        let mut d = InstanceDefaults::default();
        assert_eq!(d.versioned_kubernetes(), "v1.19.0");
        d.kubernetes_version = "v1.20.2".to_string();
        assert_eq!(d.versioned_kubernetes(), "v1.20.2");
    }

    #[test]
    fn manager_config_defaults() {
        let c = ManagerConfig::for_namespace("pairs");
        assert_eq!(c.namespace, "pairs");
        assert_eq!(c.session_timeout, Duration::from_secs(2));
        assert_eq!(c.max_instances_per_user, None);
        assert_eq!(ManagerConfig::default().namespace, DEFAULT_TARGET_NAMESPACE);
    }
}
