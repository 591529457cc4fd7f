//! Status aggregation: one phase out of several resources' raw status
//!
//! The phase is never stored. Every read recomputes it from the Cluster
//! status and the session pod status it just fetched.

use k8s_openapi::api::core::v1::PodStatus;
use serde_json::Value;

use crate::spec::{InstancePhase, ResourceStatuses};

const DELETING: &str = "Deleting";
const POD_RUNNING: &str = "Running";

/// True when a Cluster status reports teardown in progress
///
/// Accepts either `status.phase == "Deleting"` or a `Deleting` condition
/// whose status is `"True"`.
pub fn cluster_is_deleting(status: &Value) -> bool {
    if status.get("phase").and_then(Value::as_str) == Some(DELETING) {
        return true;
    }
    status
        .get("conditions")
        .and_then(Value::as_array)
        .map(|conditions| {
            conditions.iter().any(|c| {
                c.get("type").and_then(Value::as_str) == Some(DELETING)
                    && c.get("status").and_then(Value::as_str) == Some("True")
            })
        })
        .unwrap_or(false)
}

/// True when the session pod is in the running phase
pub fn pod_is_running(status: Option<&PodStatus>) -> bool {
    status.and_then(|s| s.phase.as_deref()) == Some(POD_RUNNING)
}

/// Derive the phase of an instance that was just read back
///
/// Never returns `Pending`; that phase only exists in a create response.
pub fn compute_phase(resources: &ResourceStatuses) -> InstancePhase {
    if cluster_is_deleting(&resources.cluster) {
        InstancePhase::Deleting
    } else if pod_is_running(resources.session_pod.as_ref()) {
        InstancePhase::Provisioned
    } else {
        InstancePhase::Provisioning
    }
}
