//! Lookups that reach into an instance's own cluster
//!
//! Cluster API writes each workload cluster's admin kubeconfig to
//! `<name>-kubeconfig` in the management namespace. With it we can ask the
//! instance itself whether its interactive session is up.

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, PodStatus};
use kube::{Api, Client};
use pair_common::kube_utils::{client_from_kubeconfig_bytes, get_secret_data};
use pair_common::{Error, Result};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

/// Data key holding the kubeconfig inside the secret
pub const KUBECONFIG_SECRET_KEY: &str = "value";

/// Secret holding an instance's admin kubeconfig
pub fn kubeconfig_secret_name(instance: &str) -> String {
    format!("{}-kubeconfig", instance)
}

/// Interactive-session pod inside the instance's cluster
///
/// The workload install creates release `<name>` in namespace `<name>`, so
/// the pod is the first replica of its statefulset.
pub fn session_pod_name(instance: &str) -> String {
    format!("{}-humacs-0", instance)
}

/// Access to an instance's credentials and session pod
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SessionProbe: Send + Sync {
    /// Raw kubeconfig of the instance's cluster
    async fn kubeconfig(&self, namespace: &str, instance: &str) -> Result<Vec<u8>>;

    /// Status of the session pod; `None` when the pod does not exist yet
    async fn session_pod_status(
        &self,
        namespace: &str,
        instance: &str,
    ) -> Result<Option<PodStatus>>;
}

/// Probe that talks to the management cluster and the instance's cluster
pub struct KubeSessionProbe {
    client: Client,
    timeout: Duration,
}

impl KubeSessionProbe {
    /// `timeout` bounds connecting to and reading from the instance's cluster
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl SessionProbe for KubeSessionProbe {
    async fn kubeconfig(&self, namespace: &str, instance: &str) -> Result<Vec<u8>> {
        get_secret_data(
            &self.client,
            &kubeconfig_secret_name(instance),
            namespace,
            KUBECONFIG_SECRET_KEY,
        )
        .await
    }

    async fn session_pod_status(
        &self,
        namespace: &str,
        instance: &str,
    ) -> Result<Option<PodStatus>> {
        let kubeconfig = self.kubeconfig(namespace, instance).await?;
        let scoped = client_from_kubeconfig_bytes(&kubeconfig, self.timeout).await?;

        let pod_name = session_pod_name(instance);
        debug!(instance, pod = %pod_name, "Fetching session pod");
        let pods: Api<Pod> = Api::namespaced(scoped, instance);
        let pod = pods
            .get_opt(&pod_name)
            .await
            .map_err(|e| Error::from_kube("Pod", &pod_name, e))?;
        Ok(pod.and_then(|p| p.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_derive_from_the_instance() {
        assert_eq!(kubeconfig_secret_name("alice-1"), "alice-1-kubeconfig");
        assert_eq!(session_pod_name("alice-1"), "alice-1-humacs-0");
    }
}
