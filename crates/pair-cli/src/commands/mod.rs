//! CLI commands

use std::sync::Arc;

use kube::Client;
use pair_common::kube_utils::create_client;
use pair_instance::{InstanceManager, KubeResourceStore, KubeSessionProbe, ManagerConfig};
use tracing::debug;

use crate::config::ClusterArgs;
use crate::Result;

pub mod create;
pub mod delete;
pub mod get;
pub mod kubeconfig;
pub mod list;
pub mod reconcile;

/// Connect to the management cluster
pub async fn connect(cluster: &ClusterArgs) -> Result<Client> {
    debug!(kubeconfig = ?cluster.kubeconfig, "Connecting to management cluster");
    Ok(create_client(cluster.kubeconfig.as_deref()).await?)
}

/// Manager backed by the live API server
pub fn kube_manager(client: Client, config: ManagerConfig) -> Result<InstanceManager> {
    let store = Arc::new(KubeResourceStore::new(client.clone()));
    let probe = Arc::new(KubeSessionProbe::new(client, config.session_timeout));
    Ok(InstanceManager::new(store, probe, config)?)
}
