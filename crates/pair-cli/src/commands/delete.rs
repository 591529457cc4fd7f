//! `pair delete NAME` - tear an instance down
//!
//! Deleting an instance that is already gone succeeds.

use clap::Args;
use pair_instance::ManagerConfig;
use tracing::info;

use crate::config::ClusterArgs;
use crate::Result;

/// Delete an instance
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Instance name
    pub name: String,
}

/// Run the delete command
pub async fn run(args: DeleteArgs, cluster: &ClusterArgs, config: ManagerConfig) -> Result<()> {
    let client = super::connect(cluster).await?;
    let manager = super::kube_manager(client, config)?;
    manager.delete(&args.name).await?;
    info!(instance = %args.name, "Instance deleted");
    Ok(())
}
