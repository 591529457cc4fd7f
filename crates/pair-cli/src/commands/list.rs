//! `pair list` - list instances, optionally for one user

use clap::Args;
use pair_instance::{InstanceFilter, ManagerConfig};

use crate::config::{ClusterArgs, OutputFormat};
use crate::Result;

/// List instances
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only instances owned by this user
    #[arg(short, long)]
    pub user: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    pub output: OutputFormat,
}

impl ListArgs {
    fn filter(&self) -> InstanceFilter {
        InstanceFilter {
            username: self.user.clone().filter(|u| !u.is_empty()),
        }
    }
}

/// Run the list command
pub async fn run(args: ListArgs, cluster: &ClusterArgs, config: ManagerConfig) -> Result<()> {
    let client = super::connect(cluster).await?;
    let manager = super::kube_manager(client, config)?;
    let instances = manager.list(&args.filter()).await?;
    print!("{}", args.output.render(&instances)?);
    Ok(())
}
