//! `pair get NAME` - show one instance with its current phase

use clap::Args;
use pair_instance::ManagerConfig;

use crate::config::{ClusterArgs, OutputFormat};
use crate::Result;

/// Show one instance
#[derive(Args, Debug)]
pub struct GetArgs {
    /// Instance name
    pub name: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    pub output: OutputFormat,
}

/// Run the get command
pub async fn run(args: GetArgs, cluster: &ClusterArgs, config: ManagerConfig) -> Result<()> {
    let client = super::connect(cluster).await?;
    let manager = super::kube_manager(client, config)?;
    let instance = manager.get(&args.name).await?;
    print!("{}", args.output.render(&instance)?);
    Ok(())
}
