//! `pair kubeconfig NAME` - print the admin kubeconfig of an instance
//!
//! ```bash
//! pair kubeconfig alice-1a2b3c4d > alice.kubeconfig
//! pair kubeconfig alice-1a2b3c4d -o alice.kubeconfig
//! ```

use std::path::PathBuf;

use clap::Args;
use pair_instance::ManagerConfig;

use crate::config::ClusterArgs;
use crate::Result;

/// Fetch an instance's kubeconfig
#[derive(Args, Debug)]
pub struct KubeconfigArgs {
    /// Instance name
    pub name: String,

    /// Output file path (default: stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Run the kubeconfig command
pub async fn run(args: KubeconfigArgs, cluster: &ClusterArgs, config: ManagerConfig) -> Result<()> {
    let client = super::connect(cluster).await?;
    let manager = super::kube_manager(client, config)?;
    let kubeconfig = manager.kubeconfig(&args.name).await?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &kubeconfig)?;
            eprintln!("Kubeconfig written to {}", path.display());
        }
        None => print!("{}", kubeconfig),
    }
    Ok(())
}
