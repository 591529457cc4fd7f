//! pair CLI library

pub mod commands;
pub mod config;
pub mod error;

pub use error::{Error, Result};

use clap::{Parser, Subcommand};

use config::{ClusterArgs, DefaultsArgs};

/// pair - pairing instances on Cluster API
#[derive(Parser, Debug)]
#[command(name = "pair")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    #[command(flatten)]
    pub defaults: DefaultsArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an instance from a spec file
    Create(commands::create::CreateArgs),
    /// Show one instance
    Get(commands::get::GetArgs),
    /// List instances
    List(commands::list::ListArgs),
    /// Delete an instance and everything it owns
    Delete(commands::delete::DeleteArgs),
    /// Print the admin kubeconfig of an instance's cluster
    Kubeconfig(commands::kubeconfig::KubeconfigArgs),
    /// Complete interrupted deletes on an interval
    Reconcile(commands::reconcile::ReconcileArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        let config = self.defaults.manager_config(&self.cluster.namespace);
        match self.command {
            Commands::Create(args) => commands::create::run(args, &self.cluster, config).await,
            Commands::Get(args) => commands::get::run(args, &self.cluster, config).await,
            Commands::List(args) => commands::list::run(args, &self.cluster, config).await,
            Commands::Delete(args) => commands::delete::run(args, &self.cluster, config).await,
            Commands::Kubeconfig(args) => {
                commands::kubeconfig::run(args, &self.cluster, config).await
            }
            Commands::Reconcile(args) => {
                commands::reconcile::run(args, &self.cluster, config).await
            }
        }
    }
}
