//! `pair reconcile` - complete interrupted deletes until stopped
//!
//! Replicas coordinate through a Lease, so running several copies is safe.
//! Ctrl-C releases the lease and exits cleanly.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use pair_common::leader_election::{LeaderElector, RECONCILER_LEASE_NAME};
use pair_instance::{ManagerConfig, Reconciler};
use tracing::{info, warn};

use crate::config::ClusterArgs;
use crate::{Error, Result};

/// Run the reconciler
#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Seconds between passes
    #[arg(long, env = "APP_RECONCILE_INTERVAL_SECONDS", default_value_t = 60)]
    pub interval: u64,

    /// Identity recorded as lease holder (default: pod name or pair-<pid>)
    #[arg(long, env = "POD_NAME")]
    pub identity: Option<String>,

    /// Namespace of the Lease (default: the instance namespace)
    #[arg(long, env = "APP_LEASE_NAMESPACE")]
    pub lease_namespace: Option<String>,

    /// Run one pass and exit, without taking the lease
    #[arg(long)]
    pub once: bool,
}

impl ReconcileArgs {
    fn interval(&self) -> Result<Duration> {
        if self.interval == 0 {
            return Err(Error::validation("--interval must be at least 1 second"));
        }
        Ok(Duration::from_secs(self.interval))
    }

    fn identity(&self) -> String {
        self.identity
            .clone()
            .filter(|i| !i.is_empty())
            .unwrap_or_else(|| format!("pair-{}", std::process::id()))
    }
}

/// Run the reconcile command
pub async fn run(args: ReconcileArgs, cluster: &ClusterArgs, config: ManagerConfig) -> Result<()> {
    let interval = args.interval()?;
    let client = super::connect(cluster).await?;
    let lease_namespace = args
        .lease_namespace
        .clone()
        .unwrap_or_else(|| config.namespace.clone());
    let manager = Arc::new(super::kube_manager(client.clone(), config)?);
    let reconciler = Reconciler::new(manager, interval);

    if args.once {
        let report = reconciler.reconcile_once().await?;
        info!(
            completed = ?report.completed,
            failed = ?report.failed,
            "Reconcile pass finished"
        );
        return Ok(());
    }

    let identity = args.identity();
    info!(identity = %identity, lease_namespace = %lease_namespace, "Waiting for leadership");
    let elector = Arc::new(LeaderElector::new(
        client,
        RECONCILER_LEASE_NAME,
        &lease_namespace,
        &identity,
    ));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    reconciler.run(elector, shutdown).await?;
    Ok(())
}
