//! Periodic reconciler
//!
//! Finishes deletes that stopped part way. A Cluster without its
//! ControlPlane can only be the residue of an interrupted delete, so the
//! reconciler re-issues the delete until nothing is left.
//!
//! Only one replica may run passes at a time: `run` holds a Lease for the
//! whole loop and stops at the first sign of losing it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use pair_common::leader_election::LeaderElector;
use pair_common::{Error, Result};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::manager::InstanceManager;

/// Default time between passes
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(60);

/// Outcome of one reconcile pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Instances whose delete was re-issued and completed
    pub completed: Vec<String>,
    /// Instances whose delete failed again
    pub failed: Vec<String>,
}

/// Completes partial deletes on a fixed interval
pub struct Reconciler {
    manager: Arc<InstanceManager>,
    interval: Duration,
}

impl Reconciler {
    /// Create a reconciler over a manager
    pub fn new(manager: Arc<InstanceManager>, interval: Duration) -> Self {
        Self { manager, interval }
    }

    /// Run a single pass
    ///
    /// A failure on one instance is logged and the pass moves on; only a
    /// failure to list resources fails the pass.
    pub async fn reconcile_once(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        for name in self.manager.list_partially_deleted().await? {
            info!(instance = %name, "Completing partial delete");
            match self.manager.delete(&name).await {
                Ok(()) => report.completed.push(name),
                Err(e) if e.is_retryable() => {
                    warn!(instance = %name, error = %e, "Partial delete still incomplete, retrying next pass");
                    report.failed.push(name);
                }
                Err(e) => {
                    error!(instance = %name, error = %e, "Partial delete rejected by the store, needs attention");
                    report.failed.push(name);
                }
            }
        }

        Ok(report)
    }

    /// Run passes until `shutdown` resolves or leadership is lost
    ///
    /// Returns an error on leadership loss so the process exits before
    /// another replica takes over; the in-flight pass is dropped at its
    /// next await point. On shutdown the lease is released.
    pub async fn run<F>(&self, elector: Arc<LeaderElector>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let identity = elector.identity().to_string();
        let mut guard = elector.acquire().await;
        info!(%identity, interval = ?self.interval, "Reconciler started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = guard.lost() => {
                    error!(%identity, "Leadership lost, stopping reconciler");
                    return Err(Error::internal_with_context("reconciler", "leadership lost"));
                }
                _ = &mut shutdown => {
                    info!("Reconciler shutting down");
                    if let Err(e) = guard.release().await {
                        warn!(error = %e, "Failed to release lease");
                    }
                    return Ok(());
                }
                result = async {
                    ticker.tick().await;
                    self.reconcile_once().await
                } => match result {
                    Ok(report) => debug!(
                        completed = report.completed.len(),
                        failed = report.failed.len(),
                        "Reconcile pass finished"
                    ),
                    Err(e) => warn!(error = %e, "Reconcile pass failed"),
                },
            }
        }
    }
}
