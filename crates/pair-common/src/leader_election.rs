//! Leader election on a coordination.k8s.io/v1 Lease
//!
//! Only one reconciler replica may act on instance resources at a time.
//! Holding the lease is decided with compare-and-swap on the Lease
//! `resourceVersion`: a write based on a stale read fails with 409 and
//! the caller simply tries again later.
//!
//! The renew interval is a third of the lease duration, so a holder that
//! fails to renew notices (and stops its work) well before the lease
//! expires and a standby is allowed to take over.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::json;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::FIELD_MANAGER;

/// Lease name used by the periodic reconciler
pub const RECONCILER_LEASE_NAME: &str = "pair-reconciler-leader";

const LEASE_DURATION: Duration = Duration::from_secs(30);
const RENEW_INTERVAL: Duration = Duration::from_secs(10);
const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Leader election errors
#[derive(Debug, Error)]
pub enum LeaderElectionError {
    /// Kubernetes API error
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// The lease came back without a resourceVersion to CAS against
    #[error("lease {0} has no resourceVersion")]
    MissingResourceVersion(String),
}

/// What to do with the current lease, decided from a fresh read
#[derive(Debug, Clone, PartialEq, Eq)]
enum LeaseAction {
    /// No lease object yet
    Create,
    /// We hold it; bump renewTime
    Renew,
    /// Held by someone whose lease ran out; take it over
    TakeOver { transitions: i32 },
    /// Held by someone else and still valid
    Wait,
}

/// Leader elector using a Kubernetes Lease
pub struct LeaderElector {
    client: Client,
    lease_name: String,
    namespace: String,
    identity: String,
    lease_duration: Duration,
    renew_interval: Duration,
    retry_interval: Duration,
}

impl LeaderElector {
    /// Create a new leader elector with default timing (30s lease, 10s renew, 5s retry)
    pub fn new(client: Client, lease_name: &str, namespace: &str, identity: &str) -> Self {
        Self {
            client,
            lease_name: lease_name.to_string(),
            namespace: namespace.to_string(),
            identity: identity.to_string(),
            lease_duration: LEASE_DURATION,
            renew_interval: RENEW_INTERVAL,
            retry_interval: RETRY_INTERVAL,
        }
    }

    /// Identity this elector competes under
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Block until leadership is acquired, then return a guard
    ///
    /// The guard keeps renewing the lease in the background. When renewal
    /// fails, `LeaderGuard::lost` resolves.
    pub async fn acquire(self: Arc<Self>) -> LeaderGuard {
        info!(
            identity = %self.identity,
            lease = %self.lease_name,
            "Waiting for leadership..."
        );

        loop {
            match self.try_acquire_or_renew().await {
                Ok(true) => {
                    info!(identity = %self.identity, "Leadership acquired");
                    return self.create_guard();
                }
                Ok(false) => {
                    debug!(
                        identity = %self.identity,
                        retry_secs = self.retry_interval.as_secs(),
                        "Lease held by another, waiting..."
                    );
                }
                Err(e) => {
                    warn!(
                        identity = %self.identity,
                        error = %e,
                        retry_secs = self.retry_interval.as_secs(),
                        "Failed to acquire lease, retrying..."
                    );
                }
            }
            tokio::time::sleep(self.retry_interval).await;
        }
    }

    fn create_guard(self: &Arc<Self>) -> LeaderGuard {
        let (lost_tx, lost_rx) = oneshot::channel();
        let elector = Arc::clone(self);
        let renewal_task = tokio::spawn(async move {
            elector.renewal_loop(lost_tx).await;
        });

        LeaderGuard {
            elector: Arc::clone(self),
            renewal_task,
            lost_rx: Some(lost_rx),
        }
    }

    fn decide(&self, existing: Option<&Lease>, now: DateTime<Utc>) -> LeaseAction {
        let Some(lease) = existing else {
            return LeaseAction::Create;
        };
        let spec = lease.spec.as_ref();

        if spec.and_then(|s| s.holder_identity.as_deref()) == Some(self.identity.as_str()) {
            return LeaseAction::Renew;
        }

        let renew_time = spec.and_then(|s| s.renew_time.as_ref());
        let duration_secs = spec.and_then(|s| s.lease_duration_seconds);
        let expired = match (renew_time, duration_secs) {
            (Some(rt), Some(secs)) => now > rt.0 + chrono::Duration::seconds(i64::from(secs)),
            _ => true,
        };

        if expired {
            LeaseAction::TakeOver {
                transitions: spec.and_then(|s| s.lease_transitions).unwrap_or(0),
            }
        } else {
            LeaseAction::Wait
        }
    }

    async fn try_acquire_or_renew(&self) -> Result<bool, LeaderElectionError> {
        let api: Api<Lease> = Api::namespaced(self.client.clone(), &self.namespace);
        let now = Utc::now();

        let existing = match api.get(&self.lease_name).await {
            Ok(lease) => Some(lease),
            Err(kube::Error::Api(e)) if e.code == 404 => None,
            Err(e) => return Err(e.into()),
        };

        match self.decide(existing.as_ref(), now) {
            LeaseAction::Wait => Ok(false),
            LeaseAction::Create => {
                let lease = self.lease_for(None, now, now, 0);
                self.write(&api, lease, true).await
            }
            LeaseAction::Renew => {
                let Some(mut lease) = existing else {
                    return Ok(false);
                };
                if lease.metadata.resource_version.is_none() {
                    return Err(LeaderElectionError::MissingResourceVersion(
                        self.lease_name.clone(),
                    ));
                }
                if let Some(ref mut spec) = lease.spec {
                    spec.renew_time = Some(MicroTime(now));
                }
                self.write(&api, lease, false).await
            }
            LeaseAction::TakeOver { transitions } => {
                let resource_version = existing
                    .and_then(|l| l.metadata.resource_version)
                    .ok_or_else(|| {
                        LeaderElectionError::MissingResourceVersion(self.lease_name.clone())
                    })?;
                let lease = self.lease_for(Some(resource_version), now, now, transitions + 1);
                self.write(&api, lease, false).await
            }
        }
    }

    fn lease_for(
        &self,
        resource_version: Option<String>,
        acquired: DateTime<Utc>,
        renewed: DateTime<Utc>,
        transitions: i32,
    ) -> Lease {
        Lease {
            metadata: ObjectMeta {
                name: Some(self.lease_name.clone()),
                namespace: Some(self.namespace.clone()),
                resource_version,
                ..Default::default()
            },
            spec: Some(LeaseSpec {
                holder_identity: Some(self.identity.clone()),
                lease_duration_seconds: Some(self.lease_duration.as_secs() as i32),
                acquire_time: Some(MicroTime(acquired)),
                renew_time: Some(MicroTime(renewed)),
                lease_transitions: Some(transitions),
                ..Default::default()
            }),
        }
    }

    /// Create or replace the lease; a 409 means someone else won the race
    async fn write(
        &self,
        api: &Api<Lease>,
        lease: Lease,
        create: bool,
    ) -> Result<bool, LeaderElectionError> {
        let result = if create {
            api.create(&PostParams::default(), &lease).await
        } else {
            api.replace(&self.lease_name, &PostParams::default(), &lease)
                .await
        };

        match result {
            Ok(_) => {
                debug!(identity = %self.identity, create, "Lease written");
                Ok(true)
            }
            Err(kube::Error::Api(e)) if e.code == 409 => {
                debug!(identity = %self.identity, "Lease write conflict");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn renewal_loop(&self, lost_tx: oneshot::Sender<()>) {
        loop {
            tokio::time::sleep(self.renew_interval).await;

            match self.try_acquire_or_renew().await {
                Ok(true) => {}
                Ok(false) | Err(_) => {
                    warn!(identity = %self.identity, "Leadership lost");
                    let _ = lost_tx.send(());
                    return;
                }
            }
        }
    }

    /// Clear the holder so a standby can take over without waiting for expiry
    async fn release_lease(&self) -> Result<(), LeaderElectionError> {
        let api: Api<Lease> = Api::namespaced(self.client.clone(), &self.namespace);

        let lease = match api.get(&self.lease_name).await {
            Ok(l) => l,
            Err(kube::Error::Api(e)) if e.code == 404 => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let holder = lease.spec.as_ref().and_then(|s| s.holder_identity.as_ref());
        if holder != Some(&self.identity) {
            debug!(identity = %self.identity, "Not the lease holder, nothing to release");
            return Ok(());
        }

        let past = Utc::now() - chrono::Duration::seconds(60);
        let patch = json!({
            "spec": {
                "holderIdentity": null,
                "renewTime": past.to_rfc3339()
            }
        });

        api.patch(
            &self.lease_name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Merge(&patch),
        )
        .await?;

        info!(identity = %self.identity, "Lease released");
        Ok(())
    }
}

/// Guard that maintains leadership while it lives
///
/// Dropping the guard stops renewal; the lease then expires on its own
/// unless `release` was called first.
pub struct LeaderGuard {
    elector: Arc<LeaderElector>,
    renewal_task: JoinHandle<()>,
    lost_rx: Option<oneshot::Receiver<()>>,
}

impl LeaderGuard {
    /// Wait until leadership is lost
    ///
    /// Resolves immediately on every call after the first loss. Safe to use
    /// as a `select!` branch: the receiver survives a cancelled poll.
    pub async fn lost(&mut self) {
        if let Some(rx) = self.lost_rx.as_mut() {
            let _ = rx.await;
            self.lost_rx = None;
        }
    }

    /// Give up leadership now (graceful shutdown)
    pub async fn release(&self) -> Result<(), LeaderElectionError> {
        self.renewal_task.abort();
        self.elector.release_lease().await
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        self.renewal_task.abort();
        info!(identity = %self.elector.identity, "Leadership released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elector() -> LeaderElector {
        // decide() never touches the client; build one against a dummy URL
        let config = kube::Config::new("http://127.0.0.1:1".parse().unwrap());
        let client = Client::try_from(config).unwrap();
        LeaderElector::new(client, RECONCILER_LEASE_NAME, "pair-system", "replica-a")
    }

    fn lease(holder: &str, renewed: DateTime<Utc>, transitions: i32) -> Lease {
        Lease {
            metadata: ObjectMeta {
                name: Some(RECONCILER_LEASE_NAME.to_string()),
                resource_version: Some("42".to_string()),
                ..Default::default()
            },
            spec: Some(LeaseSpec {
                holder_identity: Some(holder.to_string()),
                lease_duration_seconds: Some(30),
                renew_time: Some(MicroTime(renewed)),
                lease_transitions: Some(transitions),
                ..Default::default()
            }),
        }
    }

    #[tokio::test]
    async fn missing_lease_is_created() {
        assert_eq!(elector().decide(None, Utc::now()), LeaseAction::Create);
    }

    #[tokio::test]
    async fn own_lease_is_renewed() {
        let now = Utc::now();
        let l = lease("replica-a", now, 3);
        assert_eq!(elector().decide(Some(&l), now), LeaseAction::Renew);
    }

    #[tokio::test]
    async fn foreign_valid_lease_means_wait() {
        let now = Utc::now();
        let l = lease("replica-b", now - chrono::Duration::seconds(5), 1);
        assert_eq!(elector().decide(Some(&l), now), LeaseAction::Wait);
    }

    #[tokio::test]
    async fn foreign_expired_lease_is_taken_over() {
        let now = Utc::now();
        let l = lease("replica-b", now - chrono::Duration::seconds(31), 4);
        assert_eq!(
            elector().decide(Some(&l), now),
            LeaseAction::TakeOver { transitions: 4 }
        );
    }

    #[tokio::test]
    async fn lease_without_spec_is_treated_as_expired() {
        let l = Lease::default();
        assert_eq!(
            elector().decide(Some(&l), Utc::now()),
            LeaseAction::TakeOver { transitions: 0 }
        );
    }

    #[tokio::test]
    async fn built_lease_carries_identity_and_timing() {
        let now = Utc::now();
        let e = elector();
        let l = e.lease_for(Some("7".to_string()), now, now, 2);
        let spec = l.spec.unwrap();
        assert_eq!(spec.holder_identity.as_deref(), Some("replica-a"));
        assert_eq!(spec.lease_duration_seconds, Some(30));
        assert_eq!(spec.lease_transitions, Some(2));
        assert_eq!(l.metadata.resource_version.as_deref(), Some("7"));
        assert_eq!(e.identity(), "replica-a");
    }
}
