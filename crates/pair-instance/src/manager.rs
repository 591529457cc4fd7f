//! Lifecycle coordinator: create, read, list and delete instances
//!
//! An instance has no record of its own. Create writes seven resources in
//! [`CREATE_ORDER`](crate::resources::CREATE_ORDER), delete removes them in
//! [`DELETE_ORDER`], and reads rebuild the instance from whatever resources
//! currently exist. The only concurrency signals understood are
//! `AlreadyExists` (create) and `NotFound` (delete), both treated as
//! success so that re-running either operation converges.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::future::join_all;
use k8s_openapi::api::core::v1::PodStatus;
use pair_common::{Error, Result, CLUSTER_NAME_LABEL, OWNERSHIP_LABEL_SELECTOR};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::annotations;
use crate::config::ManagerConfig;
use crate::expander::TemplateExpander;
use crate::resources::{DeleteStep, ResourceDocument, ResourceKind, ResourceSet, DELETE_ORDER};
use crate::session::SessionProbe;
use crate::store::ResourceStore;
use crate::spec::{Instance, InstanceFilter, InstanceSpec, InstanceStatus, ResourceStatuses};
use crate::status::compute_phase;
use crate::validation::{
    derive_instance_name, normalize_repos, validate_instance_name, validate_spec,
};

/// A fully prepared create: the final spec and the documents it expands to
#[derive(Clone, Debug, PartialEq)]
pub struct InstancePlan {
    /// Spec after naming, normalization and defaulting
    pub spec: InstanceSpec,
    /// Documents that would be submitted, keyed by kind
    pub resources: ResourceSet,
}

/// Coordinates instance operations against a resource store
pub struct InstanceManager {
    store: Arc<dyn ResourceStore>,
    probe: Arc<dyn SessionProbe>,
    expander: TemplateExpander,
    config: ManagerConfig,
}

impl InstanceManager {
    /// Create a manager
    pub fn new(
        store: Arc<dyn ResourceStore>,
        probe: Arc<dyn SessionProbe>,
        config: ManagerConfig,
    ) -> Result<Self> {
        let expander = TemplateExpander::new(config.defaults.clone())?;
        Ok(Self::with_expander(store, probe, expander, config))
    }

    pub(crate) fn with_expander(
        store: Arc<dyn ResourceStore>,
        probe: Arc<dyn SessionProbe>,
        expander: TemplateExpander,
        config: ManagerConfig,
    ) -> Self {
        Self {
            store,
            probe,
            expander,
            config,
        }
    }

    /// Namespace instances live in
    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    /// Validate, name, normalize, default and expand without writing anything
    pub fn plan(&self, spec: InstanceSpec) -> Result<InstancePlan> {
        validate_spec(&spec)?;

        let mut spec = spec;
        if spec.name.is_empty() {
            spec.name = derive_instance_name(&spec);
            debug!(instance = %spec.name, "Derived instance name");
            validate_instance_name(&spec.name)?;
        }
        normalize_repos(&mut spec.setup.repos);

        let defaults = self.expander.defaults();
        if spec.setup.timezone.is_empty() {
            spec.setup.timezone = defaults.timezone.clone();
        }
        if spec.node_size.is_empty() {
            spec.node_size = defaults.node_size.clone();
        }

        let resources = self.expander.expand(&spec, &self.config.namespace)?;
        Ok(InstancePlan { spec, resources })
    }

    /// Create an instance
    ///
    /// Resources that already exist are left alone. Any other failure stops
    /// the walk; resources created before it stay in place. With a per-user
    /// limit configured, a user at the limit can only re-create an instance
    /// they already hold.
    #[instrument(skip(self, spec), fields(user = %spec.setup.user))]
    pub async fn create(&self, spec: InstanceSpec) -> Result<Instance> {
        let plan = self.plan(spec)?;
        if let Some(max) = self.config.max_instances_per_user {
            self.check_instance_limit(&plan.spec, max).await?;
        }
        let namespace = self.namespace();

        for doc in plan.resources.in_create_order() {
            match self.store.create(namespace, doc).await {
                Ok(()) => {
                    info!(instance = %plan.spec.name, kind = %doc.kind, name = %doc.name, "Created resource")
                }
                Err(e) if e.is_already_exists() => {
                    info!(instance = %plan.spec.name, kind = %doc.kind, name = %doc.name, "Resource already exists")
                }
                Err(e) => {
                    warn!(instance = %plan.spec.name, kind = %doc.kind, name = %doc.name, error = %e, "Create aborted");
                    return Err(e);
                }
            }
        }

        Ok(Instance::pending(plan.spec))
    }

    /// Read an instance back from its resources
    ///
    /// The Cluster is required since it is the only resource the spec is
    /// decoded from. A missing control plane or infra cluster leaves its
    /// status empty.
    #[instrument(skip(self))]
    pub async fn get(&self, name: &str) -> Result<Instance> {
        validate_instance_name(name)?;

        let control_plane = self.owned_status(ResourceKind::ControlPlane, name).await?;
        let infra_cluster = self.owned_status(ResourceKind::InfraCluster, name).await?;

        let cluster = self
            .store
            .get(ResourceKind::Cluster, self.namespace(), name)
            .await?;
        if !cluster.is_owned() {
            warn!(instance = name, "Cluster is not managed by pair");
            return Err(Error::not_found(ResourceKind::Cluster.kind(), name));
        }

        let mut resources = ResourceStatuses {
            control_plane,
            cluster: cluster.status,
            infra_cluster,
            session_pod: None,
        };
        resources.session_pod = self.session_pod_status(name).await;

        Ok(Instance {
            spec: annotations::decode(&cluster.annotations),
            status: InstanceStatus {
                phase: compute_phase(&resources),
                resources,
            },
        })
    }

    /// List instances, optionally only one user's
    ///
    /// An instance is listed when its ControlPlane exists. InfraCluster and
    /// Cluster resources are merged into it by their name annotation; the
    /// Cluster pass also restores the spec.
    #[instrument(skip(self))]
    pub async fn list(&self, filter: &InstanceFilter) -> Result<Vec<Instance>> {
        let mut instances: BTreeMap<String, Instance> = BTreeMap::new();

        for doc in self.owned_documents(ResourceKind::ControlPlane, filter).await? {
            let Some(name) = doc.instance_name().map(str::to_string) else {
                warn!(name = %doc.name, "ControlPlane has no instance name annotation");
                continue;
            };
            let entry = instances.entry(name.clone()).or_default();
            entry.spec.name = name;
            entry.status.resources.control_plane = doc.status;
        }

        for doc in self.owned_documents(ResourceKind::InfraCluster, filter).await? {
            match doc.instance_name().and_then(|n| instances.get_mut(n)) {
                Some(instance) => instance.status.resources.infra_cluster = doc.status,
                None => debug!(name = %doc.name, "InfraCluster without ControlPlane ignored"),
            }
        }

        for doc in self.owned_documents(ResourceKind::Cluster, filter).await? {
            match doc.instance_name().and_then(|n| instances.get_mut(n)) {
                Some(instance) => {
                    instance.spec = annotations::decode(&doc.annotations);
                    instance.status.resources.cluster = doc.status;
                }
                None => debug!(name = %doc.name, "Cluster without ControlPlane ignored"),
            }
        }

        let names: Vec<String> = instances.keys().cloned().collect();
        let pods = join_all(names.iter().map(|n| self.session_pod_status(n))).await;
        for (instance, pod) in instances.values_mut().zip(pods) {
            instance.status.resources.session_pod = pod;
            instance.status.phase = compute_phase(&instance.status.resources);
        }

        Ok(instances.into_values().collect())
    }

    /// Delete an instance
    ///
    /// Missing resources count as deleted. Any other failure stops the
    /// walk; calling delete again picks up where it left off.
    #[instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> Result<()> {
        validate_instance_name(name)?;
        let namespace = self.namespace();

        for step in DELETE_ORDER {
            let (kind, target, result) = match step {
                DeleteStep::Resource(kind) => {
                    let target = kind.resource_name(name);
                    let result = self.store.delete(kind, namespace, &target).await;
                    (kind, target, result)
                }
                DeleteStep::Machines => {
                    let selector = machine_selector(name);
                    let result = self
                        .store
                        .delete_collection(ResourceKind::Machine, namespace, &selector)
                        .await;
                    (ResourceKind::Machine, selector, result)
                }
            };

            match result {
                Ok(()) => info!(instance = name, %kind, resource = %target, "Deleted"),
                Err(e) if e.is_not_found() => {
                    debug!(instance = name, %kind, resource = %target, "Already gone")
                }
                Err(e) => {
                    warn!(instance = name, %kind, resource = %target, error = %e, "Delete aborted");
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    /// Admin kubeconfig of the instance's own cluster
    #[instrument(skip(self))]
    pub async fn kubeconfig(&self, name: &str) -> Result<String> {
        validate_instance_name(name)?;
        let bytes = self.probe.kubeconfig(self.namespace(), name).await?;
        String::from_utf8(bytes).map_err(|e| {
            Error::serialization_for_kind("Secret", format!("kubeconfig is not utf-8: {}", e))
        })
    }

    /// Instances whose Cluster outlived their ControlPlane
    ///
    /// That only happens when a delete stopped part way, since the
    /// ControlPlane is created first and the Cluster is deleted last.
    pub async fn list_partially_deleted(&self) -> Result<Vec<String>> {
        let everyone = InstanceFilter::default();
        let control_planes: BTreeSet<String> = self
            .owned_documents(ResourceKind::ControlPlane, &everyone)
            .await?
            .iter()
            .filter_map(|d| d.instance_name().map(str::to_string))
            .collect();

        let orphaned = self
            .owned_documents(ResourceKind::Cluster, &everyone)
            .await?
            .iter()
            .filter_map(|d| d.instance_name().map(str::to_string))
            .filter(|n| !control_planes.contains(n))
            .collect::<BTreeSet<_>>();

        Ok(orphaned.into_iter().collect())
    }

    /// Reject a new instance for a user already holding `max`
    ///
    /// Counts the same set `list` would return for the user: instances with
    /// an owned ControlPlane.
    async fn check_instance_limit(&self, spec: &InstanceSpec, max: usize) -> Result<()> {
        let held: BTreeSet<String> = self
            .owned_documents(
                ResourceKind::ControlPlane,
                &InstanceFilter::for_user(spec.setup.user.as_str()),
            )
            .await?
            .iter()
            .filter_map(|d| d.instance_name().map(str::to_string))
            .collect();

        if held.contains(&spec.name) || held.len() < max {
            return Ok(());
        }
        warn!(instance = %spec.name, user = %spec.setup.user, held = held.len(), max, "Instance limit reached");
        Err(Error::validation_for_field(
            &spec.name,
            "setup.user",
            format!(
                "user {} already holds {} of {} allowed instances",
                spec.setup.user,
                held.len(),
                max
            ),
        ))
    }

    /// Status of one of this instance's resources; `Null` when absent or foreign
    async fn owned_status(&self, kind: ResourceKind, name: &str) -> Result<Value> {
        let resource_name = kind.resource_name(name);
        match self.store.get(kind, self.namespace(), &resource_name).await {
            Ok(doc) if doc.is_owned() => Ok(doc.status),
            Ok(_) => {
                warn!(instance = name, %kind, name = %resource_name, "Skipping resource not managed by pair");
                Ok(Value::Null)
            }
            Err(e) if e.is_not_found() => {
                info!(instance = name, %kind, name = %resource_name, "Resource not found");
                Ok(Value::Null)
            }
            Err(e) => Err(e),
        }
    }

    async fn owned_documents(
        &self,
        kind: ResourceKind,
        filter: &InstanceFilter,
    ) -> Result<Vec<ResourceDocument>> {
        let docs = self
            .store
            .list(kind, self.namespace(), OWNERSHIP_LABEL_SELECTOR)
            .await?;

        Ok(docs
            .into_iter()
            .filter(|doc| {
                if !doc.is_owned() {
                    warn!(%kind, name = %doc.name, "Skipping resource not managed by pair");
                    return false;
                }
                match &filter.username {
                    Some(user) => doc.instance_user() == Some(user.as_str()),
                    None => true,
                }
            })
            .collect())
    }

    /// Best-effort session pod lookup bounded by the configured deadline
    async fn session_pod_status(&self, name: &str) -> Option<PodStatus> {
        let lookup = self.probe.session_pod_status(self.namespace(), name);
        match tokio::time::timeout(self.config.session_timeout, lookup).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                warn!(instance = name, error = %e, "Session pod lookup failed");
                None
            }
            Err(_) => {
                warn!(instance = name, timeout = ?self.config.session_timeout, "Session pod lookup timed out");
                None
            }
        }
    }
}

/// Selector matching every machine of an instance's cluster
fn machine_selector(name: &str) -> String {
    format!("{}={}", CLUSTER_NAME_LABEL, name)
}
