//! Resource kinds an instance expands into, and their typed documents
//!
//! Each [`ResourceKind`] knows its group/version, kind, plural and naming
//! suffix, so the lifecycle code can walk [`CREATE_ORDER`] and
//! [`DELETE_ORDER`] generically instead of special-casing every type.

use std::collections::BTreeMap;

use kube::api::{DynamicObject, ObjectMeta, TypeMeta};
use kube::discovery::ApiResource;
use pair_common::kube_utils::{build_api_resource, pluralize_kind};
use pair_common::{Error, Result};
use serde_json::Value;

use crate::annotations;

/// Cluster API core group version
pub const CAPI_API_VERSION: &str = "cluster.x-k8s.io/v1alpha3";
/// Kubeadm control plane group version
pub const CONTROL_PLANE_API_VERSION: &str = "controlplane.cluster.x-k8s.io/v1alpha3";
/// Kubeadm bootstrap group version
pub const BOOTSTRAP_API_VERSION: &str = "bootstrap.cluster.x-k8s.io/v1alpha3";
/// Packet infrastructure group version
pub const INFRASTRUCTURE_API_VERSION: &str = "infrastructure.cluster.x-k8s.io/v1alpha3";

/// Name suffix of the control-plane resources
pub const CONTROL_PLANE_SUFFIX: &str = "control-plane";
/// Name suffix of the single worker pool's resources
pub const WORKER_POOL_SUFFIX: &str = "worker-a";

/// One kind of resource in an instance constellation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// KubeadmControlPlane `<name>-control-plane`
    ControlPlane,
    /// PacketMachineTemplate `<name>-control-plane`
    ControlPlaneMachineTemplate,
    /// PacketCluster `<name>`
    InfraCluster,
    /// Cluster `<name>`
    Cluster,
    /// MachineDeployment `<name>-worker-a`
    WorkerMachineDeployment,
    /// KubeadmConfigTemplate `<name>-worker-a`
    WorkerBootstrapConfigTemplate,
    /// PacketMachineTemplate `<name>-worker-a`
    WorkerMachineTemplate,
    /// PacketMachine objects created by the controllers; only bulk-deleted
    Machine,
}

impl ResourceKind {
    /// apiVersion of this kind
    pub const fn api_version(self) -> &'static str {
        match self {
            ResourceKind::ControlPlane => CONTROL_PLANE_API_VERSION,
            ResourceKind::Cluster | ResourceKind::WorkerMachineDeployment => CAPI_API_VERSION,
            ResourceKind::WorkerBootstrapConfigTemplate => BOOTSTRAP_API_VERSION,
            ResourceKind::ControlPlaneMachineTemplate
            | ResourceKind::InfraCluster
            | ResourceKind::WorkerMachineTemplate
            | ResourceKind::Machine => INFRASTRUCTURE_API_VERSION,
        }
    }

    /// Kubernetes kind string
    pub const fn kind(self) -> &'static str {
        match self {
            ResourceKind::ControlPlane => "KubeadmControlPlane",
            ResourceKind::ControlPlaneMachineTemplate | ResourceKind::WorkerMachineTemplate => {
                "PacketMachineTemplate"
            }
            ResourceKind::InfraCluster => "PacketCluster",
            ResourceKind::Cluster => "Cluster",
            ResourceKind::WorkerMachineDeployment => "MachineDeployment",
            ResourceKind::WorkerBootstrapConfigTemplate => "KubeadmConfigTemplate",
            ResourceKind::Machine => "PacketMachine",
        }
    }

    /// Plural resource name used in API paths
    pub fn plural(self) -> String {
        pluralize_kind(self.kind())
    }

    /// `ApiResource` for building a dynamic `Api`
    pub fn api_resource(self) -> ApiResource {
        build_api_resource(self.api_version(), self.kind())
    }

    /// Suffix appended to the instance name, if any
    pub const fn name_suffix(self) -> Option<&'static str> {
        match self {
            ResourceKind::ControlPlane | ResourceKind::ControlPlaneMachineTemplate => {
                Some(CONTROL_PLANE_SUFFIX)
            }
            ResourceKind::WorkerMachineDeployment
            | ResourceKind::WorkerBootstrapConfigTemplate
            | ResourceKind::WorkerMachineTemplate => Some(WORKER_POOL_SUFFIX),
            ResourceKind::InfraCluster | ResourceKind::Cluster | ResourceKind::Machine => None,
        }
    }

    /// Name of this instance's resource of this kind
    pub fn resource_name(self, instance: &str) -> String {
        match self.name_suffix() {
            Some(suffix) => format!("{}-{}", instance, suffix),
            None => instance.to_string(),
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())
    }
}

/// Order resources are submitted in
///
/// The control plane and its template go first so that the Cluster's
/// references resolve as soon as it appears.
pub const CREATE_ORDER: [ResourceKind; 7] = [
    ResourceKind::ControlPlane,
    ResourceKind::ControlPlaneMachineTemplate,
    ResourceKind::InfraCluster,
    ResourceKind::Cluster,
    ResourceKind::WorkerMachineDeployment,
    ResourceKind::WorkerBootstrapConfigTemplate,
    ResourceKind::WorkerMachineTemplate,
];

/// One step of an instance teardown
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteStep {
    /// Delete this instance's resource of the given kind by name
    Resource(ResourceKind),
    /// Delete every machine labelled with the instance's cluster name
    Machines,
}

/// Order resources are removed in
///
/// Worker pool first, then the machines it left behind, then the control
/// plane, and the Cluster last since it is the only resource the spec can
/// be recovered from.
pub const DELETE_ORDER: [DeleteStep; 8] = [
    DeleteStep::Resource(ResourceKind::WorkerMachineTemplate),
    DeleteStep::Resource(ResourceKind::WorkerBootstrapConfigTemplate),
    DeleteStep::Resource(ResourceKind::WorkerMachineDeployment),
    DeleteStep::Machines,
    DeleteStep::Resource(ResourceKind::ControlPlane),
    DeleteStep::Resource(ResourceKind::ControlPlaneMachineTemplate),
    DeleteStep::Resource(ResourceKind::InfraCluster),
    DeleteStep::Resource(ResourceKind::Cluster),
];

/// A resource document with typed identity and untyped spec/status
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceDocument {
    /// Which member of the constellation this is
    pub kind: ResourceKind,
    /// metadata.name
    pub name: String,
    /// metadata.namespace
    pub namespace: String,
    /// metadata.labels
    pub labels: BTreeMap<String, String>,
    /// metadata.annotations
    pub annotations: BTreeMap<String, String>,
    /// spec, as sent to or read from the store
    pub spec: Value,
    /// status; only populated on documents read back from the store
    pub status: Value,
}

impl ResourceDocument {
    /// Create an empty document
    pub fn new(kind: ResourceKind, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            namespace: namespace.into(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            spec: Value::Null,
            status: Value::Null,
        }
    }

    /// Set the spec
    pub fn with_spec(mut self, spec: Value) -> Self {
        self.spec = spec;
        self
    }

    /// Merge labels into the document
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels.extend(labels);
        self
    }

    /// Merge annotations into the document
    pub fn with_annotations(mut self, annotations: BTreeMap<String, String>) -> Self {
        self.annotations.extend(annotations);
        self
    }

    /// Set the status (store doubles and tests)
    pub fn with_status(mut self, status: Value) -> Self {
        self.status = status;
        self
    }

    /// True when the ownership label marks this as an instance resource
    pub fn is_owned(&self) -> bool {
        annotations::is_owned(&self.labels)
    }

    /// Instance this resource belongs to, from its annotation bag
    pub fn instance_name(&self) -> Option<&str> {
        annotations::instance_name(&self.annotations)
    }

    /// Owning user, from its annotation bag
    pub fn instance_user(&self) -> Option<&str> {
        annotations::instance_user(&self.annotations)
    }

    /// Convert into the generic object the Kubernetes API takes
    pub fn to_dynamic(&self) -> Result<DynamicObject> {
        let mut data = serde_json::Map::new();
        if !self.spec.is_null() {
            data.insert("spec".to_string(), self.spec.clone());
        }
        if !self.status.is_null() {
            data.insert("status".to_string(), self.status.clone());
        }

        Ok(DynamicObject {
            types: Some(TypeMeta {
                api_version: self.kind.api_version().to_string(),
                kind: self.kind.kind().to_string(),
            }),
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: (!self.labels.is_empty()).then(|| self.labels.clone()),
                annotations: (!self.annotations.is_empty()).then(|| self.annotations.clone()),
                ..Default::default()
            },
            data: Value::Object(data),
        })
    }

    /// Convert a generic object read as `kind` back into a document
    ///
    /// Fails when the object has no name or declares a different kind.
    pub fn from_dynamic(kind: ResourceKind, obj: DynamicObject) -> Result<Self> {
        if let Some(types) = &obj.types {
            if types.kind != kind.kind() {
                return Err(Error::serialization_for_kind(
                    kind.kind(),
                    format!("expected kind {}, got {}", kind.kind(), types.kind),
                ));
            }
        }

        let name = obj.metadata.name.clone().ok_or_else(|| {
            Error::serialization_for_kind(kind.kind(), "object has no metadata.name")
        })?;

        let field = |key: &str| obj.data.get(key).cloned().unwrap_or(Value::Null);
        let spec = field("spec");
        let status = field("status");

        Ok(Self {
            kind,
            name,
            namespace: obj.metadata.namespace.unwrap_or_default(),
            labels: obj.metadata.labels.unwrap_or_default(),
            annotations: obj.metadata.annotations.unwrap_or_default(),
            spec,
            status,
        })
    }
}

/// The seven documents generated for one instance
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceSet {
    documents: BTreeMap<ResourceKind, ResourceDocument>,
}

impl ResourceSet {
    /// Build a set; every kind in [`CREATE_ORDER`] must be present exactly once
    pub fn new(documents: Vec<ResourceDocument>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for doc in documents {
            let kind = doc.kind;
            if map.insert(kind, doc).is_some() {
                return Err(Error::internal_with_context(
                    "resource_set",
                    format!("duplicate {:?} document", kind),
                ));
            }
        }
        if let Some(missing) = CREATE_ORDER.iter().find(|k| !map.contains_key(*k)) {
            return Err(Error::internal_with_context(
                "resource_set",
                format!("missing {:?} document", missing),
            ));
        }
        Ok(Self { documents: map })
    }

    /// Document of the given kind
    pub fn get(&self, kind: ResourceKind) -> Option<&ResourceDocument> {
        self.documents.get(&kind)
    }

    /// Documents in submission order
    pub fn in_create_order(&self) -> impl Iterator<Item = &ResourceDocument> {
        CREATE_ORDER.iter().filter_map(|k| self.documents.get(k))
    }

    /// Number of documents
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Always false for a constructed set
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Render every document as a JSON object, in submission order
    pub fn to_values(&self) -> Result<Vec<Value>> {
        self.in_create_order()
            .map(|doc| {
                doc.to_dynamic().and_then(|obj| {
                    serde_json::to_value(obj)
                        .map_err(|e| Error::serialization_for_kind(doc.kind.kind(), e.to_string()))
                })
            })
            .collect()
    }
}
