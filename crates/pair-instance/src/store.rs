//! External resource store
//!
//! The trait is the only way the lifecycle code touches the cluster, so
//! tests can swap in a mock or an in-memory store. Implementations must
//! report missing and duplicate resources as `Error::NotFound` and
//! `Error::AlreadyExists`; every other failure is upstream.

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::Client;
use pair_common::{Error, Result, FIELD_MANAGER};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::resources::{ResourceDocument, ResourceKind};

/// Generic CRUD over the resource kinds an instance is made of
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Create `doc` in `namespace`
    async fn create(&self, namespace: &str, doc: &ResourceDocument) -> Result<()>;

    /// Fetch one resource by name
    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str)
        -> Result<ResourceDocument>;

    /// List resources matching a label selector
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<ResourceDocument>>;

    /// Delete one resource by name
    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<()>;

    /// Delete every resource matching a label selector
    async fn delete_collection(
        &self,
        kind: ResourceKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<()>;
}

/// Store backed by the Kubernetes API through untyped `DynamicObject`s
pub struct KubeResourceStore {
    client: Client,
}

impl KubeResourceStore {
    /// Create a store over an existing client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, kind: ResourceKind, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &kind.api_resource())
    }
}

#[async_trait]
impl ResourceStore for KubeResourceStore {
    async fn create(&self, namespace: &str, doc: &ResourceDocument) -> Result<()> {
        debug!(kind = %doc.kind, name = %doc.name, namespace, "Creating resource");
        let obj = doc.to_dynamic()?;
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        self.api(doc.kind, namespace)
            .create(&params, &obj)
            .await
            .map_err(|e| Error::from_kube(doc.kind.kind(), &doc.name, e))?;
        Ok(())
    }

    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<ResourceDocument> {
        debug!(%kind, name, namespace, "Getting resource");
        let obj = self
            .api(kind, namespace)
            .get(name)
            .await
            .map_err(|e| Error::from_kube(kind.kind(), name, e))?;
        ResourceDocument::from_dynamic(kind, obj)
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<ResourceDocument>> {
        debug!(%kind, namespace, label_selector, "Listing resources");
        let list = self
            .api(kind, namespace)
            .list(&ListParams::default().labels(label_selector))
            .await
            .map_err(|e| Error::from_kube(kind.kind(), label_selector, e))?;
        list.items
            .into_iter()
            .map(|obj| ResourceDocument::from_dynamic(kind, obj))
            .collect()
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<()> {
        debug!(%kind, name, namespace, "Deleting resource");
        self.api(kind, namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| Error::from_kube(kind.kind(), name, e))?;
        Ok(())
    }

    async fn delete_collection(
        &self,
        kind: ResourceKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<()> {
        debug!(%kind, namespace, label_selector, "Deleting resource collection");
        self.api(kind, namespace)
            .delete_collection(
                &DeleteParams::default(),
                &ListParams::default().labels(label_selector),
            )
            .await
            .map_err(|e| Error::from_kube(kind.kind(), label_selector, e))?;
        Ok(())
    }
}
