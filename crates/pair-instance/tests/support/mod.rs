//! Shared test doubles for lifecycle tests
//!
//! `MemoryStore` behaves like the API server as far as the lifecycle code
//! can tell: creates of an existing name fail with `AlreadyExists`, reads
//! and deletes of a missing name fail with `NotFound`.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::PodStatus;
use pair_common::{Error, Result};
use pair_instance::{
    InstanceManager, ManagerConfig, ResourceDocument, ResourceKind, ResourceStore, SessionProbe,
};

pub const NAMESPACE: &str = "pairs";

type Key = (ResourceKind, String, String);

/// In-memory resource store keyed by kind, namespace and name
#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<BTreeMap<Key, ResourceDocument>>,
    /// Kind whose next delete fails with an upstream error
    fail_delete_of: Mutex<Option<ResourceKind>>,
    deleted_collections: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a document in place without going through `create`
    pub fn insert(&self, doc: ResourceDocument) {
        let key = (doc.kind, doc.namespace.clone(), doc.name.clone());
        self.docs.lock().unwrap().insert(key, doc);
    }

    pub fn len(&self) -> usize {
        self.docs.lock().unwrap().len()
    }

    pub fn contains(&self, kind: ResourceKind, name: &str) -> bool {
        self.docs
            .lock()
            .unwrap()
            .contains_key(&(kind, NAMESPACE.to_string(), name.to_string()))
    }

    pub fn kinds(&self) -> BTreeSet<ResourceKind> {
        self.docs.lock().unwrap().keys().map(|(k, _, _)| *k).collect()
    }

    pub fn get_doc(&self, kind: ResourceKind, name: &str) -> Option<ResourceDocument> {
        self.docs
            .lock()
            .unwrap()
            .get(&(kind, NAMESPACE.to_string(), name.to_string()))
            .cloned()
    }

    pub fn set_status(&self, kind: ResourceKind, name: &str, status: serde_json::Value) {
        if let Some(doc) = self
            .docs
            .lock()
            .unwrap()
            .get_mut(&(kind, NAMESPACE.to_string(), name.to_string()))
        {
            doc.status = status;
        }
    }

    pub fn remove(&self, kind: ResourceKind, name: &str) {
        self.docs
            .lock()
            .unwrap()
            .remove(&(kind, NAMESPACE.to_string(), name.to_string()));
    }

    pub fn fail_next_delete_of(&self, kind: ResourceKind) {
        *self.fail_delete_of.lock().unwrap() = Some(kind);
    }

    pub fn deleted_collections(&self) -> Vec<String> {
        self.deleted_collections.lock().unwrap().clone()
    }
}

fn matches_selector(doc: &ResourceDocument, selector: &str) -> bool {
    selector
        .split(',')
        .filter(|s| !s.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => doc.labels.get(k).map(String::as_str) == Some(v),
            None => doc.labels.contains_key(term),
        })
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn create(&self, namespace: &str, doc: &ResourceDocument) -> Result<()> {
        let key = (doc.kind, namespace.to_string(), doc.name.clone());
        let mut docs = self.docs.lock().unwrap();
        if docs.contains_key(&key) {
            return Err(Error::already_exists(doc.kind.kind(), doc.name.clone()));
        }
        let mut stored = doc.clone();
        stored.namespace = namespace.to_string();
        docs.insert(key, stored);
        Ok(())
    }

    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<ResourceDocument> {
        self.docs
            .lock()
            .unwrap()
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| Error::not_found(kind.kind(), name))
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<ResourceDocument>> {
        Ok(self
            .docs
            .lock()
            .unwrap()
            .iter()
            .filter(|((k, ns, _), doc)| {
                *k == kind && ns == namespace && matches_selector(doc, label_selector)
            })
            .map(|(_, doc)| doc.clone())
            .collect())
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<()> {
        {
            let mut fail = self.fail_delete_of.lock().unwrap();
            if *fail == Some(kind) {
                *fail = None;
                return Err(Error::internal_with_context("memory_store", "injected failure"));
            }
        }
        self.docs
            .lock()
            .unwrap()
            .remove(&(kind, namespace.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| Error::not_found(kind.kind(), name))
    }

    async fn delete_collection(
        &self,
        kind: ResourceKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<()> {
        self.deleted_collections
            .lock()
            .unwrap()
            .push(label_selector.to_string());
        self.docs.lock().unwrap().retain(|(k, ns, _), doc| {
            !(*k == kind && ns == namespace && matches_selector(doc, label_selector))
        });
        Ok(())
    }
}

/// Probe answering every instance with the same pod status
#[derive(Default)]
pub struct StaticProbe {
    pub pod: Option<PodStatus>,
}

impl StaticProbe {
    pub fn running() -> Self {
        Self {
            pod: Some(PodStatus {
                phase: Some("Running".to_string()),
                ..Default::default()
            }),
        }
    }
}

#[async_trait]
impl SessionProbe for StaticProbe {
    async fn kubeconfig(&self, _namespace: &str, instance: &str) -> Result<Vec<u8>> {
        Ok(format!("current-context: {}\n", instance).into_bytes())
    }

    async fn session_pod_status(
        &self,
        _namespace: &str,
        _instance: &str,
    ) -> Result<Option<PodStatus>> {
        Ok(self.pod.clone())
    }
}

pub fn manager(store: Arc<MemoryStore>, probe: StaticProbe) -> InstanceManager {
    manager_with_config(store, probe, ManagerConfig::for_namespace(NAMESPACE))
}

pub fn manager_with_config(
    store: Arc<MemoryStore>,
    probe: StaticProbe,
    config: ManagerConfig,
) -> InstanceManager {
    InstanceManager::new(store, Arc::new(probe), config).expect("manager should build")
}
