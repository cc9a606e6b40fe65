//! [`ResourceClient`] over a fixed in-process object set.
//!
//! Used by the functional tests and by anything that needs to run the
//! validator or the sidecar composer without an API server. Operations can
//! be made to fail, secret writes are counted and patched statuses are kept.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Secret};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;

use super::ResourceClient;
use crate::controller::error::{Error, Result, not_found};
use crate::crd::ElasticsearchStatus;

/// Client operations, for failure injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClientOp {
    GetSecret,
    ApplySecret,
    GetStatefulSet,
    GetStorageClass,
    ListStorageClasses,
    ListPvcs,
    PatchStatus,
}

type Key = (String, String);

#[derive(Default)]
struct State {
    secrets: BTreeMap<Key, Secret>,
    stateful_sets: BTreeMap<Key, StatefulSet>,
    storage_classes: BTreeMap<String, StorageClass>,
    pvcs: BTreeMap<Key, PersistentVolumeClaim>,
    statuses: BTreeMap<Key, ElasticsearchStatus>,
    failing: BTreeSet<ClientOp>,
    secret_writes: usize,
}

/// In-memory object store.
#[derive(Default)]
pub struct InMemoryClient {
    state: Mutex<State>,
}

fn key_of<K: ResourceExt>(obj: &K) -> Key {
    (obj.namespace().unwrap_or_default(), obj.name_any())
}

/// Match an equality-based selector such as `a=b,c=d`.
fn matches_selector(labels: &BTreeMap<String, String>, selector: &str) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k.trim()).is_some_and(|l| l == v.trim()),
            None => labels.contains_key(term),
        })
}

impl InMemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_secret(self, secret: Secret) -> Self {
        self.insert_secret(secret);
        self
    }

    pub fn with_stateful_set(self, sts: StatefulSet) -> Self {
        self.insert_stateful_set(sts);
        self
    }

    pub fn with_storage_class(self, class: StorageClass) -> Self {
        self.insert_storage_class(class);
        self
    }

    pub fn with_pvc(self, pvc: PersistentVolumeClaim) -> Self {
        self.insert_pvc(pvc);
        self
    }

    /// Make `op` fail with a server error until cleared.
    pub fn failing(self, op: ClientOp) -> Self {
        self.set_failing(op, true);
        self
    }

    pub fn insert_secret(&self, secret: Secret) {
        self.state().secrets.insert(key_of(&secret), secret);
    }

    pub fn insert_stateful_set(&self, sts: StatefulSet) {
        self.state().stateful_sets.insert(key_of(&sts), sts);
    }

    pub fn insert_storage_class(&self, class: StorageClass) {
        self.state()
            .storage_classes
            .insert(class.name_any(), class);
    }

    pub fn insert_pvc(&self, pvc: PersistentVolumeClaim) {
        self.state().pvcs.insert(key_of(&pvc), pvc);
    }

    pub fn set_failing(&self, op: ClientOp, failing: bool) {
        let mut state = self.state();
        if failing {
            state.failing.insert(op);
        } else {
            state.failing.remove(&op);
        }
    }

    /// Stored secret, without going through the client interface.
    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.state()
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Last status patched for an Elasticsearch resource.
    pub fn elasticsearch_status(&self, namespace: &str, name: &str) -> Option<ElasticsearchStatus> {
        self.state()
            .statuses
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Number of secret writes performed so far.
    pub fn secret_writes(&self) -> usize {
        self.state().secret_writes
    }

    /// Common preamble: honour cancellation and injected failures.
    fn begin(&self, op: ClientOp, cancel: &CancellationToken) -> Result<MutexGuard<'_, State>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let state = self.state();
        if state.failing.contains(&op) {
            return Err(Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
                status: "Failure".to_string(),
                message: format!("injected failure for {op:?}"),
                reason: "InternalError".to_string(),
                code: 500,
            })));
        }
        Ok(state)
    }
}

#[async_trait]
impl ResourceClient for InMemoryClient {
    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Secret> {
        let state = self.begin(ClientOp::GetSecret, cancel)?;
        state
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| not_found("secrets", name))
    }

    async fn apply_secret(&self, secret: &Secret, cancel: &CancellationToken) -> Result<Secret> {
        let mut state = self.begin(ClientOp::ApplySecret, cancel)?;
        state.secret_writes += 1;
        state.secrets.insert(key_of(secret), secret.clone());
        Ok(secret.clone())
    }

    async fn get_stateful_set(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<StatefulSet> {
        let state = self.begin(ClientOp::GetStatefulSet, cancel)?;
        state
            .stateful_sets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| not_found("statefulsets.apps", name))
    }

    async fn get_storage_class(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<StorageClass> {
        let state = self.begin(ClientOp::GetStorageClass, cancel)?;
        state
            .storage_classes
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("storageclasses.storage.k8s.io", name))
    }

    async fn list_storage_classes(&self, cancel: &CancellationToken) -> Result<Vec<StorageClass>> {
        let state = self.begin(ClientOp::ListStorageClasses, cancel)?;
        Ok(state.storage_classes.values().cloned().collect())
    }

    async fn list_pvcs(
        &self,
        namespace: &str,
        label_selector: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<PersistentVolumeClaim>> {
        let state = self.begin(ClientOp::ListPvcs, cancel)?;
        Ok(state
            .pvcs
            .iter()
            .filter(|((ns, _), pvc)| ns == namespace && matches_selector(pvc.labels(), label_selector))
            .map(|(_, pvc)| pvc.clone())
            .collect())
    }

    async fn patch_elasticsearch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ElasticsearchStatus,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut state = self.begin(ClientOp::PatchStatus, cancel)?;
        state
            .statuses
            .insert((namespace.to_string(), name.to_string()), status.clone());
        Ok(())
    }
}
