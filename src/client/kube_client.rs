//! [`ResourceClient`] backed by the Kubernetes API server.

use std::future::Future;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Secret};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::ResourceClient;
use crate::controller::context::FIELD_MANAGER;
use crate::controller::error::{Error, Result};
use crate::crd::{Elasticsearch, ElasticsearchStatus};

/// API server client.
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
}

impl KubeClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }
}

/// Race a request against the cancellation token.
async fn cancellable<T, F>(cancel: &CancellationToken, request: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, kube::Error>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = request => result.map_err(Error::from),
    }
}

#[async_trait]
impl ResourceClient for KubeClient {
    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Secret> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        cancellable(cancel, api.get(name)).await
    }

    async fn apply_secret(&self, secret: &Secret, cancel: &CancellationToken) -> Result<Secret> {
        let namespace = secret
            .namespace()
            .ok_or_else(|| Error::MissingField("secret.metadata.namespace".to_string()))?;
        let name = secret
            .metadata
            .name
            .clone()
            .ok_or_else(|| Error::MissingField("secret.metadata.name".to_string()))?;
        debug!(namespace = %namespace, name = %name, "Applying secret");

        let api: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        cancellable(
            cancel,
            api.patch(
                &name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(secret),
            ),
        )
        .await
    }

    async fn get_stateful_set(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<StatefulSet> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        cancellable(cancel, api.get(name)).await
    }

    async fn get_storage_class(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<StorageClass> {
        let api: Api<StorageClass> = Api::all(self.client.clone());
        cancellable(cancel, api.get(name)).await
    }

    async fn list_storage_classes(&self, cancel: &CancellationToken) -> Result<Vec<StorageClass>> {
        let api: Api<StorageClass> = Api::all(self.client.clone());
        let list = cancellable(cancel, api.list(&ListParams::default())).await?;
        Ok(list.items)
    }

    async fn list_pvcs(
        &self,
        namespace: &str,
        label_selector: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<PersistentVolumeClaim>> {
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(label_selector);
        let list = cancellable(cancel, api.list(&params)).await?;
        Ok(list.items)
    }

    async fn patch_elasticsearch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ElasticsearchStatus,
        cancel: &CancellationToken,
    ) -> Result<()> {
        debug!(namespace = %namespace, name = %name, phase = ?status.phase, "Patching Elasticsearch status");
        let api: Api<Elasticsearch> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({ "status": status });
        cancellable(
            cancel,
            api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch)),
        )
        .await?;
        Ok(())
    }
}
