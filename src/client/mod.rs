//! Access to the Kubernetes objects the operator core reads and writes.
//!
//! Validation and sidecar composition only need a handful of typed
//! resources. They reach them through [`ResourceClient`] so that the same
//! code runs against the API server ([`KubeClient`]) and against a fixed
//! in-process state ([`InMemoryClient`]).
//!
//! Every call takes a [`CancellationToken`] and returns
//! [`Error::Cancelled`](crate::controller::error::Error::Cancelled) once it
//! fires. Absent objects are reported as 404 API errors, so callers classify
//! them with [`Error::is_not_found`](crate::controller::error::Error::is_not_found).

mod in_memory;
mod kube_client;

pub use in_memory::{ClientOp, InMemoryClient};
pub use kube_client::KubeClient;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Secret};
use k8s_openapi::api::storage::v1::StorageClass;
use tokio_util::sync::CancellationToken;

use crate::controller::error::Result;
use crate::crd::ElasticsearchStatus;

/// Typed reads and writes of the cluster resources used by the core.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Fetch a secret.
    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Secret>;

    /// Create or update a secret (server-side apply).
    async fn apply_secret(&self, secret: &Secret, cancel: &CancellationToken) -> Result<Secret>;

    /// Fetch a stateful set.
    async fn get_stateful_set(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<StatefulSet>;

    /// Fetch a storage class (cluster scoped).
    async fn get_storage_class(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<StorageClass>;

    /// List all storage classes.
    async fn list_storage_classes(&self, cancel: &CancellationToken) -> Result<Vec<StorageClass>>;

    /// List the volume claims of a namespace matching an equality label selector.
    async fn list_pvcs(
        &self,
        namespace: &str,
        label_selector: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<PersistentVolumeClaim>>;

    /// Replace the status subresource of an Elasticsearch resource.
    async fn patch_elasticsearch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ElasticsearchStatus,
        cancel: &CancellationToken,
    ) -> Result<()>;
}
