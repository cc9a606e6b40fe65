//! Common resource generation utilities.
//!
//! Naming conventions, labels and owner references shared by every object
//! the operator derives from an [`Elasticsearch`] resource.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

use crate::crd::Elasticsearch;

/// Label carrying the owning cluster name.
pub const CLUSTER_NAME_LABEL: &str = "elasticsearch.k8s.elastic.co/cluster-name";

/// Label carrying the resource type.
pub const TYPE_LABEL: &str = "common.k8s.elastic.co/type";

/// Name of the field manager and of the `managed-by` label value.
pub const MANAGED_BY: &str = "es-operator";

/// Key of the monitoring user in the internal users secret.
pub const MONITORING_USER: &str = "elastic-internal-monitoring";

/// Key of the CA certificate in certificate secrets.
pub const CA_CERT_KEY: &str = "ca.crt";

/// Standard labels applied to all managed resources
pub fn standard_labels(es: &Elasticsearch) -> BTreeMap<String, String> {
    BTreeMap::from([
        (CLUSTER_NAME_LABEL.to_string(), es.name_any()),
        (TYPE_LABEL.to_string(), "elasticsearch".to_string()),
        (
            "app.kubernetes.io/managed-by".to_string(),
            MANAGED_BY.to_string(),
        ),
    ])
}

/// Label selector matching every object of a cluster.
pub fn cluster_selector(cluster: &str) -> String {
    format!("{CLUSTER_NAME_LABEL}={cluster}")
}

/// Create owner reference for an Elasticsearch cluster
pub fn owner_reference(es: &Elasticsearch) -> OwnerReference {
    OwnerReference {
        api_version: Elasticsearch::api_version(&()).to_string(),
        kind: Elasticsearch::kind(&()).to_string(),
        name: es.name_any(),
        uid: es.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// `<cluster>-es-<nodeSet>`
pub fn stateful_set_name(cluster: &str, node_set: &str) -> String {
    format!("{cluster}-es-{node_set}")
}

/// Secret holding the passwords of the operator's internal users.
pub fn internal_users_secret_name(cluster: &str) -> String {
    format!("{cluster}-es-internal-users")
}

/// Secret holding the public part of the HTTP certificates.
pub fn http_certs_public_secret_name(cluster: &str) -> String {
    format!("{cluster}-es-http-certs-public")
}

/// Secret holding the rendered configuration of a beat sidecar.
pub fn beat_config_secret_name(cluster: &str, beat: &str) -> String {
    format!("{cluster}-es-{beat}-config")
}
