//! Test fixtures and builder patterns for Elasticsearch resources.

use std::collections::BTreeMap;

use k8s_openapi::ByteString;
use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, Secret, VolumeResourceRequirements,
};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use es_operator::client::InMemoryClient;
use es_operator::crd::{
    AssociationConf, Config, Elasticsearch, ElasticsearchSpec, ElasticsearchStatus, NodeSet,
    ObjectSelector, SelfSignedCertificate, VolumeClaimDeletePolicy, association_conf_annotation,
};

/// Namespace of the monitoring clusters referenced by the fixtures.
pub const MONITORING_NAMESPACE: &str = "observability";

/// Builder for creating Elasticsearch test fixtures.
///
/// # Example
/// ```ignore
/// let es = ElasticsearchBuilder::new("es")
///     .version("8.1.0")
///     .node_set(node_set("master", 3, json!({"node.roles": ["master"]})))
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct ElasticsearchBuilder {
    name: String,
    namespace: String,
    version: Option<String>,
    image: Option<String>,
    node_sets: Vec<NodeSet>,
    annotations: BTreeMap<String, String>,
    delete_policy: Option<VolumeClaimDeletePolicy>,
    tls_disabled: bool,
    metrics_ref: Option<ObjectSelector>,
    logs_ref: Option<ObjectSelector>,
    generation: Option<i64>,
    uid: Option<String>,
    status_version: Option<String>,
}

impl ElasticsearchBuilder {
    /// Create a new builder with the given resource name, in `default`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: "default".to_string(),
            version: Some("8.1.0".to_string()),
            image: None,
            node_sets: Vec::new(),
            annotations: BTreeMap::new(),
            delete_policy: None,
            tls_disabled: false,
            metrics_ref: None,
            logs_ref: None,
            generation: None,
            uid: None,
            status_version: None,
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Leave `spec.version` empty.
    pub fn without_version(mut self) -> Self {
        self.version = None;
        self
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn node_set(mut self, node_set: NodeSet) -> Self {
        self.node_sets.push(node_set);
        self
    }

    pub fn annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn delete_policy(mut self, policy: VolumeClaimDeletePolicy) -> Self {
        self.delete_policy = Some(policy);
        self
    }

    /// Serve plain HTTP.
    pub fn tls_disabled(mut self) -> Self {
        self.tls_disabled = true;
        self
    }

    /// Ship metrics to `observability/<target>`, with a resolved association.
    pub fn metrics_to(mut self, target: &str) -> Self {
        self.metrics_ref = Some(monitoring_selector(target));
        self.annotations.insert(
            association_conf_annotation(MONITORING_NAMESPACE, target),
            association_conf_json("metrics"),
        );
        self
    }

    /// Ship logs to `observability/<target>`, with a resolved association.
    pub fn logs_to(mut self, target: &str) -> Self {
        self.logs_ref = Some(monitoring_selector(target));
        self.annotations.insert(
            association_conf_annotation(MONITORING_NAMESPACE, target),
            association_conf_json("logs"),
        );
        self
    }

    /// Reference a metrics target the association controller did not resolve yet.
    pub fn unresolved_metrics_to(mut self, target: &str) -> Self {
        self.metrics_ref = Some(monitoring_selector(target));
        self
    }

    pub fn generation(mut self, generation: i64) -> Self {
        self.generation = Some(generation);
        self
    }

    pub fn uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    /// Version reported as running in the status.
    pub fn status_version(mut self, version: impl Into<String>) -> Self {
        self.status_version = Some(version.into());
        self
    }

    pub fn build(self) -> Elasticsearch {
        let mut spec = ElasticsearchSpec {
            version: self.version.unwrap_or_default(),
            image: self.image,
            volume_claim_delete_policy: self.delete_policy,
            node_sets: self.node_sets,
            ..Default::default()
        };
        if self.tls_disabled {
            spec.http.tls.self_signed_certificate = Some(SelfSignedCertificate {
                disabled: true,
                ..Default::default()
            });
        }
        if let Some(selector) = self.metrics_ref {
            spec.monitoring.metrics.elasticsearch_refs = vec![selector];
        }
        if let Some(selector) = self.logs_ref {
            spec.monitoring.logs.elasticsearch_refs = vec![selector];
        }
        Elasticsearch {
            metadata: ObjectMeta {
                name: Some(self.name),
                namespace: Some(self.namespace),
                annotations: if self.annotations.is_empty() {
                    None
                } else {
                    Some(self.annotations)
                },
                generation: self.generation,
                uid: self.uid,
                ..Default::default()
            },
            spec,
            status: self.status_version.map(|version| ElasticsearchStatus {
                version: Some(version),
                ..Default::default()
            }),
        }
    }
}

impl Default for ElasticsearchBuilder {
    fn default() -> Self {
        Self::new("es")
    }
}

fn monitoring_selector(target: &str) -> ObjectSelector {
    ObjectSelector {
        name: target.to_string(),
        namespace: Some(MONITORING_NAMESPACE.to_string()),
        ..Default::default()
    }
}

/// Association configuration of the `concern` monitoring target of cluster `default/es`.
pub fn association_conf(concern: &str) -> AssociationConf {
    AssociationConf {
        auth_secret_name: format!("es-{concern}-beat-user"),
        auth_secret_key: format!("default-es-{concern}-beat-user"),
        ca_secret_name: Some(format!("es-{concern}-monitoring-ca")),
        ca_cert_provided: true,
        url: format!("https://{concern}-es-http.{MONITORING_NAMESPACE}.svc:9200"),
        version: "8.1.0".to_string(),
    }
}

fn association_conf_json(concern: &str) -> String {
    serde_json::to_string(&association_conf(concern)).unwrap_or_default()
}

/// A node set with the given `elasticsearch.yml` settings; `null` means none.
pub fn node_set(name: &str, count: i32, config: serde_json::Value) -> NodeSet {
    NodeSet {
        name: name.to_string(),
        count,
        config: if config.is_null() {
            None
        } else {
            Some(Config(config))
        },
        ..Default::default()
    }
}

/// A node set holding both the master and the data role.
pub fn master_data_node_set(name: &str, count: i32) -> NodeSet {
    node_set(
        name,
        count,
        serde_json::json!({"node.roles": ["master", "data"]}),
    )
}

/// Minimal valid cluster `default/es`: one master and data node set.
pub fn valid_cluster(version: &str) -> Elasticsearch {
    ElasticsearchBuilder::new("es")
        .version(version)
        .node_set(master_data_node_set("m", 3))
        .build()
}

/// A secret in `default` with string data.
pub fn secret(name: &str, data: &[(&str, &str)]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        data: Some(
            data.iter()
                .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                .collect(),
        ),
        ..Default::default()
    }
}

/// Client holding every secret the sidecars of cluster `default/es` read.
pub fn monitoring_client(password: &str) -> InMemoryClient {
    InMemoryClient::new()
        .with_secret(secret(
            "es-es-internal-users",
            &[("elastic-internal-monitoring", password)],
        ))
        .with_secret(secret(
            "es-es-http-certs-public",
            &[("ca.crt", "source-ca"), ("tls.crt", "cert")],
        ))
        .with_secret(secret(
            "es-metrics-beat-user",
            &[("default-es-metrics-beat-user", "metrics-password")],
        ))
        .with_secret(secret("es-metrics-monitoring-ca", &[("ca.crt", "metrics-ca")]))
        .with_secret(secret(
            "es-logs-beat-user",
            &[("default-es-logs-beat-user", "logs-password")],
        ))
        .with_secret(secret("es-logs-monitoring-ca", &[("ca.crt", "logs-ca")]))
}

/// A volume claim template requesting `storage`.
pub fn claim(name: &str, storage: &str, class: Option<&str>) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: class.map(str::to_string),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(storage.to_string()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// A StatefulSet in `default` with the given claim templates.
pub fn stateful_set(name: &str, claims: Vec<PersistentVolumeClaim>) -> StatefulSet {
    StatefulSet {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            volume_claim_templates: Some(claims),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// A storage class, optionally marked as the cluster default.
pub fn storage_class(name: &str, expandable: bool, default: bool) -> StorageClass {
    let annotations = default.then(|| {
        BTreeMap::from([(
            "storageclass.kubernetes.io/is-default-class".to_string(),
            "true".to_string(),
        )])
    });
    StorageClass {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            annotations,
            ..Default::default()
        },
        allow_volume_expansion: Some(expandable),
        provisioner: "csi.example.com".to_string(),
        ..Default::default()
    }
}

/// Cluster `default/es` with one node set `m` whose data claim requests `storage`.
pub fn cluster_with_storage(version: &str, storage: &str) -> Elasticsearch {
    let mut node_set = master_data_node_set("m", 3);
    node_set.volume_claim_templates = vec![claim("elasticsearch-data", storage, Some("standard"))];
    ElasticsearchBuilder::new("es")
        .version(version)
        .node_set(node_set)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let es = ElasticsearchBuilder::new("test").build();
        assert_eq!(es.metadata.name, Some("test".to_string()));
        assert_eq!(es.metadata.namespace, Some("default".to_string()));
        assert_eq!(es.spec.version, "8.1.0");
        assert!(es.metadata.annotations.is_none());
    }

    #[test]
    fn test_builder_monitoring() {
        let es = ElasticsearchBuilder::new("es").metrics_to("metrics").build();
        assert!(es.is_metrics_enabled());
        assert!(!es.is_logs_enabled());
        let selector = es.spec.monitoring.metrics.single_target().cloned().unwrap_or_default();
        assert_eq!(es.association_conf(&selector).ok().flatten(), Some(association_conf("metrics")));
    }
}
