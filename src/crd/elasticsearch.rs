//! Elasticsearch Custom Resource Definition.
//!
//! Mirrors the user-facing `elasticsearch.k8s.elastic.co/v1` resource: a
//! version, HTTP TLS options, node sets and optional stack monitoring
//! references. Node set `config` blocks are free-form and only interpreted
//! through [`crate::settings`].

use k8s_openapi::api::core::v1::{PersistentVolumeClaim, PodTemplateSpec};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::settings::{CanonicalConfig, NodeSettings, SettingsError};

/// Annotation disabling the no-downgrade rule.
pub const DISABLE_DOWNGRADE_VALIDATION_ANNOTATION: &str =
    "eck.k8s.elastic.co/disable-downgrade-validation";

/// Annotation listing the Kubernetes node labels to expose to the pods.
pub const DOWNWARD_NODE_LABELS_ANNOTATION: &str = "eck.k8s.elastic.co/downward-node-labels";

/// Annotation carrying the autoscaling policies.
pub const AUTOSCALING_ANNOTATION: &str = "elasticsearch.alpha.elastic.co/autoscaling-spec";

/// Annotation written by `kubectl apply`.
pub const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// Name of the default data volume claim.
pub const DEFAULT_DATA_VOLUME_NAME: &str = "elasticsearch-data";

/// Elasticsearch is a custom resource describing an Elasticsearch cluster.
///
/// Example:
/// ```yaml
/// apiVersion: elasticsearch.k8s.elastic.co/v1
/// kind: Elasticsearch
/// metadata:
///   name: quickstart
/// spec:
///   version: 8.12.0
///   nodeSets:
///   - name: default
///     count: 3
///     config:
///       node.roles: ["master", "data"]
///   monitoring:
///     metrics:
///       elasticsearchRefs:
///       - name: monitoring
///         namespace: observability
/// ```
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "elasticsearch.k8s.elastic.co",
    version = "v1",
    kind = "Elasticsearch",
    plural = "elasticsearches",
    shortname = "es",
    status = "ElasticsearchStatus",
    namespaced,
    derive = "PartialEq",
    derive = "Default",
    printcolumn = r#"{"name":"Health", "type":"string", "jsonPath":".status.health"}"#,
    printcolumn = r#"{"name":"Nodes", "type":"integer", "jsonPath":".status.availableNodes"}"#,
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".status.version"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ElasticsearchSpec {
    /// Elasticsearch version, `{major}.{minor}.{patch}[-{label}]`.
    #[serde(default)]
    pub version: String,

    /// Custom Elasticsearch image. Defaults to the official image for `version`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// HTTP layer settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// What happens to volume claims on scale down and cluster deletion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_claim_delete_policy: Option<VolumeClaimDeletePolicy>,

    /// Groups of nodes sharing the same configuration.
    #[serde(default)]
    pub node_sets: Vec<NodeSet>,

    /// Stack monitoring references.
    #[serde(default)]
    pub monitoring: Monitoring,
}

/// A homogeneous group of Elasticsearch nodes, backed by one StatefulSet.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeSet {
    /// Name of the node set, unique within the cluster.
    pub name: String,

    /// Number of nodes.
    #[serde(default)]
    #[schemars(range(min = 0))]
    pub count: i32,

    /// Elasticsearch settings (`elasticsearch.yml`) for this node set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Config>,

    /// Pod template merged with the operator defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_template: Option<PodTemplateSpec>,

    /// Volume claim templates of the StatefulSet.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_claim_templates: Vec<PersistentVolumeClaim>,
}

impl NodeSet {
    /// Canonical form of the node set configuration. No config is an empty one.
    pub fn canonical_config(&self) -> Result<CanonicalConfig, SettingsError> {
        match &self.config {
            Some(Config(value)) => CanonicalConfig::from_json(value),
            None => Ok(CanonicalConfig::default()),
        }
    }

    /// Role-related settings of the node set.
    pub fn node_settings(&self) -> Result<NodeSettings, SettingsError> {
        NodeSettings::from_config(&self.canonical_config()?)
    }
}

/// Free-form Elasticsearch settings.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Config(pub serde_json::Value);

impl JsonSchema for Config {
    fn schema_name() -> String {
        "Config".to_string()
    }

    fn json_schema(_: &mut schemars::r#gen::SchemaGenerator) -> schemars::schema::Schema {
        let mut schema = schemars::schema::SchemaObject {
            instance_type: Some(schemars::schema::InstanceType::Object.into()),
            ..Default::default()
        };
        schema.extensions.insert(
            "x-kubernetes-preserve-unknown-fields".to_string(),
            serde_json::Value::Bool(true),
        );
        schemars::schema::Schema::Object(schema)
    }
}

/// HTTP layer settings.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    #[serde(default)]
    pub tls: TlsOptions,
}

impl HttpConfig {
    /// TLS is on unless the self-signed certificate is disabled and no
    /// custom certificate is provided.
    pub fn tls_enabled(&self) -> bool {
        let self_signed_disabled = self
            .tls
            .self_signed_certificate
            .as_ref()
            .is_some_and(|c| c.disabled);
        !self_signed_disabled || self.tls.certificate.is_some()
    }

    pub fn scheme(&self) -> &'static str {
        if self.tls_enabled() { "https" } else { "http" }
    }
}

/// TLS options of the HTTP layer.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TlsOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_signed_certificate: Option<SelfSignedCertificate>,

    /// User-provided certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<SecretRef>,
}

/// Settings of the operator-generated certificate.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelfSignedCertificate {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subject_alt_names: Vec<SubjectAlternativeName>,

    #[serde(default)]
    pub disabled: bool,
}

/// A subject alternative name entry.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAlternativeName {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

/// Reference to a secret in the same namespace.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    pub secret_name: String,
}

/// Volume claim lifecycle.
///
/// `Retain` leaves claims without owner reference so they survive the
/// cluster. Both removal policies set the cluster as owner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum VolumeClaimDeletePolicy {
    Retain,
    #[serde(rename = "DeleteOnScaledownOnly", alias = "RemoveOnScaleDown")]
    RemoveOnScaleDown,
    #[default]
    #[serde(
        rename = "DeleteOnScaledownAndClusterDeletion",
        alias = "RemoveOnClusterDeletion"
    )]
    RemoveOnClusterDeletion,
}

impl VolumeClaimDeletePolicy {
    /// Whether claims created under this policy carry a cluster owner reference.
    pub fn owns_claims(&self) -> bool {
        !matches!(self, VolumeClaimDeletePolicy::Retain)
    }
}

impl std::fmt::Display for VolumeClaimDeletePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolumeClaimDeletePolicy::Retain => write!(f, "Retain"),
            VolumeClaimDeletePolicy::RemoveOnScaleDown => write!(f, "DeleteOnScaledownOnly"),
            VolumeClaimDeletePolicy::RemoveOnClusterDeletion => {
                write!(f, "DeleteOnScaledownAndClusterDeletion")
            }
        }
    }
}

/// Stack monitoring configuration.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Monitoring {
    /// Where to ship metrics.
    #[serde(default)]
    pub metrics: MonitoringRefs,
    /// Where to ship logs.
    #[serde(default)]
    pub logs: MonitoringRefs,
}

/// Monitoring cluster references for one concern.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringRefs {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elasticsearch_refs: Vec<ObjectSelector>,
}

impl MonitoringRefs {
    /// The single target when exactly one non-empty reference is set.
    pub fn single_target(&self) -> Option<&ObjectSelector> {
        match self.elasticsearch_refs.as_slice() {
            [only] if only.is_defined() => Some(only),
            _ => None,
        }
    }
}

/// Reference to another resource, optionally in another namespace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSelector {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    /// Secret describing an unmanaged cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}

impl ObjectSelector {
    /// A selector is defined if it names a resource or a connection secret.
    pub fn is_defined(&self) -> bool {
        !self.name.is_empty() || self.secret_name.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Namespace of the target, defaulting to `default_ns`.
    pub fn namespace_or<'a>(&'a self, default_ns: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(default_ns)
    }
}

/// Status of the Elasticsearch cluster.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ElasticsearchStatus {
    #[serde(default)]
    pub phase: ElasticsearchPhase,
    #[serde(default)]
    pub health: ElasticsearchHealth,
    #[serde(default)]
    pub available_nodes: i32,
    /// Lowest version currently running in the cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Orchestration phase.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ElasticsearchPhase {
    /// Nothing observed yet.
    #[default]
    Pending,
    /// The cluster matches its specification.
    Ready,
    /// Changes are being applied.
    ApplyingChanges,
    /// Data is migrated away from nodes about to be removed.
    MigratingData,
    /// The operator cannot make progress.
    Stalled,
    /// The specification failed validation.
    Invalid,
}

impl std::fmt::Display for ElasticsearchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElasticsearchPhase::Pending => write!(f, "Pending"),
            ElasticsearchPhase::Ready => write!(f, "Ready"),
            ElasticsearchPhase::ApplyingChanges => write!(f, "ApplyingChanges"),
            ElasticsearchPhase::MigratingData => write!(f, "MigratingData"),
            ElasticsearchPhase::Stalled => write!(f, "Stalled"),
            ElasticsearchPhase::Invalid => write!(f, "Invalid"),
        }
    }
}

/// Cluster health as reported by Elasticsearch.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ElasticsearchHealth {
    #[default]
    Unknown,
    Red,
    Yellow,
    Green,
}

/// Condition describes the state of a cluster at a certain point.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition.
    pub r#type: String,
    /// Status of the condition ("True", "False", "Unknown").
    pub status: String,
    /// Machine-readable reason for the condition's last transition.
    pub reason: String,
    /// Human-readable message indicating details about last transition.
    pub message: String,
    /// Last time the condition transitioned from one status to another.
    pub last_transition_time: String,
    /// The generation of the resource this condition was observed for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    /// Create a new condition.
    pub fn new(
        condition_type: &str,
        status: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> Self {
        Self {
            r#type: condition_type.to_string(),
            status: if status {
                "True".to_string()
            } else {
                "False".to_string()
            },
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time: jiff::Timestamp::now().to_string(),
            observed_generation: generation,
        }
    }

    /// Create a "ReconciliationComplete" condition.
    pub fn reconciliation_complete(
        complete: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> Self {
        Self::new("ReconciliationComplete", complete, reason, message, generation)
    }
}

impl Elasticsearch {
    /// Value of an annotation, if set.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations().get(key).map(String::as_str)
    }

    /// Whether the user opted out of the no-downgrade rule.
    pub fn is_downgrade_validation_disabled(&self) -> bool {
        self.annotation(DISABLE_DOWNGRADE_VALIDATION_ANNOTATION) == Some("true")
    }

    /// Node labels requested through the downward node labels annotation.
    pub fn downward_node_labels(&self) -> Vec<String> {
        self.annotation(DOWNWARD_NODE_LABELS_ANNOTATION)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|label| !label.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Raw autoscaling policies annotation.
    pub fn autoscaling_annotation(&self) -> Option<&str> {
        self.annotation(AUTOSCALING_ANNOTATION)
    }

    /// Whether autoscaling policies are attached to this cluster.
    pub fn is_autoscaling_defined(&self) -> bool {
        self.autoscaling_annotation().is_some_and(|a| !a.trim().is_empty())
    }

    /// Effective volume claim delete policy.
    pub fn delete_policy(&self) -> VolumeClaimDeletePolicy {
        self.spec.volume_claim_delete_policy.unwrap_or_default()
    }

    /// Whether any monitoring reference is declared.
    pub fn is_monitoring_defined(&self) -> bool {
        !self.spec.monitoring.metrics.elasticsearch_refs.is_empty()
            || !self.spec.monitoring.logs.elasticsearch_refs.is_empty()
    }

    /// Metrics shipping is on when exactly one metrics target is set.
    pub fn is_metrics_enabled(&self) -> bool {
        self.spec.monitoring.metrics.single_target().is_some()
    }

    /// Log shipping is on when exactly one logs target is set.
    pub fn is_logs_enabled(&self) -> bool {
        self.spec.monitoring.logs.single_target().is_some()
    }

    /// Version running in the cluster if known, else the desired one.
    pub fn current_version(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|s| s.version.as_deref())
            .filter(|v| !v.is_empty())
            .unwrap_or(&self.spec.version)
    }
}
