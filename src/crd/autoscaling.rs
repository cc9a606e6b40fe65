//! Autoscaling policies carried by the autoscaling annotation.
//!
//! ```json
//! {"policies": [{
//!   "name": "data-ingest",
//!   "roles": ["data", "ingest"],
//!   "resources": {
//!     "nodeCount": {"min": 3, "max": 8},
//!     "cpu": {"min": 2, "max": 8},
//!     "memory": {"min": "2Gi", "max": "16Gi"},
//!     "storage": {"min": "64Gi", "max": "512Gi"}
//!   }
//! }]}
//! ```

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use super::Elasticsearch;

/// Set of autoscaling policies.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalingSpec {
    #[serde(default)]
    pub policies: Vec<AutoscalingPolicySpec>,
}

impl AutoscalingSpec {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// One named policy, applied to the node sets with exactly these roles.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalingPolicySpec {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    #[serde(default)]
    pub resources: AutoscalingResources,
}

impl AutoscalingPolicySpec {
    /// Sorted, de-duplicated roles of the policy.
    pub fn role_set(&self) -> Vec<String> {
        let mut roles = self.roles.clone().unwrap_or_default();
        roles.sort();
        roles.dedup();
        roles
    }
}

/// Resource boundaries of a policy.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalingResources {
    #[serde(default)]
    pub node_count: CountRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<QuantityRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<QuantityRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<QuantityRange>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CountRange {
    #[serde(default)]
    pub min: i32,
    #[serde(default)]
    pub max: i32,
}

/// A `[min, max]` quantity range. Bounds may be written as numbers or strings.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct QuantityRange {
    #[serde(deserialize_with = "quantity_from_any")]
    pub min: Quantity,
    #[serde(deserialize_with = "quantity_from_any")]
    pub max: Quantity,
}

fn quantity_from_any<'de, D>(deserializer: D) -> Result<Quantity, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(Quantity(s)),
        serde_json::Value::Number(n) => Ok(Quantity(n.to_string())),
        other => Err(D::Error::custom(format!("invalid quantity: {other}"))),
    }
}

impl Elasticsearch {
    /// Parsed autoscaling policies, if the annotation is set.
    pub fn autoscaling_spec(&self) -> Option<Result<AutoscalingSpec, serde_json::Error>> {
        self.autoscaling_annotation()
            .filter(|raw| !raw.trim().is_empty())
            .map(AutoscalingSpec::parse)
    }
}
