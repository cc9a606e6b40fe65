//! Resolved references from a cluster to its monitoring targets.
//!
//! The association controller writes one annotation per referenced cluster
//! on the Elasticsearch resource. The value is the JSON form of
//! [`AssociationConf`].

use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{Elasticsearch, ObjectSelector};

/// Prefix of the association configuration annotations.
pub const ASSOCIATION_CONF_ANNOTATION_PREFIX: &str = "association.k8s.elastic.co/es-conf";

const ANNOTATION_GROUP: &str = "association.k8s.elastic.co";

/// Longest allowed name part of an annotation key.
const MAX_ANNOTATION_NAME_LENGTH: usize = 63;

/// Connection coordinates of a monitoring target.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationConf {
    #[serde(default)]
    pub auth_secret_name: String,
    #[serde(default)]
    pub auth_secret_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_secret_name: Option<String>,
    #[serde(default)]
    pub ca_cert_provided: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub version: String,
}

impl AssociationConf {
    /// A configuration is usable once the URL and credentials are known.
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty() && !self.auth_secret_name.is_empty()
    }
}

/// Annotation key holding the association configuration for `namespace/name`.
pub fn association_conf_annotation(namespace: &str, name: &str) -> String {
    let name_part = format!("es-conf-{namespace}.{name}");
    if name_part.len() <= MAX_ANNOTATION_NAME_LENGTH {
        return format!("{ANNOTATION_GROUP}/{name_part}");
    }
    // annotation names are bounded, fall back to a digest of the reference
    let digest = Sha256::digest(format!("{namespace}.{name}").as_bytes());
    let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    format!("{ASSOCIATION_CONF_ANNOTATION_PREFIX}-{hex}")
}

impl Elasticsearch {
    /// Association configuration for `target`, if the annotation is present.
    pub fn association_conf(
        &self,
        target: &ObjectSelector,
    ) -> Result<Option<AssociationConf>, serde_json::Error> {
        let namespace = self.namespace().unwrap_or_default();
        let name = if target.name.is_empty() {
            target.secret_name.as_deref().unwrap_or_default()
        } else {
            target.name.as_str()
        };
        let key = association_conf_annotation(target.namespace_or(&namespace), name);
        self.annotation(&key)
            .map(serde_json::from_str::<AssociationConf>)
            .transpose()
    }
}
