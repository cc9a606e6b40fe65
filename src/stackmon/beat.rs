//! Building blocks shared by the metricbeat and filebeat sidecars.

use std::collections::BTreeMap;

use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{
    Capabilities, Container, EnvVar, EnvVarSource, ResourceRequirements, Secret,
    SecretKeySelector, SecretVolumeSource, SecurityContext, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::client::ResourceClient;
use crate::controller::error::{Error, Result};
use crate::crd::{AssociationConf, Elasticsearch, MonitoringRefs};
use crate::resources::common::{
    CA_CERT_KEY, beat_config_secret_name, owner_reference, standard_labels,
};
use crate::version::{BEATS_NON_ROOT_MIN, Version};

const DEFAULT_IMAGE_REGISTRY: &str = "docker.elastic.co";
const ES_IMAGE_NAME: &str = "elasticsearch/elasticsearch";

/// Sidecar kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Beat {
    Metricbeat,
    Filebeat,
}

impl Beat {
    pub fn name(self) -> &'static str {
        match self {
            Beat::Metricbeat => "metricbeat",
            Beat::Filebeat => "filebeat",
        }
    }

    /// Key of the rendered configuration in the config secret.
    pub fn config_key(self) -> &'static str {
        match self {
            Beat::Metricbeat => "metricbeat.yml",
            Beat::Filebeat => "filebeat.yml",
        }
    }

    /// Directory the config secret is mounted at.
    pub fn config_dir(self) -> &'static str {
        match self {
            Beat::Metricbeat => "/etc/metricbeat-config",
            Beat::Filebeat => "/etc/filebeat-config",
        }
    }

    /// Monitoring concern served by this beat.
    pub fn concern(self) -> &'static str {
        match self {
            Beat::Metricbeat => "metrics",
            Beat::Filebeat => "logs",
        }
    }

    pub fn refs(self, es: &Elasticsearch) -> &MonitoringRefs {
        match self {
            Beat::Metricbeat => &es.spec.monitoring.metrics,
            Beat::Filebeat => &es.spec.monitoring.logs,
        }
    }

    fn config_volume_name(self) -> String {
        format!("{}-config", self.name())
    }

    /// Sidecar image, following a custom Elasticsearch image if one is set.
    pub fn image(self, es: &Elasticsearch) -> Result<String> {
        match es.spec.image.as_deref().filter(|i| !i.is_empty()) {
            None => Ok(format!(
                "{DEFAULT_IMAGE_REGISTRY}/beats/{}:{}",
                self.name(),
                es.spec.version
            )),
            Some(image) if image.contains(ES_IMAGE_NAME) => {
                Ok(image.replace(ES_IMAGE_NAME, &format!("beats/{}", self.name())))
            }
            Some(_) => Err(Error::StackMonitoring(
                "stack monitoring not supported with custom image".to_string(),
            )),
        }
    }
}

impl std::fmt::Display for Beat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A monitoring cluster the beat ships to, with the material read from its secrets.
#[derive(Clone, Debug)]
pub struct Target {
    pub index: usize,
    pub conf: AssociationConf,
    pub password: Vec<u8>,
    pub ca: Option<Vec<u8>>,
}

impl Target {
    /// `/mnt/es/{i}/monitoring/{concern}/target`
    pub fn ca_dir(&self, beat: Beat) -> String {
        format!("/mnt/es/{}/monitoring/{}/target", self.index, beat.concern())
    }

    pub fn ca_path(&self, beat: Beat) -> Option<String> {
        self.ca
            .as_ref()
            .map(|_| format!("{}/{CA_CERT_KEY}", self.ca_dir(beat)))
    }

    fn ca_volume_name(&self, beat: Beat) -> String {
        format!("es-{}-monitoring-{}-target-ca", self.index, beat.concern())
    }

    /// `ES_{i}_TARGET_*` variables. The password comes from the association secret.
    pub fn env(&self) -> Vec<EnvVar> {
        let prefix = format!("ES_{}_TARGET", self.index);
        vec![
            literal_env(&format!("{prefix}_URL"), &self.conf.url),
            literal_env(&format!("{prefix}_USERNAME"), &self.conf.auth_secret_key),
            secret_env(
                &format!("{prefix}_PASSWORD"),
                &self.conf.auth_secret_name,
                &self.conf.auth_secret_key,
            ),
        ]
    }

    /// Volume and mount of the target CA, if the association provides one.
    pub fn ca_volume(&self, beat: Beat) -> Option<(Volume, VolumeMount)> {
        let secret_name = self.conf.ca_secret_name.as_deref()?;
        self.ca.as_ref()?;
        let name = self.ca_volume_name(beat);
        Some((
            secret_volume(&name, secret_name),
            read_only_mount(&name, &self.ca_dir(beat)),
        ))
    }
}

/// Resolve the single target of `beat`'s concern.
pub async fn resolve_target(
    client: &dyn ResourceClient,
    es: &Elasticsearch,
    beat: Beat,
    cancel: &CancellationToken,
) -> Result<Target> {
    let selector = beat.refs(es).single_target().ok_or_else(|| {
        Error::StackMonitoring(format!("{} monitoring is not enabled", beat.concern()))
    })?;
    let conf = es
        .association_conf(selector)?
        .filter(AssociationConf::is_configured)
        .ok_or_else(|| {
            Error::NotReconcilable(format!(
                "association with {}/{} is not configured yet",
                selector.namespace_or(&es.namespace().unwrap_or_default()),
                selector.name
            ))
        })?;

    let namespace = es.namespace().unwrap_or_default();
    let password = secret_value(
        client,
        &namespace,
        &conf.auth_secret_name,
        &conf.auth_secret_key,
        cancel,
    )
    .await?;
    let ca = match conf.ca_secret_name.as_deref() {
        Some(ca_secret) if conf.ca_cert_provided => {
            Some(secret_value(client, &namespace, ca_secret, CA_CERT_KEY, cancel).await?)
        }
        _ => None,
    };

    Ok(Target {
        index: 0,
        conf,
        password,
        ca,
    })
}

/// Fetch a secret the sidecars depend on.
///
/// Absence is reported as [`Error::MissingSecret`] so that the caller retries
/// instead of treating the reconciled resource as gone.
pub async fn dependent_secret(
    client: &dyn ResourceClient,
    namespace: &str,
    name: &str,
    cancel: &CancellationToken,
) -> Result<Secret> {
    client
        .get_secret(namespace, name, cancel)
        .await
        .map_err(|e| {
            if e.is_not_found() {
                Error::MissingSecret(format!("{namespace}/{name}"))
            } else {
                e
            }
        })
}

/// Read one key of a secret.
pub async fn secret_value(
    client: &dyn ResourceClient,
    namespace: &str,
    name: &str,
    key: &str,
    cancel: &CancellationToken,
) -> Result<Vec<u8>> {
    let secret = dependent_secret(client, namespace, name, cancel).await?;
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .map(|value| value.0.clone())
        .ok_or_else(|| Error::MissingField(format!("{key} in secret {namespace}/{name}")))
}

pub fn literal_env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

pub fn secret_env(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: key.to_string(),
                optional: Some(false),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn secret_volume(name: &str, secret: &str) -> Volume {
    Volume {
        name: name.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret.to_string()),
            optional: Some(false),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn read_only_mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        read_only: Some(true),
        ..Default::default()
    }
}

/// Whether `es` runs at least version `min`. Unparseable versions never do.
pub fn runs_at_least(es: &Elasticsearch, min: &Version) -> bool {
    Version::parse(&es.spec.version)
        .ok()
        .is_some_and(|v| v.gte(min))
}

/// Non-privileged context with every capability dropped.
pub fn security_context(es: &Elasticsearch) -> SecurityContext {
    SecurityContext {
        privileged: Some(false),
        allow_privilege_escalation: Some(false),
        run_as_non_root: runs_at_least(es, &BEATS_NON_ROOT_MIN).then_some(true),
        capabilities: Some(Capabilities {
            drop: Some(vec!["ALL".to_string()]),
            add: None,
        }),
        ..Default::default()
    }
}

fn resource_requirements() -> ResourceRequirements {
    let resources = BTreeMap::from([
        ("cpu".to_string(), Quantity("100m".to_string())),
        ("memory".to_string(), Quantity("300Mi".to_string())),
    ]);
    ResourceRequirements {
        requests: Some(resources.clone()),
        limits: Some(resources),
        ..Default::default()
    }
}

/// Output of the sidecar composer for one beat.
#[derive(Clone, Debug)]
pub struct BeatSidecar {
    pub container: Container,
    pub volumes: Vec<Volume>,
    pub config_secret: Secret,
    /// Covers the rendered configuration and every credential and CA used.
    pub config_hash: Sha256,
}

impl BeatSidecar {
    /// Final digest of the running hash.
    pub fn digest(&self) -> Vec<u8> {
        self.config_hash.clone().finalize().to_vec()
    }
}

/// Beat-specific parts of a sidecar.
pub struct SidecarParts {
    pub config: String,
    pub env: Vec<EnvVar>,
    pub volumes: Vec<(Volume, VolumeMount)>,
    /// Credentials and certificates folded into the configuration hash.
    pub hashed: Vec<Vec<u8>>,
}

/// Feed `bytes` prefixed with their length, so items cannot bleed into
/// each other.
fn hash_framed(hash: &mut Sha256, bytes: &[u8]) {
    hash.update((bytes.len() as u64).to_be_bytes());
    hash.update(bytes);
}

/// Assemble the container, config secret and hash of `beat`.
pub fn assemble(beat: Beat, es: &Elasticsearch, parts: SidecarParts) -> Result<BeatSidecar> {
    let secret_name = beat_config_secret_name(&es.name_any(), beat.name());
    let config_volume = beat.config_volume_name();

    let mut config_hash = Sha256::new();
    hash_framed(&mut config_hash, parts.config.as_bytes());
    for material in &parts.hashed {
        hash_framed(&mut config_hash, material);
    }

    let config_secret = Secret {
        metadata: ObjectMeta {
            name: Some(secret_name.clone()),
            namespace: es.namespace(),
            labels: Some(standard_labels(es)),
            owner_references: Some(vec![owner_reference(es)]),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            beat.config_key().to_string(),
            ByteString(parts.config.into_bytes()),
        )])),
        ..Default::default()
    };

    let mut volumes = vec![secret_volume(&config_volume, &secret_name)];
    let mut mounts = vec![read_only_mount(&config_volume, beat.config_dir())];
    for (volume, mount) in parts.volumes {
        volumes.push(volume);
        mounts.push(mount);
    }

    let container = Container {
        name: beat.name().to_string(),
        image: Some(beat.image(es)?),
        args: Some(vec![
            "-c".to_string(),
            format!("{}/{}", beat.config_dir(), beat.config_key()),
            "-e".to_string(),
        ]),
        env: Some(parts.env),
        volume_mounts: Some(mounts),
        resources: Some(resource_requirements()),
        security_context: Some(security_context(es)),
        ..Default::default()
    };

    Ok(BeatSidecar {
        container,
        volumes,
        config_secret,
        config_hash,
    })
}
