//! Stack monitoring sidecars.
//!
//! A cluster referencing a metrics monitoring cluster gets a metricbeat
//! sidecar, one referencing a logs monitoring cluster gets a filebeat
//! sidecar. Each sidecar comes with a rendered configuration secret and a
//! running hash over that configuration and the credentials and CAs it uses.
//! The pod template carries the combined digest in
//! [`MONITORING_CONFIG_HASH_ANNOTATION`], so rotating any of them rolls the pods.

mod beat;
mod filebeat;
mod metricbeat;
pub mod templates;

pub use beat::{Beat, BeatSidecar};
pub use filebeat::{LOGS_VOLUME, filebeat};
pub use metricbeat::{DOWNWARD_API_VOLUME, metricbeat};

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::ResourceClient;
use crate::controller::error::Result;
use crate::crd::Elasticsearch;
use crate::resources::PodTemplateBuilder;

/// Pod template annotation holding the monitoring configuration digest.
pub const MONITORING_CONFIG_HASH_ANNOTATION: &str =
    "elasticsearch.k8s.elastic.co/monitoring-config-hash";

/// Environment variable switching Elasticsearch logs to files.
pub const ES_LOG_STYLE: &str = "ES_LOG_STYLE";

/// Beats enabled for `es`, in a stable order.
pub fn enabled_beats(es: &Elasticsearch) -> Vec<Beat> {
    let mut beats = Vec::new();
    if es.is_metrics_enabled() {
        beats.push(Beat::Metricbeat);
    }
    if es.is_logs_enabled() {
        beats.push(Beat::Filebeat);
    }
    beats
}

/// Whether every enabled concern has a configured association.
///
/// Associations are filled in asynchronously, so an unresolved reference is
/// expected right after a monitoring reference is added.
pub fn is_reconcilable(es: &Elasticsearch) -> Result<bool> {
    for beat in enabled_beats(es) {
        let Some(selector) = beat.refs(es).single_target() else {
            continue;
        };
        match es.association_conf(selector)? {
            Some(conf) if conf.is_configured() => {}
            _ => return Ok(false),
        }
    }
    Ok(true)
}

/// Build the sidecar of `beat`.
pub async fn sidecar(
    client: &dyn ResourceClient,
    es: &Elasticsearch,
    beat: Beat,
    cancel: &CancellationToken,
) -> Result<BeatSidecar> {
    match beat {
        Beat::Metricbeat => metricbeat(client, es, cancel).await,
        Beat::Filebeat => filebeat(client, es, cancel).await,
    }
}

/// Lowercase hex encoding.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Combine the digests of `sidecars` into one hex digest.
pub fn combined_hash(sidecars: &[BeatSidecar]) -> String {
    let mut hash = Sha256::new();
    for sidecar in sidecars {
        hash.update(sidecar.digest());
    }
    to_hex(&hash.finalize())
}

/// Attach the enabled monitoring sidecars to `builder`.
///
/// The builder is returned unchanged when monitoring is disabled or its
/// associations are not resolved yet.
pub async fn with_monitoring(
    client: &dyn ResourceClient,
    builder: PodTemplateBuilder,
    es: &Elasticsearch,
    cancel: &CancellationToken,
) -> Result<PodTemplateBuilder> {
    let beats = enabled_beats(es);
    if beats.is_empty() {
        return Ok(builder);
    }
    if !is_reconcilable(es)? {
        debug!(beats = ?beats, "Monitoring associations not configured yet, skipping sidecars");
        return Ok(builder);
    }

    let mut sidecars = Vec::with_capacity(beats.len());
    for beat in beats {
        sidecars.push(sidecar(client, es, beat, cancel).await?);
    }

    let mut builder = builder;
    if es.is_logs_enabled() {
        builder = builder.with_env([beat::literal_env(ES_LOG_STYLE, "file")]);
    }
    let annotations = BTreeMap::from([(
        MONITORING_CONFIG_HASH_ANNOTATION.to_string(),
        combined_hash(&sidecars),
    )]);
    for sidecar in sidecars {
        builder = builder
            .with_volumes(sidecar.volumes)
            .with_containers([sidecar.container]);
    }
    Ok(builder.with_annotations(annotations))
}
