//! Metrics collector sidecar.
//!
//! Metricbeat scrapes the local node through the HTTP layer as the internal
//! monitoring user and ships to the metrics monitoring cluster.

use k8s_openapi::api::core::v1::{
    DownwardAPIVolumeFile, DownwardAPIVolumeSource, ObjectFieldSelector, Volume,
};
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;

use super::beat::{
    Beat, BeatSidecar, SidecarParts, assemble, dependent_secret, literal_env, read_only_mount,
    resolve_target, runs_at_least, secret_env, secret_value, secret_volume,
};
use super::templates::{self, FIELD_LIMIT, MetricbeatParams, OutputParams};
use crate::client::ResourceClient;
use crate::controller::error::Result;
use crate::crd::Elasticsearch;
use crate::resources::common::{
    CA_CERT_KEY, MONITORING_USER, http_certs_public_secret_name, internal_users_secret_name,
};
use crate::version::{FIELD_LIMIT_MIN, INGEST_PIPELINE_MIN};

const HTTP_PORT: u16 = 9200;

const SOURCE_CA_DIR: &str = "/mnt/es/monitoring/metrics/source";
const SOURCE_CA_VOLUME: &str = "es-monitoring-metrics-source-ca";

/// Downward API volume of Elasticsearch pods.
pub const DOWNWARD_API_VOLUME: &str = "elastic-internal-downward-api";
const DOWNWARD_API_DIR: &str = "/mnt/elastic-internal/downward-api";

fn downward_api_volume() -> Volume {
    Volume {
        name: DOWNWARD_API_VOLUME.to_string(),
        downward_api: Some(DownwardAPIVolumeSource {
            items: Some(vec![DownwardAPIVolumeFile {
                path: "labels".to_string(),
                field_ref: Some(ObjectFieldSelector {
                    field_path: "metadata.labels".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build the metricbeat sidecar for `es`.
pub async fn metricbeat(
    client: &dyn ResourceClient,
    es: &Elasticsearch,
    cancel: &CancellationToken,
) -> Result<BeatSidecar> {
    let beat = Beat::Metricbeat;
    let namespace = es.namespace().unwrap_or_default();
    let cluster = es.name_any();
    let target = resolve_target(client, es, beat, cancel).await?;

    let users_secret = internal_users_secret_name(&cluster);
    let password = secret_value(client, &namespace, &users_secret, MONITORING_USER, cancel).await?;

    let is_ssl = es.spec.http.tls_enabled();
    let source_ca = if is_ssl {
        let certs =
            dependent_secret(client, &namespace, &http_certs_public_secret_name(&cluster), cancel)
                .await?;
        certs
            .data
            .and_then(|mut data| data.remove(CA_CERT_KEY))
            .map(|ca| ca.0)
    } else {
        None
    };

    let url = format!("{}://localhost:{HTTP_PORT}", es.spec.http.scheme());
    let params = MetricbeatParams {
        url: url.clone(),
        username: MONITORING_USER.to_string(),
        password: String::from_utf8_lossy(&password).into_owned(),
        is_ssl,
        ssl_path: format!("{SOURCE_CA_DIR}/{CA_CERT_KEY}"),
        ssl_mode: if source_ca.is_some() { "certificate" } else { "full" }.to_string(),
        version: es.spec.version.clone(),
        ca_volume: source_ca.is_some(),
        field_limit: FIELD_LIMIT,
        field_limit_enabled: runs_at_least(es, &FIELD_LIMIT_MIN),
        ingest_pipeline_enabled: runs_at_least(es, &INGEST_PIPELINE_MIN),
        output: OutputParams {
            index: target.index,
            ca_path: target.ca_path(beat),
        },
    };
    let config = templates::render(templates::METRICBEAT, &params)?;

    let mut env = vec![
        literal_env("ES_SOURCE_URL", &url),
        literal_env("ES_SOURCE_USERNAME", MONITORING_USER),
        secret_env("ES_SOURCE_PASSWORD", &users_secret, MONITORING_USER),
    ];
    env.extend(target.env());

    let mut volumes = Vec::new();
    if source_ca.is_some() {
        volumes.push((
            secret_volume(SOURCE_CA_VOLUME, &http_certs_public_secret_name(&cluster)),
            read_only_mount(SOURCE_CA_VOLUME, SOURCE_CA_DIR),
        ));
    }
    volumes.extend(target.ca_volume(beat));
    volumes.push((
        downward_api_volume(),
        read_only_mount(DOWNWARD_API_VOLUME, DOWNWARD_API_DIR),
    ));

    let mut hashed = vec![password, target.password];
    hashed.extend(source_ca);
    hashed.extend(target.ca);

    assemble(
        beat,
        es,
        SidecarParts {
            config,
            env,
            volumes,
            hashed,
        },
    )
}
