//! Log shipper sidecar.
//!
//! Filebeat tails the JSON log files Elasticsearch writes to the shared logs
//! volume and ships them to the logs monitoring cluster.

use k8s_openapi::api::core::v1::{EmptyDirVolumeSource, Volume, VolumeMount};
use tokio_util::sync::CancellationToken;

use super::beat::{
    Beat, BeatSidecar, SidecarParts, assemble, read_only_mount, resolve_target, runs_at_least,
};
use super::templates::{self, FIELD_LIMIT, FilebeatParams, OutputParams};
use crate::client::ResourceClient;
use crate::controller::error::Result;
use crate::crd::Elasticsearch;
use crate::version::FIELD_LIMIT_MIN;

/// Logs volume shared with the Elasticsearch container.
pub const LOGS_VOLUME: &str = "elasticsearch-logs";
const LOGS_DIR: &str = "/usr/share/elasticsearch/logs";

const DATA_VOLUME: &str = "filebeat-data";
const DATA_DIR: &str = "/usr/share/filebeat/data";

fn empty_dir(name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }
}

/// Build the filebeat sidecar for `es`.
pub async fn filebeat(
    client: &dyn ResourceClient,
    es: &Elasticsearch,
    cancel: &CancellationToken,
) -> Result<BeatSidecar> {
    let beat = Beat::Filebeat;
    let target = resolve_target(client, es, beat, cancel).await?;

    let params = FilebeatParams {
        field_limit: FIELD_LIMIT,
        field_limit_enabled: runs_at_least(es, &FIELD_LIMIT_MIN),
        output: OutputParams {
            index: target.index,
            ca_path: target.ca_path(beat),
        },
    };
    let config = templates::render(templates::FILEBEAT, &params)?;

    let mut volumes = Vec::new();
    volumes.extend(target.ca_volume(beat));
    volumes.push((empty_dir(LOGS_VOLUME), read_only_mount(LOGS_VOLUME, LOGS_DIR)));
    volumes.push((
        empty_dir(DATA_VOLUME),
        VolumeMount {
            name: DATA_VOLUME.to_string(),
            mount_path: DATA_DIR.to_string(),
            ..Default::default()
        },
    ));

    let env = target.env();
    let mut hashed = vec![target.password];
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
