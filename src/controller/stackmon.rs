//! Stack monitoring entry points for the reconciler.
//!
//! `reconcile_config_secrets` keeps the beat configuration secrets up to date
//! and `with_monitoring` attaches the sidecars to a pod template. Both are
//! no-ops while monitoring associations are not resolved.

use std::time::Instant;

use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::ResourceClient;
use crate::controller::context::Context;
use crate::controller::error::Result;
use crate::crd::Elasticsearch;
use crate::resources::PodTemplateBuilder;
use crate::stackmon;

/// Attach the monitoring sidecars of `es` to `builder`.
pub async fn with_monitoring(
    ctx: &Context,
    builder: PodTemplateBuilder,
    es: &Elasticsearch,
    cancel: &CancellationToken,
) -> Result<PodTemplateBuilder> {
    stackmon::with_monitoring(ctx.client.as_ref(), builder, es, cancel).await
}

/// Render and store the configuration secret of every enabled beat.
pub async fn reconcile_config_secrets(
    ctx: &Context,
    es: &Elasticsearch,
    cancel: &CancellationToken,
) -> Result<()> {
    let namespace = es.namespace().unwrap_or_default();
    let name = es.name_any();
    let start = Instant::now();

    let result = reconcile_secrets(ctx.client.as_ref(), es, cancel).await;
    if let Some(health) = &ctx.health_state {
        match &result {
            Ok(writes) => health.metrics.record_secret_reconcile(
                &namespace,
                &name,
                *writes,
                start.elapsed().as_secs_f64(),
            ),
            Err(_) => health.metrics.record_secret_error(&namespace, &name),
        }
    }
    if let Err(e) = &result {
        warn!(namespace = %namespace, name = %name, error = %e, "Failed to reconcile beat configuration secrets");
    }
    result.map(|_| ())
}

async fn reconcile_secrets(
    client: &dyn ResourceClient,
    es: &Elasticsearch,
    cancel: &CancellationToken,
) -> Result<u64> {
    let beats = stackmon::enabled_beats(es);
    if beats.is_empty() || !stackmon::is_reconcilable(es)? {
        return Ok(0);
    }

    let mut writes = 0;
    for beat in beats {
        let sidecar = stackmon::sidecar(client, es, beat, cancel).await?;
        if upsert_secret(client, &sidecar.config_secret, cancel).await? {
            writes += 1;
        }
    }
    Ok(writes)
}

/// Write `expected` unless an identical secret already exists.
async fn upsert_secret(
    client: &dyn ResourceClient,
    expected: &Secret,
    cancel: &CancellationToken,
) -> Result<bool> {
    let namespace = expected.namespace().unwrap_or_default();
    let name = expected.name_any();
    match client.get_secret(&namespace, &name, cancel).await {
        Ok(existing) if is_up_to_date(&existing, expected) => {
            debug!(namespace = %namespace, name = %name, "Beat configuration secret up to date");
            return Ok(false);
        }
        Ok(_) => {}
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e),
    }
    client.apply_secret(expected, cancel).await?;
    info!(namespace = %namespace, name = %name, "Beat configuration secret written");
    Ok(true)
}

fn is_up_to_date(existing: &Secret, expected: &Secret) -> bool {
    existing.data == expected.data
        && existing.metadata.labels == expected.metadata.labels
        && existing.metadata.owner_references == expected.metadata.owner_references
}
