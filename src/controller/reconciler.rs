//! Reconciliation loop for Elasticsearch resources.
//!
//! Only the parts owned by this crate run here: the manifest is validated
//! (and flagged `Invalid` in the status when it fails), then the beat
//! configuration secrets of enabled stack monitoring are brought up to date.
//! Pod templates pick up the sidecars through [`with_monitoring`](super::with_monitoring).

use std::sync::Arc;
use std::time::Duration;

use kube::{ResourceExt, runtime::controller::Action};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::controller::cluster_validation::{invalid_status, validate_create};
use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::controller::stackmon::reconcile_config_secrets;
use crate::crd::Elasticsearch;
use crate::stackmon;

/// Periodic resync of healthy resources
const RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Retry delay while monitoring associations are unresolved
const ASSOCIATION_RETRY: Duration = Duration::from_secs(10);

/// Reconcile an Elasticsearch resource
pub async fn reconcile(es: Arc<Elasticsearch>, ctx: Arc<Context>) -> Result<Action> {
    let name = es.name_any();
    let namespace = es.namespace().unwrap_or_else(|| "default".to_string());

    if !ctx.managed_namespaces.contains(&namespace) {
        debug!(name = %name, namespace = %namespace, "Skipping unmanaged namespace");
        return Ok(Action::await_change());
    }

    // Owned secrets are garbage collected through their owner reference
    if es.metadata.deletion_timestamp.is_some() {
        debug!(name = %name, namespace = %namespace, "Resource is being deleted");
        return Ok(Action::await_change());
    }

    debug!(name = %name, namespace = %namespace, "Reconciling Elasticsearch");
    let cancel = CancellationToken::new();

    match validate_create(&ctx, &es) {
        Ok(()) => {}
        Err(Error::Validation(errs)) => {
            let status = invalid_status(&es, &errs);
            if es.status.as_ref() != Some(&status) {
                ctx.client
                    .patch_elasticsearch_status(&namespace, &name, &status, &cancel)
                    .await?;
                info!(name = %name, namespace = %namespace, "Marked Elasticsearch as invalid");
            }
            return Ok(Action::await_change());
        }
        Err(e) => return Err(e),
    }

    reconcile_config_secrets(&ctx, &es, &cancel).await?;

    if !stackmon::is_reconcilable(&es)? {
        debug!(name = %name, namespace = %namespace, "Waiting for monitoring associations");
        return Ok(Action::requeue(ASSOCIATION_RETRY));
    }
    Ok(Action::requeue(RESYNC_INTERVAL))
}

/// Error policy for the controller
pub fn error_policy(es: Arc<Elasticsearch>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = es.name_any();

    if error.is_not_found() {
        debug!(name = %name, "Resource not found (likely deleted)");
        return Action::await_change();
    }

    if error.is_retryable() {
        warn!(name = %name, error = %error, "Retryable error, will retry");
        Action::requeue(error.requeue_after())
    } else {
        error!(name = %name, error = %error, "Non-retryable error");
        Action::requeue(RESYNC_INTERVAL)
    }
}
