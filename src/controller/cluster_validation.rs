//! Reconcile-time validation of Elasticsearch resources.
//!
//! The same policies run at admission and at reconciliation time, so a
//! resource applied while the webhook was unavailable still gets rejected
//! before anything is derived from it.

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::crd::{Condition, Elasticsearch, ElasticsearchPhase, ElasticsearchStatus};
use crate::webhooks::policies::{self, ErrorList, UpdateEnv};

const RECONCILIATION_COMPLETE: &str = "ReconciliationComplete";

fn into_result(es: &Elasticsearch, errs: ErrorList) -> Result<()> {
    if errs.is_empty() {
        return Ok(());
    }
    warn!(
        namespace = ?es.metadata.namespace,
        name = ?es.metadata.name,
        errors = %errs,
        "Elasticsearch manifest validation failed"
    );
    Err(Error::Validation(errs))
}

/// Validate a new cluster.
pub fn validate_create(ctx: &Context, es: &Elasticsearch) -> Result<()> {
    into_result(es, policies::validate_create(es, &ctx.validation))
}

/// Validate a change from `old` to `new`.
pub async fn validate_update(
    ctx: &Context,
    old: &Elasticsearch,
    new: &Elasticsearch,
    cancel: &CancellationToken,
) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    let env = UpdateEnv {
        client: ctx.client.as_ref(),
        validate_storage_class: ctx.validate_storage_class,
        config: &ctx.validation,
        cancel,
    };
    into_result(new, policies::validate_update(old, new, &env).await)
}

/// Status reporting a failed validation, keeping what is already observed.
pub fn invalid_status(es: &Elasticsearch, errs: &ErrorList) -> ElasticsearchStatus {
    let generation = es.metadata.generation;
    let mut status = es.status.clone().unwrap_or_default();
    status.phase = ElasticsearchPhase::Invalid;
    status.observed_generation = generation;
    let mut condition =
        Condition::reconciliation_complete(false, "ValidationFailed", &errs.to_string(), generation);
    // the transition time only moves when the condition status flips
    if let Some(previous) = status
        .conditions
        .iter()
        .find(|c| c.r#type == RECONCILIATION_COMPLETE && c.status == condition.status)
    {
        condition.last_transition_time = previous.last_transition_time.clone();
    }
    status.conditions.retain(|c| c.r#type != RECONCILIATION_COMPLETE);
    status.conditions.push(condition);
    status
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::client::InMemoryClient;
    use crate::webhooks::policies::fixtures::{es, node_set, valid_es};

    fn ctx() -> Context {
        Context::new(Arc::new(InMemoryClient::new()), None)
    }

    #[test]
    fn test_validate_create() {
        assert!(validate_create(&ctx(), &valid_es("8.1.0")).is_ok());

        let no_master = es("8.1.0", vec![node_set("data", 3, serde_json::json!({"node.roles": ["data"]}))]);
        let err = validate_create(&ctx(), &no_master).unwrap_err();
        match err {
            Error::Validation(errs) => assert_eq!(errs.len(), 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_validate_update_downgrade() {
        let cancel = CancellationToken::new();
        let err = validate_update(&ctx(), &valid_es("8.1.0"), &valid_es("8.0.0"), &cancel)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Downgrades are not supported"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_validate_update_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = validate_update(&ctx(), &valid_es("8.1.0"), &valid_es("8.1.0"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_invalid_status() {
        let mut cluster = valid_es("8.1.0");
        cluster.metadata.generation = Some(4);
        cluster.status = Some(ElasticsearchStatus {
            version: Some("8.0.0".to_string()),
            conditions: vec![Condition::reconciliation_complete(true, "Done", "", Some(3))],
            ..Default::default()
        });
        let errs = policies::validate_create(&valid_es("x"), &Default::default());
        let status = invalid_status(&cluster, &errs);
        assert_eq!(status.phase, ElasticsearchPhase::Invalid);
        assert_eq!(status.version.as_deref(), Some("8.0.0"));
        assert_eq!(status.observed_generation, Some(4));
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].status, "False");
        assert!(status.conditions[0].message.contains("spec.version"));

        cluster.status = Some(status.clone());
        assert_eq!(invalid_status(&cluster, &errs), status);
    }
}
