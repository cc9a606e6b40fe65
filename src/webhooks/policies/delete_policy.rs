//! Volume claim delete policy validation policy.
//!
//! Tier 2 (Update): Only enforced on UPDATE operations
//!
//! Validates:
//! - The delete policy is not flipped between retaining and removing claims
//!   while existing claims still carry the ownership of the previous policy
//!
//! Claims owned by the cluster are garbage collected with it. The owner
//! references found on existing claims tell which policy they were created
//! under.

use kube::ResourceExt;
use tracing::debug;

use super::{ErrorList, FieldError, FieldPath, UpdateEnv};
use crate::crd::Elasticsearch;
use crate::resources::common::cluster_selector;

/// Validate a change of `spec.volumeClaimDeletePolicy`.
pub async fn validate(old: &Elasticsearch, new: &Elasticsearch, env: &UpdateEnv<'_>) -> ErrorList {
    let (old_policy, new_policy) = (old.delete_policy(), new.delete_policy());
    if old_policy.owns_claims() == new_policy.owns_claims() {
        return ErrorList::new();
    }

    let namespace = new.namespace().unwrap_or_default();
    let cluster = new.name_any();
    let claims = match env
        .client
        .list_pvcs(&namespace, &cluster_selector(&cluster), env.cancel)
        .await
    {
        Ok(claims) => claims,
        Err(e) => {
            debug!(namespace = %namespace, name = %cluster, error = %e, "Cannot list volume claims, skipping delete policy validation");
            return ErrorList::new();
        }
    };
    if claims.is_empty() {
        return ErrorList::new();
    }

    let owned = claims.iter().any(|claim| {
        claim
            .owner_references()
            .iter()
            .any(|r| r.kind == "Elasticsearch" && r.name == cluster)
    });
    if owned != old_policy.owns_claims() {
        return ErrorList::new();
    }

    FieldError::forbidden(
        FieldPath::new("spec").child("volumeClaimDeletePolicy"),
        format!(
            "cannot change volume claim delete policy from {old_policy} to {new_policy} while volume claims exist"
        ),
    )
    .into()
}
