//! Volume claim template validation policies.
//!
//! Tier 1 (Create and update): claim naming
//! Tier 2 (Update): claim modification
//!
//! Validates:
//! - Claims other than the data volume are mounted by some container
//! - Existing claims only change by growing their storage request
//! - Growing claims use a storage class that allows volume expansion
//!
//! StatefulSet claim templates are immutable, so proposed claims are compared
//! with the templates of the StatefulSet actually running, not with the
//! previous resource.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use k8s_openapi::api::core::v1::{PersistentVolumeClaim, PodSpec};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::ResourceExt;
use tracing::debug;

use super::{ErrorList, FieldError, FieldPath, UpdateEnv, ValidationContext};
use crate::crd::{DEFAULT_DATA_VOLUME_NAME, Elasticsearch, NodeSet};
use crate::quantity;
use crate::resources::common::stateful_set_name;

const PVC_NOT_MOUNTED_MSG: &str = "volume claim declared but volume not mounted in any container. Note that the Elasticsearch data volume should be named 'elasticsearch-data'";
const PVC_IMMUTABLE_MSG: &str = "volume claim templates can only have their storage requests increased, if the storage class allows volume expansion. Any other change is forbidden";

const DEFAULT_STORAGE_CLASS_ANNOTATION: &str = "storageclass.kubernetes.io/is-default-class";
const BETA_DEFAULT_STORAGE_CLASS_ANNOTATION: &str = "storageclass.beta.kubernetes.io/is-default-class";

const STORAGE: &str = "storage";
const FILESYSTEM_VOLUME_MODE: &str = "Filesystem";

fn claims_path(index: usize) -> FieldPath {
    FieldPath::new("spec")
        .child("nodeSets")
        .index(index)
        .child("volumeClaimTemplates")
}

fn claim_name(claim: &PersistentVolumeClaim) -> &str {
    claim.metadata.name.as_deref().unwrap_or_default()
}

fn claim_names(claims: &[PersistentVolumeClaim]) -> Vec<String> {
    claims.iter().map(|c| claim_name(c).to_string()).collect()
}

/// Validate that every declared claim is mounted.
pub fn validate_naming(ctx: &ValidationContext<'_>) -> ErrorList {
    let mut errs = ErrorList::new();
    for (i, node_set) in ctx.resource.spec.node_sets.iter().enumerate() {
        let mounted = mounted_volumes(node_set);
        for claim in &node_set.volume_claim_templates {
            let name = claim_name(claim);
            if name != DEFAULT_DATA_VOLUME_NAME && !mounted.contains(name) {
                errs.push(FieldError::invalid(claims_path(i), name, PVC_NOT_MOUNTED_MSG));
            }
        }
    }
    errs
}

/// Names of the volumes mounted by any container or init container.
fn mounted_volumes(node_set: &NodeSet) -> BTreeSet<&str> {
    let Some(spec) = node_set.pod_template.as_ref().and_then(|t| t.spec.as_ref()) else {
        return BTreeSet::new();
    };
    let PodSpec {
        containers,
        init_containers,
        ..
    } = spec;
    containers
        .iter()
        .chain(init_containers.iter().flatten())
        .flat_map(|c| c.volume_mounts.iter().flatten())
        .map(|m| m.name.as_str())
        .collect()
}

/// Validate claim changes against the running StatefulSets.
pub async fn validate_modification(
    old: &Elasticsearch,
    new: &Elasticsearch,
    env: &UpdateEnv<'_>,
) -> ErrorList {
    let mut errs = ErrorList::new();
    // the autoscaling controller owns storage sizes
    if new.is_autoscaling_defined() {
        return errs;
    }
    let namespace = new.namespace().unwrap_or_default();
    let cluster = new.name_any();

    for (i, node_set) in new.spec.node_sets.iter().enumerate() {
        if !old.spec.node_sets.iter().any(|ns| ns.name == node_set.name) {
            continue;
        }
        // without declared claims the operator manages the default one
        if node_set.volume_claim_templates.is_empty() {
            continue;
        }

        let sset_name = stateful_set_name(&cluster, &node_set.name);
        let sset = match env.client.get_stateful_set(&namespace, &sset_name, env.cancel).await {
            Ok(sset) => sset,
            Err(e) => {
                debug!(namespace = %namespace, name = %sset_name, error = %e, "Skipping claim validation, StatefulSet unavailable");
                continue;
            }
        };
        let actual = sset
            .spec
            .and_then(|s| s.volume_claim_templates)
            .unwrap_or_default();

        if let Err(detail) =
            validate_claims_update(&actual, &node_set.volume_claim_templates, env).await
        {
            errs.push(FieldError::invalid(
                claims_path(i),
                claim_names(&node_set.volume_claim_templates),
                detail,
            ));
        }
    }
    errs
}

/// Compare proposed claim templates with the current ones.
async fn validate_claims_update(
    current: &[PersistentVolumeClaim],
    proposed: &[PersistentVolumeClaim],
    env: &UpdateEnv<'_>,
) -> Result<(), String> {
    let current_names: BTreeSet<&str> = current.iter().map(claim_name).collect();
    let proposed_names: BTreeSet<&str> = proposed.iter().map(claim_name).collect();
    if current_names != proposed_names {
        return Err(PVC_IMMUTABLE_MSG.to_string());
    }

    for claim in proposed {
        let Some(existing) = current.iter().find(|c| claim_name(c) == claim_name(claim)) else {
            continue;
        };
        if !same_except_storage(existing, claim) {
            return Err(PVC_IMMUTABLE_MSG.to_string());
        }
        match compare_storage(existing, claim) {
            Some(Ordering::Less) => {
                return Err(format!(
                    "decreasing storage size is not supported: an attempt was made to decrease storage size for claim {}",
                    claim_name(claim)
                ));
            }
            Some(Ordering::Greater) if env.validate_storage_class => {
                ensure_expandable(claim, env).await?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn storage_request(claim: &PersistentVolumeClaim) -> Option<&Quantity> {
    claim
        .spec
        .as_ref()?
        .resources
        .as_ref()?
        .requests
        .as_ref()?
        .get(STORAGE)
}

/// Ordering of the proposed storage request relative to the existing one.
fn compare_storage(existing: &PersistentVolumeClaim, proposed: &PersistentVolumeClaim) -> Option<Ordering> {
    match (storage_request(existing), storage_request(proposed)) {
        (Some(before), Some(after)) => quantity::compare(after, before),
        _ => None,
    }
}

/// Claims are equal in everything the StatefulSet controller would refuse to change.
fn same_except_storage(a: &PersistentVolumeClaim, b: &PersistentVolumeClaim) -> bool {
    let meta_equal = a.metadata.labels == b.metadata.labels
        && a.metadata.annotations == b.metadata.annotations;

    let spec_a = a.spec.clone().unwrap_or_default();
    let spec_b = b.spec.clone().unwrap_or_default();
    let volume_mode = |mode: &Option<String>| {
        mode.clone()
            .unwrap_or_else(|| FILESYSTEM_VOLUME_MODE.to_string())
    };
    let limits = |claim: &k8s_openapi::api::core::v1::PersistentVolumeClaimSpec| {
        claim.resources.as_ref().and_then(|r| r.limits.clone())
    };

    meta_equal
        && spec_a.access_modes == spec_b.access_modes
        && spec_a.selector == spec_b.selector
        && spec_a.storage_class_name == spec_b.storage_class_name
        && volume_mode(&spec_a.volume_mode) == volume_mode(&spec_b.volume_mode)
        && spec_a.data_source == spec_b.data_source
        && limits(&spec_a) == limits(&spec_b)
}

/// Check that the storage class of `claim` allows expansion.
///
/// Client failures other than a missing class do not block the update.
async fn ensure_expandable(claim: &PersistentVolumeClaim, env: &UpdateEnv<'_>) -> Result<(), String> {
    let class_name = claim.spec.as_ref().and_then(|s| s.storage_class_name.clone());

    let class = match class_name {
        Some(name) => match env.client.get_storage_class(&name, env.cancel).await {
            Ok(class) => class,
            Err(e) if e.is_not_found() => return Err(format!("storage class {name} not found")),
            Err(e) => {
                debug!(storage_class = %name, error = %e, "Cannot read storage class");
                return Ok(());
            }
        },
        None => match env.client.list_storage_classes(env.cancel).await {
            Ok(classes) => match classes.into_iter().find(is_default_class) {
                Some(class) => class,
                None => return Err("unable to find the default storage class".to_string()),
            },
            Err(e) => {
                debug!(error = %e, "Cannot list storage classes");
                return Ok(());
            }
        },
    };

    if class.allow_volume_expansion == Some(true) {
        Ok(())
    } else {
        Err(format!(
            "claim {} (storage class {}) does not support volume expansion",
            claim_name(claim),
            class.name_any()
        ))
    }
}

fn is_default_class(class: &StorageClass) -> bool {
    [DEFAULT_STORAGE_CLASS_ANNOTATION, BETA_DEFAULT_STORAGE_CLASS_ANNOTATION]
        .iter()
        .any(|key| class.annotations().get(*key).is_some_and(|v| v == "true"))
}
