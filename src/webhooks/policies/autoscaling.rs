//! Autoscaling annotation validation policy.
//!
//! Tier 1 (Create and update): Enforced when the autoscaling annotation is set
//!
//! Validates:
//! - The annotation is only used on versions that support it
//! - Policies are well formed: names, role sets, node counts and resource ranges
//! - Every policy drives at least one node set, matched by exact role set
//! - Autoscaled node sets use a single volume claim

use std::cmp::Ordering;
use std::collections::BTreeSet;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde_json::Value;

use super::node_roles::{config_path, config_value};
use super::{ErrorList, FieldError, FieldPath, ValidationContext};
use crate::crd::{AUTOSCALING_ANNOTATION, AutoscalingPolicySpec, AutoscalingSpec, QuantityRange};
use crate::quantity;
use crate::version::{AUTOSCALING_ANNOTATION_REMOVED, AUTOSCALING_MIN};

const AUTOSCALING_VERSION_MSG: &str = "autoscaling is not available in this version of Elasticsearch";
const UNEXPECTED_VOLUME_CLAIM_MSG: &str = "autoscaling supports only one volume claim";

/// Smallest memory minimum a policy may declare.
const MIN_MEMORY: &str = "2Gi";

const ML_ROLE: &str = "ml";
const REMOTE_CLUSTER_CLIENT_ROLE: &str = "remote_cluster_client";

fn annotation_path() -> FieldPath {
    FieldPath::new("metadata")
        .child("annotations")
        .child(&format!("\"{AUTOSCALING_ANNOTATION}\""))
}

fn policy_path(index: usize) -> FieldPath {
    annotation_path().index(index)
}

/// Validate the autoscaling annotation.
pub fn validate(ctx: &ValidationContext<'_>) -> ErrorList {
    let es = ctx.resource;
    let Some(parsed) = es.autoscaling_spec() else {
        return ErrorList::new();
    };

    if let Some(version) = ctx.version() {
        if version.lt(&AUTOSCALING_MIN) {
            return FieldError::invalid(
                FieldPath::new("spec").child("version"),
                es.spec.version.as_str(),
                AUTOSCALING_VERSION_MSG,
            )
            .into();
        }
        if version.gte(&AUTOSCALING_ANNOTATION_REMOVED) {
            return FieldError::forbidden(
                annotation_path(),
                format!(
                    "autoscaling annotation is no longer supported from Elasticsearch {AUTOSCALING_ANNOTATION_REMOVED}"
                ),
            )
            .into();
        }
    }

    let spec = match parsed {
        Ok(spec) => spec,
        Err(e) => {
            return FieldError::invalid(
                annotation_path(),
                es.autoscaling_annotation().unwrap_or_default(),
                format!("cannot parse autoscaling specification: {e}"),
            )
            .into();
        }
    };

    let mut errs = validate_policies(&spec);
    errs.append(validate_node_sets(ctx, &spec));
    errs
}

/// Rules that only look at the policies themselves.
pub fn validate_policies(spec: &AutoscalingSpec) -> ErrorList {
    let mut errs = ErrorList::new();
    let mut names = BTreeSet::new();
    let mut role_sets: Vec<Vec<String>> = Vec::new();
    let mut ml_policies = 0;

    for (i, policy) in spec.policies.iter().enumerate() {
        let path = policy_path(i);

        if policy.name.is_empty() {
            errs.push(FieldError::required(path.child("name"), "name is mandatory"));
        } else if !names.insert(policy.name.as_str()) {
            errs.push(FieldError::invalid(
                path.child("name"),
                policy.name.as_str(),
                "policy is duplicated",
            ));
        }

        let roles = policy.roles.clone().unwrap_or_default();
        let joined = roles.join(",");
        if roles.is_empty() {
            errs.push(FieldError::required(
                path.child("roles"),
                "roles field is mandatory and must not be empty",
            ));
        } else {
            let role_set = policy.role_set();
            if role_sets.contains(&role_set) {
                errs.push(FieldError::invalid(
                    path.child("name"),
                    joined.as_str(),
                    "roles set is duplicated",
                ));
            } else {
                role_sets.push(role_set);
            }
        }

        let has_ml = roles.iter().any(|r| r == ML_ROLE);
        if has_ml {
            ml_policies += 1;
        }
        if ml_policies > 1 && has_ml {
            errs.push(FieldError::invalid(
                path.child("name"),
                joined.as_str(),
                "ML nodes must be in a dedicated NodeSet",
            ));
        }
        let non_ml = roles
            .iter()
            .filter(|r| r.as_str() != REMOTE_CLUSTER_CLIENT_ROLE)
            .count();
        if has_ml && non_ml > 1 {
            errs.push(FieldError::invalid(
                path.child("name"),
                joined.as_str(),
                "ML nodes must be in a dedicated autoscaling policy",
            ));
        }

        errs.append(validate_node_count(&path, policy));

        let resources = path.child("resources");
        let memory_min = Quantity(MIN_MEMORY.to_string());
        for (name, range, min) in [
            ("cpu", &policy.resources.cpu, None),
            ("memory", &policy.resources.memory, Some(&memory_min)),
            ("storage", &policy.resources.storage, None),
        ] {
            if let Some(range) = range {
                errs.append(validate_quantities(&resources.child(name), range, min));
            }
        }
    }
    errs
}

fn validate_node_count(path: &FieldPath, policy: &AutoscalingPolicySpec) -> ErrorList {
    let count = policy.resources.node_count;
    let count_path = path.child("resources").child("nodeCount");
    let mut errs = ErrorList::new();

    if count.min < 0 {
        errs.push(FieldError::invalid(
            count_path.child("min"),
            count.min,
            "min count must be equal or greater than 0",
        ));
    }
    if count.max <= 0 {
        errs.push(FieldError::invalid(
            count_path.child("max"),
            count.max,
            "max count must be greater than 0",
        ));
    }
    if count.max < count.min {
        errs.push(FieldError::invalid(
            count_path.child("max"),
            count.max,
            "max node count must be an integer greater or equal than the min node count",
        ));
    }
    errs
}

fn validate_quantities(path: &FieldPath, range: &QuantityRange, floor: Option<&Quantity>) -> ErrorList {
    let mut errs = ErrorList::new();

    let (min, max) = match (quantity::parse(&range.min), quantity::parse(&range.max)) {
        (Ok(min), Ok(max)) => (min, max),
        (min, _) => {
            let (bound, value) = if min.is_err() {
                ("min", &range.min)
            } else {
                ("max", &range.max)
            };
            return FieldError::invalid(path.child(bound), value.0.as_str(), "cannot parse quantity")
                .into();
        }
    };

    if let Some(floor) = floor
        && quantity::compare(&range.min, floor) == Some(Ordering::Less)
    {
        errs.push(FieldError::required(
            path.child("min"),
            format!("min quantity must be greater than {}", floor.0),
        ));
    }
    if !min.is_positive() {
        errs.push(FieldError::required(
            path.child("min"),
            "min quantity must be greater than 0",
        ));
    }
    if min > max {
        errs.push(FieldError::invalid(
            path.child("max"),
            range.max.0.as_str(),
            "max quantity must be greater or equal than min quantity",
        ));
    }
    errs
}

/// Rules that relate the policies to the node sets.
fn validate_node_sets(ctx: &ValidationContext<'_>, spec: &AutoscalingSpec) -> ErrorList {
    let es = ctx.resource;
    let mut errs = ErrorList::new();

    let mut node_set_roles = Vec::with_capacity(es.spec.node_sets.len());
    for (i, node_set) in es.spec.node_sets.iter().enumerate() {
        let roles = node_set
            .node_settings()
            .map_err(|e| e.to_string())
            .and_then(|s| s.role_set().ok_or_else(|| "node.roles must be set".to_string()));
        match roles {
            Ok(roles) => {
                let mut names: Vec<String> = roles.iter().map(|r| r.as_str().to_string()).collect();
                names.sort();
                node_set_roles.push(names);
            }
            Err(reason) => {
                // the remaining rules need the roles of every node set
                errs.push(FieldError::invalid(
                    config_path(i),
                    config_value(node_set),
                    format!("cannot parse nodeSet configuration: {reason}"),
                ));
                return errs;
            }
        }
    }

    let mut autoscaled = BTreeSet::new();
    for (i, policy) in spec.policies.iter().enumerate() {
        let role_set = policy.role_set();
        let matching: Vec<usize> = node_set_roles
            .iter()
            .enumerate()
            .filter(|(_, roles)| **roles == role_set)
            .map(|(idx, _)| idx)
            .collect();
        if matching.is_empty() {
            let roles = serde_json::to_value(&policy.roles).unwrap_or(Value::Null);
            errs.push(FieldError::invalid(
                policy_path(i).child("roles"),
                roles,
                "roles must be used in at least one nodeSet",
            ));
        }
        autoscaled.extend(matching);
    }

    for (i, node_set) in es.spec.node_sets.iter().enumerate() {
        if autoscaled.contains(&i) && node_set.volume_claim_templates.len() > 1 {
            let names: Vec<String> = node_set
                .volume_claim_templates
                .iter()
                .map(|c| c.metadata.name.clone().unwrap_or_default())
                .collect();
            errs.push(FieldError::invalid(
                FieldPath::new("spec").child("nodeSets").index(i),
                names,
                UNEXPECTED_VOLUME_CLAIM_MSG,
            ));
        }
    }
    errs
}
