//! Node role validation policy.
//!
//! Tier 1 (Create and update): Always enforced
//!
//! Validates:
//! - Each node set configuration can be read
//! - `node.roles` is only used from 7.9.0 on
//! - `node.roles` is not combined with the legacy `node.<role>` flags
//! - At least one node set provides voting master nodes
//!
//! When the version does not parse, the 7.9.0 gate is skipped. The version
//! policy reports that problem already.

use serde_json::Value;

use super::{ErrorList, FieldError, FieldPath, ValidationContext};
use crate::crd::{Config, NodeSet};
use crate::version::NODE_ROLES_MIN;

const CFG_INVALID_MSG: &str = "Configuration invalid";
const MASTER_REQUIRED_MSG: &str = "Elasticsearch needs to have at least one master node";
const NODE_ROLES_IN_OLD_VERSION_MSG: &str =
    "node.roles setting is not available in this version of Elasticsearch";

pub(crate) fn config_path(index: usize) -> FieldPath {
    FieldPath::new("spec")
        .child("nodeSets")
        .index(index)
        .child("config")
}

pub(crate) fn config_value(node_set: &NodeSet) -> Value {
    node_set
        .config
        .as_ref()
        .map(|Config(value)| value.clone())
        .unwrap_or(Value::Null)
}

/// Validate node roles across all node sets.
pub fn validate(ctx: &ValidationContext<'_>) -> ErrorList {
    let es = ctx.resource;
    let version = ctx.version();
    let autoscaled = es.is_autoscaling_defined();

    let mut errs = ErrorList::new();
    let mut seen_master = false;

    for (i, node_set) in es.spec.node_sets.iter().enumerate() {
        let settings = match node_set.node_settings() {
            Ok(settings) => settings,
            Err(_) => {
                errs.push(FieldError::invalid(
                    config_path(i),
                    config_value(node_set),
                    CFG_INVALID_MSG,
                ));
                continue;
            }
        };

        let too_old = version.as_ref().is_some_and(|v| v.lt(&NODE_ROLES_MIN));
        if settings.roles.is_some() && too_old {
            errs.push(FieldError::invalid(
                config_path(i),
                config_value(node_set),
                NODE_ROLES_IN_OLD_VERSION_MSG,
            ));
            continue;
        }

        let legacy = settings.legacy_role_attributes();
        let has_roles = settings.roles.as_ref().is_some_and(|r| !r.is_empty());
        if has_roles && !legacy.is_empty() {
            errs.push(FieldError::forbidden(
                config_path(i),
                format!(
                    "Detected a combination of node.roles and {}. Use only node.roles",
                    legacy.join(",")
                ),
            ));
        }

        // autoscaled node sets may not have their count set yet
        seen_master = seen_master || (settings.is_full_master() && node_set.count > 0) || autoscaled;
    }

    if !seen_master {
        errs.push(FieldError::required(
            FieldPath::new("spec").child("nodeSets"),
            MASTER_REQUIRED_MSG,
        ));
    }
    errs
}
