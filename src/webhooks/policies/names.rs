//! Resource name validation policy.
//!
//! Tier 1 (Create and update): Always enforced
//!
//! Validates:
//! - The cluster name leaves room for the suffixes of generated resources
//! - Node set names are usable inside generated resource names
//! - Generated StatefulSet names `<cluster>-es-<nodeSet>` are valid DNS labels

use std::sync::LazyLock;

use kube::ResourceExt;
use regex::Regex;

use super::{ErrorList, FieldError, FieldPath, ValidationContext};
use crate::resources::common::stateful_set_name;

const INVALID_NAMES_MSG: &str = "Elasticsearch configuration would generate resources with invalid names";

/// Longest cluster name that keeps every generated name within 63 characters.
pub const MAX_CLUSTER_NAME_LENGTH: usize = 36;

/// Longest node set name.
pub const MAX_NODE_SET_NAME_LENGTH: usize = 23;

const MAX_LABEL_LENGTH: usize = 63;

static NODE_SET_NAME_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9-]+$").ok());

static DNS_LABEL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").ok());

/// Whether `value` is an RFC 1123 DNS label.
pub fn is_dns1123_label(value: &str) -> bool {
    value.len() <= MAX_LABEL_LENGTH
        && DNS_LABEL_RE
            .as_ref()
            .is_some_and(|re| re.is_match(value))
}

/// Validate generated resource names.
///
/// Only the first problem is reported.
pub fn validate(ctx: &ValidationContext<'_>) -> ErrorList {
    let es = ctx.resource;
    let name = es.name_any();

    match first_name_problem(&name, es.spec.node_sets.iter().map(|ns| ns.name.as_str())) {
        Some(problem) => FieldError::invalid(
            FieldPath::new("metadata").child("name"),
            name,
            format!("{INVALID_NAMES_MSG}: {problem}"),
        )
        .into(),
        None => ErrorList::new(),
    }
}

fn first_name_problem<'a>(
    cluster: &str,
    node_sets: impl Iterator<Item = &'a str>,
) -> Option<String> {
    if cluster.len() > MAX_CLUSTER_NAME_LENGTH {
        return Some(format!(
            "name exceeds maximum allowed length of {MAX_CLUSTER_NAME_LENGTH}"
        ));
    }

    for node_set in node_sets {
        let charset_ok = NODE_SET_NAME_RE
            .as_ref()
            .is_some_and(|re| re.is_match(node_set));
        if !charset_ok {
            return Some(format!(
                "invalid nodeSet name '{node_set}': must consist of alphanumeric characters or '-'"
            ));
        }
        if node_set.len() > MAX_NODE_SET_NAME_LENGTH {
            return Some(format!(
                "invalid nodeSet name '{node_set}': exceeds maximum allowed length of {MAX_NODE_SET_NAME_LENGTH}"
            ));
        }

        let sset = stateful_set_name(cluster, node_set);
        if !is_dns1123_label(&sset) {
            return Some(format!(
                "generated StatefulSet name '{sset}' is not a valid DNS-1123 label"
            ));
        }
    }
    None
}
