//! Node set uniqueness validation policy.
//!
//! Tier 1 (Create and update): Always enforced
//!
//! Validates:
//! - Node set names are unique within the cluster

use std::collections::BTreeSet;

use super::{ErrorList, FieldError, FieldPath, ValidationContext};

const DUPLICATE_NODE_SETS_MSG: &str = "NodeSet names must be unique";

/// One error per duplicated node set name.
pub fn validate(ctx: &ValidationContext<'_>) -> ErrorList {
    let mut seen = BTreeSet::new();
    let mut duplicates = BTreeSet::new();
    for node_set in &ctx.resource.spec.node_sets {
        if !seen.insert(node_set.name.as_str()) {
            duplicates.insert(node_set.name.as_str());
        }
    }

    duplicates
        .into_iter()
        .map(|name| {
            FieldError::invalid(
                FieldPath::new("spec").child("nodeSets"),
                name,
                DUPLICATE_NODE_SETS_MSG,
            )
        })
        .collect()
}
