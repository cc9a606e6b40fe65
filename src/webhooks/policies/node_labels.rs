//! Downward node labels validation policy.
//!
//! Tier 1 (Create and update): Always enforced
//!
//! Validates:
//! - Node labels requested through the downward node labels annotation are
//!   exposed by the operator configuration

use super::{ErrorList, FieldError, FieldPath, ValidationContext};
use crate::crd::DOWNWARD_NODE_LABELS_ANNOTATION;

const NOT_ALLOWED_NODE_LABEL_MSG: &str = "Node label not in the exposed node labels list";

/// One error per requested label that no exposed pattern matches.
pub fn validate(ctx: &ValidationContext<'_>) -> ErrorList {
    let path = FieldPath::new("metadata")
        .child("annotations")
        .child(DOWNWARD_NODE_LABELS_ANNOTATION);

    ctx.resource
        .downward_node_labels()
        .into_iter()
        .filter(|label| !ctx.config.exposed_node_labels.is_allowed(label))
        .map(|label| FieldError::invalid(path.clone(), label, NOT_ALLOWED_NODE_LABEL_MSG))
        .collect()
}
