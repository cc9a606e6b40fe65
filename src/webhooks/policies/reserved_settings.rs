//! Reserved settings validation policy.
//!
//! Tier 1 (Create and update): Always enforced
//!
//! Validates:
//! - Node set configurations do not set values the operator manages itself

use super::node_roles::config_path;
use super::{ErrorList, FieldError, ValidationContext};
use crate::settings::reserved_keys;

const UNSUPPORTED_CONFIG_MSG: &str =
    "Configuration setting is reserved for internal use. User-configured use is unsupported";

/// One error per reserved key found in each node set.
///
/// Configurations that cannot be canonicalized are left to the role policy.
pub fn validate(ctx: &ValidationContext<'_>) -> ErrorList {
    let mut errs = ErrorList::new();
    for (i, node_set) in ctx.resource.spec.node_sets.iter().enumerate() {
        let Ok(config) = node_set.canonical_config() else {
            continue;
        };
        errs.extend(reserved_keys(&config).into_iter().map(|key| {
            FieldError::forbidden(
                config_path(i).child(&key),
                UNSUPPORTED_CONFIG_MSG,
            )
        }));
    }
    errs
}
