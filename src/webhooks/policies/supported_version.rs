//! Version support validation policy.
//!
//! Tier 1 (Create and update): Always enforced
//!
//! Validates:
//! - `spec.version` parses as `{major}.{minor}.{patch}[-{label}]`
//! - The version lies in the range supported by the operator

use super::{ErrorList, FieldError, FieldPath, ValidationContext};
use crate::version::Version;

pub(crate) const PARSE_VERSION_MSG: &str =
    "Cannot parse Elasticsearch version. String format must be {major}.{minor}.{patch}[-{label}]";
pub(crate) const PARSE_STORED_VERSION_MSG: &str = "Cannot parse current Elasticsearch version. String format must be {major}.{minor}.{patch}[-{label}]";
pub(crate) const UNSUPPORTED_VERSION_MSG: &str = "Unsupported version";

pub(crate) fn version_path() -> FieldPath {
    FieldPath::new("spec").child("version")
}

/// Validate that the requested version is parseable and supported.
pub fn validate(ctx: &ValidationContext<'_>) -> ErrorList {
    let raw = &ctx.resource.spec.version;
    match Version::parse(raw) {
        Err(_) => FieldError::invalid(version_path(), raw.as_str(), PARSE_VERSION_MSG).into(),
        Ok(v) if !v.is_supported() => {
            FieldError::invalid(version_path(), raw.as_str(), UNSUPPORTED_VERSION_MSG).into()
        }
        Ok(_) => ErrorList::new(),
    }
}
