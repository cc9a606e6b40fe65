//! Upgrade protection validation policy.
//!
//! Tier 2 (Update): Only enforced on UPDATE operations
//!
//! Validates:
//! - The version is never lowered, unless the downgrade validation annotation opts out
//! - The cluster can reach the new version from the one it currently runs
//!
//! The running version is taken from `status.version`, which the operator
//! maintains as the lowest version deployed. Before the first status update
//! the previous `spec.version` stands in for it.

use super::supported_version::{
    PARSE_STORED_VERSION_MSG, PARSE_VERSION_MSG, UNSUPPORTED_VERSION_MSG, version_path,
};
use super::{ErrorList, FieldError, FieldPath, ValidationContext};
use crate::crd::Elasticsearch;
use crate::version::{Version, supported_versions};

const NO_DOWNGRADES_MSG: &str = "Downgrades are not supported";
const UNSUPPORTED_UPGRADE_MSG: &str = "Unsupported version upgrade path. Check the Elasticsearch documentation for supported upgrade paths.";

/// Reject lowering `spec.version`.
pub fn validate_no_downgrade(ctx: &ValidationContext<'_>) -> ErrorList {
    let Some(old) = ctx.old_resource else {
        return ErrorList::new();
    };
    let new = ctx.resource;
    if new.is_downgrade_validation_disabled() {
        return ErrorList::new();
    }

    let mut errs = ErrorList::new();
    let current = Version::parse(&old.spec.version);
    if current.is_err() {
        errs.push(FieldError::invalid(
            version_path(),
            old.spec.version.as_str(),
            PARSE_STORED_VERSION_MSG,
        ));
    }
    let proposed = Version::parse(&new.spec.version);
    if proposed.is_err() {
        errs.push(FieldError::invalid(
            version_path(),
            new.spec.version.as_str(),
            PARSE_VERSION_MSG,
        ));
    }

    if let (Ok(current), Ok(proposed)) = (current, proposed)
        && proposed.lt(&current)
    {
        errs.push(FieldError::invalid(
            version_path(),
            new.spec.version.as_str(),
            NO_DOWNGRADES_MSG,
        ));
    }
    errs
}

/// Reject version changes the running cluster cannot perform.
pub fn validate_upgrade_path(ctx: &ValidationContext<'_>) -> ErrorList {
    let Some(old) = ctx.old_resource else {
        return ErrorList::new();
    };
    let new = ctx.resource;

    let mut errs = ErrorList::new();
    let current = running_version(old);
    if let Err(e) = &current {
        errs.push(e.clone());
    }
    let proposed = Version::parse(&new.spec.version);
    if proposed.is_err() {
        errs.push(FieldError::invalid(
            version_path(),
            new.spec.version.as_str(),
            PARSE_VERSION_MSG,
        ));
    }
    let (Ok(current), Ok(proposed)) = (current, proposed) else {
        return errs;
    };

    match supported_versions(&proposed) {
        None => errs.push(FieldError::invalid(
            version_path(),
            new.spec.version.as_str(),
            UNSUPPORTED_VERSION_MSG,
        )),
        Some(range) if !range.contains(&current) => errs.push(FieldError::invalid(
            version_path(),
            new.spec.version.as_str(),
            UNSUPPORTED_UPGRADE_MSG,
        )),
        Some(_) => {}
    }
    errs
}

/// Version the cluster currently runs, with the field blamed on parse failure.
fn running_version(old: &Elasticsearch) -> Result<Version, FieldError> {
    match old
        .status
        .as_ref()
        .and_then(|s| s.version.as_deref())
        .filter(|v| !v.is_empty())
    {
        Some(status_version) => Version::parse(status_version).map_err(|_| {
            FieldError::invalid(
                FieldPath::new("status").child("version"),
                status_version,
                PARSE_STORED_VERSION_MSG,
            )
        }),
        None => Version::parse(&old.spec.version).map_err(|_| {
            FieldError::invalid(
                version_path(),
                old.spec.version.as_str(),
                PARSE_STORED_VERSION_MSG,
            )
        }),
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::get_unwrap
)]
mod tests {
    use super::*;
    use crate::crd::{DISABLE_DOWNGRADE_VALIDATION_ANNOTATION, ElasticsearchStatus};
    use crate::webhooks::policies::ValidationConfig;
    use crate::webhooks::policies::fixtures::{annotate, valid_es};

    fn with_status_version(mut es: Elasticsearch, version: &str) -> Elasticsearch {
        es.status = Some(ElasticsearchStatus {
            version: Some(version.to_string()),
            ..Default::default()
        });
        es
    }

    fn run(
        old: &Elasticsearch,
        new: &Elasticsearch,
        policy: fn(&ValidationContext<'_>) -> ErrorList,
    ) -> ErrorList {
        let config = ValidationConfig::default();
        policy(&ValidationContext {
            resource: new,
            old_resource: Some(old),
            config: &config,
        })
    }

    #[test]
    fn test_no_downgrade() {
        let errs = run(&valid_es("7.14.0"), &valid_es("7.13.0"), validate_no_downgrade);
        assert_eq!(
            errs.to_string(),
            r#"spec.version: Invalid value: "7.13.0": Downgrades are not supported"#
        );
    }

    #[test]
    fn test_upgrade_and_same_version_allowed() {
        let old = valid_es("7.14.0");
        assert!(run(&old, &valid_es("7.14.0"), validate_no_downgrade).is_empty());
        assert!(run(&old, &valid_es("7.15.1"), validate_no_downgrade).is_empty());
    }

    #[test]
    fn test_downgrade_opt_out() {
        let new = annotate(valid_es("7.13.0"), DISABLE_DOWNGRADE_VALIDATION_ANNOTATION, "true");
        assert!(run(&valid_es("7.14.0"), &new, validate_no_downgrade).is_empty());
    }

    #[test]
    fn test_stored_version_unparseable() {
        let errs = run(&valid_es("garbage"), &valid_es("7.14.0"), validate_no_downgrade);
        assert_eq!(errs.len(), 1);
        assert!(errs.mentions(PARSE_STORED_VERSION_MSG));
    }

    #[test]
    fn test_upgrade_path_from_status() {
        // spec already moved on, but the cluster still runs 7.16
        let old = with_status_version(valid_es("7.17.0"), "7.16.0");
        let errs = run(&old, &valid_es("8.0.0"), validate_upgrade_path);
        assert_eq!(
            errs.to_string(),
            format!(r#"spec.version: Invalid value: "8.0.0": {UNSUPPORTED_UPGRADE_MSG}"#)
        );

        let old = with_status_version(valid_es("7.17.0"), "7.17.0");
        assert!(run(&old, &valid_es("8.0.0"), validate_upgrade_path).is_empty());
    }

    #[test]
    fn test_upgrade_path_from_spec_without_status() {
        let errs = run(&valid_es("7.16.0"), &valid_es("8.1.0"), validate_upgrade_path);
        assert!(errs.mentions("Unsupported version upgrade path"));
    }

    #[test]
    fn test_upgrade_path_unsupported_target() {
        let errs = run(&valid_es("8.1.0"), &valid_es("10.0.0"), validate_upgrade_path);
        assert_eq!(
            errs.to_string(),
            r#"spec.version: Invalid value: "10.0.0": Unsupported version"#
        );
    }

    #[test]
    fn test_bad_status_version_blamed_on_status() {
        let old = with_status_version(valid_es("7.14.0"), "7.x");
        let errs = run(&old, &valid_es("7.15.0"), validate_upgrade_path);
        let err = errs.iter().next().unwrap();
        assert_eq!(err.field.as_str(), "status.version");
        assert_eq!(err.detail, PARSE_STORED_VERSION_MSG);
    }
}
