//! Stack monitoring validation policy.
//!
//! Tier 1 (Create and update): Always enforced
//!
//! Validates:
//! - Monitoring references require a version with sidecar support
//! - Metrics and logs each ship to at most one cluster
//! - Each reference names a cluster or a connection secret

use super::{ErrorList, FieldError, FieldPath, ValidationContext};
use crate::crd::MonitoringRefs;
use crate::version::STACK_MONITORING_MIN;

const ONE_REF_MSG: &str = "Only one Elasticsearch reference is supported for Stack Monitoring";
const UNDEFINED_REF_MSG: &str = "Elasticsearch reference must have a name or a secretName";

/// Validate `spec.monitoring`.
pub fn validate(ctx: &ValidationContext<'_>) -> ErrorList {
    let es = ctx.resource;
    let mut errs = ErrorList::new();
    if !es.is_monitoring_defined() {
        return errs;
    }

    // unparseable versions are reported by the version policy
    if let Some(version) = ctx.version()
        && version.lt(&STACK_MONITORING_MIN)
    {
        errs.push(FieldError::invalid(
            FieldPath::new("spec").child("version"),
            es.spec.version.as_str(),
            format!("Unsupported version for Stack Monitoring. Required >= {STACK_MONITORING_MIN}."),
        ));
    }

    let monitoring = FieldPath::new("spec").child("monitoring");
    errs.append(validate_refs(
        &monitoring.child("metrics").child("elasticsearchRefs"),
        &es.spec.monitoring.metrics,
    ));
    errs.append(validate_refs(
        &monitoring.child("logs").child("elasticsearchRefs"),
        &es.spec.monitoring.logs,
    ));
    errs
}

fn validate_refs(path: &FieldPath, refs: &MonitoringRefs) -> ErrorList {
    let mut errs = ErrorList::new();
    if refs.elasticsearch_refs.len() > 1 {
        let value = serde_json::to_value(&refs.elasticsearch_refs).unwrap_or_default();
        errs.push(FieldError::invalid(path.clone(), value, ONE_REF_MSG));
    }
    for (i, selector) in refs.elasticsearch_refs.iter().enumerate() {
        if !selector.is_defined() {
            errs.push(FieldError::required(path.index(i), UNDEFINED_REF_MSG));
        }
    }
    errs
}
