//! Subject alternative name validation policy.
//!
//! Tier 1 (Create and update): Always enforced
//!
//! Validates:
//! - IP entries of the self-signed HTTP certificate are IP addresses

use std::net::IpAddr;

use super::{ErrorList, FieldError, FieldPath, ValidationContext};

const INVALID_SAN_IP_MSG: &str = "Invalid SAN IP address. Must be a valid IPv4 address";

/// Validate the IP subject alternative names of the self-signed certificate.
pub fn validate(ctx: &ValidationContext<'_>) -> ErrorList {
    let Some(self_signed) = &ctx.resource.spec.http.tls.self_signed_certificate else {
        return ErrorList::new();
    };
    let path = FieldPath::new("spec")
        .child("http")
        .child("tls")
        .child("selfSignedCertificate")
        .child("subjectAltNames");

    self_signed
        .subject_alt_names
        .iter()
        .filter_map(|san| san.ip.as_deref())
        .filter(|ip| !ip.is_empty() && ip.parse::<IpAddr>().is_err())
        .map(|ip| FieldError::invalid(path.clone(), ip, INVALID_SAN_IP_MSG))
        .collect()
}
