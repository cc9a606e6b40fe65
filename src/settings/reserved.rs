//! Settings the operator manages itself and users may not override.

use super::{CanonicalConfig, ConfigValue};

/// Settings that can never be set by the user.
pub const RESERVED_SETTINGS: &[&str] = &[
    "cluster.name",
    "cluster.initial_master_nodes",
    "discovery.zen.minimum_master_nodes",
    "network.host",
    "network.publish_host",
    "node.name",
    "xpack.security.authc.reserved_realm.enabled",
    "xpack.security.enabled",
    "xpack.security.http.ssl.enabled",
    "xpack.security.http.ssl.certificate",
    "xpack.security.http.ssl.key",
    "xpack.security.transport.ssl.enabled",
    "xpack.security.transport.ssl.certificate",
    "xpack.security.transport.ssl.key",
];

/// Transport verification mode, reserved only for the values listed below.
const TRANSPORT_VERIFICATION_MODE: &str = "xpack.security.transport.ssl.verification_mode";
const RESERVED_VERIFICATION_MODES: &[&str] = &["none"];

/// Reserved settings present in `config`, in declaration order.
pub fn reserved_keys(config: &CanonicalConfig) -> Vec<String> {
    let mut found = config.has_keys(RESERVED_SETTINGS);

    let weak_mode = config
        .get(TRANSPORT_VERIFICATION_MODE)
        .and_then(ConfigValue::as_string)
        .is_some_and(|mode| RESERVED_VERIFICATION_MODES.contains(&mode.to_lowercase().as_str()));
    if weak_mode {
        found.push(TRANSPORT_VERIFICATION_MODE.to_string());
    }
    found
}
