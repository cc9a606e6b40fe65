//! Elasticsearch configuration handling.
//!
//! User-provided `config` blocks mix nested and dotted keys freely. Everything
//! in here works on the canonical (flattened) form so that
//! `{"cluster": {"name": "x"}}` and `{"cluster.name": "x"}` are the same thing.

mod canonical;
mod node;
mod reserved;

pub use canonical::{CanonicalConfig, ConfigValue};
pub use node::{NodeRole, NodeSettings};
pub use reserved::{RESERVED_SETTINGS, reserved_keys};

use thiserror::Error;

/// Errors produced while canonicalizing or projecting a configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// The configuration root is not a mapping
    #[error("configuration must be an object")]
    NotAnObject,

    /// Same key reachable both as a value and as a parent, or with two values
    #[error("conflicting values for setting '{0}'")]
    Conflict(String),

    /// A setting holds a value of the wrong type
    #[error("invalid value for setting '{key}': expected {expected}")]
    InvalidValue { key: String, expected: &'static str },

    /// `node.roles` contains a role Elasticsearch does not know
    #[error("unknown node role '{0}'")]
    UnknownRole(String),
}
