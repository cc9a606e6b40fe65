//! Validation policies for Elasticsearch admission webhooks.
//!
//! Policies are organized into tiers:
//! - Tier 1 (Create and update): shape of the resource, versions, roles, settings,
//!   monitoring, autoscaling, node labels and volume claim naming
//! - Tier 2 (Update): downgrades, upgrade paths, delete policy and volume claim changes
//!
//! Every policy runs and every error is collected, so that one admission
//! response reports all problems at once.

pub mod autoscaling;
pub mod delete_policy;
pub mod last_applied;
pub mod monitoring;
pub mod names;
pub mod node_labels;
pub mod node_roles;
pub mod node_sets;
pub mod reserved_settings;
pub mod san;
pub mod supported_version;
pub mod upgrade_protection;
pub mod volume_claims;

use std::fmt;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::client::ResourceClient;
use crate::config::NodeLabels;
use crate::crd::Elasticsearch;
use crate::version::Version;

/// Dotted path to a field, `spec.nodeSets[2].config`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn new(root: &str) -> Self {
        Self(root.to_string())
    }

    pub fn child(&self, name: &str) -> Self {
        Self(format!("{}.{}", self.0, name))
    }

    pub fn index(&self, index: usize) -> Self {
        Self(format!("{}[{}]", self.0, index))
    }

    pub fn key(&self, key: &str) -> Self {
        Self(format!("{}[{}]", self.0, key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Category of a field error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Invalid,
    Required,
    Forbidden,
    Duplicate,
    NotSupported,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Invalid => "Invalid value",
            ErrorKind::Required => "Required value",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::Duplicate => "Duplicate value",
            ErrorKind::NotSupported => "Unsupported value",
        }
    }
}

/// A problem with one field of the resource.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldError {
    pub kind: ErrorKind,
    pub field: FieldPath,
    pub bad_value: Option<Value>,
    pub detail: String,
}

impl FieldError {
    pub fn invalid(field: FieldPath, bad_value: impl Into<Value>, detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Invalid,
            field,
            bad_value: Some(bad_value.into()),
            detail: detail.into(),
        }
    }

    pub fn required(field: FieldPath, detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Required,
            field,
            bad_value: None,
            detail: detail.into(),
        }
    }

    pub fn forbidden(field: FieldPath, detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Forbidden,
            field,
            bad_value: None,
            detail: detail.into(),
        }
    }

    pub fn duplicate(field: FieldPath, bad_value: impl Into<Value>) -> Self {
        Self {
            kind: ErrorKind::Duplicate,
            field,
            bad_value: Some(bad_value.into()),
            detail: String::new(),
        }
    }

    pub fn not_supported(
        field: FieldPath,
        bad_value: impl Into<Value>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind: ErrorKind::NotSupported,
            field,
            bad_value: Some(bad_value.into()),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.kind.as_str())?;
        let shows_value = !matches!(self.kind, ErrorKind::Required | ErrorKind::Forbidden);
        if shows_value && let Some(value) = &self.bad_value {
            write!(f, ": {value}")?;
        }
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        Ok(())
    }
}

/// Aggregated validation errors.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ErrorList(Vec<FieldError>);

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    pub fn append(&mut self, other: ErrorList) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldError> {
        self.0.iter()
    }

    /// Whether any error detail contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.0.iter().any(|e| e.to_string().contains(needle))
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => Ok(()),
            [only] => write!(f, "{only}"),
            many => {
                let rendered: Vec<String> = many.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
        }
    }
}

impl From<FieldError> for ErrorList {
    fn from(error: FieldError) -> Self {
        Self(vec![error])
    }
}

impl FromIterator<FieldError> for ErrorList {
    fn from_iter<I: IntoIterator<Item = FieldError>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<FieldError> for ErrorList {
    fn extend<I: IntoIterator<Item = FieldError>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for ErrorList {
    type Item = FieldError;
    type IntoIter = std::vec::IntoIter<FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ErrorList {
    type Item = &'a FieldError;
    type IntoIter = std::slice::Iter<'a, FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Operator-level settings that influence validation.
#[derive(Clone, Debug, Default)]
pub struct ValidationConfig {
    /// Node labels pods may ask to see through the downward node labels annotation.
    pub exposed_node_labels: NodeLabels,
}

/// Context for validation
pub struct ValidationContext<'a> {
    /// The resource being validated
    pub resource: &'a Elasticsearch,
    /// The old resource (for UPDATE operations)
    pub old_resource: Option<&'a Elasticsearch>,
    /// Operator settings
    pub config: &'a ValidationConfig,
}

impl<'a> ValidationContext<'a> {
    /// Check if this is an UPDATE operation
    pub fn is_update(&self) -> bool {
        self.old_resource.is_some()
    }

    /// Parsed `spec.version` of the resource, if valid.
    pub fn version(&self) -> Option<Version> {
        Version::parse(&self.resource.spec.version).ok()
    }
}

/// Environment of update validation: the checks that read cluster state.
pub struct UpdateEnv<'a> {
    pub client: &'a dyn ResourceClient,
    /// Verify that the storage class allows expansion when claims grow
    pub validate_storage_class: bool,
    pub config: &'a ValidationConfig,
    pub cancel: &'a CancellationToken,
}

/// Run every policy that applies to both creates and updates.
pub fn validate_create(es: &Elasticsearch, config: &ValidationConfig) -> ErrorList {
    let ctx = ValidationContext {
        resource: es,
        old_resource: None,
        config,
    };
    run_common(&ctx)
}

/// Run every create policy on `new`, then the update-only policies.
pub async fn validate_update(
    old: &Elasticsearch,
    new: &Elasticsearch,
    env: &UpdateEnv<'_>,
) -> ErrorList {
    let ctx = ValidationContext {
        resource: new,
        old_resource: Some(old),
        config: env.config,
    };
    let mut errs = run_common(&ctx);

    // Tier 2: Update validations
    errs.append(upgrade_protection::validate_no_downgrade(&ctx));
    errs.append(upgrade_protection::validate_upgrade_path(&ctx));
    errs.append(delete_policy::validate(old, new, env).await);
    errs.append(volume_claims::validate_modification(old, new, env).await);
    errs
}

fn run_common(ctx: &ValidationContext<'_>) -> ErrorList {
    let mut errs = ErrorList::new();

    // Tier 1: always enforced
    errs.append(node_labels::validate(ctx));
    errs.append(last_applied::validate(ctx));
    errs.append(names::validate(ctx));
    errs.append(node_sets::validate(ctx));
    errs.append(node_roles::validate(ctx));
    errs.append(supported_version::validate(ctx));
    errs.append(san::validate(ctx));
    errs.append(reserved_settings::validate(ctx));
    errs.append(autoscaling::validate(ctx));
    errs.append(volume_claims::validate_naming(ctx));
    errs.append(monitoring::validate(ctx));
    errs
}
