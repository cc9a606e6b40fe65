//! Controller module for es-operator.
//!
//! Contains the narrow surface the reconciliation loop calls:
//! reconcile-time validation and stack monitoring, plus the shared context,
//! error handling and the loop body itself.

pub mod cluster_validation;
pub mod context;
pub mod error;
pub mod reconciler;
pub mod stackmon;

pub use cluster_validation::{invalid_status, validate_create, validate_update};
pub use context::{Context, FIELD_MANAGER};
pub use error::{Error, Result};
pub use reconciler::{error_policy, reconcile};
pub use stackmon::{reconcile_config_secrets, with_monitoring};
