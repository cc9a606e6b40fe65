//! Shared context for the reconciler-facing adapters.
//!
//! The Context struct holds shared state passed to every adapter call:
//! the resource client, the validation settings and optional metrics.

use std::sync::Arc;

use crate::client::ResourceClient;
use crate::config::{NamespaceList, OperatorConfig};
use crate::health::HealthState;
use crate::webhooks::policies::ValidationConfig;

/// Field manager name for the operator
pub const FIELD_MANAGER: &str = "es-operator";

/// Shared context for the adapters
#[derive(Clone)]
pub struct Context {
    /// Cluster resource client
    pub client: Arc<dyn ResourceClient>,
    /// Resources in other namespaces are ignored
    pub managed_namespaces: NamespaceList,
    /// Validation settings
    pub validation: ValidationConfig,
    /// Check storage class expansion support when claims grow
    pub validate_storage_class: bool,
    /// Optional health state for metrics
    pub health_state: Option<Arc<HealthState>>,
}

impl Context {
    /// Create a new context
    pub fn new(client: Arc<dyn ResourceClient>, health_state: Option<Arc<HealthState>>) -> Self {
        Self {
            client,
            managed_namespaces: NamespaceList::default(),
            validation: ValidationConfig::default(),
            validate_storage_class: true,
            health_state,
        }
    }

    /// Create a context from the process configuration
    pub fn from_config(
        client: Arc<dyn ResourceClient>,
        config: &OperatorConfig,
        health_state: Option<Arc<HealthState>>,
    ) -> Self {
        Self {
            client,
            managed_namespaces: config.managed_namespaces.clone(),
            validation: ValidationConfig {
                exposed_node_labels: config.exposed_node_labels.clone(),
            },
            validate_storage_class: config.validate_storage_class,
            health_state,
        }
    }
}
