//! Resource generation module.
//!
//! Contains utilities for generating Kubernetes resources owned by an
//! Elasticsearch cluster.
//!
//! ## Resources Generated
//!
//! | Resource | Purpose |
//! |----------|---------|
//! | Pod template | Elasticsearch pods, augmented with monitoring sidecars |
//! | Secret | Rendered beat configuration |

pub mod common;
pub mod pod_template;

// Re-export commonly used items from common
pub use common::{owner_reference, standard_labels};
pub use pod_template::{ES_CONTAINER_NAME, PodTemplateBuilder};
