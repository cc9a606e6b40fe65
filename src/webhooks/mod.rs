//! Webhook module for validating admission requests.
//!
//! This module provides the Elasticsearch ValidatingAdmissionWebhook with tiered validation policies:
//! - Tier 1 (Create and update): Always enforced (e.g., node roles, versions, settings)
//! - Tier 2 (Update): Only on UPDATE operations (e.g., downgrades, volume claim changes)

pub mod policies;
mod server;

pub use policies::{ErrorList, FieldError, FieldPath, ValidationConfig, ValidationContext};
pub use server::{
    VALIDATE_ELASTICSEARCH_PATH, WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT, WebhookError,
    WebhookState, create_webhook_router, invalid_message, run_webhook_server,
};

// Re-export kube-rs admission types for contract testing
pub use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
