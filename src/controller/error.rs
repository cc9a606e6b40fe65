//! Error types for the controller.
//!
//! Defines custom error types with classification for retry behavior.

use std::time::Duration;
use thiserror::Error;

use crate::settings::SettingsError;
use crate::webhooks::policies::ErrorList;

/// Error type for controller operations
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Missing required field in resource
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// The cluster specification failed validation
    #[error("Validation error: {0}")]
    Validation(ErrorList),

    /// A node set configuration could not be interpreted
    #[error("Configuration error: {0}")]
    Settings(#[from] SettingsError),

    /// A beat configuration template failed to render
    #[error("Config render error: {0}")]
    ConfigRender(#[from] minijinja::Error),

    /// Stack monitoring cannot be set up for this cluster
    #[error("{0}")]
    StackMonitoring(String),

    /// Monitoring references exist but cannot be resolved yet
    #[error("Not reconcilable: {0}")]
    NotReconcilable(String),

    /// A secret the monitoring sidecars read does not exist (yet)
    #[error("Missing secret: {0}")]
    MissingSecret(String),

    /// The operation was cancelled by the caller
    #[error("operation cancelled")]
    Cancelled,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(e)) if e.code == 404)
    }

    /// Check if this error is the not-reconcilable sentinel
    pub fn is_not_reconcilable(&self) -> bool {
        matches!(self, Error::NotReconcilable(_))
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(e) => {
                // Retry on network errors, rate limiting, and server errors
                matches!(
                    e,
                    kube::Error::Api(api_err) if api_err.code >= 500 || api_err.code == 429
                ) || matches!(e, kube::Error::Service(_))
            }
            Error::NotReconcilable(_) | Error::MissingSecret(_) | Error::ConfigRender(_) => true,
            Error::Validation(_)
            | Error::Settings(_)
            | Error::StackMonitoring(_)
            | Error::MissingField(_)
            | Error::Cancelled => false,
            Error::Serialization(_) => false,
        }
    }

    /// Get the recommended requeue duration for this error
    pub fn requeue_after(&self) -> Duration {
        if self.is_not_reconcilable() {
            // association controller is expected to catch up quickly
            Duration::from_secs(10)
        } else if self.is_retryable() {
            Duration::from_secs(30)
        } else {
            // Don't requeue for non-retryable errors
            Duration::from_secs(3600)
        }
    }
}

/// Build the 404 error returned for absent objects.
pub fn not_found(kind: &str, name: &str) -> Error {
    Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{kind} \"{name}\" not found"),
        reason: "NotFound".to_string(),
        code: 404,
    }))
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;
