//! Admission webhook server.
//!
//! Provides HTTP endpoints for Kubernetes admission webhooks.
//!
//! To enable webhooks:
//! 1. Deploy cert-manager for TLS certificates
//! 2. Create a ValidatingWebhookConfiguration pointing at [`VALIDATE_ELASTICSEARCH_PATH`]
//! 3. Mount the TLS certificate secret to the operator pod at /etc/webhook/certs/
//!
//! The webhook server starts automatically when certificates are present.

use axum::body::Bytes;
use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::post};
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::ResourceClient;
use crate::config::{NamespaceList, OperatorConfig};
use crate::crd::Elasticsearch;
use crate::health::HealthState;
use crate::webhooks::policies::{ErrorList, UpdateEnv, ValidationConfig, validate_create, validate_update};

/// Default path to webhook TLS certificate
pub const WEBHOOK_CERT_PATH: &str = "/etc/webhook/certs/tls.crt";
/// Default path to webhook TLS private key
pub const WEBHOOK_KEY_PATH: &str = "/etc/webhook/certs/tls.key";
/// Default webhook server port
pub const WEBHOOK_PORT: u16 = 9443;

/// Path of the Elasticsearch validating webhook
pub const VALIDATE_ELASTICSEARCH_PATH: &str =
    "/validate-elasticsearch-k8s-elastic-co-v1-elasticsearch";

/// Shared state for webhook handlers
pub struct WebhookState {
    pub client: Arc<dyn ResourceClient>,
    /// Requests for other namespaces are allowed without validation
    pub managed_namespaces: NamespaceList,
    pub validation: ValidationConfig,
    pub validate_storage_class: bool,
    pub health_state: Option<Arc<HealthState>>,
}

impl WebhookState {
    pub fn new(client: Arc<dyn ResourceClient>) -> Self {
        Self {
            client,
            managed_namespaces: NamespaceList::default(),
            validation: ValidationConfig::default(),
            validate_storage_class: true,
            health_state: None,
        }
    }

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

    fn record(&self, operation: &Operation, allowed: bool) {
        if let Some(health) = &self.health_state {
            health
                .metrics
                .record_admission(&format!("{operation:?}").to_uppercase(), allowed);
        }
    }
}

/// Create a denial response with reason embedded in message.
/// kube-rs deny() only sets status.message, so we format as "[reason] message"
fn deny_with_reason<T: Resource<DynamicType = ()>>(
    request: &AdmissionRequest<T>,
    message: &str,
    reason: &str,
) -> AdmissionReview<kube::core::DynamicObject> {
    let full_message = format!("[{}] {}", reason, message);
    AdmissionResponse::from(request)
        .deny(full_message)
        .into_review()
}

/// Message of a rejected Elasticsearch resource, in the API server's wording.
pub fn invalid_message(name: &str, errs: &ErrorList) -> String {
    format!("Elasticsearch.elasticsearch.k8s.elastic.co \"{name}\" is invalid: {errs}")
}

/// Create the webhook router
pub fn create_webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(VALIDATE_ELASTICSEARCH_PATH, post(validate_elasticsearch))
        .with_state(state)
}

fn bad_request(message: String) -> (StatusCode, Json<AdmissionReview<kube::core::DynamicObject>>) {
    (
        StatusCode::BAD_REQUEST,
        Json(AdmissionResponse::invalid(message).into_review()),
    )
}

/// Validate an Elasticsearch admission webhook handler
///
/// The body is decoded here rather than by an extractor so that a review
/// whose object does not deserialize still gets an AdmissionReview answer.
async fn validate_elasticsearch(
    State(state): State<Arc<WebhookState>>,
    body: Bytes,
) -> impl IntoResponse {
    let review: AdmissionReview<Elasticsearch> = match serde_json::from_slice(&body) {
        Ok(review) => review,
        Err(e) => {
            error!(error = %e, "Failed to decode admission review");
            return bad_request(format!("Invalid AdmissionReview: {}", e));
        }
    };
    let request: AdmissionRequest<Elasticsearch> = match review.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to extract admission request");
            return bad_request(format!("Invalid AdmissionReview: {}", e));
        }
    };

    let uid = &request.uid;
    debug!(
        uid = %uid,
        operation = ?request.operation,
        namespace = ?request.namespace,
        name = %request.name,
        "Processing admission request"
    );

    // DELETE operations are always allowed
    if request.operation == Operation::Delete {
        info!(uid = %uid, "Admission request allowed (DELETE)");
        return (
            StatusCode::OK,
            Json(AdmissionResponse::from(&request).into_review()),
        );
    }

    let namespace = request.namespace.as_deref().unwrap_or_default();
    if !state.managed_namespaces.contains(namespace) {
        debug!(uid = %uid, namespace = %namespace, "Skipping validation for unmanaged namespace");
        return (
            StatusCode::OK,
            Json(AdmissionResponse::from(&request).into_review()),
        );
    }

    let Some(resource) = request.object.as_ref() else {
        error!(uid = %uid, "Missing object in request");
        return (
            StatusCode::OK,
            Json(deny_with_reason(
                &request,
                "Missing object in request",
                "InvalidRequest",
            )),
        );
    };

    let errs = match (&request.operation, request.old_object.as_ref()) {
        (Operation::Update, Some(old)) => {
            let cancel = CancellationToken::new();
            let env = UpdateEnv {
                client: state.client.as_ref(),
                validate_storage_class: state.validate_storage_class,
                config: &state.validation,
                cancel: &cancel,
            };
            validate_update(old, resource, &env).await
        }
        (Operation::Update, None) => {
            error!(uid = %uid, "Missing old object in request");
            return (
                StatusCode::OK,
                Json(deny_with_reason(
                    &request,
                    "Missing old object in request",
                    "InvalidRequest",
                )),
            );
        }
        _ => validate_create(resource, &state.validation),
    };

    if !errs.is_empty() {
        let message = invalid_message(&resource.name_any(), &errs);
        warn!(uid = %uid, errors = errs.len(), message = %message, "Admission request denied");
        state.record(&request.operation, false);
        return (
            StatusCode::OK,
            Json(deny_with_reason(&request, &message, "Invalid")),
        );
    }

    info!(uid = %uid, "Admission request allowed");
    state.record(&request.operation, true);
    (
        StatusCode::OK,
        Json(AdmissionResponse::from(&request).into_review()),
    )
}

/// Errors that can occur when running the webhook server
#[derive(Debug)]
pub enum WebhookError {
    /// TLS configuration error
    TlsConfig(String),
    /// Server error
    Server(String),
}

impl std::fmt::Display for WebhookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebhookError::TlsConfig(msg) => write!(f, "TLS configuration error: {}", msg),
            WebhookError::Server(msg) => write!(f, "Webhook server error: {}", msg),
        }
    }
}

impl std::error::Error for WebhookError {}

/// Run the webhook server with TLS
///
/// Binds to 0.0.0.0:`port` and serves the Elasticsearch validation endpoint.
/// TLS certificates are loaded from the paths specified.
///
/// # Arguments
/// * `state` - Shared handler state
/// * `cert_path` - Path to TLS certificate file (PEM format)
/// * `key_path` - Path to TLS private key file (PEM format)
/// * `port` - Listening port
pub async fn run_webhook_server(
    state: Arc<WebhookState>,
    cert_path: &str,
    key_path: &str,
    port: u16,
) -> Result<(), WebhookError> {
    use axum_server::tls_rustls::RustlsConfig;
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let app = create_webhook_router(state);

    let config = RustlsConfig::from_pem_file(PathBuf::from(cert_path), PathBuf::from(key_path))
        .await
        .map_err(|e| WebhookError::TlsConfig(e.to_string()))?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(port = port, "Webhook server listening with TLS");

    axum_server::bind_rustls(addr, config)
        .serve(app.into_make_service())
        .await
        .map_err(|e| WebhookError::Server(e.to_string()))?;

    Ok(())
}
