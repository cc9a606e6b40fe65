//! AdmissionReview plumbing for the webhook router.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use es_operator::client::InMemoryClient;
use es_operator::crd::Elasticsearch;
use es_operator::webhooks::{VALIDATE_ELASTICSEARCH_PATH, WebhookState, create_webhook_router};

/// Verdict returned by the webhook.
#[derive(Debug)]
pub struct Verdict {
    pub status: StatusCode,
    pub allowed: bool,
    pub message: String,
}

impl Verdict {
    pub fn assert_allowed(&self) {
        assert!(self.allowed, "expected allowed, got: {}", self.message);
    }

    pub fn assert_denied_with(&self, needle: &str) {
        assert!(!self.allowed, "expected denied");
        assert!(
            self.message.contains(needle),
            "message {:?} does not contain {:?}",
            self.message,
            needle
        );
    }
}

/// Build an AdmissionReview for the Elasticsearch webhook.
pub fn review(operation: &str, object: Option<&Elasticsearch>, old: Option<&Elasticsearch>) -> Value {
    let name = object
        .or(old)
        .and_then(|es| es.metadata.name.clone())
        .unwrap_or_default();
    let namespace = object
        .or(old)
        .and_then(|es| es.metadata.namespace.clone())
        .unwrap_or_else(|| "default".to_string());
    json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
            "kind": {"group": "elasticsearch.k8s.elastic.co", "version": "v1", "kind": "Elasticsearch"},
            "resource": {"group": "elasticsearch.k8s.elastic.co", "version": "v1", "resource": "elasticsearches"},
            "name": name,
            "namespace": namespace,
            "operation": operation,
            "userInfo": {"username": "admin"},
            "object": object,
            "oldObject": old,
            "dryRun": false
        }
    })
}

/// Post `body` to the Elasticsearch webhook backed by `client`.
pub async fn post_to(state: WebhookState, body: Value) -> Verdict {
    post_bytes(state, serde_json::to_vec(&body).unwrap()).await
}

/// Post raw bytes. The answer must always be an AdmissionReview.
pub async fn post_bytes(state: WebhookState, body: Vec<u8>) -> Verdict {
    let router = create_webhook_router(Arc::new(state));
    let request = Request::post(VALIDATE_ELASTICSEARCH_PATH)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let review: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(review["kind"], "AdmissionReview");
    Verdict {
        status,
        allowed: review["response"]["allowed"].as_bool().unwrap_or(false),
        message: review["response"]["status"]["message"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
    }
}

/// Post `body` with the default webhook settings.
pub async fn post(client: InMemoryClient, body: Value) -> Verdict {
    post_to(WebhookState::new(Arc::new(client)), body).await
}
