//! Admission decisions through the webhook router.

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;

use crate::common::fixtures::{
    ElasticsearchBuilder, claim, cluster_with_storage, node_set, stateful_set, storage_class,
    valid_cluster,
};
use crate::{post, post_bytes, post_to, review};
use es_operator::client::{ClientOp, InMemoryClient};
use es_operator::config::NamespaceList;
use es_operator::crd::DISABLE_DOWNGRADE_VALIDATION_ANNOTATION;
use es_operator::health::HealthState;
use es_operator::resources::common::stateful_set_name;
use es_operator::webhooks::WebhookState;

#[tokio::test]
async fn test_valid_creation_is_allowed() {
    let es = valid_cluster("7.14.0");
    let verdict = post(InMemoryClient::new(), review("CREATE", Some(&es), None)).await;
    assert_eq!(verdict.status, StatusCode::OK);
    verdict.assert_allowed();
}

#[tokio::test]
async fn test_missing_version_is_denied() {
    let es = ElasticsearchBuilder::new("es")
        .without_version()
        .node_set(node_set("m", 3, json!({"node.roles": ["master", "data"]})))
        .build();
    let verdict = post(InMemoryClient::new(), review("CREATE", Some(&es), None)).await;
    verdict.assert_denied_with("Cannot parse Elasticsearch version");
    verdict.assert_denied_with("[Invalid] Elasticsearch.elasticsearch.k8s.elastic.co \"es\" is invalid");
}

#[tokio::test]
async fn test_version_downgrade_is_denied() {
    let old = valid_cluster("7.9.1");
    let new = valid_cluster("7.9.0");
    let verdict = post(InMemoryClient::new(), review("UPDATE", Some(&new), Some(&old))).await;
    verdict.assert_denied_with("Downgrades are not supported");
}

#[tokio::test]
async fn test_downgrade_allowed_with_annotation() {
    let old = valid_cluster("7.9.1");
    let mut new = valid_cluster("7.9.0");
    new.metadata.annotations = Some(
        [(DISABLE_DOWNGRADE_VALIDATION_ANNOTATION.to_string(), "true".to_string())].into(),
    );
    let verdict = post(InMemoryClient::new(), review("UPDATE", Some(&new), Some(&old))).await;
    verdict.assert_allowed();
}

#[tokio::test]
async fn test_storage_decrease_reverting_a_mistake() {
    let old = cluster_with_storage("8.1.0", "2Gi");
    let new = cluster_with_storage("8.1.0", "1Gi");
    let sset = |storage: &str| {
        stateful_set(
            &stateful_set_name("es", "m"),
            vec![claim("elasticsearch-data", storage, Some("standard"))],
        )
    };

    // the running StatefulSet still holds the old size
    let client = InMemoryClient::new()
        .with_storage_class(storage_class("standard", true, true))
        .with_stateful_set(sset("1Gi"));
    let verdict = post(client, review("UPDATE", Some(&new), Some(&old))).await;
    verdict.assert_allowed();

    let client = InMemoryClient::new()
        .with_storage_class(storage_class("standard", true, true))
        .with_stateful_set(sset("2Gi"));
    let verdict = post(client, review("UPDATE", Some(&new), Some(&old))).await;
    verdict.assert_denied_with("decreasing storage size is not supported");
}

#[tokio::test]
async fn test_storage_increase_needs_expandable_class() {
    let old = cluster_with_storage("8.1.0", "1Gi");
    let new = cluster_with_storage("8.1.0", "5Gi");
    let client = InMemoryClient::new()
        .with_storage_class(storage_class("standard", false, true))
        .with_stateful_set(stateful_set(
            &stateful_set_name("es", "m"),
            vec![claim("elasticsearch-data", "1Gi", Some("standard"))],
        ));
    let verdict = post(client, review("UPDATE", Some(&new), Some(&old))).await;
    assert!(!verdict.allowed);

    let mut state = WebhookState::new(Arc::new(
        InMemoryClient::new()
            .with_storage_class(storage_class("standard", false, true))
            .with_stateful_set(stateful_set(
                &stateful_set_name("es", "m"),
                vec![claim("elasticsearch-data", "1Gi", Some("standard"))],
            )),
    ));
    state.validate_storage_class = false;
    post_to(state, review("UPDATE", Some(&new), Some(&old)))
        .await
        .assert_allowed();
}

#[tokio::test]
async fn test_client_errors_do_not_deny() {
    let old = cluster_with_storage("8.1.0", "2Gi");
    let new = cluster_with_storage("8.1.0", "1Gi");
    let client = InMemoryClient::new()
        .with_stateful_set(stateful_set(
            &stateful_set_name("es", "m"),
            vec![claim("elasticsearch-data", "2Gi", Some("standard"))],
        ))
        .failing(ClientOp::GetStatefulSet);
    let verdict = post(client, review("UPDATE", Some(&new), Some(&old))).await;
    verdict.assert_allowed();
}

#[tokio::test]
async fn test_delete_is_always_allowed() {
    let es = ElasticsearchBuilder::new("es").without_version().build();
    let verdict = post(InMemoryClient::new(), review("DELETE", None, Some(&es))).await;
    verdict.assert_allowed();
}

#[tokio::test]
async fn test_unmanaged_namespace_is_not_validated() {
    let es = ElasticsearchBuilder::new("es")
        .namespace("elsewhere")
        .without_version()
        .build();
    let mut state = WebhookState::new(Arc::new(InMemoryClient::new()));
    state.managed_namespaces = NamespaceList::new(["elastic"]);
    post_to(state, review("CREATE", Some(&es), None))
        .await
        .assert_allowed();
}

#[tokio::test]
async fn test_update_without_old_object_is_denied() {
    let es = valid_cluster("8.1.0");
    let verdict = post(InMemoryClient::new(), review("UPDATE", Some(&es), None)).await;
    verdict.assert_denied_with("[InvalidRequest]");
}

#[tokio::test]
async fn test_malformed_review_is_a_bad_request() {
    let verdict = post(
        InMemoryClient::new(),
        json!({"apiVersion": "admission.k8s.io/v1", "kind": "AdmissionReview"}),
    )
    .await;
    assert_eq!(verdict.status, StatusCode::BAD_REQUEST);
    assert!(!verdict.allowed);
}

#[tokio::test]
async fn test_undecodable_object_is_a_bad_request() {
    let mut body = review("CREATE", Some(&valid_cluster("8.1.0")), None);
    body["request"]["object"]["spec"]["nodeSets"][0]["count"] = json!("three");
    let verdict = post(InMemoryClient::new(), body).await;
    assert_eq!(verdict.status, StatusCode::BAD_REQUEST);
    assert!(!verdict.allowed);
    assert!(verdict.message.contains("Invalid AdmissionReview"), "{}", verdict.message);
}

#[tokio::test]
async fn test_non_json_body_is_a_bad_request() {
    let state = WebhookState::new(Arc::new(InMemoryClient::new()));
    let verdict = post_bytes(state, b"not json".to_vec()).await;
    assert_eq!(verdict.status, StatusCode::BAD_REQUEST);
    assert!(!verdict.allowed);
}

#[tokio::test]
async fn test_every_error_is_reported() {
    let es = ElasticsearchBuilder::new("es")
        .version("8.1.0")
        .node_set(node_set("data", 1, json!({"node.roles": ["data"]})))
        .node_set(node_set("data", 1, json!({"node.roles": ["data"], "cluster.name": "mine"})))
        .build();
    let verdict = post(InMemoryClient::new(), review("CREATE", Some(&es), None)).await;
    verdict.assert_denied_with("NodeSet names must be unique");
    verdict.assert_denied_with("reserved for internal use");
}

#[tokio::test]
async fn test_verdicts_are_counted() {
    let health = Arc::new(HealthState::new());
    let mut state = WebhookState::new(Arc::new(InMemoryClient::new()));
    state.health_state = Some(health.clone());
    let es = valid_cluster("8.1.0");
    post_to(state, review("CREATE", Some(&es), None))
        .await
        .assert_allowed();
    assert!(
        health
            .metrics
            .encode()
            .contains(r#"operation="CREATE",verdict="allowed""#)
    );
}
