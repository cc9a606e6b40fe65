//! Stack monitoring composition through the reconciler adapters.

use std::sync::Arc;

use k8s_openapi::api::core::v1::PodTemplateSpec;
use tokio_util::sync::CancellationToken;

use crate::common::fixtures::{ElasticsearchBuilder, master_data_node_set, monitoring_client, secret};
use es_operator::client::{ClientOp, InMemoryClient};
use es_operator::controller::{Context, Error, reconcile_config_secrets, with_monitoring};
use es_operator::crd::Elasticsearch;
use es_operator::resources::{ES_CONTAINER_NAME, PodTemplateBuilder};
use es_operator::stackmon::MONITORING_CONFIG_HASH_ANNOTATION;

fn builder() -> PodTemplateBuilder {
    PodTemplateBuilder::new(PodTemplateSpec::default(), ES_CONTAINER_NAME)
}

fn metrics_cluster() -> Elasticsearch {
    ElasticsearchBuilder::new("es")
        .node_set(master_data_node_set("m", 3))
        .metrics_to("metrics")
        .build()
}

fn hash_of(builder: &PodTemplateBuilder) -> String {
    builder
        .annotations()
        .and_then(|a| a.get(MONITORING_CONFIG_HASH_ANNOTATION))
        .cloned()
        .unwrap_or_default()
}

#[tokio::test]
async fn test_metricbeat_sidecar_composition() {
    let ctx = Context::new(Arc::new(monitoring_client("1234")), None);
    let cancel = CancellationToken::new();
    let out = with_monitoring(&ctx, builder(), &metrics_cluster(), &cancel)
        .await
        .unwrap();

    let sidecars: Vec<_> = out
        .containers()
        .iter()
        .filter(|c| c.name != ES_CONTAINER_NAME)
        .collect();
    assert_eq!(sidecars.len(), 1);
    assert_eq!(sidecars[0].name, "metricbeat");
    assert_eq!(
        sidecars[0].image.as_deref(),
        Some("docker.elastic.co/beats/metricbeat:8.1.0")
    );
    let mounts = sidecars[0].volume_mounts.as_ref().unwrap();
    assert_eq!(mounts.len(), 4);
    let paths: Vec<&str> = mounts.iter().map(|m| m.mount_path.as_str()).collect();
    assert!(paths.contains(&"/etc/metricbeat-config"));
    assert!(paths.contains(&"/mnt/es/monitoring/metrics/source"));
    assert!(paths.contains(&"/mnt/es/0/monitoring/metrics/target"));

    assert!(!hash_of(&out).is_empty());
    // logs are disabled, the main container is untouched
    assert!(out.main_container().unwrap().env.is_none());
}

#[tokio::test]
async fn test_password_rotation_changes_the_hash() {
    let client = Arc::new(monitoring_client("1234"));
    let ctx = Context::new(client.clone(), None);
    let cancel = CancellationToken::new();
    let es = metrics_cluster();

    let first = with_monitoring(&ctx, builder(), &es, &cancel).await.unwrap();
    client.insert_secret(secret(
        "es-es-internal-users",
        &[("elastic-internal-monitoring", "5678")],
    ));
    let second = with_monitoring(&ctx, builder(), &es, &cancel).await.unwrap();

    assert_ne!(hash_of(&first), hash_of(&second));
}

#[tokio::test]
async fn test_composition_is_idempotent() {
    let ctx = Context::new(Arc::new(monitoring_client("1234")), None);
    let cancel = CancellationToken::new();
    let es = ElasticsearchBuilder::new("es")
        .node_set(master_data_node_set("m", 3))
        .metrics_to("metrics")
        .logs_to("logs")
        .build();

    let once = with_monitoring(&ctx, builder(), &es, &cancel).await.unwrap();
    let twice = with_monitoring(&ctx, once.clone(), &es, &cancel).await.unwrap();
    assert_eq!(once, twice);

    let names: Vec<&str> = once.containers().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec![ES_CONTAINER_NAME, "metricbeat", "filebeat"]);
    let env = once.main_container().unwrap().env.as_ref().unwrap();
    assert!(env.iter().any(|e| e.name == "ES_LOG_STYLE" && e.value.as_deref() == Some("file")));
}

#[tokio::test]
async fn test_custom_image_is_rejected() {
    let ctx = Context::new(Arc::new(monitoring_client("1234")), None);
    let es = ElasticsearchBuilder::new("es")
        .image("registry.example.com/es:8.1.0")
        .node_set(master_data_node_set("m", 3))
        .metrics_to("metrics")
        .build();
    let err = with_monitoring(&ctx, builder(), &es, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StackMonitoring(_)));
    assert_eq!(err.to_string(), "stack monitoring not supported with custom image");
}

#[tokio::test]
async fn test_unresolved_association_is_a_no_op() {
    let client = Arc::new(InMemoryClient::new());
    let ctx = Context::new(client.clone(), None);
    let cancel = CancellationToken::new();
    let es = ElasticsearchBuilder::new("es")
        .node_set(master_data_node_set("m", 3))
        .unresolved_metrics_to("metrics")
        .build();

    let out = with_monitoring(&ctx, builder(), &es, &cancel).await.unwrap();
    assert_eq!(out, builder());
    reconcile_config_secrets(&ctx, &es, &cancel).await.unwrap();
    assert_eq!(client.secret_writes(), 0);
}

#[tokio::test]
async fn test_config_secrets_are_written_once() {
    let client = Arc::new(monitoring_client("1234"));
    let ctx = Context::new(client.clone(), None);
    let cancel = CancellationToken::new();
    let es = ElasticsearchBuilder::new("es")
        .node_set(master_data_node_set("m", 3))
        .metrics_to("metrics")
        .logs_to("logs")
        .build();

    reconcile_config_secrets(&ctx, &es, &cancel).await.unwrap();
    let metricbeat = client.secret("default", "es-es-metricbeat-config").unwrap();
    let filebeat = client.secret("default", "es-es-filebeat-config").unwrap();
    assert!(metricbeat.data.unwrap().contains_key("metricbeat.yml"));
    assert!(filebeat.data.unwrap().contains_key("filebeat.yml"));
    assert_eq!(client.secret_writes(), 2);

    reconcile_config_secrets(&ctx, &es, &cancel).await.unwrap();
    assert_eq!(client.secret_writes(), 2);
}

#[tokio::test]
async fn test_client_errors_bubble_up() {
    let client = Arc::new(monitoring_client("1234").failing(ClientOp::GetSecret));
    let ctx = Context::new(client, None);
    let err = with_monitoring(&ctx, builder(), &metrics_cluster(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_cancelled_composition() {
    let ctx = Context::new(Arc::new(monitoring_client("1234")), None);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = with_monitoring(&ctx, builder(), &metrics_cluster(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}
