// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Unit tests for es-operator.
//!
//! These tests run without a Kubernetes cluster and exercise the public
//! API of individual components in isolation.

#[path = "../common/mod.rs"]
mod common;

mod version_tests {
    use es_operator::version::{STACK_MONITORING_MIN, Version, supported_versions};

    #[test]
    fn test_feature_gates_read_as_comparisons() {
        let v = Version::parse("7.14.0").unwrap();
        assert!(v.gte(&STACK_MONITORING_MIN));
        assert!(Version::parse("7.13.4").unwrap().lt(&STACK_MONITORING_MIN));
    }

    #[test]
    fn test_label_does_not_affect_precedence() {
        let release = Version::parse("8.0.0").unwrap();
        let snapshot = Version::parse("8.0.0-SNAPSHOT").unwrap();
        assert_ne!(release, snapshot);
        assert!(release.gte(&snapshot) && snapshot.gte(&release));
    }

    #[test]
    fn test_supported_versions_table() {
        let range = supported_versions(&Version::new(8, 2, 0)).unwrap();
        assert!(range.contains(&Version::new(7, 17, 3)));
        assert!(!range.contains(&Version::new(7, 16, 0)));
        assert!(supported_versions(&Version::new(5, 6, 0)).is_none());
    }

    #[test]
    fn test_from_str() {
        let v: Version = "7.9.1".parse().unwrap();
        assert_eq!(v, Version::new(7, 9, 1));
        assert!("7.9".parse::<Version>().is_err());
    }
}

mod settings_tests {
    use es_operator::settings::{CanonicalConfig, NodeRole, NodeSettings, reserved_keys};
    use serde_json::json;

    #[test]
    fn test_nested_and_dotted_forms_are_equal() {
        let nested = CanonicalConfig::from_json(&json!({"cluster": {"name": "x"}})).unwrap();
        let dotted = CanonicalConfig::from_json(&json!({"cluster.name": "x"})).unwrap();
        assert_eq!(nested, dotted);
    }

    #[test]
    fn test_conflicting_keys() {
        assert!(CanonicalConfig::from_json(&json!({"a": {"b": 1}, "a.b": 2})).is_err());
        assert!(CanonicalConfig::from_json(&json!("not an object")).is_err());
    }

    #[test]
    fn test_reserved_keys() {
        let config = CanonicalConfig::from_json(&json!({
            "network": {"host": "0.0.0.0"},
            "xpack.security.transport.ssl.verification_mode": "NONE",
            "path.logs": "/logs"
        }))
        .unwrap();
        assert_eq!(
            reserved_keys(&config),
            vec![
                "network.host".to_string(),
                "xpack.security.transport.ssl.verification_mode".to_string()
            ]
        );
    }

    #[test]
    fn test_node_roles() {
        let config = CanonicalConfig::from_json(&json!({"node.roles": ["data", "ingest"]})).unwrap();
        let settings = NodeSettings::from_config(&config).unwrap();
        assert!(settings.has_role(NodeRole::Data));
        assert!(!settings.has_role(NodeRole::Master));

        let defaults = NodeSettings::from_config(&CanonicalConfig::default()).unwrap();
        assert!(defaults.has_role(NodeRole::Master));
    }

    #[test]
    fn test_unknown_role() {
        let config = CanonicalConfig::from_json(&json!({"node.roles": ["chef"]})).unwrap();
        assert!(NodeSettings::from_config(&config).is_err());
    }
}

mod quantity_tests {
    use std::cmp::Ordering;

    use es_operator::quantity::{compare, parse_str};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    #[test]
    fn test_binary_and_decimal_suffixes() {
        assert_eq!(parse_str("1Gi").unwrap(), parse_str("1024Mi").unwrap());
        assert!(parse_str("1G").unwrap().millis() < parse_str("1Gi").unwrap().millis());
        assert_eq!(parse_str("500m").unwrap().millis(), 500);
        assert!(parse_str("abc").is_err());
    }

    #[test]
    fn test_compare() {
        let a = Quantity("2Gi".to_string());
        let b = Quantity("2048Mi".to_string());
        assert_eq!(compare(&a, &b), Some(Ordering::Equal));
        assert_eq!(compare(&Quantity("1Gi".to_string()), &a), Some(Ordering::Less));
        assert_eq!(compare(&Quantity("bogus".to_string()), &a), None);
    }
}

mod crd_tests {
    use crate::common::fixtures::{ElasticsearchBuilder, valid_cluster};
    use es_operator::crd::{ElasticsearchPhase, VolumeClaimDeletePolicy};

    #[test]
    fn test_phase_default() {
        assert_eq!(ElasticsearchPhase::default(), ElasticsearchPhase::Pending);
    }

    #[test]
    fn test_delete_policy_wire_names() {
        let legacy: VolumeClaimDeletePolicy =
            serde_json::from_value(serde_json::json!("RemoveOnScaleDown")).unwrap();
        assert_eq!(legacy, VolumeClaimDeletePolicy::RemoveOnScaleDown);
        assert_eq!(
            serde_json::to_value(legacy).unwrap(),
            serde_json::json!("DeleteOnScaledownOnly")
        );
        assert!(!VolumeClaimDeletePolicy::Retain.owns_claims());
        assert_eq!(
            valid_cluster("8.1.0").delete_policy(),
            VolumeClaimDeletePolicy::RemoveOnClusterDeletion
        );
    }

    #[test]
    fn test_monitoring_enablement_needs_a_single_target() {
        let es = ElasticsearchBuilder::new("es").metrics_to("metrics").build();
        assert!(es.is_metrics_enabled());
        assert!(es.is_monitoring_defined());

        let mut two = es.clone();
        let extra = two.spec.monitoring.metrics.elasticsearch_refs[0].clone();
        two.spec.monitoring.metrics.elasticsearch_refs.push(extra);
        assert!(!two.is_metrics_enabled());
        assert!(two.is_monitoring_defined());
    }

    #[test]
    fn test_current_version_prefers_status() {
        let es = ElasticsearchBuilder::new("es")
            .version("8.2.0")
            .status_version("8.1.0")
            .build();
        assert_eq!(es.current_version(), "8.1.0");
        assert_eq!(valid_cluster("8.2.0").current_version(), "8.2.0");
    }

    #[test]
    fn test_tls_scheme() {
        assert_eq!(valid_cluster("8.1.0").spec.http.scheme(), "https");
        let plain = ElasticsearchBuilder::new("es").tls_disabled().build();
        assert_eq!(plain.spec.http.scheme(), "http");
    }
}

mod validation_tests {
    use crate::common::fixtures::{ElasticsearchBuilder, master_data_node_set, node_set, valid_cluster};
    use es_operator::webhooks::{ValidationConfig, invalid_message};
    use es_operator::webhooks::policies::validate_create;
    use serde_json::json;

    fn create(es: &es_operator::crd::Elasticsearch) -> es_operator::webhooks::ErrorList {
        validate_create(es, &ValidationConfig::default())
    }

    #[test]
    fn test_valid_cluster() {
        assert!(create(&valid_cluster("7.14.0")).is_empty());
        assert!(create(&valid_cluster("8.1.0")).is_empty());
    }

    #[test]
    fn test_errors_are_aggregated() {
        let es = ElasticsearchBuilder::new("es")
            .version("8.1.0")
            .node_set(node_set("data", 1, json!({"node.roles": ["data"], "node.name": "x"})))
            .build();
        let errs = create(&es);
        assert!(errs.len() >= 2);
        assert!(errs.mentions("at least one master node"));
        assert!(errs.mentions("reserved for internal use"));
    }

    #[test]
    fn test_duplicate_node_sets() {
        let es = ElasticsearchBuilder::new("es")
            .node_set(master_data_node_set("m", 1))
            .node_set(master_data_node_set("m", 1))
            .build();
        assert!(!create(&es).is_empty());
    }

    #[test]
    fn test_invalid_message_lists_every_error() {
        let es = ElasticsearchBuilder::new("es")
            .without_version()
            .node_set(node_set("data", 1, json!({"node.roles": ["data"]})))
            .build();
        let errs = create(&es);
        let message = invalid_message("es", &errs);
        assert!(message.starts_with("Elasticsearch.elasticsearch.k8s.elastic.co \"es\" is invalid: "));
        for err in &errs {
            assert!(message.contains(&err.to_string()));
        }
    }
}

mod pod_template_tests {
    use es_operator::resources::{ES_CONTAINER_NAME, PodTemplateBuilder};
    use k8s_openapi::api::core::v1::{Container, PodTemplateSpec, Volume};

    fn container(name: &str, image: &str) -> Container {
        Container {
            name: name.to_string(),
            image: Some(image.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_main_container_is_created() {
        let builder = PodTemplateBuilder::new(PodTemplateSpec::default(), ES_CONTAINER_NAME);
        assert_eq!(builder.main_container().unwrap().name, ES_CONTAINER_NAME);
        assert_eq!(builder.containers().len(), 1);
    }

    #[test]
    fn test_later_containers_and_volumes_win() {
        let builder = PodTemplateBuilder::new(PodTemplateSpec::default(), ES_CONTAINER_NAME)
            .with_containers([container("sidecar", "a")])
            .with_containers([container("sidecar", "b")])
            .with_volumes([Volume {
                name: "v".to_string(),
                ..Default::default()
            }])
            .with_volumes([Volume {
                name: "v".to_string(),
                ..Default::default()
            }]);
        assert_eq!(builder.containers().len(), 2);
        assert_eq!(builder.containers()[1].image.as_deref(), Some("b"));
        assert_eq!(builder.volumes().len(), 1);

        let template = builder.build();
        assert_eq!(template.spec.unwrap().containers.len(), 2);
    }
}

mod template_tests {
    use es_operator::stackmon::templates::{
        FIELD_LIMIT, FILEBEAT, FilebeatParams, OutputParams, render,
    };

    #[test]
    fn test_filebeat_output_references_indexed_env() {
        let rendered = render(
            FILEBEAT,
            &FilebeatParams {
                field_limit: FIELD_LIMIT,
                field_limit_enabled: true,
                output: OutputParams {
                    index: 0,
                    ca_path: Some("/mnt/es/0/monitoring/logs/target/ca.crt".to_string()),
                },
            },
        )
        .unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&rendered).unwrap();
        let hosts = &doc["output.elasticsearch"]["hosts"];
        assert_eq!(hosts[0].as_str(), Some("${ES_0_TARGET_URL}"));
        assert!(rendered.contains("/mnt/es/0/monitoring/logs/target/ca.crt"));
    }
}

mod config_tests {
    use std::collections::HashMap;

    use envconfig::Envconfig;
    use es_operator::OperatorConfig;

    #[test]
    fn test_defaults() {
        let config = OperatorConfig::init_from_hashmap(&HashMap::new()).unwrap();
        assert!(config.managed_namespaces.is_all());
        assert_eq!(config.webhook_port, es_operator::WEBHOOK_PORT);
        assert_eq!(config.webhook_cert_path, es_operator::WEBHOOK_CERT_PATH);
    }

    #[test]
    fn test_invalid_node_label_pattern() {
        let env = HashMap::from([("EXPOSED_NODE_LABELS".to_string(), "(".to_string())]);
        assert!(OperatorConfig::init_from_hashmap(&env).is_err());
    }
}

mod health_tests {
    use es_operator::health::Metrics;

    #[test]
    fn test_admission_counter() {
        let metrics = Metrics::new();
        metrics.record_admission("CREATE", true);
        metrics.record_admission("CREATE", true);
        let encoded = metrics.encode();
        assert!(encoded.contains(r#"es_operator_admission_requests_total{operation="CREATE",verdict="allowed"} 2"#));
    }
}
