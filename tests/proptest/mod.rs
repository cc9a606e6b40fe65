// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for es-operator.
//!
//! Uses proptest to generate random inputs and verify invariants.

#[path = "../common/mod.rs"]
mod common;

use std::future::Future;

use proptest::prelude::*;
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;

use common::fixtures::{
    ElasticsearchBuilder, claim, cluster_with_storage, monitoring_client, node_set, stateful_set,
    storage_class,
};
use es_operator::client::InMemoryClient;
use es_operator::crd::{AutoscalingSpec, Elasticsearch};
use es_operator::resources::common::stateful_set_name;
use es_operator::settings::{CanonicalConfig, RESERVED_SETTINGS, reserved_keys};
use es_operator::stackmon::{combined_hash, metricbeat};
use es_operator::webhooks::policies::autoscaling::validate_policies;
use es_operator::webhooks::policies::{UpdateEnv, validate_create, validate_update};
use es_operator::webhooks::{ErrorList, ValidationConfig};

fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

fn update(client: &InMemoryClient, old: &Elasticsearch, new: &Elasticsearch) -> ErrorList {
    let config = ValidationConfig::default();
    let cancel = CancellationToken::new();
    let env = UpdateEnv {
        client,
        validate_storage_class: true,
        config: &config,
        cancel: &cancel,
    };
    block_on(validate_update(old, new, &env))
}

/// Strategy for versions the operator manages.
fn supported_version() -> impl Strategy<Value = (u64, u64, u64)> {
    prop_oneof![
        (Just(7u64), 0..=17u64, 0..=10u64),
        (Just(8u64), 0..=15u64, 0..=10u64),
    ]
}

/// Strategy for roles that never make a node master-eligible.
fn non_master_roles() -> impl Strategy<Value = Vec<&'static str>> {
    prop::collection::vec(
        prop_oneof![
            Just("data"),
            Just("ingest"),
            Just("ml"),
            Just("transform"),
            Just("data_hot"),
            Just("remote_cluster_client"),
        ],
        0..4,
    )
}

/// Strategy for a cluster made of arbitrary node sets.
fn any_cluster() -> impl Strategy<Value = Elasticsearch> {
    (
        supported_version(),
        prop::collection::vec(
            (
                "[a-z]{1,8}",
                0..5i32,
                prop::option::of(non_master_roles()),
                any::<bool>(),
            ),
            0..4,
        ),
    )
        .prop_map(|((major, minor, patch), sets)| {
            let mut builder =
                ElasticsearchBuilder::new("es").version(format!("{major}.{minor}.{patch}"));
            for (name, count, roles, master) in sets {
                let config = match roles {
                    Some(mut roles) => {
                        if master {
                            roles.push("master");
                        }
                        json!({ "node.roles": roles })
                    }
                    None => Value::Null,
                };
                builder = builder.node_set(node_set(&name, count, config));
            }
            builder.build()
        })
}

/// Nest the first `depth` segments of a dotted key into objects.
fn reshape(key: &str, depth: usize, value: Value) -> Value {
    let parts: Vec<&str> = key.split('.').collect();
    let depth = depth.min(parts.len() - 1);
    let mut leaf = Map::new();
    leaf.insert(parts[depth..].join("."), value);
    parts[..depth]
        .iter()
        .rev()
        .fold(Value::Object(leaf), |inner, segment| {
            let mut outer = Map::new();
            outer.insert((*segment).to_string(), inner);
            Value::Object(outer)
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Validation only depends on its input.
    #[test]
    fn validate_create_is_deterministic(es in any_cluster()) {
        let config = ValidationConfig::default();
        let first = validate_create(&es, &config);
        let second = validate_create(&es, &config);
        prop_assert_eq!(first.to_string(), second.to_string());
    }

    /// Without a master-eligible node set there is always a master error.
    #[test]
    fn master_is_required(sets in prop::collection::vec(("[a-z]{1,8}", 1..5i32, non_master_roles()), 1..4)) {
        let mut builder = ElasticsearchBuilder::new("es").version("8.1.0");
        for (name, count, roles) in sets {
            builder = builder.node_set(node_set(&name, count, json!({ "node.roles": roles })));
        }
        let errs = validate_create(&builder.build(), &ValidationConfig::default());
        prop_assert!(errs.mentions("Elasticsearch needs to have at least one master node"));
    }

    /// Reserved key detection does not depend on how the key is nested.
    #[test]
    fn reserved_detection_ignores_shape(
        index in 0..RESERVED_SETTINGS.len(),
        depth in 0usize..6,
        value in "[a-z0-9]{1,10}",
    ) {
        let key = RESERVED_SETTINGS[index];
        let flat = CanonicalConfig::from_json(&reshape(key, 0, json!(value.clone()))).unwrap();
        let nested = CanonicalConfig::from_json(&reshape(key, depth, json!(value))).unwrap();
        prop_assert_eq!(reserved_keys(&flat), vec![key.to_string()]);
        prop_assert_eq!(reserved_keys(&flat), reserved_keys(&nested));
    }

    /// Lowering the version is always rejected.
    #[test]
    fn downgrades_are_rejected(
        (major, minor, patch) in supported_version(),
        lower in prop_oneof![Just(0usize), Just(1usize), Just(2usize)],
    ) {
        let old = (major, minor + 1, patch + 1);
        let new = match lower {
            0 => (major, minor + 1, patch),
            1 => (major, minor, patch + 1),
            _ => (major - 1, minor, patch),
        };
        let old_es = ElasticsearchBuilder::new("es")
            .version(format!("{}.{}.{}", old.0, old.1, old.2))
            .node_set(common::fixtures::master_data_node_set("m", 3))
            .build();
        let new_es = ElasticsearchBuilder::new("es")
            .version(format!("{}.{}.{}", new.0, new.1, new.2))
            .node_set(common::fixtures::master_data_node_set("m", 3))
            .build();
        let errs = update(&InMemoryClient::new(), &old_es, &new_es);
        prop_assert!(errs.mentions("Downgrades are not supported"));
    }

    /// Growing the storage request on an expandable class is the only accepted claim change.
    #[test]
    fn claim_updates(current in 1u64..100, growth in 0u64..100, change_access in any::<bool>()) {
        let client = InMemoryClient::new()
            .with_storage_class(storage_class("standard", true, true))
            .with_stateful_set(stateful_set(
                &stateful_set_name("es", "m"),
                vec![claim("elasticsearch-data", &format!("{current}Gi"), Some("standard"))],
            ));
        let old = cluster_with_storage("8.1.0", &format!("{current}Gi"));
        let mut new = cluster_with_storage("8.1.0", &format!("{}Gi", current + growth));
        if change_access {
            let spec = new.spec.node_sets[0].volume_claim_templates[0].spec.as_mut().unwrap();
            spec.access_modes = Some(vec!["ReadWriteMany".to_string()]);
        }
        let errs = update(&client, &old, &new);
        prop_assert_eq!(errs.is_empty(), !change_access, "{}", errs);
    }

    /// Equal inputs give equal hashes, any changed password byte changes it.
    #[test]
    fn config_hash_is_stable_and_sensitive(password in "[a-zA-Z0-9]{8,16}", flip in 0usize..8) {
        let es = ElasticsearchBuilder::new("es").metrics_to("metrics").build();
        let cancel = CancellationToken::new();
        let hash = |password: &str| {
            let client = monitoring_client(password);
            let sidecar = block_on(metricbeat(&client, &es, &cancel)).unwrap();
            combined_hash(&[sidecar])
        };

        let first = hash(&password);
        prop_assert_eq!(&first, &hash(&password));

        let mut changed = password.into_bytes();
        changed[flip] = if changed[flip] == b'x' { b'y' } else { b'x' };
        let changed = String::from_utf8(changed).unwrap();
        prop_assert_ne!(first, hash(&changed));
    }

    /// The memory floor is exactly 2Gi, whatever the unit used.
    #[test]
    fn memory_floor_is_two_gibibytes(bytes in (1u64 << 31) - (1 << 20)..(1u64 << 31) + (1 << 20), in_kib in any::<bool>()) {
        let min = if in_kib && bytes % 1024 == 0 {
            format!("{}Ki", bytes / 1024)
        } else {
            bytes.to_string()
        };
        let spec = AutoscalingSpec::parse(
            &json!({"policies": [{
                "name": "p", "roles": ["data"],
                "resources": {
                    "nodeCount": {"min": 1, "max": 2},
                    "memory": {"min": min, "max": "64Gi"},
                },
            }]})
            .to_string(),
        )
        .unwrap();
        let errs = validate_policies(&spec);
        prop_assert_eq!(errs.is_empty(), bytes >= 1 << 31, "{}: {}", min, errs);
    }
}
