//! Unknown field detection through the last-applied-configuration annotation.
//!
//! Tier 1 (Create and update): Always enforced
//!
//! Validates:
//! - Fields written by the user but dropped while decoding the resource
//!
//! The API server prunes unknown fields before the webhook sees the object,
//! so the only place they survive is the annotation written by
//! `kubectl apply`. It is only trusted when it describes the object under
//! review, i.e. when its decoded spec equals the submitted one.

use serde_json::Value;

use super::{ErrorList, FieldError, FieldPath, ValidationContext};
use crate::crd::{Elasticsearch, LAST_APPLIED_ANNOTATION};

const UNKNOWN_FIELD_MSG: &str = "unknown field";

/// Report fields of the last applied configuration that the resource model does not know.
pub fn validate(ctx: &ValidationContext<'_>) -> ErrorList {
    let es = ctx.resource;
    let Some(raw) = es.annotation(LAST_APPLIED_ANNOTATION) else {
        return ErrorList::new();
    };
    let Ok(raw_value) = serde_json::from_str::<Value>(raw) else {
        return ErrorList::new();
    };
    let Ok(typed) = serde_json::from_value::<Elasticsearch>(raw_value.clone()) else {
        return ErrorList::new();
    };
    if typed.spec != es.spec {
        return ErrorList::new();
    }
    let Ok(known) = serde_json::to_value(&typed) else {
        return ErrorList::new();
    };

    let mut unknown = Vec::new();
    collect_unknown(None, &raw_value, &known, &mut unknown);
    unknown
        .into_iter()
        .map(|path| FieldError::forbidden(FieldPath::new(&path), UNKNOWN_FIELD_MSG))
        .collect()
}

/// Walk `raw` alongside its re-serialized typed form and record keys the
/// typed form lost. Empty values are dropped by serialization defaults and
/// do not count.
fn collect_unknown(prefix: Option<&str>, raw: &Value, known: &Value, out: &mut Vec<String>) {
    let path_of = |key: &str| match prefix {
        Some(p) => format!("{p}.{key}"),
        None => key.to_string(),
    };

    match (raw, known) {
        (Value::Object(raw_map), Value::Object(known_map)) => {
            for (key, raw_child) in raw_map {
                match known_map.get(key) {
                    Some(known_child) => {
                        collect_unknown(Some(&path_of(key)), raw_child, known_child, out)
                    }
                    None if is_empty(raw_child) => {}
                    None => out.push(path_of(key)),
                }
            }
        }
        (Value::Array(raw_items), Value::Array(known_items)) => {
            let base = prefix.unwrap_or_default();
            for (i, (raw_item, known_item)) in raw_items.iter().zip(known_items).enumerate() {
                collect_unknown(Some(&format!("{base}[{i}]")), raw_item, known_item, out);
            }
        }
        _ => {}
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}
