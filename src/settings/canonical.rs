//! Canonical (flattened) configuration form.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};

use super::SettingsError;

/// A leaf of the canonical configuration.
///
/// Objects only survive as `Nested` inside lists, where flattening would lose
/// the element boundaries. Their own keys are flattened too.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<ConfigValue>),
    Nested(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    fn from_json(value: &Value) -> Result<Self, SettingsError> {
        Ok(match value {
            Value::Null => ConfigValue::Null,
            Value::Bool(b) => ConfigValue::Bool(*b),
            Value::Number(n) => ConfigValue::Number(n.clone()),
            Value::String(s) => ConfigValue::String(s.clone()),
            Value::Array(items) => ConfigValue::List(
                items
                    .iter()
                    .map(ConfigValue::from_json)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => {
                let mut flat = BTreeMap::new();
                flatten_into(None, map, &mut flat)?;
                ConfigValue::Nested(flat)
            }
        })
    }

    /// Interpret as a boolean. Elasticsearch accepts `"true"` and `"false"`
    /// strings for boolean settings, so do we.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            ConfigValue::String(s) => match s.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Interpret as a string (numbers and booleans are rendered).
    pub fn as_string(&self) -> Option<String> {
        match self {
            ConfigValue::String(s) => Some(s.clone()),
            ConfigValue::Bool(b) => Some(b.to_string()),
            ConfigValue::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Interpret as a list of strings. A comma-separated string is also accepted.
    pub fn as_string_list(&self) -> Option<Vec<String>> {
        match self {
            ConfigValue::List(items) => items.iter().map(ConfigValue::as_string).collect(),
            ConfigValue::String(s) if s.is_empty() => Some(Vec::new()),
            ConfigValue::String(s) => Some(s.split(',').map(|r| r.trim().to_string()).collect()),
            _ => None,
        }
    }

    /// Convert back into JSON.
    pub fn to_json(&self) -> Value {
        match self {
            ConfigValue::Null => Value::Null,
            ConfigValue::Bool(b) => Value::Bool(*b),
            ConfigValue::Number(n) => Value::Number(n.clone()),
            ConfigValue::String(s) => Value::String(s.clone()),
            ConfigValue::List(items) => Value::Array(items.iter().map(ConfigValue::to_json).collect()),
            ConfigValue::Nested(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

/// A configuration keyed by dotted paths.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CanonicalConfig(BTreeMap<String, ConfigValue>);

impl CanonicalConfig {
    /// Canonicalize a JSON configuration. `null` yields an empty config.
    pub fn from_json(value: &Value) -> Result<Self, SettingsError> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(map) => Self::from_map(map),
            _ => Err(SettingsError::NotAnObject),
        }
    }

    /// Canonicalize a JSON object.
    pub fn from_map(map: &Map<String, Value>) -> Result<Self, SettingsError> {
        let mut flat = BTreeMap::new();
        flatten_into(None, map, &mut flat)?;
        Ok(Self(flat))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over the dotted keys in lexical order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Look up a dotted key.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.0.get(key)
    }

    /// Whether any key equals `prefix` or lives below it.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.contains_key(prefix) || self.children(prefix).next().is_some()
    }

    /// Return those `candidates` that are set in this config, either directly
    /// or through a child key. `cluster.name_suffix` does not match `cluster.name`.
    pub fn has_keys(&self, candidates: &[&str]) -> Vec<String> {
        candidates
            .iter()
            .filter(|candidate| self.has_prefix(candidate))
            .map(|candidate| candidate.to_string())
            .collect()
    }

    /// Flat JSON object view (`{"a.b": 1}`).
    pub fn to_flat_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    fn children<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a String> + 'a {
        let lower = format!("{prefix}.");
        self.0
            .range(lower.clone()..)
            .map(|(k, _)| k)
            .take_while(move |k| k.starts_with(&lower))
    }
}

fn join(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(p) => format!("{p}.{key}"),
        None => key.to_string(),
    }
}

fn flatten_into(
    prefix: Option<&str>,
    map: &Map<String, Value>,
    out: &mut BTreeMap<String, ConfigValue>,
) -> Result<(), SettingsError> {
    for (key, value) in map {
        let full = join(prefix, key);
        match value {
            Value::Object(inner) if !inner.is_empty() => flatten_into(Some(&full), inner, out)?,
            Value::Object(_) => {}
            leaf => insert_leaf(out, full, ConfigValue::from_json(leaf)?)?,
        }
    }
    Ok(())
}

fn insert_leaf(
    out: &mut BTreeMap<String, ConfigValue>,
    key: String,
    value: ConfigValue,
) -> Result<(), SettingsError> {
    // an ancestor of the key is already a leaf
    for (idx, _) in key.match_indices('.') {
        if let Some(ancestor) = key.get(..idx)
            && out.contains_key(ancestor)
        {
            return Err(SettingsError::Conflict(ancestor.to_string()));
        }
    }
    // the key is already a parent of other leaves
    let child_prefix = format!("{key}.");
    if out
        .range(child_prefix.clone()..)
        .next()
        .is_some_and(|(k, _)| k.starts_with(&child_prefix))
    {
        return Err(SettingsError::Conflict(key));
    }
    match out.get(&key) {
        Some(existing) if *existing != value => Err(SettingsError::Conflict(key)),
        Some(_) => Ok(()),
        None => {
            out.insert(key, value);
            Ok(())
        }
    }
}
