//! Operator configuration, read from the environment.

use std::fmt;
use std::str::FromStr;

use envconfig::Envconfig;
use regex::Regex;

/// Process-level settings.
#[derive(Envconfig, Clone, Debug)]
pub struct OperatorConfig {
    /// Comma separated namespaces to manage. Empty means all namespaces.
    #[envconfig(from = "MANAGED_NAMESPACES", default = "")]
    pub managed_namespaces: NamespaceList,

    /// Comma separated regular expressions of node labels pods may request.
    #[envconfig(from = "EXPOSED_NODE_LABELS", default = "")]
    pub exposed_node_labels: NodeLabels,

    /// Check storage class expansion support when claims grow.
    #[envconfig(from = "VALIDATE_STORAGE_CLASS", default = "true")]
    pub validate_storage_class: bool,

    #[envconfig(from = "WEBHOOK_CERT_PATH", default = "/etc/webhook/certs/tls.crt")]
    pub webhook_cert_path: String,

    #[envconfig(from = "WEBHOOK_KEY_PATH", default = "/etc/webhook/certs/tls.key")]
    pub webhook_key_path: String,

    #[envconfig(from = "WEBHOOK_PORT", default = "9443")]
    pub webhook_port: u16,

    #[envconfig(from = "HEALTH_PORT", default = "8080")]
    pub health_port: u16,

    /// Leader election identity
    #[envconfig(from = "POD_NAME")]
    pub pod_name: Option<String>,

    #[envconfig(from = "POD_NAMESPACE")]
    pub pod_namespace: Option<String>,
}

/// Namespaces the operator is responsible for.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NamespaceList(Vec<String>);

impl NamespaceList {
    pub fn new<I, S>(namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(namespaces.into_iter().map(Into::into).collect())
    }

    /// An empty list manages every namespace.
    pub fn contains(&self, namespace: &str) -> bool {
        self.0.is_empty() || self.0.iter().any(|ns| ns == namespace)
    }

    pub fn is_all(&self) -> bool {
        self.0.is_empty()
    }

    /// The namespace when exactly one is managed.
    pub fn single(&self) -> Option<&str> {
        match self.0.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }
}

impl FromStr for NamespaceList {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(
            s.split(',')
                .map(str::trim)
                .filter(|ns| !ns.is_empty()),
        ))
    }
}

/// Allowed node label patterns. A label is allowed if some pattern matches it entirely.
#[derive(Clone, Debug, Default)]
pub struct NodeLabels(Vec<Regex>);

impl NodeLabels {
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        patterns
            .into_iter()
            .map(|p| Regex::new(&format!("^(?:{})$", p.as_ref())))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn is_allowed(&self, label: &str) -> bool {
        self.0.iter().any(|re| re.is_match(label))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for NodeLabels {
    type Err = regex::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.split(',').map(str::trim).filter(|p| !p.is_empty()))
    }
}

impl fmt::Display for NodeLabels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let patterns: Vec<&str> = self.0.iter().map(Regex::as_str).collect();
        write!(f, "{}", patterns.join(","))
    }
}
