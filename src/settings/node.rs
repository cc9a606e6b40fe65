//! Projection of the `node.*` settings relevant to role validation.

use std::fmt;
use std::str::FromStr;

use super::{CanonicalConfig, ConfigValue, SettingsError};

pub const NODE_MASTER: &str = "node.master";
pub const NODE_DATA: &str = "node.data";
pub const NODE_INGEST: &str = "node.ingest";
pub const NODE_ML: &str = "node.ml";
pub const NODE_VOTING_ONLY: &str = "node.voting_only";
pub const NODE_TRANSFORM: &str = "node.transform";
pub const NODE_REMOTE_CLUSTER_CLIENT: &str = "node.remote_cluster_client";
pub const NODE_ROLES: &str = "node.roles";

/// Elasticsearch node roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeRole {
    Master,
    Data,
    DataContent,
    DataHot,
    DataWarm,
    DataCold,
    DataFrozen,
    Ingest,
    Ml,
    VotingOnly,
    Transform,
    RemoteClusterClient,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Master => "master",
            NodeRole::Data => "data",
            NodeRole::DataContent => "data_content",
            NodeRole::DataHot => "data_hot",
            NodeRole::DataWarm => "data_warm",
            NodeRole::DataCold => "data_cold",
            NodeRole::DataFrozen => "data_frozen",
            NodeRole::Ingest => "ingest",
            NodeRole::Ml => "ml",
            NodeRole::VotingOnly => "voting_only",
            NodeRole::Transform => "transform",
            NodeRole::RemoteClusterClient => "remote_cluster_client",
        }
    }

    fn is_data_tier(&self) -> bool {
        matches!(
            self,
            NodeRole::DataContent
                | NodeRole::DataHot
                | NodeRole::DataWarm
                | NodeRole::DataCold
                | NodeRole::DataFrozen
        )
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeRole {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "master" => NodeRole::Master,
            "data" => NodeRole::Data,
            "data_content" => NodeRole::DataContent,
            "data_hot" => NodeRole::DataHot,
            "data_warm" => NodeRole::DataWarm,
            "data_cold" => NodeRole::DataCold,
            "data_frozen" => NodeRole::DataFrozen,
            "ingest" => NodeRole::Ingest,
            "ml" => NodeRole::Ml,
            "voting_only" => NodeRole::VotingOnly,
            "transform" => NodeRole::Transform,
            "remote_cluster_client" => NodeRole::RemoteClusterClient,
            other => return Err(SettingsError::UnknownRole(other.to_string())),
        })
    }
}

/// Role-related node settings. `None` means "not set by the user".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeSettings {
    pub master: Option<bool>,
    pub data: Option<bool>,
    pub ingest: Option<bool>,
    pub ml: Option<bool>,
    pub voting_only: Option<bool>,
    pub transform: Option<bool>,
    pub remote_cluster_client: Option<bool>,
    pub roles: Option<Vec<NodeRole>>,
}

impl NodeSettings {
    /// Extract node settings from a canonical config.
    pub fn from_config(config: &CanonicalConfig) -> Result<Self, SettingsError> {
        let flag = |key: &str| -> Result<Option<bool>, SettingsError> {
            match config.get(key) {
                None | Some(ConfigValue::Null) => Ok(None),
                Some(value) => value.as_bool().map(Some).ok_or(SettingsError::InvalidValue {
                    key: key.to_string(),
                    expected: "a boolean",
                }),
            }
        };

        let roles = match config.get(NODE_ROLES) {
            None | Some(ConfigValue::Null) => None,
            Some(value) => {
                let names = value.as_string_list().ok_or(SettingsError::InvalidValue {
                    key: NODE_ROLES.to_string(),
                    expected: "a list of roles",
                })?;
                Some(
                    names
                        .iter()
                        .map(|name| name.parse::<NodeRole>())
                        .collect::<Result<Vec<_>, _>>()?,
                )
            }
        };

        Ok(Self {
            master: flag(NODE_MASTER)?,
            data: flag(NODE_DATA)?,
            ingest: flag(NODE_INGEST)?,
            ml: flag(NODE_ML)?,
            voting_only: flag(NODE_VOTING_ONLY)?,
            transform: flag(NODE_TRANSFORM)?,
            remote_cluster_client: flag(NODE_REMOTE_CLUSTER_CLIENT)?,
            roles,
        })
    }

    /// Whether the node would carry `role`. With `node.roles` set this is
    /// list membership; otherwise the legacy flags apply with Elasticsearch's
    /// defaults (every role on, except `voting_only`).
    pub fn has_role(&self, role: NodeRole) -> bool {
        if let Some(roles) = &self.roles {
            return roles.contains(&role);
        }
        match role {
            NodeRole::Master => self.master.unwrap_or(true),
            NodeRole::Data => self.data.unwrap_or(true),
            r if r.is_data_tier() => self.data.unwrap_or(true),
            NodeRole::Ingest => self.ingest.unwrap_or(true),
            NodeRole::Ml => self.ml.unwrap_or(true),
            NodeRole::VotingOnly => self.voting_only.unwrap_or(false),
            NodeRole::Transform => self.transform.unwrap_or(true),
            NodeRole::RemoteClusterClient => self.remote_cluster_client.unwrap_or(true),
            _ => false,
        }
    }

    /// Whether this node is master eligible and can vote for itself.
    pub fn is_full_master(&self) -> bool {
        self.has_role(NodeRole::Master) && !self.has_role(NodeRole::VotingOnly)
    }

    /// Names of the legacy role flags explicitly set.
    pub fn legacy_role_attributes(&self) -> Vec<&'static str> {
        [
            (NODE_DATA, self.data),
            (NODE_INGEST, self.ingest),
            (NODE_MASTER, self.master),
            (NODE_ML, self.ml),
            (NODE_REMOTE_CLUSTER_CLIENT, self.remote_cluster_client),
            (NODE_TRANSFORM, self.transform),
            (NODE_VOTING_ONLY, self.voting_only),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|_| name))
        .collect()
    }

    /// Sorted, de-duplicated role set from `node.roles`.
    pub fn role_set(&self) -> Option<Vec<NodeRole>> {
        self.roles.as_ref().map(|roles| {
            let mut set = roles.clone();
            set.sort();
            set.dedup();
            set
        })
    }
}
