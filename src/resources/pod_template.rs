//! Incremental construction of Elasticsearch pod templates.
//!
//! Containers and volumes are keyed by name: adding one whose name already
//! exists replaces it in place, otherwise it is appended. Environment
//! variables of the main container follow the same rule.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, EnvVar, PodSpec, PodTemplateSpec, Volume};

/// Name of the Elasticsearch container.
pub const ES_CONTAINER_NAME: &str = "elasticsearch";

/// Builder around a pod template with a designated main container.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PodTemplateBuilder {
    pod_template: PodTemplateSpec,
    container_name: String,
}

/// Insert or replace `additions` in `items` by name.
fn merge_by_name<T>(items: &mut Vec<T>, additions: impl IntoIterator<Item = T>, name: fn(&T) -> &str) {
    for addition in additions {
        match items.iter().position(|item| name(item) == name(&addition)) {
            Some(pos) => {
                if let Some(slot) = items.get_mut(pos) {
                    *slot = addition;
                }
            }
            None => items.push(addition),
        }
    }
}

impl PodTemplateBuilder {
    /// Start from `template`, creating the main container if it is absent.
    pub fn new(template: PodTemplateSpec, container_name: &str) -> Self {
        let mut builder = Self {
            pod_template: template,
            container_name: container_name.to_string(),
        };
        let spec = builder.spec_mut();
        if !spec.containers.iter().any(|c| c.name == container_name) {
            spec.containers.insert(
                0,
                Container {
                    name: container_name.to_string(),
                    ..Default::default()
                },
            );
        }
        builder
    }

    fn spec_mut(&mut self) -> &mut PodSpec {
        self.pod_template.spec.get_or_insert_with(PodSpec::default)
    }

    fn main_container_mut(&mut self) -> Option<&mut Container> {
        let name = self.container_name.clone();
        self.spec_mut().containers.iter_mut().find(|c| c.name == name)
    }

    /// The main container.
    pub fn main_container(&self) -> Option<&Container> {
        self.containers().iter().find(|c| c.name == self.container_name)
    }

    /// All containers, main container included.
    pub fn containers(&self) -> &[Container] {
        self.pod_template
            .spec
            .as_ref()
            .map(|s| s.containers.as_slice())
            .unwrap_or_default()
    }

    pub fn volumes(&self) -> &[Volume] {
        self.pod_template
            .spec
            .as_ref()
            .and_then(|s| s.volumes.as_deref())
            .unwrap_or_default()
    }

    pub fn annotations(&self) -> Option<&BTreeMap<String, String>> {
        self.pod_template
            .metadata
            .as_ref()
            .and_then(|m| m.annotations.as_ref())
    }

    pub fn with_containers(mut self, containers: impl IntoIterator<Item = Container>) -> Self {
        merge_by_name(&mut self.spec_mut().containers, containers, |c| c.name.as_str());
        self
    }

    pub fn with_volumes(mut self, volumes: impl IntoIterator<Item = Volume>) -> Self {
        let existing = self.spec_mut().volumes.get_or_insert_with(Vec::new);
        merge_by_name(existing, volumes, |v| v.name.as_str());
        self
    }

    /// Set environment variables on the main container.
    pub fn with_env(mut self, vars: impl IntoIterator<Item = EnvVar>) -> Self {
        if let Some(container) = self.main_container_mut() {
            let env = container.env.get_or_insert_with(Vec::new);
            merge_by_name(env, vars, |e| e.name.as_str());
        }
        self
    }

    pub fn with_annotations(mut self, annotations: BTreeMap<String, String>) -> Self {
        self.pod_template
            .metadata
            .get_or_insert_with(Default::default)
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(annotations);
        self
    }

    pub fn build(self) -> PodTemplateSpec {
        self.pod_template
    }
}
