//! Beat configuration templates.
//!
//! Rendering is strict: a template referencing a value missing from its
//! parameters fails instead of producing an empty string.

use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use serde::Serialize;

const METRICBEAT_TEMPLATE: &str = include_str!("../../templates/metricbeat.yml");
const FILEBEAT_TEMPLATE: &str = include_str!("../../templates/filebeat.yml");
const OUTPUT_TEMPLATE: &str = include_str!("../../templates/output.yml");

pub const METRICBEAT: &str = "metricbeat.yml";
pub const FILEBEAT: &str = "filebeat.yml";

/// `index.mapping.total_fields.limit` of the monitoring indices.
pub const FIELD_LIMIT: u32 = 10000;

/// Connection to the monitoring cluster, resolved from environment variables
/// at beat startup.
#[derive(Clone, Debug, Serialize)]
pub struct OutputParams {
    pub index: usize,
    pub ca_path: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct MetricbeatParams {
    pub url: String,
    pub username: String,
    pub password: String,
    pub is_ssl: bool,
    pub ssl_path: String,
    pub ssl_mode: String,
    pub version: String,
    pub ca_volume: bool,
    pub field_limit: u32,
    pub field_limit_enabled: bool,
    pub ingest_pipeline_enabled: bool,
    pub output: OutputParams,
}

#[derive(Clone, Debug, Serialize)]
pub struct FilebeatParams {
    pub field_limit: u32,
    pub field_limit_enabled: bool,
    pub output: OutputParams,
}

fn environment() -> Result<Environment<'static>, minijinja::Error> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    // values are quoted explicitly with `tojson`
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.add_template(METRICBEAT, METRICBEAT_TEMPLATE)?;
    env.add_template(FILEBEAT, FILEBEAT_TEMPLATE)?;
    env.add_template("output.yml", OUTPUT_TEMPLATE)?;
    Ok(env)
}

/// Render the template `name` with `params`.
pub fn render<P: Serialize>(name: &str, params: &P) -> Result<String, minijinja::Error> {
    environment()?.get_template(name)?.render(params)
}
