//! Custom Resource Definitions (CRDs) for es-operator.
//!
//! - `Elasticsearch`: the cluster specification
//! - association and autoscaling annotations attached to it

mod association;
mod autoscaling;
mod elasticsearch;

pub use association::*;
pub use autoscaling::*;
pub use elasticsearch::*;
