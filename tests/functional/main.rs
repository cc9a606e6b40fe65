// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Functional tests for admission and stack monitoring.
//!
//! These tests drive the webhook router and the reconciler adapters end to
//! end WITHOUT requiring a live Kubernetes cluster. Cluster objects are
//! served by the in-memory resource client.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run specific test
//! cargo test --test functional test_valid_creation_is_allowed
//! ```
//!
//! ## Test Categories
//!
//! - **Admission tests**: AdmissionReview requests posted to the webhook router
//! - **Monitoring tests**: sidecar composition and configuration secrets
//! - **Reconcile tests**: the controller loop body against in-memory state

#[path = "../common/mod.rs"]
mod common;

mod admission;
mod admission_tests;
mod monitoring_tests;

pub use admission::*;
