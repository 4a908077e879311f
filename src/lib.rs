//! IAM Binding Controller Library
//!
//! This library provides the core functionality for the IAM Binding Controller:
//! a desired-state reconciler that turns per-environment permission
//! declarations into the exact set of IAM role bindings held at each scope
//! (project, service account, Cloud Run service, Cloud Run job).
//!
//! Tests for pure logic are included in the module files (e.g., normalizer.rs);
//! reconciliation behavior is covered by the integration tests under `tests/`.

pub mod applier;
pub mod composition;
pub mod config;
pub mod constants;
pub mod factory;
pub mod memory;
pub mod model;
pub mod normalizer;
pub mod provider;
pub mod reconciler;
pub mod statefile;
pub mod telemetry;

pub use config::EnvironmentSpec;
pub use memory::InMemoryControlPlane;
pub use model::{BindingScope, DeclaredBindings, RoleMember, ServiceAccountSpec};
pub use provider::ControlPlane;
pub use reconciler::{PassReport, Reconciler};
pub use statefile::FileControlPlane;
