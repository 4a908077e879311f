//! # Control Plane Trait
//!
//! Abstract interface for the binding store the controller reconciles
//! against.
//!
//! The control plane is treated as an idempotent key-value binding store:
//! ensuring a binding that already exists is a no-op, and every operation is
//! keyed by (scope, role, member). Retry and backoff are the client's
//! concern, not this layer's.

use std::collections::BTreeSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{BindingScope, RoleMember, ServiceAccountOutputs, ServiceAccountSpec};

#[derive(Debug, Error)]
pub enum ControlPlaneError {
    /// The request was syntactically valid but refused (unknown role,
    /// nonexistent member, insufficient permission to grant)
    #[error("rejected by control plane: {reason}")]
    Rejected { reason: String },

    #[error("state io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Control plane abstraction for service accounts and role bindings
///
/// All operations are idempotent per their key; applying the same desired
/// set twice must produce no observable change.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Create the service account if absent; return its stable outputs
    ///
    /// Re-invocation with identical inputs is a no-op that returns the
    /// outputs assigned at creation time.
    async fn ensure_service_account(
        &self,
        project_id: &str,
        spec: &ServiceAccountSpec,
    ) -> Result<ServiceAccountOutputs, ControlPlaneError>;

    /// List the bindings currently held at a scope
    async fn list_bindings(
        &self,
        scope: &BindingScope,
    ) -> Result<BTreeSet<RoleMember>, ControlPlaneError>;

    /// Enumerate every scope currently holding at least one binding
    ///
    /// The reconciler sweeps these against the declared set, so a scope
    /// whose whole declaration was dropped still has its bindings revoked.
    async fn list_scopes(&self) -> Result<Vec<BindingScope>, ControlPlaneError>;

    /// Ensure a binding exists at a scope
    /// Returns true if the binding was created, false if it already existed
    async fn ensure_binding(
        &self,
        scope: &BindingScope,
        binding: &RoleMember,
    ) -> Result<bool, ControlPlaneError>;

    /// Remove a binding from a scope; removing an absent binding is a no-op
    async fn remove_binding(
        &self,
        scope: &BindingScope,
        binding: &RoleMember,
    ) -> Result<(), ControlPlaneError>;
}
