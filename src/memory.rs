//! # In-Memory Control Plane
//!
//! A fake binding store satisfying the [`ControlPlane`] contract.
//!
//! Used by the integration tests and by `iamctl plan`, which reconciles
//! against a seeded copy of the observed state so a dry run never mutates
//! anything durable. Rejection rules can be injected to exercise per-binding
//! failure isolation.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::model::{BindingScope, RoleMember, ServiceAccountOutputs, ServiceAccountSpec};
use crate::provider::{ControlPlane, ControlPlaneError};

#[derive(Debug, Default)]
struct MemoryState {
    /// Keyed by `{project_id}/{account_id}`
    accounts: BTreeMap<String, ServiceAccountOutputs>,
    bindings: BTreeMap<BindingScope, BTreeSet<RoleMember>>,
    /// Roles the fake control plane refuses to grant
    rejected_roles: BTreeSet<String>,
    next_unique_id: u64,
}

#[derive(Debug, Default)]
pub struct InMemoryControlPlane {
    state: Mutex<MemoryState>,
}

fn account_key(project_id: &str, account_id: &str) -> String {
    format!("{project_id}/{account_id}")
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a service account, as if created by an earlier pass
    pub async fn seed_account(
        &self,
        project_id: &str,
        account_id: &str,
        outputs: ServiceAccountOutputs,
    ) {
        let mut state = self.state.lock().await;
        state
            .accounts
            .insert(account_key(project_id, account_id), outputs);
    }

    /// Pre-populate observed bindings at a scope
    pub async fn seed_bindings(&self, scope: BindingScope, bindings: BTreeSet<RoleMember>) {
        let mut state = self.state.lock().await;
        state.bindings.insert(scope, bindings);
    }

    /// Make the control plane reject any grant of the given role
    pub async fn reject_role(&self, role: &str) {
        let mut state = self.state.lock().await;
        state.rejected_roles.insert(role.to_string());
    }

    /// Observed bindings at a scope (empty set if the scope holds none)
    pub async fn bindings_at(&self, scope: &BindingScope) -> BTreeSet<RoleMember> {
        let state = self.state.lock().await;
        state.bindings.get(scope).cloned().unwrap_or_default()
    }

    pub async fn service_account(
        &self,
        project_id: &str,
        account_id: &str,
    ) -> Option<ServiceAccountOutputs> {
        let state = self.state.lock().await;
        state
            .accounts
            .get(&account_key(project_id, account_id))
            .cloned()
    }
}

#[async_trait]
impl ControlPlane for InMemoryControlPlane {
    async fn ensure_service_account(
        &self,
        project_id: &str,
        spec: &ServiceAccountSpec,
    ) -> Result<ServiceAccountOutputs, ControlPlaneError> {
        let mut state = self.state.lock().await;
        let key = account_key(project_id, &spec.account_id);
        if let Some(existing) = state.accounts.get(&key) {
            return Ok(existing.clone());
        }
        state.next_unique_id += 1;
        let email = format!(
            "{}@{}.{}",
            spec.account_id,
            project_id,
            crate::constants::SERVICE_ACCOUNT_EMAIL_DOMAIN
        );
        let outputs = ServiceAccountOutputs {
            name: format!("projects/{project_id}/serviceAccounts/{email}"),
            email,
            unique_id: format!("10{:016}", state.next_unique_id),
        };
        state.accounts.insert(key, outputs.clone());
        Ok(outputs)
    }

    async fn list_bindings(
        &self,
        scope: &BindingScope,
    ) -> Result<BTreeSet<RoleMember>, ControlPlaneError> {
        let state = self.state.lock().await;
        Ok(state.bindings.get(scope).cloned().unwrap_or_default())
    }

    async fn list_scopes(&self) -> Result<Vec<BindingScope>, ControlPlaneError> {
        let state = self.state.lock().await;
        Ok(state.bindings.keys().cloned().collect())
    }

    async fn ensure_binding(
        &self,
        scope: &BindingScope,
        binding: &RoleMember,
    ) -> Result<bool, ControlPlaneError> {
        let mut state = self.state.lock().await;
        if state.rejected_roles.contains(&binding.role) {
            return Err(ControlPlaneError::Rejected {
                reason: format!("unknown role: {}", binding.role),
            });
        }
        let created = state
            .bindings
            .entry(scope.clone())
            .or_default()
            .insert(binding.clone());
        Ok(created)
    }

    async fn remove_binding(
        &self,
        scope: &BindingScope,
        binding: &RoleMember,
    ) -> Result<(), ControlPlaneError> {
        let mut state = self.state.lock().await;
        let emptied = match state.bindings.get_mut(scope) {
            Some(held) => {
                held.remove(binding);
                held.is_empty()
            }
            None => false,
        };
        // A scope with no bindings left is no longer enumerated
        if emptied {
            state.bindings.remove(scope);
        }
        Ok(())
    }
}
