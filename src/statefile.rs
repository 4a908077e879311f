//! # State File Control Plane
//!
//! A [`ControlPlane`] backed by a JSON document on disk.
//!
//! The document records every ensured service account and the binding set
//! held at each scope. `iamctl apply` reconciles against this store and
//! persists after every mutation, so an interrupted pass leaves a state the
//! next run converges from without cleanup. `iamctl plan` loads the same
//! document into an [`InMemoryControlPlane`] copy instead.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::memory::InMemoryControlPlane;
use crate::model::{BindingScope, RoleMember, ServiceAccountOutputs, ServiceAccountSpec};
use crate::provider::{ControlPlane, ControlPlaneError};

/// One ensured service account, with the inputs it was created from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountRecord {
    pub project_id: String,
    pub spec: ServiceAccountSpec,
    pub outputs: ServiceAccountOutputs,
}

/// Binding set held at one scope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeState {
    pub scope: BindingScope,
    pub bindings: BTreeSet<RoleMember>,
}

/// On-disk document shape
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDocument {
    #[serde(default)]
    pub service_accounts: Vec<ServiceAccountRecord>,
    #[serde(default)]
    pub scopes: Vec<ScopeState>,
    #[serde(default)]
    pub next_unique_id: u64,
}

impl StateDocument {
    fn account(&self, project_id: &str, account_id: &str) -> Option<&ServiceAccountRecord> {
        self.service_accounts
            .iter()
            .find(|r| r.project_id == project_id && r.spec.account_id == account_id)
    }

    fn scope_mut(&mut self, scope: &BindingScope) -> &mut BTreeSet<RoleMember> {
        if let Some(idx) = self.scopes.iter().position(|s| s.scope == *scope) {
            return &mut self.scopes[idx].bindings;
        }
        self.scopes.push(ScopeState {
            scope: scope.clone(),
            bindings: BTreeSet::new(),
        });
        let last = self.scopes.len() - 1;
        &mut self.scopes[last].bindings
    }
}

#[derive(Debug)]
pub struct FileControlPlane {
    path: PathBuf,
    state: Mutex<StateDocument>,
}

/// Load a state document; a missing file is an empty store
pub async fn load_document(path: &Path) -> Result<StateDocument, ControlPlaneError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("State file {} not found, starting empty", path.display());
            return Ok(StateDocument::default());
        }
        Err(e) => return Err(e.into()),
    };
    let document = serde_json::from_str(&raw)?;
    Ok(document)
}

impl FileControlPlane {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, ControlPlaneError> {
        let path = path.into();
        let document = load_document(&path).await?;
        Ok(Self {
            path,
            state: Mutex::new(document),
        })
    }

    async fn persist(&self, state: &StateDocument) -> Result<(), ControlPlaneError> {
        let raw = serde_json::to_string_pretty(state)?;
        tokio::fs::write(&self.path, raw).await?;
        Ok(())
    }

    /// Copy the observed state into an in-memory store for dry runs
    pub async fn to_memory(&self) -> InMemoryControlPlane {
        let state = self.state.lock().await;
        document_to_memory(&state).await
    }
}

/// Seed an [`InMemoryControlPlane`] from a loaded state document
pub async fn document_to_memory(document: &StateDocument) -> InMemoryControlPlane {
    let memory = InMemoryControlPlane::new();
    for record in &document.service_accounts {
        memory
            .seed_account(
                &record.project_id,
                &record.spec.account_id,
                record.outputs.clone(),
            )
            .await;
    }
    for scope_state in &document.scopes {
        memory
            .seed_bindings(scope_state.scope.clone(), scope_state.bindings.clone())
            .await;
    }
    memory
}

#[async_trait]
impl ControlPlane for FileControlPlane {
    async fn ensure_service_account(
        &self,
        project_id: &str,
        spec: &ServiceAccountSpec,
    ) -> Result<ServiceAccountOutputs, ControlPlaneError> {
        let mut state = self.state.lock().await;
        if let Some(record) = state.account(project_id, &spec.account_id) {
            return Ok(record.outputs.clone());
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
        state.service_accounts.push(ServiceAccountRecord {
            project_id: project_id.to_string(),
            spec: spec.clone(),
            outputs: outputs.clone(),
        });
        self.persist(&state).await?;
        Ok(outputs)
    }

    async fn list_bindings(
        &self,
        scope: &BindingScope,
    ) -> Result<BTreeSet<RoleMember>, ControlPlaneError> {
        let state = self.state.lock().await;
        Ok(state
            .scopes
            .iter()
            .find(|s| s.scope == *scope)
            .map(|s| s.bindings.clone())
            .unwrap_or_default())
    }

    async fn list_scopes(&self) -> Result<Vec<BindingScope>, ControlPlaneError> {
        let state = self.state.lock().await;
        Ok(state.scopes.iter().map(|s| s.scope.clone()).collect())
    }

    async fn ensure_binding(
        &self,
        scope: &BindingScope,
        binding: &RoleMember,
    ) -> Result<bool, ControlPlaneError> {
        let mut state = self.state.lock().await;
        let created = state.scope_mut(scope).insert(binding.clone());
        if created {
            self.persist(&state).await?;
        }
        Ok(created)
    }

    async fn remove_binding(
        &self,
        scope: &BindingScope,
        binding: &RoleMember,
    ) -> Result<(), ControlPlaneError> {
        let mut state = self.state.lock().await;
        let removed = state
            .scopes
            .iter_mut()
            .find(|s| s.scope == *scope)
            .is_some_and(|s| s.bindings.remove(binding));
        if removed {
            // A scope with no bindings left is no longer recorded
            state.scopes.retain(|s| !s.bindings.is_empty());
            self.persist(&state).await?;
        }
        Ok(())
    }
}
