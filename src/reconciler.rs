//! # Reconciler
//!
//! Orchestrates one full reconciliation pass.
//!
//! ## Pass Flow
//!
//! 1. Validate the environment declaration (fail before any control-plane call)
//! 2. Ensure every declared service account (bindings reference their emails,
//!    so this completes before any apply)
//! 3. Compose: resolve `${name}` member references against factory outputs
//! 4. Normalize each scope's declarations into one deduplicated set
//! 5. Sweep observed scopes absent from the declared set against an empty
//!    desired set, so dropping a whole declaration block revokes its bindings
//! 6. Apply all scopes in parallel; each binding gets its own outcome
//! 7. Assemble the pass report
//!
//! Validation, composition and normalization errors fail the whole pass;
//! apply-time rejections are per-binding and land in the report. Because
//! every operation is idempotent, an interrupted pass needs no cleanup -
//! the next run converges to the same desired state.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::applier::{apply_scope, ScopeReport};
use crate::composition::{self, CompositionError};
use crate::config::{self, ConfigError, EnvironmentSpec};
use crate::factory;
use crate::model::{BindingScope, RoleMember, ServiceAccountOutputs};
use crate::normalizer::{self, NormalizeError};
use crate::provider::{ControlPlane, ControlPlaneError};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("configuration invalid: {0}")]
    Config(#[from] ConfigError),

    #[error("composition failed: {0}")]
    Composition(#[from] CompositionError),

    #[error("normalization failed for {scope}: {source}")]
    Normalize {
        scope: String,
        #[source]
        source: NormalizeError,
    },

    /// Service account creation and scope enumeration are prerequisites
    /// for the apply stage, so their failure fails the pass
    #[error("control plane request failed: {0}")]
    ControlPlane(#[from] ControlPlaneError),
}

/// Aggregate counts over a pass report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassSummary {
    pub applied: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Result of one reconciliation pass: every binding with its outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    pub environment: String,
    pub project_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Ensured service accounts, keyed by logical name
    pub service_accounts: BTreeMap<String, ServiceAccountOutputs>,
    pub scopes: Vec<ScopeReport>,
}

impl PassReport {
    pub fn summary(&self) -> PassSummary {
        let mut summary = PassSummary::default();
        for scope in &self.scopes {
            for outcome in &scope.outcomes {
                match outcome.action {
                    crate::model::BindingAction::Applied => summary.applied += 1,
                    crate::model::BindingAction::Unchanged => summary.unchanged += 1,
                    crate::model::BindingAction::Removed => summary.removed += 1,
                    crate::model::BindingAction::Failed { .. } => summary.failed += 1,
                }
            }
        }
        summary
    }

    /// Every outcome that is not `Unchanged`, with its scope
    pub fn changes(&self) -> Vec<(&BindingScope, &crate::model::BindingOutcome)> {
        self.scopes
            .iter()
            .flat_map(|scope| scope.changes().map(move |o| (&scope.scope, o)))
            .collect()
    }

    pub fn has_failures(&self) -> bool {
        self.summary().failed > 0
    }
}

pub struct Reconciler<'a> {
    plane: &'a dyn ControlPlane,
}

impl fmt::Debug for Reconciler<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}

impl<'a> Reconciler<'a> {
    pub fn new(plane: &'a dyn ControlPlane) -> Self {
        Self { plane }
    }

    /// Run one full compute-then-apply pass for an environment
    pub async fn reconcile(&self, spec: &EnvironmentSpec) -> Result<PassReport, ReconcileError> {
        let started_at = Utc::now();
        info!(
            "Reconciling environment '{}' in project '{}'",
            spec.environment, spec.project_id
        );

        config::validate(spec)?;

        let service_accounts =
            factory::ensure_accounts(self.plane, &spec.project_id, &spec.service_accounts).await?;

        let desired = composition::compose(spec, &service_accounts)?;

        let mut normalized: BTreeMap<BindingScope, BTreeSet<RoleMember>> = BTreeMap::new();
        for (scope, declarations) in &desired.scopes {
            let set = normalizer::normalize(declarations).map_err(|source| {
                error!("Normalization failed for {}: {}", scope.describe(), source);
                ReconcileError::Normalize {
                    scope: scope.describe(),
                    source,
                }
            })?;
            normalized.insert(scope.clone(), set);
        }

        // Full reconciliation covers scopes whose whole declaration was
        // dropped: every observed scope absent from the declared set
        // reconciles against an empty desired set, revoking its bindings
        for scope in self.plane.list_scopes().await? {
            normalized.entry(scope).or_default();
        }

        // Scopes are independent within a pass
        let scopes = join_all(
            normalized
                .iter()
                .map(|(scope, set)| apply_scope(self.plane, scope, set)),
        )
        .await;

        let report = PassReport {
            environment: spec.environment.clone(),
            project_id: spec.project_id.clone(),
            started_at,
            finished_at: Utc::now(),
            service_accounts,
            scopes,
        };

        let summary = report.summary();
        info!(
            "Reconciliation complete for '{}': {} applied, {} unchanged, {} removed, {} failed",
            spec.environment, summary.applied, summary.unchanged, summary.removed, summary.failed
        );
        Ok(report)
    }
}
