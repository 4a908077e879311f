//! # Binding Applier
//!
//! Reconciles one scope's normalized binding set against the control plane.
//!
//! Full-set semantics: desired-but-missing bindings are granted, observed
//! bindings no longer declared are revoked. Every binding gets its own
//! outcome; a control-plane rejection of one binding never aborts the rest
//! of the scope, and scopes never block each other.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::model::{BindingAction, BindingOutcome, BindingScope, RoleMember};
use crate::normalizer::binding_key;
use crate::provider::ControlPlane;

/// Outcomes for every binding touched at one scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeReport {
    pub scope: BindingScope,
    pub outcomes: Vec<BindingOutcome>,
}

impl ScopeReport {
    pub fn changes(&self) -> impl Iterator<Item = &BindingOutcome> {
        self.outcomes.iter().filter(|o| o.is_change())
    }

    pub fn failures(&self) -> impl Iterator<Item = &BindingOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }
}

fn outcome(binding: &RoleMember, action: BindingAction) -> BindingOutcome {
    BindingOutcome {
        key: binding_key(&binding.role, &binding.member),
        role: binding.role.clone(),
        member: binding.member.clone(),
        action,
    }
}

/// Apply the desired binding set at one scope
///
/// The observed set is listed once up front; without it, stale bindings
/// could not be revoked. If listing itself fails, every desired binding is
/// reported failed for this scope and no operation is issued.
pub async fn apply_scope(
    plane: &dyn ControlPlane,
    scope: &BindingScope,
    desired: &BTreeSet<RoleMember>,
) -> ScopeReport {
    let observed = match plane.list_bindings(scope).await {
        Ok(observed) => observed,
        Err(e) => {
            warn!(
                "Failed to list observed bindings at {}: {}",
                scope.describe(),
                e
            );
            let reason = format!("failed to list observed bindings: {e}");
            return ScopeReport {
                scope: scope.clone(),
                outcomes: desired
                    .iter()
                    .map(|binding| {
                        outcome(
                            binding,
                            BindingAction::Failed {
                                reason: reason.clone(),
                            },
                        )
                    })
                    .collect(),
            };
        }
    };

    let mut outcomes = Vec::with_capacity(desired.len());

    for binding in desired {
        let action = match plane.ensure_binding(scope, binding).await {
            Ok(true) => {
                info!(
                    "Granted {} to {} at {}",
                    binding.role,
                    binding.member,
                    scope.describe()
                );
                BindingAction::Applied
            }
            Ok(false) => BindingAction::Unchanged,
            Err(e) => {
                warn!(
                    "Failed to grant {} to {} at {}: {}",
                    binding.role,
                    binding.member,
                    scope.describe(),
                    e
                );
                BindingAction::Failed {
                    reason: e.to_string(),
                }
            }
        };
        outcomes.push(outcome(binding, action));
    }

    for stale in observed.difference(desired) {
        let action = match plane.remove_binding(scope, stale).await {
            Ok(()) => {
                info!(
                    "Revoked {} from {} at {}",
                    stale.role,
                    stale.member,
                    scope.describe()
                );
                BindingAction::Removed
            }
            Err(e) => {
                warn!(
                    "Failed to revoke {} from {} at {}: {}",
                    stale.role,
                    stale.member,
                    scope.describe(),
                    e
                );
                BindingAction::Failed {
                    reason: e.to_string(),
                }
            }
        };
        outcomes.push(outcome(stale, action));
    }

    ScopeReport {
        scope: scope.clone(),
        outcomes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryControlPlane;

    fn desired(pairs: &[(&str, &str)]) -> BTreeSet<RoleMember> {
        pairs
            .iter()
            .map(|(role, member)| RoleMember::new(*role, *member))
            .collect()
    }

    #[tokio::test]
    async fn test_apply_scope_grants_missing_bindings() {
        let plane = InMemoryControlPlane::new();
        let scope = BindingScope::project("p1");
        let set = desired(&[("roles/run.invoker", "allUsers")]);

        let report = apply_scope(&plane, &scope, &set).await;
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].action, BindingAction::Applied);
        assert_eq!(plane.bindings_at(&scope).await, set);
    }

    #[tokio::test]
    async fn test_apply_scope_second_pass_is_unchanged() {
        let plane = InMemoryControlPlane::new();
        let scope = BindingScope::project("p1");
        let set = desired(&[("roles/run.invoker", "allUsers")]);

        apply_scope(&plane, &scope, &set).await;
        let report = apply_scope(&plane, &scope, &set).await;
        assert!(report.changes().next().is_none());
        assert_eq!(report.outcomes[0].action, BindingAction::Unchanged);
    }

    #[tokio::test]
    async fn test_apply_scope_revokes_stale_bindings() {
        let plane = InMemoryControlPlane::new();
        let scope = BindingScope::project("p1");
        plane
            .seed_bindings(
                scope.clone(),
                desired(&[
                    ("roles/run.invoker", "allUsers"),
                    ("roles/viewer", "user:old@example.com"),
                ]),
            )
            .await;

        let set = desired(&[("roles/run.invoker", "allUsers")]);
        let report = apply_scope(&plane, &scope, &set).await;

        let removed: Vec<_> = report
            .outcomes
            .iter()
            .filter(|o| o.action == BindingAction::Removed)
            .collect();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].member, "user:old@example.com");
        assert_eq!(plane.bindings_at(&scope).await, set);
    }

    #[tokio::test]
    async fn test_apply_scope_rejection_does_not_block_others() {
        let plane = InMemoryControlPlane::new();
        plane.reject_role("roles/bogus").await;
        let scope = BindingScope::project("p1");
        let set = desired(&[
            ("roles/bogus", "allUsers"),
            ("roles/run.invoker", "allUsers"),
        ]);

        let report = apply_scope(&plane, &scope, &set).await;
        assert_eq!(report.failures().count(), 1);
        assert!(plane
            .bindings_at(&scope)
            .await
            .contains(&RoleMember::new("roles/run.invoker", "allUsers")));
    }
}
