//! # Data Model
//!
//! Core types for the binding pipeline:
//!
//! - [`BindingScope`] - the resource level at which a binding is granted
//! - [`RoleMember`] - one (role, member) pair; the unit of reconciliation
//! - [`DeclaredBindings`] - the two accepted declaration shapes
//! - [`ServiceAccountSpec`] / [`ServiceAccountOutputs`] - factory input/output
//! - [`BindingOutcome`] - per-binding result of an apply pass
//!
//! Triples are compared by structured value (scope, role, member); the string
//! key produced by the normalizer is for display and audit only.

use schemars::JsonSchema;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The resource level at which a binding is granted
///
/// A scope owns zero or more bindings; scopes are independent of each other
/// within an apply pass and may be reconciled in parallel.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum BindingScope {
    /// Project-level grant
    #[serde(rename_all = "camelCase")]
    Project { project_id: String },
    /// Grant on a service account resource (e.g. for impersonation roles)
    #[serde(rename_all = "camelCase")]
    ServiceAccount { resource_name: String },
    /// Grant on a named Cloud Run service
    #[serde(rename_all = "camelCase")]
    CloudRunService {
        project_id: String,
        region: String,
        service: String,
    },
    /// Grant on a named Cloud Run job
    #[serde(rename_all = "camelCase")]
    CloudRunJob {
        project_id: String,
        region: String,
        job: String,
    },
}

impl BindingScope {
    pub fn project(project_id: impl Into<String>) -> Self {
        Self::Project {
            project_id: project_id.into(),
        }
    }

    /// Scope for a service account, identified by its full resource path
    pub fn service_account(project_id: &str, email: &str) -> Self {
        Self::ServiceAccount {
            resource_name: format!("projects/{project_id}/serviceAccounts/{email}"),
        }
    }

    pub fn run_service(
        project_id: impl Into<String>,
        region: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self::CloudRunService {
            project_id: project_id.into(),
            region: region.into(),
            service: service.into(),
        }
    }

    pub fn run_job(
        project_id: impl Into<String>,
        region: impl Into<String>,
        job: impl Into<String>,
    ) -> Self {
        Self::CloudRunJob {
            project_id: project_id.into(),
            region: region.into(),
            job: job.into(),
        }
    }

    /// Short human-readable identifier used in logs and reports
    pub fn describe(&self) -> String {
        match self {
            Self::Project { project_id } => format!("project/{project_id}"),
            Self::ServiceAccount { resource_name } => format!("serviceAccount/{resource_name}"),
            Self::CloudRunService {
                project_id,
                region,
                service,
            } => format!("runService/{project_id}/{region}/{service}"),
            Self::CloudRunJob {
                project_id,
                region,
                job,
            } => format!("runJob/{project_id}/{region}/{job}"),
        }
    }
}

/// One declared (role, member) pair
///
/// Equality and ordering are by value; this is what makes the normalized set
/// deduplicate overlapping declarations.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct RoleMember {
    pub role: String,
    pub member: String,
}

impl RoleMember {
    pub fn new(role: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            member: member.into(),
        }
    }
}

/// Member list for the grouped-by-role declaration shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberList {
    pub members: Vec<String>,
}

/// Declared permissions for one scope, in either accepted shape
///
/// Project and service-account declarations conventionally use the
/// grouped-by-role map; Cloud Run declarations use the flat list. Both
/// shapes normalize to the identical triple set, and the same pair declared
/// through both shapes in one scope merges to a single triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum DeclaredBindings {
    /// `role -> { members: [...] }`
    GroupedByRole(BTreeMap<String, MemberList>),
    /// `[{ role, member }, ...]`
    FlatList(Vec<RoleMember>),
}

impl DeclaredBindings {
    /// Flatten either shape into explicit (role, member) pairs,
    /// in declaration order
    pub fn flatten(&self) -> Vec<RoleMember> {
        match self {
            Self::GroupedByRole(roles) => roles
                .iter()
                .flat_map(|(role, list)| {
                    list.members
                        .iter()
                        .map(move |member| RoleMember::new(role.clone(), member.clone()))
                })
                .collect(),
            Self::FlatList(pairs) => pairs.clone(),
        }
    }

    /// Apply a fallible transformation to every member, preserving shape
    pub fn try_map_members<E>(
        &self,
        mut f: impl FnMut(&str) -> Result<String, E>,
    ) -> Result<Self, E> {
        match self {
            Self::GroupedByRole(roles) => {
                let mut mapped = BTreeMap::new();
                for (role, list) in roles {
                    let members = list
                        .members
                        .iter()
                        .map(|m| f(m))
                        .collect::<Result<Vec<_>, E>>()?;
                    mapped.insert(role.clone(), MemberList { members });
                }
                Ok(Self::GroupedByRole(mapped))
            }
            Self::FlatList(pairs) => {
                let mapped = pairs
                    .iter()
                    .map(|pair| {
                        Ok(RoleMember {
                            role: pair.role.clone(),
                            member: f(&pair.member)?,
                        })
                    })
                    .collect::<Result<Vec<_>, E>>()?;
                Ok(Self::FlatList(mapped))
            }
        }
    }
}

/// Service account definition consumed by the factory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountSpec {
    /// Unique within the project; lowercase-hyphen, 6-30 characters
    pub account_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Stable outputs of an ensured service account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountOutputs {
    /// Derived deterministically from account_id and project
    pub email: String,
    /// Fully qualified resource path
    pub name: String,
    /// Assigned by the control plane at creation time, immutable thereafter
    pub unique_id: String,
}

/// What happened to one binding during an apply pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "action")]
pub enum BindingAction {
    /// Binding was missing and has been granted
    Applied,
    /// Binding was already present; no operation issued
    Unchanged,
    /// Binding was present but no longer declared; it has been revoked
    Removed,
    /// The control plane rejected this binding; unrelated bindings proceed
    #[serde(rename_all = "camelCase")]
    Failed { reason: String },
}

/// Per-binding entry in the pass report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingOutcome {
    /// Deterministic display key derived from role and sanitized member
    pub key: String,
    pub role: String,
    pub member: String,
    #[serde(flatten)]
    pub action: BindingAction,
}

impl BindingOutcome {
    pub fn is_change(&self) -> bool {
        !matches!(self.action, BindingAction::Unchanged)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.action, BindingAction::Failed { .. })
    }
}
