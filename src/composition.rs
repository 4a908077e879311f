//! # Environment Composition
//!
//! Wires service account factory outputs into binding declarations.
//!
//! Members may reference an ensured account by logical name with a
//! `${name}` placeholder (e.g. `serviceAccount:${backend}`); composition
//! substitutes the derived email. A reference to a name with no factory
//! output fails here, at configuration time, before any binding is applied -
//! a grant is never issued against a malformed or empty member.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::config::EnvironmentSpec;
use crate::model::{BindingScope, DeclaredBindings, RoleMember, ServiceAccountOutputs};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompositionError {
    #[error(
        "member '{member}' in {location} references unknown service account '{reference}'"
    )]
    UnknownServiceAccount {
        reference: String,
        member: String,
        location: String,
    },

    #[error("{location} targets unknown service account '{target}'")]
    UnknownBindingTarget { target: String, location: String },
}

/// Fully resolved desired state for one reconciliation pass:
/// every scope with its declarations, placeholders already substituted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredState {
    pub scopes: BTreeMap<BindingScope, Vec<DeclaredBindings>>,
}

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

fn placeholder_re() -> &'static Regex {
    PLACEHOLDER_RE
        .get_or_init(|| Regex::new(r"\$\{([A-Za-z0-9_-]+)\}").expect("placeholder pattern is valid"))
}

/// Substitute `${name}` references in one member with account emails
pub fn resolve_member(
    member: &str,
    accounts: &BTreeMap<String, ServiceAccountOutputs>,
    location: &str,
) -> Result<String, CompositionError> {
    let mut resolved = String::with_capacity(member.len());
    let mut last_end = 0;
    for captures in placeholder_re().captures_iter(member) {
        let whole = captures.get(0).expect("capture 0 always present");
        let name = &captures[1];
        let outputs = accounts
            .get(name)
            .ok_or_else(|| CompositionError::UnknownServiceAccount {
                reference: name.to_string(),
                member: member.to_string(),
                location: location.to_string(),
            })?;
        resolved.push_str(&member[last_end..whole.start()]);
        resolved.push_str(&outputs.email);
        last_end = whole.end();
    }
    resolved.push_str(&member[last_end..]);
    Ok(resolved)
}

fn resolve_declared(
    declared: &DeclaredBindings,
    accounts: &BTreeMap<String, ServiceAccountOutputs>,
    location: &str,
) -> Result<DeclaredBindings, CompositionError> {
    declared.try_map_members(|member| resolve_member(member, accounts, location))
}

/// Compose the full desired state for an environment
///
/// Declarations are grouped by scope, so a scope declared in several places
/// (or through both shapes) normalizes as one set. Binding order within the
/// pass carries no meaning; scopes are independent.
pub fn compose(
    spec: &EnvironmentSpec,
    accounts: &BTreeMap<String, ServiceAccountOutputs>,
) -> Result<DesiredState, CompositionError> {
    let mut scopes: BTreeMap<BindingScope, Vec<DeclaredBindings>> = BTreeMap::new();

    if let Some(declared) = &spec.project_bindings {
        let resolved = resolve_declared(declared, accounts, "projectBindings")?;
        scopes
            .entry(BindingScope::project(&spec.project_id))
            .or_default()
            .push(resolved);
    }

    for entry in &spec.service_account_bindings {
        let location = format!("serviceAccountBindings[{}]", entry.target);
        let target =
            accounts
                .get(&entry.target)
                .ok_or_else(|| CompositionError::UnknownBindingTarget {
                    target: entry.target.clone(),
                    location: location.clone(),
                })?;
        let resolved = resolve_declared(&entry.bindings, accounts, &location)?;
        scopes
            .entry(BindingScope::service_account(&spec.project_id, &target.email))
            .or_default()
            .push(resolved);
    }

    for entry in &spec.cloud_run_services {
        let location = format!("cloudRunServices[{}]", entry.name);
        let resolved = resolve_declared(&entry.bindings, accounts, &location)?;
        scopes
            .entry(BindingScope::run_service(
                &spec.project_id,
                &entry.region,
                &entry.name,
            ))
            .or_default()
            .push(resolved);
    }

    for entry in &spec.cloud_run_jobs {
        let location = format!("cloudRunJobs[{}]", entry.name);
        let resolved = resolve_declared(&entry.bindings, accounts, &location)?;
        scopes
            .entry(BindingScope::run_job(
                &spec.project_id,
                &entry.region,
                &entry.name,
            ))
            .or_default()
            .push(resolved);
    }

    Ok(DesiredState { scopes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CloudRunResourceBindings, ServiceAccountBindings};
    use crate::factory::derive_email;
    use crate::model::{MemberList, ServiceAccountSpec};

    fn outputs_for(account_id: &str, project_id: &str) -> ServiceAccountOutputs {
        let email = derive_email(account_id, project_id);
        ServiceAccountOutputs {
            name: format!("projects/{project_id}/serviceAccounts/{email}"),
            email,
            unique_id: "100000000000000001".to_string(),
        }
    }

    fn accounts() -> BTreeMap<String, ServiceAccountOutputs> {
        let mut map = BTreeMap::new();
        map.insert(
            "backend".to_string(),
            outputs_for("sagent-backend", "sagent-dev"),
        );
        map
    }

    #[test]
    fn test_resolve_member_substitutes_email() {
        let resolved =
            resolve_member("serviceAccount:${backend}", &accounts(), "projectBindings").unwrap();
        assert_eq!(
            resolved,
            "serviceAccount:sagent-backend@sagent-dev.iam.gserviceaccount.com"
        );
    }

    #[test]
    fn test_resolve_member_without_placeholder_is_unchanged() {
        let resolved = resolve_member("allUsers", &accounts(), "projectBindings").unwrap();
        assert_eq!(resolved, "allUsers");
    }

    #[test]
    fn test_resolve_member_unknown_reference_fails() {
        let err = resolve_member("serviceAccount:${missing}", &accounts(), "projectBindings")
            .unwrap_err();
        assert_eq!(
            err,
            CompositionError::UnknownServiceAccount {
                reference: "missing".to_string(),
                member: "serviceAccount:${missing}".to_string(),
                location: "projectBindings".to_string(),
            }
        );
    }

    #[test]
    fn test_compose_groups_scopes_and_resolves_members() {
        let mut roles = BTreeMap::new();
        roles.insert(
            "roles/logging.logWriter".to_string(),
            MemberList {
                members: vec!["serviceAccount:${backend}".to_string()],
            },
        );
        let spec = EnvironmentSpec {
            environment: "dev".to_string(),
            project_id: "sagent-dev".to_string(),
            service_accounts: {
                let mut map = BTreeMap::new();
                map.insert(
                    "backend".to_string(),
                    ServiceAccountSpec {
                        account_id: "sagent-backend".to_string(),
                        display_name: None,
                        description: None,
                    },
                );
                map
            },
            project_bindings: Some(DeclaredBindings::GroupedByRole(roles)),
            service_account_bindings: Vec::new(),
            cloud_run_services: vec![CloudRunResourceBindings {
                name: "sagent-web".to_string(),
                region: "europe-west1".to_string(),
                bindings: DeclaredBindings::FlatList(vec![RoleMember::new(
                    "roles/run.invoker",
                    "allUsers",
                )]),
            }],
            cloud_run_jobs: Vec::new(),
        };

        let desired = compose(&spec, &accounts()).unwrap();
        assert_eq!(desired.scopes.len(), 2);

        let project_decls = &desired.scopes[&BindingScope::project("sagent-dev")];
        let pairs = project_decls[0].flatten();
        assert_eq!(
            pairs[0].member,
            "serviceAccount:sagent-backend@sagent-dev.iam.gserviceaccount.com"
        );
    }

    #[test]
    fn test_compose_unknown_binding_target_fails() {
        let spec = EnvironmentSpec {
            environment: "dev".to_string(),
            project_id: "sagent-dev".to_string(),
            service_accounts: BTreeMap::new(),
            project_bindings: None,
            service_account_bindings: vec![ServiceAccountBindings {
                target: "frontend".to_string(),
                bindings: DeclaredBindings::FlatList(Vec::new()),
            }],
            cloud_run_services: Vec::new(),
            cloud_run_jobs: Vec::new(),
        };
        let err = compose(&spec, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, CompositionError::UnknownBindingTarget { .. }));
    }
}
