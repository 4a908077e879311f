//! Common test fixtures for reconciliation tests
//!
//! Provides a representative environment declaration: two service accounts,
//! project bindings in grouped-by-role shape, and Cloud Run bindings in
//! flat-list shape, with members referencing factory outputs.

use std::collections::BTreeMap;

use iam_binding_controller::config::{CloudRunResourceBindings, ServiceAccountBindings};
use iam_binding_controller::model::{MemberList, RoleMember};
use iam_binding_controller::{DeclaredBindings, EnvironmentSpec, ServiceAccountSpec};

pub const PROJECT_ID: &str = "sagent-dev";

pub fn grouped(entries: &[(&str, &[&str])]) -> DeclaredBindings {
    let mut roles = BTreeMap::new();
    for (role, members) in entries {
        roles.insert(
            (*role).to_string(),
            MemberList {
                members: members.iter().map(|m| (*m).to_string()).collect(),
            },
        );
    }
    DeclaredBindings::GroupedByRole(roles)
}

pub fn flat(entries: &[(&str, &str)]) -> DeclaredBindings {
    DeclaredBindings::FlatList(
        entries
            .iter()
            .map(|(role, member)| RoleMember::new(*role, *member))
            .collect(),
    )
}

pub fn account(account_id: &str, display_name: &str) -> ServiceAccountSpec {
    ServiceAccountSpec {
        account_id: account_id.to_string(),
        display_name: Some(display_name.to_string()),
        description: None,
    }
}

/// A dev environment with both declaration shapes and cross-module
/// member references
pub fn sample_environment() -> EnvironmentSpec {
    let mut service_accounts = BTreeMap::new();
    service_accounts.insert(
        "backend".to_string(),
        account("sagent-backend", "Backend runtime identity"),
    );
    service_accounts.insert(
        "frontend".to_string(),
        account("sagent-frontend", "Frontend runtime identity"),
    );

    EnvironmentSpec {
        environment: "dev".to_string(),
        project_id: PROJECT_ID.to_string(),
        service_accounts,
        project_bindings: Some(grouped(&[(
            "roles/logging.logWriter",
            &[
                "serviceAccount:${backend}",
                "serviceAccount:${frontend}",
            ],
        )])),
        service_account_bindings: vec![ServiceAccountBindings {
            target: "backend".to_string(),
            bindings: grouped(&[(
                "roles/iam.serviceAccountTokenCreator",
                &["serviceAccount:${frontend}"],
            )]),
        }],
        cloud_run_services: vec![CloudRunResourceBindings {
            name: "sagent-web".to_string(),
            region: "europe-west1".to_string(),
            bindings: flat(&[("roles/run.invoker", "allUsers")]),
        }],
        cloud_run_jobs: vec![CloudRunResourceBindings {
            name: "sagent-sync".to_string(),
            region: "europe-west1".to_string(),
            bindings: flat(&[("roles/run.invoker", "serviceAccount:${backend}")]),
        }],
    }
}
