//! # Environment Configuration
//!
//! Per-environment declarations loaded from YAML: the service accounts to
//! ensure and the permission declarations for every scope.
//!
//! Validation runs before any control-plane call and fails with a message
//! naming the offending field, so a malformed declaration never reaches the
//! apply stage.
//!
//! ## Example
//!
//! ```yaml
//! environment: dev
//! projectId: sagent-dev
//! serviceAccounts:
//!   backend:
//!     accountId: sagent-backend
//!     displayName: Backend runtime identity
//! projectBindings:
//!   roles/logging.logWriter:
//!     members:
//!       - serviceAccount:${backend}
//! cloudRunServices:
//!   - name: sagent-web
//!     region: europe-west1
//!     bindings:
//!       - role: roles/run.invoker
//!         member: allUsers
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{MEMBER_PREFIXES, SPECIAL_MEMBERS};
use crate::factory;
use crate::model::{DeclaredBindings, ServiceAccountSpec};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("field '{field}' must not be empty")]
    EmptyField { field: String },

    #[error("invalid account id '{account_id}' for service account '{name}': {reason}")]
    InvalidAccountId {
        name: String,
        account_id: String,
        reason: String,
    },

    #[error("duplicate account id '{account_id}' declared by service accounts '{first}' and '{second}'")]
    DuplicateAccountId {
        account_id: String,
        first: String,
        second: String,
    },

    #[error("invalid member '{member}' in {location}: {reason}")]
    InvalidMember {
        member: String,
        location: String,
        reason: String,
    },

    #[error("invalid role '{role}' in {location}: {reason}")]
    InvalidRole {
        role: String,
        location: String,
        reason: String,
    },
}

/// Bindings declared on one service account resource
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountBindings {
    /// Logical name of the target account under `serviceAccounts`
    pub target: String,
    pub bindings: DeclaredBindings,
}

/// Bindings declared on one Cloud Run service or job
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloudRunResourceBindings {
    pub name: String,
    pub region: String,
    pub bindings: DeclaredBindings,
}

/// Full declared state for one environment
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSpec {
    /// Environment name (dev, staging, prod)
    pub environment: String,
    /// Owning project for service accounts and project-level bindings
    pub project_id: String,
    /// Service accounts to ensure, keyed by logical name
    /// Logical names are referenced from members as `${name}`
    #[serde(default)]
    pub service_accounts: BTreeMap<String, ServiceAccountSpec>,
    /// Project-level permission declarations
    #[serde(default)]
    pub project_bindings: Option<DeclaredBindings>,
    /// Per-service-account permission declarations
    #[serde(default)]
    pub service_account_bindings: Vec<ServiceAccountBindings>,
    /// Per-Cloud-Run-service permission declarations
    #[serde(default)]
    pub cloud_run_services: Vec<CloudRunResourceBindings>,
    /// Per-Cloud-Run-job permission declarations
    #[serde(default)]
    pub cloud_run_jobs: Vec<CloudRunResourceBindings>,
}

/// Load an environment declaration from a YAML file
pub fn load_environment(path: &Path) -> Result<EnvironmentSpec, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Validate a declared member's syntax
///
/// A member must carry a permitted prefix (serviceAccount:, user:, group:,
/// domain:) or be one of the special principals. `${name}` placeholders are
/// resolved later by composition; they still require a prefix.
pub fn validate_member(member: &str, location: &str) -> Result<(), ConfigError> {
    if member.is_empty() {
        return Err(ConfigError::InvalidMember {
            member: member.to_string(),
            location: location.to_string(),
            reason: "member is empty".to_string(),
        });
    }
    if member.chars().any(char::is_whitespace) {
        return Err(ConfigError::InvalidMember {
            member: member.to_string(),
            location: location.to_string(),
            reason: "member contains whitespace".to_string(),
        });
    }
    if SPECIAL_MEMBERS.contains(&member) {
        return Ok(());
    }
    let prefix = MEMBER_PREFIXES.iter().find(|p| member.starts_with(**p));
    match prefix {
        Some(p) if member.len() > p.len() => Ok(()),
        Some(p) => Err(ConfigError::InvalidMember {
            member: member.to_string(),
            location: location.to_string(),
            reason: format!("no principal after prefix '{p}'"),
        }),
        None => Err(ConfigError::InvalidMember {
            member: member.to_string(),
            location: location.to_string(),
            reason: format!(
                "member must start with one of {MEMBER_PREFIXES:?} or be one of {SPECIAL_MEMBERS:?}"
            ),
        }),
    }
}

fn validate_role(role: &str, location: &str) -> Result<(), ConfigError> {
    if role.is_empty() {
        return Err(ConfigError::InvalidRole {
            role: role.to_string(),
            location: location.to_string(),
            reason: "role is empty".to_string(),
        });
    }
    if role.chars().any(char::is_whitespace) {
        return Err(ConfigError::InvalidRole {
            role: role.to_string(),
            location: location.to_string(),
            reason: "role contains whitespace".to_string(),
        });
    }
    Ok(())
}

fn validate_declared(declared: &DeclaredBindings, location: &str) -> Result<(), ConfigError> {
    for pair in declared.flatten() {
        validate_role(&pair.role, location)?;
        validate_member(&pair.member, location)?;
    }
    Ok(())
}

/// Validate a full environment declaration
///
/// Checks run in declaration order and stop at the first offending field;
/// no control-plane call happens before this succeeds.
pub fn validate(spec: &EnvironmentSpec) -> Result<(), ConfigError> {
    if spec.environment.is_empty() {
        return Err(ConfigError::EmptyField {
            field: "environment".to_string(),
        });
    }
    if spec.project_id.is_empty() {
        return Err(ConfigError::EmptyField {
            field: "projectId".to_string(),
        });
    }

    let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
    for (name, account) in &spec.service_accounts {
        factory::validate_account_id(name, &account.account_id)?;
        if let Some(first) = seen.insert(account.account_id.as_str(), name.as_str()) {
            return Err(ConfigError::DuplicateAccountId {
                account_id: account.account_id.clone(),
                first: first.to_string(),
                second: name.clone(),
            });
        }
    }

    if let Some(declared) = &spec.project_bindings {
        validate_declared(declared, "projectBindings")?;
    }
    for entry in &spec.service_account_bindings {
        if entry.target.is_empty() {
            return Err(ConfigError::EmptyField {
                field: "serviceAccountBindings.target".to_string(),
            });
        }
        validate_declared(
            &entry.bindings,
            &format!("serviceAccountBindings[{}]", entry.target),
        )?;
    }
    for (field, entries) in [
        ("cloudRunServices", &spec.cloud_run_services),
        ("cloudRunJobs", &spec.cloud_run_jobs),
    ] {
        for entry in entries.iter() {
            if entry.name.is_empty() {
                return Err(ConfigError::EmptyField {
                    field: format!("{field}.name"),
                });
            }
            if entry.region.is_empty() {
                return Err(ConfigError::EmptyField {
                    field: format!("{field}[{}].region", entry.name),
                });
            }
            validate_declared(&entry.bindings, &format!("{field}[{}]", entry.name))?;
        }
    }

    Ok(())
}
