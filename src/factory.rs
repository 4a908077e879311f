//! # Service Account Factory
//!
//! Ensures one service account per logical role (backend, frontend, ...)
//! and exposes its stable outputs for downstream binding declarations.
//!
//! Creation is a single idempotent control-plane operation; re-invocation
//! with identical inputs is a no-op. The derived email is deterministic
//! (`<account_id>@<project>.iam.gserviceaccount.com`), the `unique_id` is
//! assigned by the control plane at creation time and never changes.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use tracing::info;

use crate::config::ConfigError;
use crate::constants::{MAX_ACCOUNT_ID_LEN, MIN_ACCOUNT_ID_LEN, SERVICE_ACCOUNT_EMAIL_DOMAIN};
use crate::model::{ServiceAccountOutputs, ServiceAccountSpec};
use crate::provider::{ControlPlane, ControlPlaneError};

static ACCOUNT_ID_RE: OnceLock<Regex> = OnceLock::new();

fn account_id_re() -> &'static Regex {
    ACCOUNT_ID_RE.get_or_init(|| {
        Regex::new(r"^[a-z][a-z0-9-]*[a-z0-9]$").expect("account id pattern is valid")
    })
}

/// Validate an `account_id` against the platform constraints:
/// 6-30 characters, lowercase letters, digits and hyphens, starting with a
/// letter and ending with a letter or digit
pub fn validate_account_id(name: &str, account_id: &str) -> Result<(), ConfigError> {
    let reason = if account_id.len() < MIN_ACCOUNT_ID_LEN {
        Some(format!("shorter than {MIN_ACCOUNT_ID_LEN} characters"))
    } else if account_id.len() > MAX_ACCOUNT_ID_LEN {
        Some(format!("longer than {MAX_ACCOUNT_ID_LEN} characters"))
    } else if !account_id_re().is_match(account_id) {
        Some(
            "must contain only lowercase letters, digits and hyphens, start with a letter and end with a letter or digit"
                .to_string(),
        )
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ConfigError::InvalidAccountId {
            name: name.to_string(),
            account_id: account_id.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Deterministic email for an account in a project
pub fn derive_email(account_id: &str, project_id: &str) -> String {
    format!("{account_id}@{project_id}.{SERVICE_ACCOUNT_EMAIL_DOMAIN}")
}

/// Ensure every declared service account exists, keyed by logical name
///
/// Accounts are ensured before any binding is applied: bindings reference
/// the returned emails, so this is a strict dependency edge in the pass.
pub async fn ensure_accounts(
    plane: &dyn ControlPlane,
    project_id: &str,
    accounts: &BTreeMap<String, ServiceAccountSpec>,
) -> Result<BTreeMap<String, ServiceAccountOutputs>, ControlPlaneError> {
    let mut outputs = BTreeMap::new();
    for (name, spec) in accounts {
        let ensured = plane.ensure_service_account(project_id, spec).await?;
        info!(
            "Ensured service account {} ({}) for logical role '{}'",
            ensured.email, ensured.unique_id, name
        );
        outputs.insert(name.clone(), ensured);
    }
    Ok(outputs)
}
