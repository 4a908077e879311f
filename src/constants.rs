//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values reflect the control plane's documented identifier
//! constraints and can be referenced from validation and key derivation.

/// Minimum service account `account_id` length
pub const MIN_ACCOUNT_ID_LEN: usize = 6;

/// Maximum service account `account_id` length
pub const MAX_ACCOUNT_ID_LEN: usize = 30;

/// Separator used when encoding a (role, member) pair as a display key
/// Characters the control plane allows in members but not in keys
/// (`:`, `@`, `.`) are replaced with this separator
pub const KEY_SEPARATOR: char = '-';

/// Domain suffix of derived service account emails
pub const SERVICE_ACCOUNT_EMAIL_DOMAIN: &str = "iam.gserviceaccount.com";

/// Permitted member prefixes for principal identifiers
pub const MEMBER_PREFIXES: &[&str] = &["serviceAccount:", "user:", "group:", "domain:"];

/// Special principals accepted without a prefix
pub const SPECIAL_MEMBERS: &[&str] = &["allUsers", "allAuthenticatedUsers"];

/// Default state file path used by `iamctl plan` and `iamctl apply`
pub const DEFAULT_STATE_FILE: &str = "iam-state.json";

/// Default log level when RUST_LOG and --log-level are unset
pub const DEFAULT_LOG_LEVEL: &str = "info";
