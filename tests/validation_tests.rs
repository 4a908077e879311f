//! # Validation Integration Tests
//!
//! Configuration-time validation: every malformed declaration must fail
//! before any control-plane call, with a message naming the offending field.

mod common;

use common::{account, flat, sample_environment};
use iam_binding_controller::config::{self, ConfigError};
use iam_binding_controller::factory::validate_account_id;

#[test]
fn test_sample_environment_is_valid() {
    config::validate(&sample_environment()).unwrap();
}

#[test]
fn test_account_id_vectors() {
    let valid_ids = vec!["sagent-backend", "abc-123", "aaaaaa"];
    for id in valid_ids {
        assert!(
            validate_account_id("backend", id).is_ok(),
            "Account id '{}' should be valid",
            id
        );
    }

    let too_long = "a".repeat(31);
    let invalid_ids = vec![
        "",
        "abc",         // Too short
        "9backend",    // Starts with digit
        "backend-",    // Ends with hyphen
        "Sagent-Back", // Uppercase
        &too_long,
    ];
    for id in invalid_ids {
        assert!(
            validate_account_id("backend", id).is_err(),
            "Account id '{}' should be invalid",
            id
        );
    }
}

#[test]
fn test_invalid_account_id_in_environment_names_account() {
    let mut spec = sample_environment();
    spec.service_accounts
        .insert("batch".to_string(), account("Bad_Id", "Batch identity"));
    let err = config::validate(&spec).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("batch"), "{message}");
    assert!(message.contains("Bad_Id"), "{message}");
}

#[test]
fn test_empty_environment_field_is_rejected() {
    let mut spec = sample_environment();
    spec.environment = String::new();
    let err = config::validate(&spec).unwrap_err();
    assert!(matches!(err, ConfigError::EmptyField { field } if field == "environment"));
}

#[test]
fn test_member_without_prefix_is_rejected() {
    let mut spec = sample_environment();
    spec.cloud_run_jobs[0].bindings = flat(&[(
        "roles/run.invoker",
        "sagent-backend@sagent-dev.iam.gserviceaccount.com",
    )]);
    let err = config::validate(&spec).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidMember { .. }));
}

#[test]
fn test_empty_role_is_rejected() {
    let mut spec = sample_environment();
    spec.cloud_run_jobs[0].bindings = flat(&[("", "allUsers")]);
    let err = config::validate(&spec).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidRole { .. }));
}

#[test]
fn test_missing_run_region_is_rejected() {
    let mut spec = sample_environment();
    spec.cloud_run_services[0].region = String::new();
    let err = config::validate(&spec).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("region"), "{message}");
    assert!(message.contains("sagent-web"), "{message}");
}
