//! # Binding Normalizer
//!
//! Flattens heterogeneous permission declarations into one deduplicated,
//! ordered set of (role, member) pairs per scope.
//!
//! Both declaration shapes ([`DeclaredBindings::GroupedByRole`] and
//! [`DeclaredBindings::FlatList`]) normalize to the identical set, so
//! downstream appliers never see the source shape. Normalization is pure;
//! no control-plane calls happen here.
//!
//! Each pair also gets a deterministic display key (role plus sanitized
//! member). The set itself is compared by structured value, so the key only
//! matters for logs and audit output - but two distinct pairs collapsing to
//! the same key would make that output ambiguous, so collisions are detected
//! and reported instead of silently merged.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::constants::KEY_SEPARATOR;
use crate::model::{DeclaredBindings, RoleMember};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    /// Two distinct (role, member) pairs sanitized to the same display key
    #[error(
        "display key collision on '{key}': ({first_role}, {first_member}) and ({second_role}, {second_member}) are distinct bindings"
    )]
    KeyCollision {
        key: String,
        first_role: String,
        first_member: String,
        second_role: String,
        second_member: String,
    },
}

/// Replace characters that are legal in members but not in keys
/// (`:`, `@`, `.`) with the key separator
pub fn sanitize_member(member: &str) -> String {
    member
        .chars()
        .map(|c| match c {
            ':' | '@' | '.' => KEY_SEPARATOR,
            c => c,
        })
        .collect()
}

/// Deterministic, human-auditable key for one (role, member) pair
///
/// The scope is implicit: keys are only compared within a single scope.
pub fn binding_key(role: &str, member: &str) -> String {
    format!("{role}{KEY_SEPARATOR}{}", sanitize_member(member))
}

/// Normalize every declaration for one scope into a single flat set
///
/// Duplicate pairs (within one declaration or across declarations of either
/// shape) collapse to one entry. Distinct pairs whose display keys collide
/// are an error: the caller must not apply an ambiguous set.
pub fn normalize(declared: &[DeclaredBindings]) -> Result<BTreeSet<RoleMember>, NormalizeError> {
    let mut by_key: BTreeMap<String, RoleMember> = BTreeMap::new();
    let mut normalized = BTreeSet::new();

    for declaration in declared {
        for pair in declaration.flatten() {
            let key = binding_key(&pair.role, &pair.member);
            if let Some(existing) = by_key.get(&key) {
                if *existing != pair {
                    return Err(NormalizeError::KeyCollision {
                        key,
                        first_role: existing.role.clone(),
                        first_member: existing.member.clone(),
                        second_role: pair.role,
                        second_member: pair.member,
                    });
                }
            } else {
                by_key.insert(key, pair.clone());
            }
            normalized.insert(pair);
        }
    }

    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MemberList;
    use std::collections::BTreeMap;

    fn grouped(entries: &[(&str, &[&str])]) -> DeclaredBindings {
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

    fn flat(entries: &[(&str, &str)]) -> DeclaredBindings {
        DeclaredBindings::FlatList(
            entries
                .iter()
                .map(|(role, member)| RoleMember::new(*role, *member))
                .collect(),
        )
    }

    mod key_tests {
        use super::*;

        #[test]
        fn test_sanitize_member_replaces_separator_chars() {
            let result = sanitize_member("serviceAccount:backend@p.iam.gserviceaccount.com");
            assert_eq!(result, "serviceAccount-backend-p-iam-gserviceaccount-com");
        }

        #[test]
        fn test_sanitize_member_keeps_valid_chars() {
            assert_eq!(sanitize_member("allUsers"), "allUsers");
        }

        #[test]
        fn test_binding_key_format() {
            let key = binding_key("roles/run.invoker", "allUsers");
            assert_eq!(key, "roles/run.invoker-allUsers");
        }

        #[test]
        fn test_binding_key_is_deterministic() {
            let member = "serviceAccount:backend@p.iam.gserviceaccount.com";
            assert_eq!(
                binding_key("roles/logging.logWriter", member),
                binding_key("roles/logging.logWriter", member)
            );
        }
    }

    mod normalize_tests {
        use super::*;

        #[test]
        fn test_two_members_same_role_yield_two_triples() {
            let declared = grouped(&[(
                "roles/logging.logWriter",
                &[
                    "serviceAccount:backend@p.iam.gserviceaccount.com",
                    "serviceAccount:frontend@p.iam.gserviceaccount.com",
                ],
            )]);
            let set = normalize(&[declared]).unwrap();
            assert_eq!(set.len(), 2);
            let keys: Vec<String> = set
                .iter()
                .map(|pair| binding_key(&pair.role, &pair.member))
                .collect();
            assert_eq!(keys.len(), 2);
            assert_ne!(keys[0], keys[1]);
            assert!(set
                .iter()
                .all(|pair| pair.role == "roles/logging.logWriter"));
        }

        #[test]
        fn test_both_shapes_normalize_identically() {
            let from_map = grouped(&[
                ("roles/run.invoker", &["allUsers"]),
                (
                    "roles/logging.logWriter",
                    &["serviceAccount:backend@p.iam.gserviceaccount.com"],
                ),
            ]);
            let from_list = flat(&[
                (
                    "roles/logging.logWriter",
                    "serviceAccount:backend@p.iam.gserviceaccount.com",
                ),
                ("roles/run.invoker", "allUsers"),
            ]);
            assert_eq!(
                normalize(&[from_map]).unwrap(),
                normalize(&[from_list]).unwrap()
            );
        }

        #[test]
        fn test_duplicate_pair_collapses_to_one() {
            let declared = flat(&[
                ("roles/run.invoker", "allUsers"),
                ("roles/run.invoker", "allUsers"),
            ]);
            let set = normalize(&[declared]).unwrap();
            assert_eq!(set.len(), 1);
        }

        #[test]
        fn test_same_pair_across_both_shapes_merges() {
            let map_shape = grouped(&[("roles/run.invoker", &["allUsers"])]);
            let list_shape = flat(&[("roles/run.invoker", "allUsers")]);
            let set = normalize(&[map_shape, list_shape]).unwrap();
            assert_eq!(set.len(), 1);
        }

        #[test]
        fn test_distinct_members_with_colliding_keys_error() {
            // Both sanitize to serviceAccount-a-b-p-iam-gserviceaccount-com
            let declared = flat(&[
                ("roles/viewer", "serviceAccount:a.b@p.iam.gserviceaccount.com"),
                ("roles/viewer", "serviceAccount:a@b.p.iam.gserviceaccount.com"),
            ]);
            let err = normalize(&[declared]).unwrap_err();
            match err {
                NormalizeError::KeyCollision {
                    first_member,
                    second_member,
                    ..
                } => {
                    assert_ne!(first_member, second_member);
                }
            }
        }

        #[test]
        fn test_empty_declarations_normalize_to_empty_set() {
            assert!(normalize(&[]).unwrap().is_empty());
            assert!(normalize(&[flat(&[])]).unwrap().is_empty());
        }
    }
}
