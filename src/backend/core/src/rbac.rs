//! Role-based access control.
//!
//! The role -> permission matrix is seeded at startup and immutable at
//! runtime. Actor -> role grants and attestation authorities are
//! per-project rows in the store; the engine resolves them inside the
//! same transaction as the operation they guard.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

// ═══════════════════════════════════════════════════════════════════════════════
// Permissions
// ═══════════════════════════════════════════════════════════════════════════════

/// Permission identifiers. Stable strings; referenced by the matrix and
/// by authorization checks.
pub mod perm {
    pub const PROJECT_READ: &str = "project.read";
    pub const TASK_CREATE: &str = "task.create";
    pub const TASK_UPDATE: &str = "task.update";
    pub const TASK_CLAIM: &str = "task.claim";
    pub const TASK_FORCE_DONE: &str = "task.force_done";
    pub const ITERATION_WRITE: &str = "iteration.write";
    pub const DECISION_CREATE: &str = "decision.create";
    pub const ATTESTATION_CREATE: &str = "attestation.create";
    pub const ATTESTATION_BYPASS: &str = "attestation.bypass";
    pub const LEASE_ADMIN: &str = "lease.admin";
    pub const RBAC_ADMIN: &str = "rbac.admin";

    pub const ALL: &[&str] = &[
        PROJECT_READ,
        TASK_CREATE,
        TASK_UPDATE,
        TASK_CLAIM,
        TASK_FORCE_DONE,
        ITERATION_WRITE,
        DECISION_CREATE,
        ATTESTATION_CREATE,
        ATTESTATION_BYPASS,
        LEASE_ADMIN,
        RBAC_ADMIN,
    ];
}

/// Role identifiers seeded into every deployment.
pub mod role {
    pub const ADMIN: &str = "admin";
    pub const MAINTAINER: &str = "maintainer";
    pub const DEV: &str = "dev";
    pub const REVIEWER: &str = "reviewer";
    pub const OBSERVER: &str = "observer";
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role Matrix
// ═══════════════════════════════════════════════════════════════════════════════

/// A seeded role definition.
#[derive(Debug, Clone, Serialize)]
pub struct Role {
    pub id: &'static str,
    pub description: &'static str,
    pub permissions: &'static [&'static str],
}

const ROLES: &[Role] = &[
    Role {
        id: role::ADMIN,
        description: "Full control over the project",
        permissions: perm::ALL,
    },
    Role {
        id: role::MAINTAINER,
        description: "Plans work, runs iterations, forces completion",
        permissions: &[
            perm::PROJECT_READ,
            perm::TASK_CREATE,
            perm::TASK_UPDATE,
            perm::TASK_CLAIM,
            perm::TASK_FORCE_DONE,
            perm::ITERATION_WRITE,
            perm::DECISION_CREATE,
            perm::ATTESTATION_CREATE,
            perm::LEASE_ADMIN,
        ],
    },
    Role {
        id: role::DEV,
        description: "Creates and works on tasks",
        permissions: &[
            perm::PROJECT_READ,
            perm::TASK_CREATE,
            perm::TASK_UPDATE,
            perm::TASK_CLAIM,
            perm::ATTESTATION_CREATE,
        ],
    },
    Role {
        id: role::REVIEWER,
        description: "Records review attestations",
        permissions: &[perm::PROJECT_READ, perm::ATTESTATION_CREATE],
    },
    Role {
        id: role::OBSERVER,
        description: "Read-only access",
        permissions: &[perm::PROJECT_READ],
    },
];

/// Attestation authorities seeded at project init: which role may assert
/// each catalog kind. `security.ok` is deliberately unmapped; only
/// `attestation.bypass` holders may assert it.
pub const DEFAULT_AUTHORITIES: &[(&str, &str)] = &[
    ("ci.passed", role::DEV),
    ("review.approved", role::REVIEWER),
    ("acceptance.passed", role::MAINTAINER),
    ("iteration.approved", role::MAINTAINER),
];

/// The immutable role -> permission matrix.
#[derive(Debug)]
pub struct RoleMatrix {
    by_role: BTreeMap<&'static str, BTreeSet<&'static str>>,
}

impl RoleMatrix {
    pub fn seeded() -> Self {
        let mut by_role = BTreeMap::new();
        for role in ROLES {
            by_role.insert(role.id, role.permissions.iter().copied().collect());
        }
        Self { by_role }
    }

    pub fn known_role(&self, role_id: &str) -> bool {
        self.by_role.contains_key(role_id)
    }

    pub fn role_has(&self, role_id: &str, permission: &str) -> bool {
        self.by_role
            .get(role_id)
            .is_some_and(|perms| perms.contains(permission))
    }

    /// Whether any of the granted roles carries the permission.
    pub fn any_role_has(&self, roles: &[String], permission: &str) -> bool {
        roles.iter().any(|r| self.role_has(r, permission))
    }

    /// The sorted union of permissions across the given roles.
    pub fn permissions_for(&self, roles: &[String]) -> Vec<String> {
        let mut out: BTreeSet<&'static str> = BTreeSet::new();
        for role in roles {
            if let Some(perms) = self.by_role.get(role.as_str()) {
                out.extend(perms.iter().copied());
            }
        }
        out.into_iter().map(str::to_string).collect()
    }

    pub fn roles(&self) -> &'static [Role] {
        ROLES
    }
}

impl Default for RoleMatrix {
    fn default() -> Self {
        Self::seeded()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_has_everything() {
        let matrix = RoleMatrix::seeded();
        for p in perm::ALL {
            assert!(matrix.role_has(role::ADMIN, p), "admin missing {p}");
        }
    }

    #[test]
    fn dev_cannot_force_done() {
        let matrix = RoleMatrix::seeded();
        assert!(matrix.role_has(role::DEV, perm::TASK_CLAIM));
        assert!(matrix.role_has(role::DEV, perm::TASK_CREATE));
        assert!(!matrix.role_has(role::DEV, perm::TASK_FORCE_DONE));
        assert!(!matrix.role_has(role::DEV, perm::RBAC_ADMIN));
        assert!(!matrix.role_has(role::DEV, perm::ATTESTATION_BYPASS));
    }

    #[test]
    fn reviewer_is_attestation_only() {
        let matrix = RoleMatrix::seeded();
        assert!(matrix.role_has(role::REVIEWER, perm::ATTESTATION_CREATE));
        assert!(!matrix.role_has(role::REVIEWER, perm::TASK_CREATE));
        assert!(!matrix.role_has(role::REVIEWER, perm::TASK_CLAIM));
    }

    #[test]
    fn permissions_union_is_sorted_and_deduplicated() {
        let matrix = RoleMatrix::seeded();
        let perms = matrix.permissions_for(&["dev".to_string(), "reviewer".to_string()]);
        let mut sorted = perms.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(perms, sorted);
        assert!(perms.contains(&"task.claim".to_string()));
    }

    #[test]
    fn unknown_roles_grant_nothing() {
        let matrix = RoleMatrix::seeded();
        assert!(!matrix.known_role("intruder"));
        assert!(!matrix.any_role_has(&["intruder".to_string()], perm::PROJECT_READ));
        assert!(matrix.permissions_for(&["intruder".to_string()]).is_empty());
    }

    #[test]
    fn default_authorities_reference_seeded_roles() {
        let matrix = RoleMatrix::seeded();
        for (_, role_id) in DEFAULT_AUTHORITIES {
            assert!(matrix.known_role(role_id));
        }
    }
}
