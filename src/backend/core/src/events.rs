//! Event journal vocabulary.
//!
//! Every mutation appends at least one event in the transaction that
//! performed the state change. Types are dotted strings; payloads are
//! small JSON objects summarizing the change.

/// Event type constants.
pub mod event_type {
    pub const PROJECT_CREATED: &str = "project.created";

    pub const TASK_CREATED: &str = "task.created";
    pub const TASK_UPDATED: &str = "task.updated";
    pub const TASK_STATUS_CHANGED: &str = "task.status.changed";
    pub const TASK_POLICY_APPLIED: &str = "task.policy.applied";
    pub const POLICY_OVERRIDE: &str = "policy.override";
    pub const TASK_DONE: &str = "task.done";
    pub const TASK_FORCE_DONE: &str = "task.force_done";
    pub const TASK_VALIDATION_CHECKED: &str = "task.validation.checked";

    pub const ITERATION_CREATED: &str = "iteration.created";
    pub const ITERATION_STATUS_CHANGED: &str = "iteration.status.changed";
    pub const ITERATION_VALIDATION_CHECKED: &str = "iteration.validation.checked";

    pub const DECISION_CREATED: &str = "decision.created";

    pub const ATTESTATION_CREATED: &str = "attestation.created";

    pub const LEASE_ACQUIRED: &str = "lease.acquired";
    pub const LEASE_RENEWED: &str = "lease.renewed";
    pub const LEASE_RELEASED: &str = "lease.released";
    pub const LEASE_EXPIRED: &str = "lease.expired";

    pub const AUTH_DENIED: &str = "auth.denied";
    pub const RBAC_ROLE_GRANTED: &str = "rbac.role.granted";
    pub const RBAC_ROLE_REVOKED: &str = "rbac.role.revoked";
    pub const RBAC_AUTHORITY_SET: &str = "rbac.authority.set";
}

/// Entity kinds recorded on events. A superset of the attestation target
/// kinds: leases, attestations and RBAC changes journal under their own
/// kind.
pub mod entity_kind {
    pub const PROJECT: &str = "project";
    pub const ITERATION: &str = "iteration";
    pub const TASK: &str = "task";
    pub const DECISION: &str = "decision";
    pub const LEASE: &str = "lease";
    pub const ATTESTATION: &str = "attestation";
    pub const RBAC: &str = "rbac";

    pub const ALL: &[&str] = &[
        PROJECT, ITERATION, TASK, DECISION, LEASE, ATTESTATION, RBAC,
    ];
}
