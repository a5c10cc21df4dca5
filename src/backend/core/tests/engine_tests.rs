//! Integration tests driving the engine over an in-memory store.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use proofline_core::clock::ManualClock;
use proofline_core::config::ProjectConfig;
use proofline_core::db::{EventFilter, Store};
use proofline_core::domain::{EntityKind, IterationStatus, TaskStatus, TaskType, ValidationMode};
use proofline_core::engine::{
    CreateAttestation, CreateDecision, CreateTask, Engine, EngineOptions, UpdateTask,
};
use proofline_core::error::ErrorCode;

const PROJECT: &str = "proofline";
const ADMIN: &str = "tester";

async fn engine() -> Engine {
    let store = Store::open_in_memory().await.unwrap();
    let engine = Engine::new(store, ProjectConfig::default_for(PROJECT));
    engine.init_project(ADMIN, PROJECT, "", None).await.unwrap();
    engine
}

async fn engine_with_clock() -> (Engine, Arc<ManualClock>) {
    let store = Store::open_in_memory().await.unwrap();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
    ));
    let engine = Engine::with_options(
        store,
        ProjectConfig::default_for(PROJECT),
        EngineOptions {
            lease_ttl: Duration::minutes(15),
            clock: clock.clone(),
        },
    );
    engine.init_project(ADMIN, PROJECT, "", None).await.unwrap();
    (engine, clock)
}

fn feature_task(title: &str) -> CreateTask {
    CreateTask {
        task_type: TaskType::Feature,
        title: title.to_string(),
        ..Default::default()
    }
}

fn technical_task(title: &str) -> CreateTask {
    CreateTask {
        task_type: TaskType::Technical,
        title: title.to_string(),
        ..Default::default()
    }
}

async fn attest_task(engine: &Engine, actor: &str, task_id: &str, kind: &str) {
    engine
        .create_attestation(
            actor,
            PROJECT,
            CreateAttestation {
                id: None,
                entity_kind: EntityKind::Task,
                entity_id: task_id.to_string(),
                kind: kind.to_string(),
                ts: None,
                payload: None,
            },
        )
        .await
        .unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// Projects
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn init_project_seeds_admin_and_config() {
    let engine = engine().await;

    let whoami = engine.whoami(ADMIN, PROJECT).await.unwrap();
    assert_eq!(whoami.roles, vec!["admin"]);
    assert!(whoami.permissions.contains(&"task.force_done".to_string()));
    assert!(whoami.permissions.contains(&"attestation.bypass".to_string()));

    let config = engine.get_config(PROJECT).await.unwrap();
    assert!(config.preset("feature.default").is_some());
    assert_eq!(config.task_default_preset(TaskType::Feature), Some("feature.default"));
}

#[tokio::test]
async fn init_project_twice_conflicts() {
    let engine = engine().await;
    let err = engine
        .init_project(ADMIN, PROJECT, "", None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Conflict);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Task creation & policy
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn create_task_applies_type_default_policy() {
    let engine = engine().await;
    let task = engine
        .create_task(ADMIN, PROJECT, feature_task("Ship feature"))
        .await
        .unwrap();

    assert_eq!(task.status, TaskStatus::Planned);
    assert_eq!(task.validation_mode, ValidationMode::All);
    assert_eq!(
        task.required_attestations,
        vec!["ci.passed", "review.approved", "acceptance.passed"]
    );
    assert!(task.depends_on.is_empty());
    assert!(task.completed_at.is_none());

    // Round-trip through the store.
    let fetched = engine.get_task(PROJECT, &task.id).await.unwrap();
    assert_eq!(fetched, task);
}

#[tokio::test]
async fn create_task_inline_validation_overrides_and_journals() {
    let engine = engine().await;
    let task = engine
        .create_task(
            ADMIN,
            PROJECT,
            CreateTask {
                task_type: TaskType::Feature,
                title: "Custom gate".into(),
                validation: Some(proofline_core::policy::ValidationSpec {
                    mode: Some(ValidationMode::Any),
                    require: Some(vec!["ci.passed".into(), "review.approved".into()]),
                    threshold: None,
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(task.validation_mode, ValidationMode::Any);

    let overrides = engine
        .list_events(
            PROJECT,
            EventFilter {
                event_type: Some("policy.override".into()),
                entity_kind: None,
            },
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(overrides.items.len(), 1);
    assert_eq!(overrides.items[0].entity_id, task.id);
}

#[tokio::test]
async fn create_task_rejects_unknown_required_kind() {
    let engine = engine().await;
    let err = engine
        .create_task(
            ADMIN,
            PROJECT,
            CreateTask {
                task_type: TaskType::Technical,
                title: "Bad kinds".into(),
                validation: Some(proofline_core::policy::ValidationSpec {
                    mode: Some(ValidationMode::All),
                    require: Some(vec!["made.up".into()]),
                    threshold: None,
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::BadRequest);
}

#[tokio::test]
async fn create_task_duplicate_id_conflicts() {
    let engine = engine().await;
    let mut req = technical_task("First");
    req.id = Some("task-1".into());
    engine.create_task(ADMIN, PROJECT, req).await.unwrap();

    let mut req = technical_task("Second");
    req.id = Some("task-1".into());
    let err = engine.create_task(ADMIN, PROJECT, req).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Conflict);
}

#[tokio::test]
async fn create_task_missing_dependency_is_not_found() {
    let engine = engine().await;
    let mut req = technical_task("Depends on ghost");
    req.depends_on = vec!["ghost".into()];
    let err = engine.create_task(ADMIN, PROJECT, req).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Dependency graph
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn dependency_cycles_rejected_across_create_and_update() {
    let engine = engine().await;
    let mut req = technical_task("a");
    req.id = Some("a".into());
    engine.create_task(ADMIN, PROJECT, req).await.unwrap();

    let mut req = technical_task("b");
    req.id = Some("b".into());
    req.depends_on = vec!["a".into()];
    engine.create_task(ADMIN, PROJECT, req).await.unwrap();

    // a -> b would close the loop b -> a -> b.
    let err = engine
        .update_task(
            ADMIN,
            PROJECT,
            "a",
            UpdateTask {
                add_depends_on: vec!["b".into()],
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Conflict);

    // Self-dependency is rejected outright.
    let err = engine
        .update_task(
            ADMIN,
            PROJECT,
            "a",
            UpdateTask {
                add_depends_on: vec!["a".into()],
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Conflict);

    // Removing the edge unblocks the reverse direction.
    engine
        .update_task(
            ADMIN,
            PROJECT,
            "b",
            UpdateTask {
                remove_depends_on: vec!["a".into()],
                ..Default::default()
            },
        )
        .await
        .unwrap();
    engine
        .update_task(
            ADMIN,
            PROJECT,
            "a",
            UpdateTask {
                add_depends_on: vec!["b".into()],
                ..Default::default()
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn parent_cycles_rejected() {
    let engine = engine().await;
    for id in ["p1", "p2"] {
        let mut req = technical_task(id);
        req.id = Some(id.into());
        engine.create_task(ADMIN, PROJECT, req).await.unwrap();
    }
    engine
        .update_task(
            ADMIN,
            PROJECT,
            "p2",
            UpdateTask {
                parent_id: Some("p1".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = engine
        .update_task(
            ADMIN,
            PROJECT,
            "p1",
            UpdateTask {
                parent_id: Some("p2".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Conflict);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Leases
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn claim_grants_lease_and_starts_task() {
    let engine = engine().await;
    let task = engine
        .create_task(ADMIN, PROJECT, technical_task("Claim me"))
        .await
        .unwrap();

    let lease = engine.claim_task(ADMIN, PROJECT, &task.id).await.unwrap();
    assert_eq!(lease.owner_id, ADMIN);
    assert!(lease.expires_at > lease.acquired_at);

    let started = engine.get_task(PROJECT, &task.id).await.unwrap();
    assert_eq!(started.status, TaskStatus::InProgress);
}

#[tokio::test]
async fn concurrent_claimers_one_wins() {
    let engine = engine().await;
    engine.grant_role(ADMIN, PROJECT, "dev-1", "dev").await.unwrap();
    engine.grant_role(ADMIN, PROJECT, "dev-2", "dev").await.unwrap();
    let task = engine
        .create_task(ADMIN, PROJECT, technical_task("Contested"))
        .await
        .unwrap();

    let first = engine.claim_task("dev-1", PROJECT, &task.id).await;
    let second = engine.claim_task("dev-2", PROJECT, &task.id).await;
    assert!(first.is_ok());
    assert_eq!(second.unwrap_err().code(), ErrorCode::LeaseConflict);

    // The owner renews rather than conflicts.
    let renewed = engine.claim_task("dev-1", PROJECT, &task.id).await.unwrap();
    assert_eq!(renewed.owner_id, "dev-1");
}

#[tokio::test]
async fn expired_lease_is_reclaimable() {
    let (engine, clock) = engine_with_clock().await;
    engine.grant_role(ADMIN, PROJECT, "dev-1", "dev").await.unwrap();
    engine.grant_role(ADMIN, PROJECT, "dev-2", "dev").await.unwrap();
    let task = engine
        .create_task(ADMIN, PROJECT, technical_task("Expires"))
        .await
        .unwrap();

    engine.claim_task("dev-1", PROJECT, &task.id).await.unwrap();
    let err = engine.claim_task("dev-2", PROJECT, &task.id).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::LeaseConflict);

    clock.advance(Duration::minutes(16));
    let lease = engine.claim_task("dev-2", PROJECT, &task.id).await.unwrap();
    assert_eq!(lease.owner_id, "dev-2");

    let expired_events = engine
        .list_events(
            PROJECT,
            EventFilter {
                event_type: Some("lease.expired".into()),
                entity_kind: None,
            },
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(expired_events.items.len(), 1);
}

#[tokio::test]
async fn release_requires_owner_or_lease_admin() {
    let engine = engine().await;
    engine.grant_role(ADMIN, PROJECT, "dev-1", "dev").await.unwrap();
    engine.grant_role(ADMIN, PROJECT, "dev-2", "dev").await.unwrap();
    let task = engine
        .create_task(ADMIN, PROJECT, technical_task("Held"))
        .await
        .unwrap();
    engine.claim_task("dev-1", PROJECT, &task.id).await.unwrap();

    let err = engine
        .release_task("dev-2", PROJECT, &task.id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);

    // lease.admin (admin role) may break the lease.
    engine.release_task(ADMIN, PROJECT, &task.id).await.unwrap();

    // Released means releasable no more.
    let err = engine
        .release_task("dev-1", PROJECT, &task.id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Completion & validation
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn happy_path_to_done() {
    let engine = engine().await;
    let task = engine
        .create_task(ADMIN, PROJECT, feature_task("Ship feature"))
        .await
        .unwrap();

    for kind in ["ci.passed", "review.approved", "acceptance.passed"] {
        attest_task(&engine, ADMIN, &task.id, kind).await;
    }
    engine.claim_task(ADMIN, PROJECT, &task.id).await.unwrap();

    let done = engine
        .complete_task(
            ADMIN,
            PROJECT,
            &task.id,
            false,
            Some(serde_json::json!({"note": "ok"})),
        )
        .await
        .unwrap();
    assert_eq!(done.status, TaskStatus::Done);
    assert!(done.completed_at.is_some());

    // The lease is released on completion.
    let released = engine
        .list_events(
            PROJECT,
            EventFilter {
                event_type: Some("lease.released".into()),
                entity_kind: None,
            },
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(released.items.len(), 1);
}

#[tokio::test]
async fn unsatisfied_policy_blocks_done() {
    let engine = engine().await;
    let task = engine
        .create_task(ADMIN, PROJECT, feature_task("Needs validation"))
        .await
        .unwrap();
    engine.claim_task(ADMIN, PROJECT, &task.id).await.unwrap();
    attest_task(&engine, ADMIN, &task.id, "ci.passed").await;

    let err = engine
        .complete_task(ADMIN, PROJECT, &task.id, false, None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationFailed);

    let status = engine.task_validation(PROJECT, &task.id).await.unwrap();
    assert!(!status.satisfied);
    assert_eq!(status.present, vec!["ci.passed"]);
    assert_eq!(status.missing, vec!["review.approved", "acceptance.passed"]);
}

#[tokio::test]
async fn force_done_skips_validation_and_journals() {
    let engine = engine().await;
    let task = engine
        .create_task(ADMIN, PROJECT, feature_task("Force me"))
        .await
        .unwrap();
    engine.claim_task(ADMIN, PROJECT, &task.id).await.unwrap();

    let done = engine
        .complete_task(ADMIN, PROJECT, &task.id, true, None)
        .await
        .unwrap();
    assert_eq!(done.status, TaskStatus::Done);

    let forced = engine
        .list_events(
            PROJECT,
            EventFilter {
                event_type: Some("task.force_done".into()),
                entity_kind: None,
            },
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(forced.items.len(), 1);
}

#[tokio::test]
async fn force_requires_permission() {
    let engine = engine().await;
    engine.grant_role(ADMIN, PROJECT, "force-dev", "dev").await.unwrap();
    let task = engine
        .create_task(ADMIN, PROJECT, technical_task("Needs force"))
        .await
        .unwrap();

    let err = engine
        .complete_task("force-dev", PROJECT, &task.id, true, None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);
}

#[tokio::test]
async fn done_from_planned_is_invalid_transition() {
    let engine = engine().await;
    let task = engine
        .create_task(ADMIN, PROJECT, technical_task("Unstarted"))
        .await
        .unwrap();

    // Admin holds force permission but the planned -> done edge does
    // not exist; force bypasses validation, not the state machine.
    let err = engine
        .complete_task(ADMIN, PROJECT, &task.id, true, None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidTransition);
}

#[tokio::test]
async fn update_status_walks_the_state_machine() {
    let engine = engine().await;
    let task = engine
        .create_task(ADMIN, PROJECT, technical_task("Walk"))
        .await
        .unwrap();

    let set = |status| UpdateTask {
        status: Some(status),
        ..Default::default()
    };

    engine
        .update_task(ADMIN, PROJECT, &task.id, set(TaskStatus::InProgress))
        .await
        .unwrap();
    engine
        .update_task(ADMIN, PROJECT, &task.id, set(TaskStatus::Review))
        .await
        .unwrap();
    let err = engine
        .update_task(ADMIN, PROJECT, &task.id, set(TaskStatus::Planned))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidTransition);

    engine
        .update_task(ADMIN, PROJECT, &task.id, set(TaskStatus::Rejected))
        .await
        .unwrap();
    engine
        .update_task(ADMIN, PROJECT, &task.id, set(TaskStatus::Planned))
        .await
        .unwrap();
    engine
        .update_task(ADMIN, PROJECT, &task.id, set(TaskStatus::Canceled))
        .await
        .unwrap();
    let err = engine
        .update_task(ADMIN, PROJECT, &task.id, set(TaskStatus::InProgress))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidTransition);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Iterations
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn iteration_validation_gate() {
    let engine = engine().await;
    engine
        .create_iteration(ADMIN, PROJECT, "iter-1", "Test iteration")
        .await
        .unwrap();

    for status in [IterationStatus::Running, IterationStatus::Delivered] {
        engine
            .set_iteration_status(ADMIN, PROJECT, "iter-1", status)
            .await
            .unwrap();
    }

    let err = engine
        .set_iteration_status(ADMIN, PROJECT, "iter-1", IterationStatus::Validated)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationFailed);

    engine
        .create_attestation(
            ADMIN,
            PROJECT,
            CreateAttestation {
                id: None,
                entity_kind: EntityKind::Iteration,
                entity_id: "iter-1".into(),
                kind: "iteration.approved".into(),
                ts: None,
                payload: None,
            },
        )
        .await
        .unwrap();

    let validated = engine
        .set_iteration_status(ADMIN, PROJECT, "iter-1", IterationStatus::Validated)
        .await
        .unwrap();
    assert_eq!(validated.status, IterationStatus::Validated);
}

#[tokio::test]
async fn iteration_self_transition_rejected() {
    let engine = engine().await;
    engine
        .create_iteration(ADMIN, PROJECT, "iter-2", "Repeat")
        .await
        .unwrap();
    engine
        .set_iteration_status(ADMIN, PROJECT, "iter-2", IterationStatus::Running)
        .await
        .unwrap();
    let err = engine
        .set_iteration_status(ADMIN, PROJECT, "iter-2", IterationStatus::Running)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidTransition);
}

#[tokio::test]
async fn rejected_iteration_can_retry() {
    let engine = engine().await;
    engine
        .create_iteration(ADMIN, PROJECT, "iter-3", "Retry")
        .await
        .unwrap();
    for status in [
        IterationStatus::Running,
        IterationStatus::Delivered,
        IterationStatus::Rejected,
        IterationStatus::Running,
    ] {
        engine
            .set_iteration_status(ADMIN, PROJECT, "iter-3", status)
            .await
            .unwrap();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RBAC & attestation authority
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn unauthorized_create_denied_and_journaled() {
    let engine = engine().await;
    let err = engine
        .create_task("intruder", PROJECT, technical_task("Nope"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);

    let denied = engine
        .list_events(
            PROJECT,
            EventFilter {
                event_type: Some("auth.denied".into()),
                entity_kind: None,
            },
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(denied.items.len(), 1);
    assert_eq!(denied.items[0].actor_id, "intruder");
}

#[tokio::test]
async fn role_grant_enables_claim_but_not_force() {
    let engine = engine().await;
    let task = engine
        .create_task(ADMIN, PROJECT, technical_task("Claim me"))
        .await
        .unwrap();

    let err = engine.claim_task("dev-1", PROJECT, &task.id).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);

    engine.grant_role(ADMIN, PROJECT, "dev-1", "dev").await.unwrap();
    engine.claim_task("dev-1", PROJECT, &task.id).await.unwrap();

    // The lease admits the owner; force=true without task.force_done
    // does not deny the call, it just fails to bypass validation, which
    // is unsatisfied here (technical tasks need one of ci.passed /
    // review.approved).
    let err = engine
        .complete_task("dev-1", PROJECT, &task.id, true, None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationFailed);

    // With the policy satisfied the same call succeeds, unforced.
    attest_task(&engine, "dev-1", &task.id, "ci.passed").await;
    let done = engine
        .complete_task("dev-1", PROJECT, &task.id, true, None)
        .await
        .unwrap();
    assert_eq!(done.status, TaskStatus::Done);

    let forced = engine
        .list_events(
            PROJECT,
            EventFilter {
                event_type: Some("task.force_done".into()),
                entity_kind: None,
            },
            None,
            None,
        )
        .await
        .unwrap();
    assert!(forced.items.is_empty());
}

#[tokio::test]
async fn attestation_kind_needs_authority() {
    let engine = engine().await;
    let task = engine
        .create_task(ADMIN, PROJECT, technical_task("Secure task"))
        .await
        .unwrap();
    engine
        .grant_role(ADMIN, PROJECT, "rev1", "reviewer")
        .await
        .unwrap();

    // reviewer is mapped to review.approved by default.
    engine
        .create_attestation(
            "rev1",
            PROJECT,
            CreateAttestation {
                id: None,
                entity_kind: EntityKind::Task,
                entity_id: task.id.clone(),
                kind: "review.approved".into(),
                ts: None,
                payload: None,
            },
        )
        .await
        .unwrap();

    // security.ok is deliberately unmapped.
    let err = engine
        .create_attestation(
            "rev1",
            PROJECT,
            CreateAttestation {
                id: None,
                entity_kind: EntityKind::Task,
                entity_id: task.id.clone(),
                kind: "security.ok".into(),
                ts: None,
                payload: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ForbiddenAttestationKind);

    // Until an admin maps it to the reviewer role.
    engine
        .set_attestation_authority(ADMIN, PROJECT, "security.ok", "reviewer")
        .await
        .unwrap();
    engine
        .create_attestation(
            "rev1",
            PROJECT,
            CreateAttestation {
                id: None,
                entity_kind: EntityKind::Task,
                entity_id: task.id,
                kind: "security.ok".into(),
                ts: None,
                payload: None,
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn unknown_attestation_kind_rejected() {
    let engine = engine().await;
    let task = engine
        .create_task(ADMIN, PROJECT, technical_task("Target"))
        .await
        .unwrap();
    let err = engine
        .create_attestation(
            ADMIN,
            PROJECT,
            CreateAttestation {
                id: None,
                entity_kind: EntityKind::Task,
                entity_id: task.id,
                kind: "made.up".into(),
                ts: None,
                payload: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::BadRequest);
}

#[tokio::test]
async fn attestation_on_missing_entity_is_not_found() {
    let engine = engine().await;
    let err = engine
        .create_attestation(
            ADMIN,
            PROJECT,
            CreateAttestation {
                id: None,
                entity_kind: EntityKind::Task,
                entity_id: "ghost".into(),
                kind: "ci.passed".into(),
                ts: None,
                payload: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[tokio::test]
async fn revoke_role_removes_access() {
    let engine = engine().await;
    engine.grant_role(ADMIN, PROJECT, "dev-1", "dev").await.unwrap();
    let whoami = engine.whoami("dev-1", PROJECT).await.unwrap();
    assert_eq!(whoami.roles, vec!["dev"]);

    engine.revoke_role(ADMIN, PROJECT, "dev-1", "dev").await.unwrap();
    let whoami = engine.whoami("dev-1", PROJECT).await.unwrap();
    assert!(whoami.roles.is_empty());
    assert!(whoami.permissions.is_empty());

    let err = engine
        .create_task("dev-1", PROJECT, technical_task("No more"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Decisions
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn decisions_are_created_once() {
    let engine = engine().await;
    let decision = engine
        .create_decision(
            ADMIN,
            PROJECT,
            CreateDecision {
                id: "dec-1".into(),
                title: "Choose db".into(),
                decision: "Use sqlite".into(),
                decider_id: "cto".into(),
                context: None,
                rationale: vec!["embedded".into()],
                alternatives: vec!["postgres".into()],
            },
        )
        .await
        .unwrap();
    assert_eq!(decision.rationale, vec!["embedded"]);

    let err = engine
        .create_decision(
            ADMIN,
            PROJECT,
            CreateDecision {
                id: "dec-1".into(),
                title: "Again".into(),
                decision: "dup".into(),
                decider_id: "cto".into(),
                context: None,
                rationale: vec![],
                alternatives: vec![],
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Conflict);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Events & pagination
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn every_mutation_journals_with_the_caller() {
    let engine = engine().await;
    let task = engine
        .create_task(ADMIN, PROJECT, technical_task("Journaled"))
        .await
        .unwrap();
    engine.claim_task(ADMIN, PROJECT, &task.id).await.unwrap();

    let events = engine
        .list_events(PROJECT, EventFilter::default(), Some(100), None)
        .await
        .unwrap();
    assert!(!events.items.is_empty());
    for event in &events.items {
        assert_eq!(event.actor_id, ADMIN);
    }
    // Ids strictly decrease in the listing (strictly increase in commit order).
    for pair in events.items.windows(2) {
        assert!(pair[0].id > pair[1].id);
    }
}

#[tokio::test]
async fn event_type_filter_is_exact() {
    let engine = engine().await;
    engine
        .create_task(ADMIN, PROJECT, technical_task("One"))
        .await
        .unwrap();

    let page = engine
        .list_events(
            PROJECT,
            EventFilter {
                event_type: Some("task.created".into()),
                entity_kind: None,
            },
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);

    let none = engine
        .list_events(
            PROJECT,
            EventFilter {
                event_type: Some("no.such.type".into()),
                entity_kind: None,
            },
            None,
            None,
        )
        .await
        .unwrap();
    assert!(none.items.is_empty());
}

#[tokio::test]
async fn task_listing_paginates_without_overlap() {
    let (engine, clock) = engine_with_clock().await;
    for i in 0..5 {
        let mut req = technical_task(&format!("Task {i}"));
        req.id = Some(format!("task-{i}"));
        engine.create_task(ADMIN, PROJECT, req).await.unwrap();
        clock.advance(Duration::seconds(1));
    }

    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = engine
            .list_tasks(PROJECT, Some(2), cursor.as_deref())
            .await
            .unwrap();
        for task in &page.items {
            assert!(!seen.contains(&task.id), "duplicate {}", task.id);
            seen.push(task.id.clone());
        }
        if page.next_cursor.is_empty() {
            break;
        }
        cursor = Some(page.next_cursor);
    }
    // Newest first.
    assert_eq!(
        seen,
        vec!["task-4", "task-3", "task-2", "task-1", "task-0"]
    );
}

#[tokio::test]
async fn pagination_breaks_created_at_ties_by_id() {
    let (engine, _clock) = engine_with_clock().await;
    // Same timestamp for all three.
    for id in ["tie-a", "tie-b", "tie-c"] {
        let mut req = technical_task(id);
        req.id = Some(id.into());
        engine.create_task(ADMIN, PROJECT, req).await.unwrap();
    }

    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = engine
            .list_tasks(PROJECT, Some(1), cursor.as_deref())
            .await
            .unwrap();
        seen.extend(page.items.iter().map(|t| t.id.clone()));
        if page.next_cursor.is_empty() {
            break;
        }
        cursor = Some(page.next_cursor);
    }
    assert_eq!(seen, vec!["tie-c", "tie-b", "tie-a"]);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Task tree
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn task_tree_nests_children() {
    let engine = engine().await;
    let mut req = technical_task("Parent task");
    req.id = Some("parent-1".into());
    engine.create_task(ADMIN, PROJECT, req).await.unwrap();

    let mut req = technical_task("Child task");
    req.id = Some("child-1".into());
    req.parent_id = Some("parent-1".into());
    engine.create_task(ADMIN, PROJECT, req).await.unwrap();

    let mut req = technical_task("Grandchild");
    req.id = Some("grandchild-1".into());
    req.parent_id = Some("child-1".into());
    engine.create_task(ADMIN, PROJECT, req).await.unwrap();

    let tree = engine.task_tree(PROJECT).await.unwrap();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].task.id, "parent-1");
    assert_eq!(tree[0].children.len(), 1);
    assert_eq!(tree[0].children[0].task.id, "child-1");
    assert_eq!(tree[0].children[0].children[0].task.id, "grandchild-1");
    assert!(tree[0].children[0].children[0].children.is_empty());
}
