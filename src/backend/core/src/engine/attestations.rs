//! Attestation operations. Attestations are append-only assertions; for
//! task targets, every new attestation recomputes and journals the
//! task's validation status.

use chrono::{DateTime, Utc};
use serde_json::json;

use super::tasks::task_policy;
use super::Engine;
use crate::clock::format_ts;
use crate::db;
use crate::domain::{Attestation, EntityKind};
use crate::error::{Error, Result};
use crate::events::{entity_kind, event_type};
use crate::pagination::{clamp_limit, KeyCursor, Page};
use crate::rbac::perm;
use crate::validation;

#[derive(Debug, Clone)]
pub struct CreateAttestation {
    pub id: Option<String>,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub kind: String,
    /// Caller-supplied timestamp; clock-assigned when absent.
    pub ts: Option<DateTime<Utc>>,
    pub payload: Option<serde_json::Value>,
}

impl Engine {
    pub async fn create_attestation(
        &self,
        actor: &str,
        project_id: &str,
        req: CreateAttestation,
    ) -> Result<Attestation> {
        if req.kind.is_empty() {
            return Err(Error::bad_request_field("kind", "attestation kind is required"));
        }
        if req.entity_id.is_empty() {
            return Err(Error::bad_request_field("entity_id", "entity_id is required"));
        }

        let mut tx = self.store().begin().await?;
        self.require_project(&mut tx, project_id).await?;

        let roles = self.roles(&mut tx, project_id, actor).await?;
        if !self.has_permission(&roles, perm::ATTESTATION_CREATE) {
            drop(tx);
            return Err(self
                .deny(
                    project_id,
                    actor,
                    perm::ATTESTATION_CREATE,
                    entity_kind::ATTESTATION,
                    &req.entity_id,
                )
                .await);
        }

        let config = self.project_config(&mut tx, project_id).await?;
        if !config.has_kind(&req.kind) {
            return Err(Error::bad_request_field(
                "kind",
                format!("attestation kind {} is not in the project catalog", req.kind),
            ));
        }

        // The kind must be mapped to one of the actor's roles, unless the
        // actor holds the bypass permission.
        if !self.has_permission(&roles, perm::ATTESTATION_BYPASS) {
            let authorities = db::kind_authorities(&mut tx, project_id, &req.kind).await?;
            let entitled = authorities.iter().any(|role| roles.contains(role));
            if !entitled {
                drop(tx);
                return Err(self
                    .deny_attestation_kind(project_id, actor, &req.kind, &req.entity_id)
                    .await);
            }
        }

        self.require_entity(&mut tx, project_id, req.entity_kind, &req.entity_id)
            .await?;

        let now = self.now();
        let attestation = Attestation {
            id: req
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            project_id: project_id.to_string(),
            entity_kind: req.entity_kind,
            entity_id: req.entity_id,
            kind: req.kind,
            actor_id: actor.to_string(),
            ts: req.ts.unwrap_or(now),
            payload: req.payload,
        };
        db::insert_attestation(&mut tx, &attestation).await?;

        db::append_event(
            &mut tx,
            now,
            event_type::ATTESTATION_CREATED,
            project_id,
            entity_kind::ATTESTATION,
            &attestation.id,
            actor,
            json!({
                "kind": attestation.kind,
                "entity_kind": attestation.entity_kind.as_str(),
                "entity_id": attestation.entity_id,
            }),
        )
        .await?;

        // A task attestation may flip the task's validation verdict;
        // journal the recomputed status in the same transaction.
        if attestation.entity_kind == EntityKind::Task {
            if let Some(task) =
                db::get_task(&mut tx, project_id, &attestation.entity_id).await?
            {
                let kinds = db::attested_kinds(
                    &mut tx,
                    project_id,
                    EntityKind::Task,
                    &attestation.entity_id,
                )
                .await?;
                let status = validation::evaluate(&task_policy(&task), &kinds);
                db::append_event(
                    &mut tx,
                    now,
                    event_type::TASK_VALIDATION_CHECKED,
                    project_id,
                    entity_kind::TASK,
                    &attestation.entity_id,
                    actor,
                    json!({
                        "satisfied": status.satisfied,
                        "present": status.present,
                        "missing": status.missing,
                    }),
                )
                .await?;
            }
        }

        tx.commit().await?;
        Ok(attestation)
    }

    pub async fn list_attestations(
        &self,
        project_id: &str,
        limit: Option<u32>,
        cursor: Option<&str>,
    ) -> Result<Page<Attestation>> {
        let mut conn = self.store().read_conn().await?;
        self.require_project(&mut conn, project_id).await?;
        let limit = clamp_limit(limit);
        let cursor = cursor.map(KeyCursor::decode).transpose()?;
        let rows = db::list_attestations(&mut conn, project_id, limit + 1, cursor.as_ref()).await?;
        Ok(Page::from_rows(rows, limit, |attestation| {
            KeyCursor {
                created_at: format_ts(attestation.ts),
                id: attestation.id.clone(),
            }
            .encode()
        }))
    }

    /// Resolve an attestation target to an existing entity of the stated
    /// kind within the project.
    async fn require_entity(
        &self,
        conn: &mut sqlx::SqliteConnection,
        project_id: &str,
        kind: EntityKind,
        entity_id: &str,
    ) -> Result<()> {
        let exists = match kind {
            EntityKind::Project => entity_id == project_id,
            EntityKind::Iteration => db::get_iteration(conn, project_id, entity_id)
                .await?
                .is_some(),
            EntityKind::Task => db::get_task(conn, project_id, entity_id).await?.is_some(),
            EntityKind::Decision => db::get_decision(conn, project_id, entity_id)
                .await?
                .is_some(),
        };
        if exists {
            Ok(())
        } else {
            Err(Error::not_found(kind.as_str(), entity_id))
        }
    }
}
