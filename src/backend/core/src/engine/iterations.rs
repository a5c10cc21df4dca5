//! Iteration operations.

use serde_json::json;

use super::Engine;
use crate::clock::format_ts;
use crate::db;
use crate::domain::{EntityKind, Iteration, IterationStatus};
use crate::error::{Error, Result};
use crate::events::{entity_kind, event_type};
use crate::pagination::{clamp_limit, KeyCursor, Page};
use crate::rbac::perm;

impl Engine {
    pub async fn create_iteration(
        &self,
        actor: &str,
        project_id: &str,
        id: &str,
        goal: &str,
    ) -> Result<Iteration> {
        if id.is_empty() {
            return Err(Error::bad_request_field("id", "iteration id is required"));
        }

        let mut tx = self.store().begin().await?;
        self.require_project(&mut tx, project_id).await?;

        let roles = self.roles(&mut tx, project_id, actor).await?;
        if !self.has_permission(&roles, perm::ITERATION_WRITE) {
            drop(tx);
            return Err(self
                .deny(project_id, actor, perm::ITERATION_WRITE, entity_kind::ITERATION, id)
                .await);
        }

        if db::get_iteration(&mut tx, project_id, id).await?.is_some() {
            return Err(Error::conflict(format!("iteration {id} already exists")));
        }

        let iteration = Iteration {
            id: id.to_string(),
            project_id: project_id.to_string(),
            goal: goal.to_string(),
            status: IterationStatus::Pending,
            created_at: self.now(),
        };
        db::insert_iteration(&mut tx, &iteration).await?;
        db::append_event(
            &mut tx,
            iteration.created_at,
            event_type::ITERATION_CREATED,
            project_id,
            entity_kind::ITERATION,
            id,
            actor,
            json!({"goal": goal}),
        )
        .await?;

        tx.commit().await?;
        Ok(iteration)
    }

    /// Drive an iteration along its state machine. `validated` is gated
    /// on the project's configured iteration attestation kind.
    pub async fn set_iteration_status(
        &self,
        actor: &str,
        project_id: &str,
        iteration_id: &str,
        target: IterationStatus,
    ) -> Result<Iteration> {
        let mut tx = self.store().begin().await?;
        self.require_project(&mut tx, project_id).await?;

        let roles = self.roles(&mut tx, project_id, actor).await?;
        if !self.has_permission(&roles, perm::ITERATION_WRITE) {
            drop(tx);
            return Err(self
                .deny(
                    project_id,
                    actor,
                    perm::ITERATION_WRITE,
                    entity_kind::ITERATION,
                    iteration_id,
                )
                .await);
        }

        let mut iteration = db::get_iteration(&mut tx, project_id, iteration_id)
            .await?
            .ok_or_else(|| Error::not_found("iteration", iteration_id))?;

        let from = iteration.status;
        if !from.can_transition_to(target) {
            return Err(Error::invalid_transition(from.as_str(), target.as_str()));
        }

        let now = self.now();
        if target == IterationStatus::Validated {
            let config = self.project_config(&mut tx, project_id).await?;
            if let Some(required) = config.iteration_required_kind() {
                let kinds =
                    db::attested_kinds(&mut tx, project_id, EntityKind::Iteration, iteration_id)
                        .await?;
                let satisfied = kinds.iter().any(|k| k == required);
                if !satisfied {
                    return Err(Error::validation_failed(format!(
                        "iteration requires attestation {required}"
                    ))
                    .with_detail("missing", vec![required.to_string()]));
                }
                db::append_event(
                    &mut tx,
                    now,
                    event_type::ITERATION_VALIDATION_CHECKED,
                    project_id,
                    entity_kind::ITERATION,
                    iteration_id,
                    actor,
                    json!({"required": required, "satisfied": true}),
                )
                .await?;
            }
        }

        iteration.status = target;
        db::set_iteration_status(&mut tx, iteration_id, target).await?;
        db::append_event(
            &mut tx,
            now,
            event_type::ITERATION_STATUS_CHANGED,
            project_id,
            entity_kind::ITERATION,
            iteration_id,
            actor,
            json!({"from": from.as_str(), "to": target.as_str()}),
        )
        .await?;

        tx.commit().await?;
        Ok(iteration)
    }

    pub async fn get_iteration(&self, project_id: &str, iteration_id: &str) -> Result<Iteration> {
        let mut conn = self.store().read_conn().await?;
        self.require_project(&mut conn, project_id).await?;
        db::get_iteration(&mut conn, project_id, iteration_id)
            .await?
            .ok_or_else(|| Error::not_found("iteration", iteration_id))
    }

    pub async fn list_iterations(
        &self,
        project_id: &str,
        limit: Option<u32>,
        cursor: Option<&str>,
    ) -> Result<Page<Iteration>> {
        let mut conn = self.store().read_conn().await?;
        self.require_project(&mut conn, project_id).await?;
        let limit = clamp_limit(limit);
        let cursor = cursor.map(KeyCursor::decode).transpose()?;
        let rows = db::list_iterations(&mut conn, project_id, limit + 1, cursor.as_ref()).await?;
        Ok(Page::from_rows(rows, limit, |iteration| {
            KeyCursor {
                created_at: format_ts(iteration.created_at),
                id: iteration.id.clone(),
            }
            .encode()
        }))
    }
}
