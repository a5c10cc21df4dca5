//! Decision records. Immutable after create.

use serde_json::json;

use super::Engine;
use crate::clock::format_ts;
use crate::db;
use crate::domain::Decision;
use crate::error::{Error, Result};
use crate::events::{entity_kind, event_type};
use crate::pagination::{clamp_limit, KeyCursor, Page};
use crate::rbac::perm;

#[derive(Debug, Clone, Default)]
pub struct CreateDecision {
    pub id: String,
    pub title: String,
    pub decision: String,
    pub decider_id: String,
    pub context: Option<serde_json::Value>,
    pub rationale: Vec<String>,
    pub alternatives: Vec<String>,
}

impl Engine {
    pub async fn create_decision(
        &self,
        actor: &str,
        project_id: &str,
        req: CreateDecision,
    ) -> Result<Decision> {
        if req.id.is_empty() {
            return Err(Error::bad_request_field("id", "decision id is required"));
        }
        if req.title.trim().is_empty() {
            return Err(Error::bad_request_field("title", "title is required"));
        }

        let mut tx = self.store().begin().await?;
        self.require_project(&mut tx, project_id).await?;

        let roles = self.roles(&mut tx, project_id, actor).await?;
        if !self.has_permission(&roles, perm::DECISION_CREATE) {
            drop(tx);
            return Err(self
                .deny(project_id, actor, perm::DECISION_CREATE, entity_kind::DECISION, &req.id)
                .await);
        }

        if db::get_decision(&mut tx, project_id, &req.id).await?.is_some() {
            return Err(Error::conflict(format!("decision {} already exists", req.id)));
        }

        let decision = Decision {
            id: req.id,
            project_id: project_id.to_string(),
            title: req.title,
            decision: req.decision,
            decider_id: req.decider_id,
            context: req.context,
            rationale: req.rationale,
            alternatives: req.alternatives,
            created_at: self.now(),
        };
        db::insert_decision(&mut tx, &decision).await?;
        db::append_event(
            &mut tx,
            decision.created_at,
            event_type::DECISION_CREATED,
            project_id,
            entity_kind::DECISION,
            &decision.id,
            actor,
            json!({"title": decision.title, "decider_id": decision.decider_id}),
        )
        .await?;

        tx.commit().await?;
        Ok(decision)
    }

    pub async fn list_decisions(
        &self,
        project_id: &str,
        limit: Option<u32>,
        cursor: Option<&str>,
    ) -> Result<Page<Decision>> {
        let mut conn = self.store().read_conn().await?;
        self.require_project(&mut conn, project_id).await?;
        let limit = clamp_limit(limit);
        let cursor = cursor.map(KeyCursor::decode).transpose()?;
        let rows = db::list_decisions(&mut conn, project_id, limit + 1, cursor.as_ref()).await?;
        Ok(Page::from_rows(rows, limit, |decision| {
            KeyCursor {
                created_at: format_ts(decision.created_at),
                id: decision.id.clone(),
            }
            .encode()
        }))
    }
}
