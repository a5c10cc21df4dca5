//! The engine facade.
//!
//! The single in-process authority over task/iteration state machines,
//! policy evaluation, leases, the dependency graph, authorization, and
//! the event journal. Every mutating operation runs as one writer
//! transaction: authorize, read, validate, write, append events, commit.
//! A failure at any step rolls the transaction back; dropping the future
//! mid-flight does the same.

mod attestations;
mod decisions;
mod iterations;
mod rbac_ops;
mod tasks;

pub use attestations::CreateAttestation;
pub use decisions::CreateDecision;
pub use rbac_ops::WhoAmI;
pub use tasks::{CreateTask, TaskTreeNode, UpdateTask};

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::sync::Arc;

use sqlx::SqliteConnection;

use crate::clock::{Clock, SystemClock};
use crate::config::ProjectConfig;
use crate::db::{self, EventFilter, Store};
use crate::domain::{Event, Project};
use crate::error::{Error, Result};
use crate::events::{entity_kind, event_type};
use crate::pagination::{clamp_limit, EventCursor, Page};
use crate::rbac::{self, RoleMatrix};

/// Construction-time knobs.
pub struct EngineOptions {
    /// How long a claimed lease lives before it expires.
    pub lease_ttl: Duration,
    pub clock: Arc<dyn Clock>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            lease_ttl: Duration::minutes(15),
            clock: Arc::new(SystemClock),
        }
    }
}

pub struct Engine {
    store: Store,
    matrix: RoleMatrix,
    default_config: ProjectConfig,
    lease_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl Engine {
    pub fn new(store: Store, default_config: ProjectConfig) -> Self {
        Self::with_options(store, default_config, EngineOptions::default())
    }

    pub fn with_options(
        store: Store,
        default_config: ProjectConfig,
        options: EngineOptions,
    ) -> Self {
        Self {
            store,
            matrix: RoleMatrix::seeded(),
            default_config,
            lease_ttl: options.lease_ttl,
            clock: options.clock,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn matrix(&self) -> &RoleMatrix {
        &self.matrix
    }

    /// Current time, truncated to microseconds so values round-trip
    /// unchanged through the store's fixed-width text columns.
    pub(crate) fn now(&self) -> DateTime<Utc> {
        use chrono::Timelike;
        let now = self.clock.now();
        now.with_nanosecond(now.nanosecond() / 1_000 * 1_000)
            .unwrap_or(now)
    }

    pub(crate) fn lease_ttl(&self) -> Duration {
        self.lease_ttl
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Shared helpers
    // ─────────────────────────────────────────────────────────────────────────

    pub(crate) async fn require_project(
        &self,
        conn: &mut SqliteConnection,
        project_id: &str,
    ) -> Result<Project> {
        db::get_project(conn, project_id)
            .await?
            .ok_or_else(|| Error::not_found("project", project_id))
    }

    /// The config document stored for a project, falling back to the
    /// built-in defaults for projects initialized without one.
    pub(crate) async fn project_config(
        &self,
        conn: &mut SqliteConnection,
        project_id: &str,
    ) -> Result<ProjectConfig> {
        Ok(db::get_project_config(conn, project_id)
            .await?
            .unwrap_or_else(|| ProjectConfig::default_for(project_id)))
    }

    pub(crate) async fn roles(
        &self,
        conn: &mut SqliteConnection,
        project_id: &str,
        actor: &str,
    ) -> Result<Vec<String>> {
        db::actor_roles(conn, project_id, actor).await
    }

    pub(crate) fn has_permission(&self, roles: &[String], permission: &str) -> bool {
        self.matrix.any_role_has(roles, permission)
    }

    /// Record an `auth.denied` event and return `forbidden`.
    ///
    /// The denial journals in its own transaction: the operation that
    /// triggered it rolls back, but the denial itself must survive.
    pub(crate) async fn deny(
        &self,
        project_id: &str,
        actor: &str,
        permission: &str,
        kind: &str,
        entity_id: &str,
    ) -> Error {
        let payload = json!({"permission": permission});
        if let Err(err) = self
            .record_denied(project_id, actor, kind, entity_id, payload)
            .await
        {
            tracing::warn!(error = %err, "failed to journal auth.denied");
        }
        Error::forbidden(format!("actor {actor} lacks {permission}"))
    }

    /// Denial variant for unauthorized attestation kinds.
    pub(crate) async fn deny_attestation_kind(
        &self,
        project_id: &str,
        actor: &str,
        attestation_kind: &str,
        entity_id: &str,
    ) -> Error {
        let payload = json!({"attestation_kind": attestation_kind});
        if let Err(err) = self
            .record_denied(project_id, actor, entity_kind::ATTESTATION, entity_id, payload)
            .await
        {
            tracing::warn!(error = %err, "failed to journal auth.denied");
        }
        Error::forbidden_attestation_kind(attestation_kind)
    }

    async fn record_denied(
        &self,
        project_id: &str,
        actor: &str,
        kind: &str,
        entity_id: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        let mut tx = self.store.begin().await?;
        db::append_event(
            &mut tx,
            self.now(),
            event_type::AUTH_DENIED,
            project_id,
            kind,
            entity_id,
            actor,
            payload,
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Projects
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a project, seed the creator with the admin role, seed the
    /// default attestation authorities, and persist the config document.
    pub async fn init_project(
        &self,
        actor: &str,
        project_id: &str,
        description: &str,
        config: Option<ProjectConfig>,
    ) -> Result<Project> {
        if project_id.is_empty() {
            return Err(Error::bad_request_field("id", "project id is required"));
        }
        let mut config = config.unwrap_or_else(|| {
            if self.default_config.project.id == project_id {
                self.default_config.clone()
            } else {
                ProjectConfig::default_for(project_id)
            }
        });
        config.project.id = project_id.to_string();
        config.validate()?;

        let mut tx = self.store.begin().await?;
        if db::get_project(&mut tx, project_id).await?.is_some() {
            return Err(Error::conflict(format!("project {project_id} already exists")));
        }

        let now = self.now();
        let project = Project {
            id: project_id.to_string(),
            kind: config.project.kind.clone(),
            status: "active".to_string(),
            description: description.to_string(),
            created_at: now,
        };
        db::insert_project(&mut tx, &project).await?;
        db::upsert_project_config(&mut tx, project_id, &config).await?;

        db::grant_role(&mut tx, project_id, actor, rbac::role::ADMIN).await?;
        for (kind, role) in rbac::DEFAULT_AUTHORITIES {
            if config.has_kind(kind) {
                db::set_authority(&mut tx, project_id, kind, role).await?;
            }
        }

        db::append_event(
            &mut tx,
            now,
            event_type::PROJECT_CREATED,
            project_id,
            entity_kind::PROJECT,
            project_id,
            actor,
            json!({"kind": project.kind, "description": description}),
        )
        .await?;
        db::append_event(
            &mut tx,
            now,
            event_type::RBAC_ROLE_GRANTED,
            project_id,
            entity_kind::RBAC,
            actor,
            actor,
            json!({"actor_id": actor, "role_id": rbac::role::ADMIN}),
        )
        .await?;

        tx.commit().await?;
        tracing::info!(project = project_id, "project initialized");
        Ok(project)
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        let mut conn = self.store.read_conn().await?;
        db::list_projects(&mut conn).await
    }

    pub async fn get_project(&self, project_id: &str) -> Result<Project> {
        let mut conn = self.store.read_conn().await?;
        self.require_project(&mut conn, project_id).await
    }

    pub async fn get_config(&self, project_id: &str) -> Result<ProjectConfig> {
        let mut conn = self.store.read_conn().await?;
        self.require_project(&mut conn, project_id).await?;
        self.project_config(&mut conn, project_id).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn list_events(
        &self,
        project_id: &str,
        filter: EventFilter,
        limit: Option<u32>,
        cursor: Option<&str>,
    ) -> Result<Page<Event>> {
        let mut conn = self.store.read_conn().await?;
        self.require_project(&mut conn, project_id).await?;
        let limit = clamp_limit(limit);
        let cursor = cursor.map(EventCursor::decode).transpose()?;
        let rows = db::list_events(&mut conn, project_id, &filter, limit + 1, cursor).await?;
        Ok(Page::from_rows(rows, limit, |event| {
            EventCursor { id: event.id }.encode()
        }))
    }
}
