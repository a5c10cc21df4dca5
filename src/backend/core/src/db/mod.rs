//! Persistence layer.
//!
//! A single embedded SQLite database under the workspace directory.
//! Two pools share it: `writer` is capped at one connection so that
//! every mutating transaction serializes (the single-writer equivalent
//! of `BEGIN IMMEDIATE`), while `reader` serves snapshot reads
//! concurrently through WAL.
//!
//! Row operations are free functions taking a `&mut SqliteConnection`,
//! so the engine can compose them inside one transaction or run them
//! against a reader connection.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{pool::PoolConnection, Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock::{format_ts, parse_ts};
use crate::config::ProjectConfig;
use crate::domain::{
    Attestation, Decision, EntityKind, Event, Iteration, IterationStatus, Lease, Project, Task,
    TaskStatus, TaskType, ValidationMode,
};
use crate::error::{Error, Result};
use crate::pagination::{EventCursor, KeyCursor};

// ═══════════════════════════════════════════════════════════════════════════════
// Workspace Layout
// ═══════════════════════════════════════════════════════════════════════════════

/// Directory under the workspace root holding all Proofline state.
pub const WORKSPACE_DIR: &str = ".proofline";
/// Database file name inside [`WORKSPACE_DIR`].
pub const DB_FILE: &str = "proofline.db";
/// Optional YAML config file inside [`WORKSPACE_DIR`].
pub const CONFIG_FILE: &str = "proofline.yml";

pub fn state_dir(workspace: &Path) -> PathBuf {
    workspace.join(WORKSPACE_DIR)
}

pub fn db_path(workspace: &Path) -> PathBuf {
    state_dir(workspace).join(DB_FILE)
}

pub fn config_path(workspace: &Path) -> PathBuf {
    state_dir(workspace).join(CONFIG_FILE)
}

/// Create the workspace state directory if needed, returning it.
pub fn ensure_workspace(workspace: &Path) -> Result<PathBuf> {
    let dir = state_dir(workspace);
    std::fs::create_dir_all(&dir)
        .map_err(|e| Error::internal(format!("cannot create {}: {e}", dir.display())))?;
    Ok(dir)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Store
// ═══════════════════════════════════════════════════════════════════════════════

/// Handle to the embedded database.
#[derive(Clone)]
pub struct Store {
    writer: SqlitePool,
    reader: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database under a workspace
    /// directory and apply pending migrations.
    pub async fn open(workspace: &Path) -> Result<Self> {
        ensure_workspace(workspace)?;
        let options = SqliteConnectOptions::new()
            .filename(db_path(workspace))
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options.clone())
            .await?;
        let reader = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options.create_if_missing(false).read_only(true))
            .await?;

        let store = Self { writer, reader };
        store.migrate().await?;
        Ok(store)
    }

    /// Open an in-memory database (tests). Reads and writes share the
    /// single connection, which also keeps the data alive.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .foreign_keys(true);
        // Reclaiming the sole connection would drop the database.
        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let reader = writer.clone();
        let store = Self { writer, reader };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.writer)
            .await
            .map_err(|e| Error::internal("migration failed").with_source(e))?;
        Ok(())
    }

    /// Begin a mutating transaction. Dropping the transaction without
    /// committing rolls it back.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.writer.begin().await?)
    }

    /// A connection for snapshot reads.
    pub async fn read_conn(&self) -> Result<PoolConnection<Sqlite>> {
        Ok(self.reader.acquire().await?)
    }

    pub async fn close(&self) {
        self.writer.close().await;
        self.reader.close().await;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Row Types
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, sqlx::FromRow)]
struct ProjectRow {
    id: String,
    kind: String,
    status: String,
    description: String,
    created_at: String,
}

#[derive(Debug, sqlx::FromRow)]
struct IterationRow {
    id: String,
    project_id: String,
    goal: String,
    status: String,
    created_at: String,
}

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: String,
    project_id: String,
    iteration_id: Option<String>,
    parent_id: Option<String>,
    task_type: String,
    title: String,
    description: String,
    status: String,
    assignee_id: Option<String>,
    work_proof: Option<String>,
    validation_mode: String,
    required_attestations: String,
    required_threshold: Option<i64>,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct DecisionRow {
    id: String,
    project_id: String,
    title: String,
    decision: String,
    decider_id: String,
    context: Option<String>,
    rationale: String,
    alternatives: String,
    created_at: String,
}

#[derive(Debug, sqlx::FromRow)]
struct AttestationRow {
    id: String,
    project_id: String,
    entity_kind: String,
    entity_id: String,
    kind: String,
    actor_id: String,
    ts: String,
    payload: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct LeaseRow {
    task_id: String,
    owner_id: String,
    acquired_at: String,
    expires_at: String,
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: i64,
    ts: String,
    #[sqlx(rename = "type")]
    event_type: String,
    project_id: String,
    entity_kind: String,
    entity_id: String,
    actor_id: String,
    payload: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Row Conversions
// ═══════════════════════════════════════════════════════════════════════════════

fn ts_col(raw: &str) -> Result<DateTime<Utc>> {
    parse_ts(raw).ok_or_else(|| Error::internal(format!("corrupt timestamp column: {raw}")))
}

fn opt_ts_col(raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    raw.map(ts_col).transpose()
}

fn json_col(raw: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw).map_err(|e| Error::internal("corrupt JSON column").with_source(e))
}

fn opt_json_col(raw: Option<&str>) -> Result<Option<serde_json::Value>> {
    raw.map(json_col).transpose()
}

fn string_list_col(raw: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw).map_err(|e| Error::internal("corrupt JSON column").with_source(e))
}

impl ProjectRow {
    fn into_domain(self) -> Result<Project> {
        Ok(Project {
            created_at: ts_col(&self.created_at)?,
            id: self.id,
            kind: self.kind,
            status: self.status,
            description: self.description,
        })
    }
}

impl IterationRow {
    fn into_domain(self) -> Result<Iteration> {
        Ok(Iteration {
            status: IterationStatus::parse(&self.status)
                .ok_or_else(|| Error::internal(format!("corrupt iteration status: {}", self.status)))?,
            created_at: ts_col(&self.created_at)?,
            id: self.id,
            project_id: self.project_id,
            goal: self.goal,
        })
    }
}

impl TaskRow {
    fn into_domain(self, depends_on: Vec<String>) -> Result<Task> {
        Ok(Task {
            task_type: TaskType::parse(&self.task_type)
                .ok_or_else(|| Error::internal(format!("corrupt task type: {}", self.task_type)))?,
            status: TaskStatus::parse(&self.status)
                .ok_or_else(|| Error::internal(format!("corrupt task status: {}", self.status)))?,
            validation_mode: ValidationMode::parse(&self.validation_mode)
                .ok_or_else(|| Error::internal(format!("corrupt validation mode: {}", self.validation_mode)))?,
            required_attestations: string_list_col(&self.required_attestations)?,
            required_threshold: self.required_threshold.map(|t| t as u32),
            work_proof: opt_json_col(self.work_proof.as_deref())?,
            created_at: ts_col(&self.created_at)?,
            updated_at: ts_col(&self.updated_at)?,
            completed_at: opt_ts_col(self.completed_at.as_deref())?,
            id: self.id,
            project_id: self.project_id,
            iteration_id: self.iteration_id,
            parent_id: self.parent_id,
            title: self.title,
            description: self.description,
            assignee_id: self.assignee_id,
            depends_on,
        })
    }
}

impl DecisionRow {
    fn into_domain(self) -> Result<Decision> {
        Ok(Decision {
            context: opt_json_col(self.context.as_deref())?,
            rationale: string_list_col(&self.rationale)?,
            alternatives: string_list_col(&self.alternatives)?,
            created_at: ts_col(&self.created_at)?,
            id: self.id,
            project_id: self.project_id,
            title: self.title,
            decision: self.decision,
            decider_id: self.decider_id,
        })
    }
}

impl AttestationRow {
    fn into_domain(self) -> Result<Attestation> {
        Ok(Attestation {
            entity_kind: EntityKind::parse(&self.entity_kind)
                .ok_or_else(|| Error::internal(format!("corrupt entity kind: {}", self.entity_kind)))?,
            ts: ts_col(&self.ts)?,
            payload: opt_json_col(self.payload.as_deref())?,
            id: self.id,
            project_id: self.project_id,
            entity_id: self.entity_id,
            kind: self.kind,
            actor_id: self.actor_id,
        })
    }
}

impl LeaseRow {
    fn into_domain(self) -> Result<Lease> {
        Ok(Lease {
            acquired_at: ts_col(&self.acquired_at)?,
            expires_at: ts_col(&self.expires_at)?,
            task_id: self.task_id,
            owner_id: self.owner_id,
        })
    }
}

impl EventRow {
    fn into_domain(self) -> Result<Event> {
        Ok(Event {
            ts: ts_col(&self.ts)?,
            payload: json_col(&self.payload)?,
            id: self.id,
            event_type: self.event_type,
            project_id: self.project_id,
            entity_kind: self.entity_kind,
            entity_id: self.entity_id,
            actor_id: self.actor_id,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Project Operations
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn insert_project(conn: &mut SqliteConnection, project: &Project) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO projects (id, kind, status, description, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(&project.id)
    .bind(&project.kind)
    .bind(&project.status)
    .bind(&project.description)
    .bind(format_ts(project.created_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn get_project(conn: &mut SqliteConnection, id: &str) -> Result<Option<Project>> {
    let row = sqlx::query_as::<_, ProjectRow>(
        "SELECT id, kind, status, description, created_at FROM projects WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    row.map(ProjectRow::into_domain).transpose()
}

pub async fn list_projects(conn: &mut SqliteConnection) -> Result<Vec<Project>> {
    let rows = sqlx::query_as::<_, ProjectRow>(
        "SELECT id, kind, status, description, created_at FROM projects ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(ProjectRow::into_domain).collect()
}

pub async fn upsert_project_config(
    conn: &mut SqliteConnection,
    project_id: &str,
    config: &ProjectConfig,
) -> Result<()> {
    let document = serde_json::to_string(config)?;
    sqlx::query(
        r#"
        INSERT INTO project_configs (project_id, document) VALUES (?1, ?2)
        ON CONFLICT (project_id) DO UPDATE SET document = excluded.document
        "#,
    )
    .bind(project_id)
    .bind(document)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn get_project_config(
    conn: &mut SqliteConnection,
    project_id: &str,
) -> Result<Option<ProjectConfig>> {
    let document: Option<(String,)> =
        sqlx::query_as("SELECT document FROM project_configs WHERE project_id = ?1")
            .bind(project_id)
            .fetch_optional(&mut *conn)
            .await?;
    document
        .map(|(doc,)| {
            serde_json::from_str(&doc)
                .map_err(|e| Error::internal("corrupt project config").with_source(e))
        })
        .transpose()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Task Operations
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn insert_task(conn: &mut SqliteConnection, task: &Task) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO tasks (
            id, project_id, iteration_id, parent_id, task_type, title, description,
            status, assignee_id, work_proof, validation_mode, required_attestations,
            required_threshold, created_at, updated_at, completed_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
        "#,
    )
    .bind(&task.id)
    .bind(&task.project_id)
    .bind(&task.iteration_id)
    .bind(&task.parent_id)
    .bind(task.task_type.as_str())
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.status.as_str())
    .bind(&task.assignee_id)
    .bind(task.work_proof.as_ref().map(|v| v.to_string()))
    .bind(task.validation_mode.as_str())
    .bind(serde_json::to_string(&task.required_attestations)?)
    .bind(task.required_threshold.map(i64::from))
    .bind(format_ts(task.created_at))
    .bind(format_ts(task.updated_at))
    .bind(task.completed_at.map(format_ts))
    .execute(&mut *conn)
    .await?;

    for dep in &task.depends_on {
        add_dependency(conn, &task.id, dep).await?;
    }
    Ok(())
}

/// Persist every mutable task field. Dependency edges are managed
/// separately via [`add_dependency`]/[`remove_dependency`].
pub async fn update_task(conn: &mut SqliteConnection, task: &Task) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE tasks SET
            iteration_id = ?2, parent_id = ?3, title = ?4, description = ?5,
            status = ?6, assignee_id = ?7, work_proof = ?8, validation_mode = ?9,
            required_attestations = ?10, required_threshold = ?11,
            updated_at = ?12, completed_at = ?13
        WHERE id = ?1
        "#,
    )
    .bind(&task.id)
    .bind(&task.iteration_id)
    .bind(&task.parent_id)
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.status.as_str())
    .bind(&task.assignee_id)
    .bind(task.work_proof.as_ref().map(|v| v.to_string()))
    .bind(task.validation_mode.as_str())
    .bind(serde_json::to_string(&task.required_attestations)?)
    .bind(task.required_threshold.map(i64::from))
    .bind(format_ts(task.updated_at))
    .bind(task.completed_at.map(format_ts))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

const TASK_COLUMNS: &str = "id, project_id, iteration_id, parent_id, task_type, title, \
     description, status, assignee_id, work_proof, validation_mode, required_attestations, \
     required_threshold, created_at, updated_at, completed_at";

pub async fn get_task(
    conn: &mut SqliteConnection,
    project_id: &str,
    id: &str,
) -> Result<Option<Task>> {
    let row = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE project_id = ?1 AND id = ?2"
    ))
    .bind(project_id)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    match row {
        Some(row) => {
            let deps = depends_on(conn, id).await?;
            Ok(Some(row.into_domain(deps)?))
        }
        None => Ok(None),
    }
}

pub async fn list_tasks(
    conn: &mut SqliteConnection,
    project_id: &str,
    limit: i64,
    cursor: Option<&KeyCursor>,
) -> Result<Vec<Task>> {
    let rows = match cursor {
        Some(cursor) => {
            sqlx::query_as::<_, TaskRow>(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE project_id = ?1 AND (created_at, id) < (?2, ?3)
                 ORDER BY created_at DESC, id DESC LIMIT ?4"
            ))
            .bind(project_id)
            .bind(&cursor.created_at)
            .bind(&cursor.id)
            .bind(limit)
            .fetch_all(&mut *conn)
            .await?
        }
        None => {
            sqlx::query_as::<_, TaskRow>(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE project_id = ?1
                 ORDER BY created_at DESC, id DESC LIMIT ?2"
            ))
            .bind(project_id)
            .bind(limit)
            .fetch_all(&mut *conn)
            .await?
        }
    };

    let mut tasks = Vec::with_capacity(rows.len());
    for row in rows {
        let deps = depends_on(conn, &row.id).await?;
        tasks.push(row.into_domain(deps)?);
    }
    Ok(tasks)
}

/// Every task of a project, newest first, with dependencies loaded.
pub async fn list_all_tasks(conn: &mut SqliteConnection, project_id: &str) -> Result<Vec<Task>> {
    let rows = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE project_id = ?1 ORDER BY created_at DESC, id DESC"
    ))
    .bind(project_id)
    .fetch_all(&mut *conn)
    .await?;
    let mut tasks = Vec::with_capacity(rows.len());
    for row in rows {
        let deps = depends_on(conn, &row.id).await?;
        tasks.push(row.into_domain(deps)?);
    }
    Ok(tasks)
}

pub async fn depends_on(conn: &mut SqliteConnection, task_id: &str) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT depends_on_id FROM task_dependencies WHERE task_id = ?1 ORDER BY depends_on_id",
    )
    .bind(task_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn add_dependency(
    conn: &mut SqliteConnection,
    task_id: &str,
    depends_on_id: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO task_dependencies (task_id, depends_on_id) VALUES (?1, ?2)",
    )
    .bind(task_id)
    .bind(depends_on_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn remove_dependency(
    conn: &mut SqliteConnection,
    task_id: &str,
    depends_on_id: &str,
) -> Result<()> {
    sqlx::query("DELETE FROM task_dependencies WHERE task_id = ?1 AND depends_on_id = ?2")
        .bind(task_id)
        .bind(depends_on_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// All dependency edges `(task, depends_on)` within a project.
pub async fn dependency_edges(
    conn: &mut SqliteConnection,
    project_id: &str,
) -> Result<Vec<(String, String)>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT d.task_id, d.depends_on_id
        FROM task_dependencies d
        JOIN tasks t ON t.id = d.task_id
        WHERE t.project_id = ?1
        "#,
    )
    .bind(project_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

/// Map of task id -> parent id for every project task that has a parent.
pub async fn parent_map(
    conn: &mut SqliteConnection,
    project_id: &str,
) -> Result<HashMap<String, String>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT id, parent_id FROM tasks WHERE project_id = ?1 AND parent_id IS NOT NULL",
    )
    .bind(project_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().collect())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Iteration Operations
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn insert_iteration(conn: &mut SqliteConnection, iteration: &Iteration) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO iterations (id, project_id, goal, status, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(&iteration.id)
    .bind(&iteration.project_id)
    .bind(&iteration.goal)
    .bind(iteration.status.as_str())
    .bind(format_ts(iteration.created_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn get_iteration(
    conn: &mut SqliteConnection,
    project_id: &str,
    id: &str,
) -> Result<Option<Iteration>> {
    let row = sqlx::query_as::<_, IterationRow>(
        "SELECT id, project_id, goal, status, created_at FROM iterations WHERE project_id = ?1 AND id = ?2",
    )
    .bind(project_id)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    row.map(IterationRow::into_domain).transpose()
}

pub async fn set_iteration_status(
    conn: &mut SqliteConnection,
    id: &str,
    status: IterationStatus,
) -> Result<()> {
    sqlx::query("UPDATE iterations SET status = ?2 WHERE id = ?1")
        .bind(id)
        .bind(status.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn list_iterations(
    conn: &mut SqliteConnection,
    project_id: &str,
    limit: i64,
    cursor: Option<&KeyCursor>,
) -> Result<Vec<Iteration>> {
    let rows = match cursor {
        Some(cursor) => {
            sqlx::query_as::<_, IterationRow>(
                "SELECT id, project_id, goal, status, created_at FROM iterations
                 WHERE project_id = ?1 AND (created_at, id) < (?2, ?3)
                 ORDER BY created_at DESC, id DESC LIMIT ?4",
            )
            .bind(project_id)
            .bind(&cursor.created_at)
            .bind(&cursor.id)
            .bind(limit)
            .fetch_all(&mut *conn)
            .await?
        }
        None => {
            sqlx::query_as::<_, IterationRow>(
                "SELECT id, project_id, goal, status, created_at FROM iterations
                 WHERE project_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
            )
            .bind(project_id)
            .bind(limit)
            .fetch_all(&mut *conn)
            .await?
        }
    };
    rows.into_iter().map(IterationRow::into_domain).collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Decision Operations
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn insert_decision(conn: &mut SqliteConnection, decision: &Decision) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO decisions (id, project_id, title, decision, decider_id, context,
                               rationale, alternatives, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&decision.id)
    .bind(&decision.project_id)
    .bind(&decision.title)
    .bind(&decision.decision)
    .bind(&decision.decider_id)
    .bind(decision.context.as_ref().map(|v| v.to_string()))
    .bind(serde_json::to_string(&decision.rationale)?)
    .bind(serde_json::to_string(&decision.alternatives)?)
    .bind(format_ts(decision.created_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn get_decision(
    conn: &mut SqliteConnection,
    project_id: &str,
    id: &str,
) -> Result<Option<Decision>> {
    let row = sqlx::query_as::<_, DecisionRow>(
        "SELECT id, project_id, title, decision, decider_id, context, rationale, alternatives, created_at
         FROM decisions WHERE project_id = ?1 AND id = ?2",
    )
    .bind(project_id)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    row.map(DecisionRow::into_domain).transpose()
}

pub async fn list_decisions(
    conn: &mut SqliteConnection,
    project_id: &str,
    limit: i64,
    cursor: Option<&KeyCursor>,
) -> Result<Vec<Decision>> {
    let rows = match cursor {
        Some(cursor) => {
            sqlx::query_as::<_, DecisionRow>(
                "SELECT id, project_id, title, decision, decider_id, context, rationale, alternatives, created_at
                 FROM decisions WHERE project_id = ?1 AND (created_at, id) < (?2, ?3)
                 ORDER BY created_at DESC, id DESC LIMIT ?4",
            )
            .bind(project_id)
            .bind(&cursor.created_at)
            .bind(&cursor.id)
            .bind(limit)
            .fetch_all(&mut *conn)
            .await?
        }
        None => {
            sqlx::query_as::<_, DecisionRow>(
                "SELECT id, project_id, title, decision, decider_id, context, rationale, alternatives, created_at
                 FROM decisions WHERE project_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
            )
            .bind(project_id)
            .bind(limit)
            .fetch_all(&mut *conn)
            .await?
        }
    };
    rows.into_iter().map(DecisionRow::into_domain).collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Attestation Operations
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn insert_attestation(
    conn: &mut SqliteConnection,
    attestation: &Attestation,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO attestations (id, project_id, entity_kind, entity_id, kind, actor_id, ts, payload)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&attestation.id)
    .bind(&attestation.project_id)
    .bind(attestation.entity_kind.as_str())
    .bind(&attestation.entity_id)
    .bind(&attestation.kind)
    .bind(&attestation.actor_id)
    .bind(format_ts(attestation.ts))
    .bind(attestation.payload.as_ref().map(|v| v.to_string()))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// The kinds currently attached to an entity (duplicates preserved).
pub async fn attested_kinds(
    conn: &mut SqliteConnection,
    project_id: &str,
    entity_kind: EntityKind,
    entity_id: &str,
) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT kind FROM attestations
         WHERE project_id = ?1 AND entity_kind = ?2 AND entity_id = ?3
         ORDER BY ts, id",
    )
    .bind(project_id)
    .bind(entity_kind.as_str())
    .bind(entity_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(|(kind,)| kind).collect())
}

pub async fn list_attestations(
    conn: &mut SqliteConnection,
    project_id: &str,
    limit: i64,
    cursor: Option<&KeyCursor>,
) -> Result<Vec<Attestation>> {
    let rows = match cursor {
        Some(cursor) => {
            sqlx::query_as::<_, AttestationRow>(
                "SELECT id, project_id, entity_kind, entity_id, kind, actor_id, ts, payload
                 FROM attestations WHERE project_id = ?1 AND (ts, id) < (?2, ?3)
                 ORDER BY ts DESC, id DESC LIMIT ?4",
            )
            .bind(project_id)
            .bind(&cursor.created_at)
            .bind(&cursor.id)
            .bind(limit)
            .fetch_all(&mut *conn)
            .await?
        }
        None => {
            sqlx::query_as::<_, AttestationRow>(
                "SELECT id, project_id, entity_kind, entity_id, kind, actor_id, ts, payload
                 FROM attestations WHERE project_id = ?1 ORDER BY ts DESC, id DESC LIMIT ?2",
            )
            .bind(project_id)
            .bind(limit)
            .fetch_all(&mut *conn)
            .await?
        }
    };
    rows.into_iter().map(AttestationRow::into_domain).collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Lease Operations
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn get_lease(conn: &mut SqliteConnection, task_id: &str) -> Result<Option<Lease>> {
    let row = sqlx::query_as::<_, LeaseRow>(
        "SELECT task_id, owner_id, acquired_at, expires_at FROM leases WHERE task_id = ?1",
    )
    .bind(task_id)
    .fetch_optional(&mut *conn)
    .await?;
    row.map(LeaseRow::into_domain).transpose()
}

/// Insert or overwrite the lease row for a task.
pub async fn put_lease(conn: &mut SqliteConnection, lease: &Lease) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO leases (task_id, owner_id, acquired_at, expires_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT (task_id) DO UPDATE SET
            owner_id = excluded.owner_id,
            acquired_at = excluded.acquired_at,
            expires_at = excluded.expires_at
        "#,
    )
    .bind(&lease.task_id)
    .bind(&lease.owner_id)
    .bind(format_ts(lease.acquired_at))
    .bind(format_ts(lease.expires_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn delete_lease(conn: &mut SqliteConnection, task_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM leases WHERE task_id = ?1")
        .bind(task_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Event Operations
// ═══════════════════════════════════════════════════════════════════════════════

/// Append one journal entry, returning its monotonic id.
#[allow(clippy::too_many_arguments)]
pub async fn append_event(
    conn: &mut SqliteConnection,
    ts: DateTime<Utc>,
    event_type: &str,
    project_id: &str,
    entity_kind: &str,
    entity_id: &str,
    actor_id: &str,
    payload: serde_json::Value,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO events (ts, type, project_id, entity_kind, entity_id, actor_id, payload)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(format_ts(ts))
    .bind(event_type)
    .bind(project_id)
    .bind(entity_kind)
    .bind(entity_id)
    .bind(actor_id)
    .bind(payload.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Filters applied to an event listing. Exact matches; unknown values
/// simply match nothing.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_type: Option<String>,
    pub entity_kind: Option<String>,
}

pub async fn list_events(
    conn: &mut SqliteConnection,
    project_id: &str,
    filter: &EventFilter,
    limit: i64,
    cursor: Option<EventCursor>,
) -> Result<Vec<Event>> {
    // Clauses use bare `?` placeholders so binds stay positional as the
    // filter combination varies.
    let mut sql = String::from(
        "SELECT id, ts, type, project_id, entity_kind, entity_id, actor_id, payload
         FROM events WHERE project_id = ?",
    );
    if filter.event_type.is_some() {
        sql.push_str(" AND type = ?");
    }
    if filter.entity_kind.is_some() {
        sql.push_str(" AND entity_kind = ?");
    }
    if cursor.is_some() {
        sql.push_str(" AND id < ?");
    }
    sql.push_str(" ORDER BY id DESC LIMIT ?");

    let mut query = sqlx::query_as::<_, EventRow>(&sql).bind(project_id);
    if let Some(ty) = &filter.event_type {
        query = query.bind(ty);
    }
    if let Some(kind) = &filter.entity_kind {
        query = query.bind(kind);
    }
    if let Some(cursor) = cursor {
        query = query.bind(cursor.id);
    }
    let rows = query.bind(limit).fetch_all(&mut *conn).await?;
    rows.into_iter().map(EventRow::into_domain).collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// RBAC Operations
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn grant_role(
    conn: &mut SqliteConnection,
    project_id: &str,
    actor_id: &str,
    role_id: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO actor_roles (project_id, actor_id, role_id) VALUES (?1, ?2, ?3)",
    )
    .bind(project_id)
    .bind(actor_id)
    .bind(role_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn revoke_role(
    conn: &mut SqliteConnection,
    project_id: &str,
    actor_id: &str,
    role_id: &str,
) -> Result<()> {
    sqlx::query(
        "DELETE FROM actor_roles WHERE project_id = ?1 AND actor_id = ?2 AND role_id = ?3",
    )
    .bind(project_id)
    .bind(actor_id)
    .bind(role_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn actor_roles(
    conn: &mut SqliteConnection,
    project_id: &str,
    actor_id: &str,
) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT role_id FROM actor_roles WHERE project_id = ?1 AND actor_id = ?2 ORDER BY role_id",
    )
    .bind(project_id)
    .bind(actor_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(|(role,)| role).collect())
}

pub async fn set_authority(
    conn: &mut SqliteConnection,
    project_id: &str,
    kind: &str,
    role_id: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO attestation_authorities (project_id, kind, role_id) VALUES (?1, ?2, ?3)",
    )
    .bind(project_id)
    .bind(kind)
    .bind(role_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Roles entitled to assert a kind within a project.
pub async fn kind_authorities(
    conn: &mut SqliteConnection,
    project_id: &str,
    kind: &str,
) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT role_id FROM attestation_authorities WHERE project_id = ?1 AND kind = ?2",
    )
    .bind(project_id)
    .bind(kind)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(|(role,)| role).collect())
}
