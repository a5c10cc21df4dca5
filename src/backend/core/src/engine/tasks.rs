//! Task operations: create, update, claim/release, complete, validation,
//! listing and the parent/child tree.

use serde_json::json;
use std::collections::{HashMap, HashSet};

use super::Engine;
use crate::clock::format_ts;
use crate::db;
use crate::domain::{EntityKind, Lease, Task, TaskStatus, TaskType};
use crate::error::{Error, Result};
use crate::events::{entity_kind, event_type};
use crate::graph;
use crate::lease::{self, ClaimOutcome};
use crate::pagination::{clamp_limit, KeyCursor, Page};
use crate::policy::{self, EffectivePolicy, ValidationSpec};
use crate::rbac::perm;
use crate::validation::{self, ValidationStatus};

// ═══════════════════════════════════════════════════════════════════════════════
// Payloads
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
pub struct CreateTask {
    /// Caller-supplied id; generated when absent.
    pub id: Option<String>,
    pub iteration_id: Option<String>,
    pub parent_id: Option<String>,
    pub task_type: TaskType,
    pub title: String,
    pub description: Option<String>,
    pub assignee_id: Option<String>,
    pub depends_on: Vec<String>,
    /// Named preset overriding the task-type default.
    pub preset: Option<String>,
    /// Inline validation overriding any preset.
    pub validation: Option<ValidationSpec>,
    pub work_proof: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTask {
    pub status: Option<TaskStatus>,
    pub assignee_id: Option<String>,
    pub add_depends_on: Vec<String>,
    pub remove_depends_on: Vec<String>,
    pub parent_id: Option<String>,
    pub work_proof: Option<serde_json::Value>,
    pub validation: Option<ValidationSpec>,
}

/// One node of the parent/child forest.
#[derive(Debug, Clone)]
pub struct TaskTreeNode {
    pub task: Task,
    pub children: Vec<TaskTreeNode>,
}

/// The effective policy currently recorded on a task.
pub(crate) fn task_policy(task: &Task) -> EffectivePolicy {
    EffectivePolicy {
        mode: task.validation_mode,
        require: task.required_attestations.clone(),
        threshold: task.required_threshold,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Operations
// ═══════════════════════════════════════════════════════════════════════════════

impl Engine {
    pub async fn create_task(
        &self,
        actor: &str,
        project_id: &str,
        req: CreateTask,
    ) -> Result<Task> {
        if req.title.trim().is_empty() {
            return Err(Error::bad_request_field("title", "title is required"));
        }

        let mut tx = self.store().begin().await?;
        self.require_project(&mut tx, project_id).await?;

        let roles = self.roles(&mut tx, project_id, actor).await?;
        if !self.has_permission(&roles, perm::TASK_CREATE) {
            drop(tx);
            return Err(self
                .deny(project_id, actor, perm::TASK_CREATE, entity_kind::TASK, "")
                .await);
        }

        let config = self.project_config(&mut tx, project_id).await?;
        let resolution =
            policy::resolve(&config, req.task_type, req.preset.as_deref(), req.validation.as_ref())?;

        let id = req
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        if db::get_task(&mut tx, project_id, &id).await?.is_some() {
            return Err(Error::conflict(format!("task {id} already exists")));
        }

        if let Some(iteration_id) = &req.iteration_id {
            if db::get_iteration(&mut tx, project_id, iteration_id).await?.is_none() {
                return Err(Error::not_found("iteration", iteration_id));
            }
        }
        if let Some(parent_id) = &req.parent_id {
            if db::get_task(&mut tx, project_id, parent_id).await?.is_none() {
                return Err(Error::not_found("task", parent_id));
            }
            let parents = db::parent_map(&mut tx, project_id).await?;
            graph::ensure_parent_acyclic(&id, parent_id, &parents)?;
        }

        let mut depends_on = req.depends_on;
        depends_on.sort();
        depends_on.dedup();
        for dep in &depends_on {
            if db::get_task(&mut tx, project_id, dep).await?.is_none() {
                return Err(Error::not_found("task", dep));
            }
        }
        if !depends_on.is_empty() {
            let existing = db::dependency_edges(&mut tx, project_id).await?;
            let new_edges: Vec<(String, String)> = depends_on
                .iter()
                .map(|dep| (id.clone(), dep.clone()))
                .collect();
            graph::ensure_acyclic(&existing, &new_edges)?;
        }

        let now = self.now();
        let task = Task {
            id: id.clone(),
            project_id: project_id.to_string(),
            iteration_id: req.iteration_id,
            parent_id: req.parent_id,
            task_type: req.task_type,
            title: req.title,
            description: req.description.unwrap_or_default(),
            status: TaskStatus::Planned,
            assignee_id: req.assignee_id,
            work_proof: req.work_proof,
            validation_mode: resolution.policy.mode,
            required_attestations: resolution.policy.require.clone(),
            required_threshold: resolution.policy.threshold,
            depends_on,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        db::insert_task(&mut tx, &task).await?;

        db::append_event(
            &mut tx,
            now,
            event_type::TASK_CREATED,
            project_id,
            entity_kind::TASK,
            &id,
            actor,
            json!({"title": task.title, "type": task.task_type.as_str(), "status": task.status.as_str()}),
        )
        .await?;
        let policy_payload = json!({
            "mode": resolution.policy.mode.as_str(),
            "require": resolution.policy.require,
            "threshold": resolution.policy.threshold,
        });
        db::append_event(
            &mut tx,
            now,
            event_type::TASK_POLICY_APPLIED,
            project_id,
            entity_kind::TASK,
            &id,
            actor,
            policy_payload.clone(),
        )
        .await?;
        if resolution.overridden {
            db::append_event(
                &mut tx,
                now,
                event_type::POLICY_OVERRIDE,
                project_id,
                entity_kind::TASK,
                &id,
                actor,
                policy_payload,
            )
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(project = project_id, task = %task.id, "task created");
        Ok(task)
    }

    pub async fn get_task(&self, project_id: &str, task_id: &str) -> Result<Task> {
        let mut conn = self.store().read_conn().await?;
        self.require_project(&mut conn, project_id).await?;
        db::get_task(&mut conn, project_id, task_id)
            .await?
            .ok_or_else(|| Error::not_found("task", task_id))
    }

    pub async fn list_tasks(
        &self,
        project_id: &str,
        limit: Option<u32>,
        cursor: Option<&str>,
    ) -> Result<Page<Task>> {
        let mut conn = self.store().read_conn().await?;
        self.require_project(&mut conn, project_id).await?;
        let limit = clamp_limit(limit);
        let cursor = cursor.map(KeyCursor::decode).transpose()?;
        let rows = db::list_tasks(&mut conn, project_id, limit + 1, cursor.as_ref()).await?;
        Ok(Page::from_rows(rows, limit, |task| {
            KeyCursor {
                created_at: format_ts(task.created_at),
                id: task.id.clone(),
            }
            .encode()
        }))
    }

    /// The parent/child forest of every project task. Roots and children
    /// are ordered newest first.
    pub async fn task_tree(&self, project_id: &str) -> Result<Vec<TaskTreeNode>> {
        let mut conn = self.store().read_conn().await?;
        self.require_project(&mut conn, project_id).await?;
        let tasks = db::list_all_tasks(&mut conn, project_id).await?;

        // Tasks arrive newest-first, so roots and every children list
        // inherit that order.
        let ids: HashSet<String> = tasks.iter().map(|t| t.id.clone()).collect();
        let mut children_of: HashMap<String, Vec<Task>> = HashMap::new();
        let mut roots: Vec<Task> = Vec::new();
        for task in tasks {
            match task.parent_id.clone().filter(|p| ids.contains(p)) {
                Some(parent) => children_of.entry(parent).or_default().push(task),
                None => roots.push(task),
            }
        }

        fn build(task: Task, children_of: &mut HashMap<String, Vec<Task>>) -> TaskTreeNode {
            let kids = children_of.remove(&task.id).unwrap_or_default();
            TaskTreeNode {
                task,
                children: kids.into_iter().map(|t| build(t, children_of)).collect(),
            }
        }

        Ok(roots
            .into_iter()
            .map(|task| build(task, &mut children_of))
            .collect())
    }

    pub async fn update_task(
        &self,
        actor: &str,
        project_id: &str,
        task_id: &str,
        req: UpdateTask,
    ) -> Result<Task> {
        let mut tx = self.store().begin().await?;
        self.require_project(&mut tx, project_id).await?;

        let roles = self.roles(&mut tx, project_id, actor).await?;
        if !self.has_permission(&roles, perm::TASK_UPDATE) {
            drop(tx);
            return Err(self
                .deny(project_id, actor, perm::TASK_UPDATE, entity_kind::TASK, task_id)
                .await);
        }

        let mut task = db::get_task(&mut tx, project_id, task_id)
            .await?
            .ok_or_else(|| Error::not_found("task", task_id))?;
        let now = self.now();
        let mut changed: Vec<&'static str> = Vec::new();

        // Dependency edits first so a status change to done observes the
        // final graph.
        if !req.add_depends_on.is_empty() {
            for dep in &req.add_depends_on {
                if db::get_task(&mut tx, project_id, dep).await?.is_none() {
                    return Err(Error::not_found("task", dep));
                }
            }
            let existing = db::dependency_edges(&mut tx, project_id).await?;
            let new_edges: Vec<(String, String)> = req
                .add_depends_on
                .iter()
                .map(|dep| (task_id.to_string(), dep.clone()))
                .collect();
            graph::ensure_acyclic(&existing, &new_edges)?;
            for dep in &req.add_depends_on {
                db::add_dependency(&mut tx, task_id, dep).await?;
            }
            changed.push("add_depends_on");
        }
        if !req.remove_depends_on.is_empty() {
            for dep in &req.remove_depends_on {
                db::remove_dependency(&mut tx, task_id, dep).await?;
            }
            changed.push("remove_depends_on");
        }
        if !changed.is_empty() {
            task.depends_on = db::depends_on(&mut tx, task_id).await?;
        }

        if let Some(parent_id) = &req.parent_id {
            if db::get_task(&mut tx, project_id, parent_id).await?.is_none() {
                return Err(Error::not_found("task", parent_id));
            }
            let parents = db::parent_map(&mut tx, project_id).await?;
            graph::ensure_parent_acyclic(task_id, parent_id, &parents)?;
            task.parent_id = Some(parent_id.clone());
            changed.push("parent_id");
        }

        if let Some(assignee) = req.assignee_id {
            task.assignee_id = Some(assignee);
            changed.push("assignee_id");
        }
        if let Some(work_proof) = req.work_proof {
            task.work_proof = Some(work_proof);
            changed.push("work_proof");
        }

        if let Some(spec) = &req.validation {
            let config = self.project_config(&mut tx, project_id).await?;
            let applied = policy::apply_spec(&task_policy(&task), spec);
            let applied = policy::normalize(&config, applied)?;
            task.validation_mode = applied.mode;
            task.required_attestations = applied.require.clone();
            task.required_threshold = applied.threshold;
            changed.push("validation");

            let payload = json!({
                "mode": applied.mode.as_str(),
                "require": applied.require,
                "threshold": applied.threshold,
            });
            db::append_event(
                &mut tx,
                now,
                event_type::TASK_POLICY_APPLIED,
                project_id,
                entity_kind::TASK,
                task_id,
                actor,
                payload.clone(),
            )
            .await?;
            db::append_event(
                &mut tx,
                now,
                event_type::POLICY_OVERRIDE,
                project_id,
                entity_kind::TASK,
                task_id,
                actor,
                payload,
            )
            .await?;
        }

        if let Some(target) = req.status {
            let from = task.status;
            if !from.can_transition_to(target) {
                return Err(Error::invalid_transition(from.as_str(), target.as_str()));
            }
            if target == TaskStatus::Done {
                // Completion carries the lease/force and validation
                // gates; route through the same checks as the done
                // endpoint, unforced.
                let lease_row = db::get_lease(&mut tx, task_id).await?;
                let owns = lease_row
                    .as_ref()
                    .is_some_and(|l| l.is_active(now) && l.owner_id == actor);
                let has_force = self.has_permission(&roles, perm::TASK_FORCE_DONE);
                if !owns && !has_force {
                    drop(tx);
                    return Err(self
                        .deny(project_id, actor, perm::TASK_FORCE_DONE, entity_kind::TASK, task_id)
                        .await);
                }
                let kinds =
                    db::attested_kinds(&mut tx, project_id, EntityKind::Task, task_id).await?;
                let status = validation::evaluate(&task_policy(&task), &kinds);
                if !status.satisfied {
                    return Err(validation_failure(&status));
                }
                task.completed_at = Some(now);
                if let Some(lease_row) = lease_row {
                    db::delete_lease(&mut tx, task_id).await?;
                    db::append_event(
                        &mut tx,
                        now,
                        event_type::LEASE_RELEASED,
                        project_id,
                        entity_kind::LEASE,
                        task_id,
                        actor,
                        json!({"owner_id": lease_row.owner_id}),
                    )
                    .await?;
                }
                db::append_event(
                    &mut tx,
                    now,
                    event_type::TASK_DONE,
                    project_id,
                    entity_kind::TASK,
                    task_id,
                    actor,
                    json!({"forced": false}),
                )
                .await?;
            }
            task.status = target;
            changed.push("status");
            db::append_event(
                &mut tx,
                now,
                event_type::TASK_STATUS_CHANGED,
                project_id,
                entity_kind::TASK,
                task_id,
                actor,
                json!({"from": from.as_str(), "to": target.as_str()}),
            )
            .await?;
        }

        if changed.is_empty() {
            // Nothing to do; still a successful no-op update.
            return Ok(task);
        }

        task.updated_at = now;
        db::update_task(&mut tx, &task).await?;
        db::append_event(
            &mut tx,
            now,
            event_type::TASK_UPDATED,
            project_id,
            entity_kind::TASK,
            task_id,
            actor,
            json!({"fields": changed}),
        )
        .await?;

        tx.commit().await?;
        Ok(task)
    }

    /// Mark a task done. Requires the active lease or `task.force_done`,
    /// and a satisfied validation policy unless forced by a
    /// `task.force_done` holder.
    pub async fn complete_task(
        &self,
        actor: &str,
        project_id: &str,
        task_id: &str,
        force: bool,
        work_proof: Option<serde_json::Value>,
    ) -> Result<Task> {
        let mut tx = self.store().begin().await?;
        self.require_project(&mut tx, project_id).await?;

        let roles = self.roles(&mut tx, project_id, actor).await?;
        let mut task = db::get_task(&mut tx, project_id, task_id)
            .await?
            .ok_or_else(|| Error::not_found("task", task_id))?;

        let now = self.now();
        let lease_row = db::get_lease(&mut tx, task_id).await?;
        let owns = lease_row
            .as_ref()
            .is_some_and(|l| l.is_active(now) && l.owner_id == actor);
        let has_force = self.has_permission(&roles, perm::TASK_FORCE_DONE);

        // Admission: the active lease or the force permission. `force`
        // without the permission does not deny the call; it simply fails
        // to activate the validation bypass below.
        if !owns && !has_force {
            drop(tx);
            return Err(self
                .deny(project_id, actor, perm::TASK_FORCE_DONE, entity_kind::TASK, task_id)
                .await);
        }

        let from = task.status;
        if !from.can_transition_to(TaskStatus::Done) {
            return Err(Error::invalid_transition(from.as_str(), TaskStatus::Done.as_str()));
        }

        let forced = force && has_force;
        if !forced {
            let kinds = db::attested_kinds(&mut tx, project_id, EntityKind::Task, task_id).await?;
            let status = validation::evaluate(&task_policy(&task), &kinds);
            if !status.satisfied {
                return Err(validation_failure(&status));
            }
        }

        task.status = TaskStatus::Done;
        task.completed_at = Some(now);
        task.updated_at = now;
        if let Some(work_proof) = work_proof {
            task.work_proof = Some(work_proof);
        }
        db::update_task(&mut tx, &task).await?;

        if let Some(lease_row) = lease_row {
            db::delete_lease(&mut tx, task_id).await?;
            db::append_event(
                &mut tx,
                now,
                event_type::LEASE_RELEASED,
                project_id,
                entity_kind::LEASE,
                task_id,
                actor,
                json!({"owner_id": lease_row.owner_id}),
            )
            .await?;
        }

        db::append_event(
            &mut tx,
            now,
            event_type::TASK_DONE,
            project_id,
            entity_kind::TASK,
            task_id,
            actor,
            json!({"from": from.as_str(), "forced": forced}),
        )
        .await?;
        if forced {
            db::append_event(
                &mut tx,
                now,
                event_type::TASK_FORCE_DONE,
                project_id,
                entity_kind::TASK,
                task_id,
                actor,
                json!({"from": from.as_str()}),
            )
            .await?;
        }

        tx.commit().await?;
        tracing::info!(project = project_id, task = task_id, forced, "task done");
        Ok(task)
    }

    /// Claim (or renew) the exclusive work lease on a task. Claiming a
    /// planned task starts it.
    pub async fn claim_task(&self, actor: &str, project_id: &str, task_id: &str) -> Result<Lease> {
        let mut tx = self.store().begin().await?;
        self.require_project(&mut tx, project_id).await?;

        let roles = self.roles(&mut tx, project_id, actor).await?;
        if !self.has_permission(&roles, perm::TASK_CLAIM) {
            drop(tx);
            return Err(self
                .deny(project_id, actor, perm::TASK_CLAIM, entity_kind::LEASE, task_id)
                .await);
        }

        let mut task = db::get_task(&mut tx, project_id, task_id)
            .await?
            .ok_or_else(|| Error::not_found("task", task_id))?;

        let now = self.now();
        let current = db::get_lease(&mut tx, task_id).await?;
        let (granted, outcome) =
            lease::claim(task_id, current.as_ref(), actor, now, self.lease_ttl())?;
        db::put_lease(&mut tx, &granted).await?;

        if outcome == ClaimOutcome::Reclaimed {
            if let Some(previous) = &current {
                db::append_event(
                    &mut tx,
                    now,
                    event_type::LEASE_EXPIRED,
                    project_id,
                    entity_kind::LEASE,
                    task_id,
                    actor,
                    json!({"owner_id": previous.owner_id, "expired_at": format_ts(previous.expires_at)}),
                )
                .await?;
            }
        }
        let acquired_type = match outcome {
            ClaimOutcome::Renewed => event_type::LEASE_RENEWED,
            ClaimOutcome::Acquired | ClaimOutcome::Reclaimed => event_type::LEASE_ACQUIRED,
        };
        db::append_event(
            &mut tx,
            now,
            acquired_type,
            project_id,
            entity_kind::LEASE,
            task_id,
            actor,
            json!({"owner_id": granted.owner_id, "expires_at": format_ts(granted.expires_at)}),
        )
        .await?;

        // Claiming a planned task moves it into progress.
        if task.status == TaskStatus::Planned {
            let from = task.status;
            task.status = TaskStatus::InProgress;
            task.updated_at = now;
            db::update_task(&mut tx, &task).await?;
            db::append_event(
                &mut tx,
                now,
                event_type::TASK_STATUS_CHANGED,
                project_id,
                entity_kind::TASK,
                task_id,
                actor,
                json!({"from": from.as_str(), "to": task.status.as_str()}),
            )
            .await?;
        }

        tx.commit().await?;
        Ok(granted)
    }

    /// Release a held lease. Only the owner or a `lease.admin` holder may.
    pub async fn release_task(&self, actor: &str, project_id: &str, task_id: &str) -> Result<()> {
        let mut tx = self.store().begin().await?;
        self.require_project(&mut tx, project_id).await?;

        let roles = self.roles(&mut tx, project_id, actor).await?;
        if db::get_task(&mut tx, project_id, task_id).await?.is_none() {
            return Err(Error::not_found("task", task_id));
        }
        let lease_row = db::get_lease(&mut tx, task_id)
            .await?
            .ok_or_else(|| Error::not_found("lease", task_id))?;

        let has_admin = self.has_permission(&roles, perm::LEASE_ADMIN);
        if !lease::may_release(&lease_row, actor, has_admin) {
            drop(tx);
            return Err(self
                .deny(project_id, actor, perm::LEASE_ADMIN, entity_kind::LEASE, task_id)
                .await);
        }

        db::delete_lease(&mut tx, task_id).await?;
        db::append_event(
            &mut tx,
            self.now(),
            event_type::LEASE_RELEASED,
            project_id,
            entity_kind::LEASE,
            task_id,
            actor,
            json!({"owner_id": lease_row.owner_id}),
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Current validation status of a task.
    pub async fn task_validation(
        &self,
        project_id: &str,
        task_id: &str,
    ) -> Result<ValidationStatus> {
        let mut conn = self.store().read_conn().await?;
        self.require_project(&mut conn, project_id).await?;
        let task = db::get_task(&mut conn, project_id, task_id)
            .await?
            .ok_or_else(|| Error::not_found("task", task_id))?;
        let kinds = db::attested_kinds(&mut conn, project_id, EntityKind::Task, task_id).await?;
        Ok(validation::evaluate(&task_policy(&task), &kinds))
    }
}

fn validation_failure(status: &ValidationStatus) -> Error {
    Error::validation_failed("validation policy is not satisfied")
        .with_detail("present", status.present.clone())
        .with_detail("missing", status.missing.clone())
}
