//! API request handlers.
//!
//! All handlers return `Result<impl IntoResponse, Error>`; errors convert
//! to the envelope + status via the `IntoResponse` impl on `Error`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use super::dto::*;
use super::{Actor, AppState};
use crate::clock::parse_ts;
use crate::db::EventFilter;
use crate::engine;
use crate::error::{Error, Result};

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<u32>,
    pub cursor: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub entity_kind: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DoneQuery {
    pub force: Option<bool>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Projects
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn create_project(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse> {
    let req: CreateProjectRequest = decode(body, &[])?;
    let project = state
        .engine
        .init_project(&actor, &req.id, req.description.as_deref().unwrap_or(""), None)
        .await?;
    Ok((StatusCode::CREATED, Json(ProjectResponse::from(project))))
}

pub async fn list_projects(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let projects = state.engine.list_projects().await?;
    let out: Vec<ProjectResponse> = projects.into_iter().map(Into::into).collect();
    Ok(Json(out))
}

pub async fn get_config(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<impl IntoResponse> {
    let config = state.engine.get_config(&project_id).await?;
    Ok(Json(config))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tasks
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn create_task(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Actor(actor): Actor,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse> {
    let req: CreateTaskRequest = decode(body, &["depends_on", "validation.require"])?;
    let payload = engine::CreateTask {
        id: req.id,
        iteration_id: req.iteration_id,
        parent_id: req.parent_id,
        task_type: req.task_type,
        title: req.title,
        description: req.description,
        assignee_id: req.assignee_id,
        depends_on: req.depends_on,
        preset: req.policy.and_then(|p| p.preset),
        validation: req.validation.map(Into::into),
        work_proof: req.work_proof,
    };
    let task = state.engine.create_task(&actor, &project_id, payload).await?;
    Ok((StatusCode::CREATED, Json(TaskResponse::from(task))))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path((project_id, task_id)): Path<(String, String)>,
) -> Result<impl IntoResponse> {
    let task = state.engine.get_task(&project_id, &task_id).await?;
    Ok(Json(TaskResponse::from(task)))
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse> {
    let page = state
        .engine
        .list_tasks(&project_id, query.limit, query.cursor.as_deref())
        .await?;
    Ok(Json(page.map(TaskResponse::from)))
}

pub async fn task_tree(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<impl IntoResponse> {
    let tree = state.engine.task_tree(&project_id).await?;
    let out: Vec<TaskTreeResponse> = tree.into_iter().map(Into::into).collect();
    Ok(Json(out))
}

pub async fn update_task(
    State(state): State<AppState>,
    Path((project_id, task_id)): Path<(String, String)>,
    Actor(actor): Actor,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse> {
    let req: UpdateTaskRequest = decode(
        body,
        &["add_depends_on", "remove_depends_on", "validation.require"],
    )?;
    let payload = engine::UpdateTask {
        status: req.status,
        assignee_id: req.assignee_id,
        add_depends_on: req.add_depends_on,
        remove_depends_on: req.remove_depends_on,
        parent_id: req.parent_id,
        work_proof: req.work_proof,
        validation: req.validation.map(Into::into),
    };
    let task = state
        .engine
        .update_task(&actor, &project_id, &task_id, payload)
        .await?;
    Ok(Json(TaskResponse::from(task)))
}

pub async fn claim_task(
    State(state): State<AppState>,
    Path((project_id, task_id)): Path<(String, String)>,
    Actor(actor): Actor,
) -> Result<impl IntoResponse> {
    let lease = state.engine.claim_task(&actor, &project_id, &task_id).await?;
    Ok(Json(LeaseResponse::from(lease)))
}

pub async fn release_task(
    State(state): State<AppState>,
    Path((project_id, task_id)): Path<(String, String)>,
    Actor(actor): Actor,
) -> Result<impl IntoResponse> {
    state
        .engine
        .release_task(&actor, &project_id, &task_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn complete_task(
    State(state): State<AppState>,
    Path((project_id, task_id)): Path<(String, String)>,
    Query(query): Query<DoneQuery>,
    Actor(actor): Actor,
    body: Option<Json<serde_json::Value>>,
) -> Result<impl IntoResponse> {
    let req: CompleteTaskRequest = match body {
        Some(Json(value)) => decode(value, &[])?,
        None => CompleteTaskRequest::default(),
    };
    let task = state
        .engine
        .complete_task(
            &actor,
            &project_id,
            &task_id,
            query.force.unwrap_or(false),
            req.work_proof,
        )
        .await?;
    Ok(Json(TaskResponse::from(task)))
}

pub async fn task_validation(
    State(state): State<AppState>,
    Path((project_id, task_id)): Path<(String, String)>,
) -> Result<impl IntoResponse> {
    let status = state.engine.task_validation(&project_id, &task_id).await?;
    Ok(Json(status))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Iterations
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn create_iteration(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Actor(actor): Actor,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse> {
    let req: CreateIterationRequest = decode(body, &[])?;
    let iteration = state
        .engine
        .create_iteration(&actor, &project_id, &req.id, &req.goal)
        .await?;
    Ok((StatusCode::CREATED, Json(IterationResponse::from(iteration))))
}

pub async fn list_iterations(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse> {
    let page = state
        .engine
        .list_iterations(&project_id, query.limit, query.cursor.as_deref())
        .await?;
    Ok(Json(page.map(IterationResponse::from)))
}

pub async fn set_iteration_status(
    State(state): State<AppState>,
    Path((project_id, iteration_id)): Path<(String, String)>,
    Actor(actor): Actor,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse> {
    let req: SetIterationStatusRequest = decode(body, &[])?;
    let iteration = state
        .engine
        .set_iteration_status(&actor, &project_id, &iteration_id, req.status)
        .await?;
    Ok(Json(IterationResponse::from(iteration)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Decisions
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn create_decision(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Actor(actor): Actor,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse> {
    let req: CreateDecisionRequest = decode(body, &["rationale", "alternatives"])?;
    let payload = engine::CreateDecision {
        id: req.id,
        title: req.title,
        decision: req.decision,
        decider_id: req.decider_id,
        context: req.context,
        rationale: req.rationale,
        alternatives: req.alternatives,
    };
    let decision = state
        .engine
        .create_decision(&actor, &project_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(DecisionResponse::from(decision))))
}

pub async fn list_decisions(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse> {
    let page = state
        .engine
        .list_decisions(&project_id, query.limit, query.cursor.as_deref())
        .await?;
    Ok(Json(page.map(DecisionResponse::from)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Attestations
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn create_attestation(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Actor(actor): Actor,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse> {
    let req: CreateAttestationRequest = decode(body, &[])?;
    let ts = req
        .ts
        .as_deref()
        .map(|raw| {
            parse_ts(raw).ok_or_else(|| Error::bad_request_field("ts", "ts must be RFC3339"))
        })
        .transpose()?;
    let payload = engine::CreateAttestation {
        id: req.id,
        entity_kind: req.entity_kind,
        entity_id: req.entity_id,
        kind: req.kind,
        ts,
        payload: req.payload,
    };
    let attestation = state
        .engine
        .create_attestation(&actor, &project_id, payload)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(AttestationResponse::from(attestation)),
    ))
}

pub async fn list_attestations(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse> {
    let page = state
        .engine
        .list_attestations(&project_id, query.limit, query.cursor.as_deref())
        .await?;
    Ok(Json(page.map(AttestationResponse::from)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Events
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn list_events(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<impl IntoResponse> {
    let filter = EventFilter {
        event_type: query.event_type,
        entity_kind: query.entity_kind,
    };
    let page = state
        .engine
        .list_events(&project_id, filter, query.limit, query.cursor.as_deref())
        .await?;
    Ok(Json(page.map(EventResponse::from)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// RBAC
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn grant_role(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Actor(actor): Actor,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse> {
    let req: RoleChangeRequest = decode(body, &[])?;
    let result = state
        .engine
        .grant_role(&actor, &project_id, &req.actor_id, &req.role_id)
        .await?;
    Ok(Json(result))
}

pub async fn revoke_role(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Actor(actor): Actor,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse> {
    let req: RoleChangeRequest = decode(body, &[])?;
    let result = state
        .engine
        .revoke_role(&actor, &project_id, &req.actor_id, &req.role_id)
        .await?;
    Ok(Json(result))
}

pub async fn set_authority(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Actor(actor): Actor,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse> {
    let req: AttestationAuthorityRequest = decode(body, &[])?;
    state
        .engine
        .set_attestation_authority(&actor, &project_id, &req.kind, &req.role_id)
        .await?;
    Ok(Json(json!({"kind": req.kind, "role_id": req.role_id})))
}

pub async fn me_permissions(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Actor(actor): Actor,
) -> Result<impl IntoResponse> {
    let whoami = state.engine.whoami(&actor, &project_id).await?;
    Ok(Json(whoami))
}
