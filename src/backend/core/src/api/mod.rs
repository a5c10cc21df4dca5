//! HTTP surface: the axum router over the engine.
//!
//! The router is mechanical plumbing; every decision (authorization,
//! state machines, validation) lives in the engine. Mutating routes
//! require the `X-Actor-Id` header.

pub mod dto;
mod handlers;
mod openapi;

pub use dto::{decode, reject_null_arrays};

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::engine::Engine;
use crate::error::{ErrorBody, ErrorCode, ErrorEnvelope};

/// Header carrying the caller identity on mutating requests.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

/// Extracts the calling actor from `X-Actor-Id`.
///
/// A missing header answers 401. The taxonomy has no dedicated 401 code,
/// so the envelope reuses `bad_request`; the engine is never reached.
pub struct Actor(pub String);

pub struct MissingActor;

impl IntoResponse for MissingActor {
    fn into_response(self) -> Response {
        let envelope = ErrorEnvelope {
            error: ErrorBody {
                code: ErrorCode::BadRequest,
                message: "missing X-Actor-Id header".to_string(),
                details: None,
            },
        };
        (StatusCode::UNAUTHORIZED, Json(envelope)).into_response()
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = MissingActor;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(|value| Actor(value.to_string()))
            .ok_or(MissingActor)
    }
}

/// Build the versioned application router, nesting the API under
/// `base_path` (e.g. `/v0`).
pub fn build_app(state: AppState, base_path: &str) -> Router {
    Router::new().nest(base_path, api_router(state, base_path))
}

fn api_router(state: AppState, base_path: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let openapi_document = openapi::document(base_path);

    Router::new()
        .route(
            "/projects",
            post(handlers::create_project).get(handlers::list_projects),
        )
        .route("/projects/:project_id/config", get(handlers::get_config))
        .route(
            "/projects/:project_id/tasks",
            post(handlers::create_task).get(handlers::list_tasks),
        )
        .route("/projects/:project_id/tasks/tree", get(handlers::task_tree))
        .route(
            "/projects/:project_id/tasks/:id",
            get(handlers::get_task).patch(handlers::update_task),
        )
        .route(
            "/projects/:project_id/tasks/:id/claim",
            post(handlers::claim_task),
        )
        .route(
            "/projects/:project_id/tasks/:id/release",
            post(handlers::release_task),
        )
        .route(
            "/projects/:project_id/tasks/:id/done",
            post(handlers::complete_task),
        )
        .route(
            "/projects/:project_id/tasks/:id/validation",
            get(handlers::task_validation),
        )
        .route(
            "/projects/:project_id/iterations",
            post(handlers::create_iteration).get(handlers::list_iterations),
        )
        .route(
            "/projects/:project_id/iterations/:id/status",
            patch(handlers::set_iteration_status),
        )
        .route(
            "/projects/:project_id/decisions",
            post(handlers::create_decision).get(handlers::list_decisions),
        )
        .route(
            "/projects/:project_id/attestations",
            post(handlers::create_attestation).get(handlers::list_attestations),
        )
        .route("/projects/:project_id/events", get(handlers::list_events))
        .route(
            "/projects/:project_id/rbac/roles/grant",
            post(handlers::grant_role),
        )
        .route(
            "/projects/:project_id/rbac/roles/revoke",
            post(handlers::revoke_role),
        )
        .route(
            "/projects/:project_id/rbac/authorities",
            post(handlers::set_authority),
        )
        .route(
            "/projects/:project_id/me/permissions",
            get(handlers::me_permissions),
        )
        .route(
            "/openapi.json",
            get(move || std::future::ready(Json(openapi_document.clone()))),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
