//! Wire DTOs and request decoding.
//!
//! Responses guarantee array fields are always serialized (`[]`, never
//! null or omitted). Requests are decoded in two steps: a null-array
//! precheck over the raw JSON document (so the offending field can be
//! named in `details.field`), then typed deserialization.

use serde::Deserialize;
use serde::Serialize;

use crate::clock::format_ts;
use crate::domain::{
    Attestation, Decision, EntityKind, Event, Iteration, IterationStatus, Lease, Project, Task,
    TaskStatus, TaskType, ValidationMode,
};
use crate::engine::TaskTreeNode;
use crate::error::{Error, Result};
use crate::policy::ValidationSpec;

// ═══════════════════════════════════════════════════════════════════════════════
// Request Decoding
// ═══════════════════════════════════════════════════════════════════════════════

/// Reject explicit JSON nulls for the named (possibly dotted) array
/// fields. Absent fields are fine; `null` is a 400 naming the field.
pub fn reject_null_arrays(body: &serde_json::Value, fields: &[&str]) -> Result<()> {
    for field in fields {
        let mut current = body;
        let mut resolved = true;
        for part in field.split('.') {
            match current.get(part) {
                Some(next) => current = next,
                None => {
                    resolved = false;
                    break;
                }
            }
        }
        if resolved && current.is_null() {
            return Err(Error::bad_request_field(
                field,
                format!("{field} must not be null"),
            ));
        }
    }
    Ok(())
}

/// Decode a typed request after the null-array precheck.
pub fn decode<T: serde::de::DeserializeOwned>(
    body: serde_json::Value,
    null_checked: &[&str],
) -> Result<T> {
    reject_null_arrays(&body, null_checked)?;
    serde_json::from_value(body).map_err(|e| Error::bad_request(format!("invalid request: {e}")))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Requests
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskValidationRequest {
    #[serde(default)]
    pub mode: Option<ValidationMode>,
    #[serde(default)]
    pub require: Option<Vec<String>>,
    #[serde(default)]
    pub threshold: Option<u32>,
}

impl From<TaskValidationRequest> for ValidationSpec {
    fn from(req: TaskValidationRequest) -> Self {
        Self {
            mode: req.mode,
            require: req.require,
            threshold: req.threshold,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskPolicyRequest {
    #[serde(default)]
    pub preset: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub iteration_id: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub policy: Option<TaskPolicyRequest>,
    #[serde(default)]
    pub validation: Option<TaskValidationRequest>,
    #[serde(default)]
    pub work_proof: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTaskRequest {
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub add_depends_on: Vec<String>,
    #[serde(default)]
    pub remove_depends_on: Vec<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub work_proof: Option<serde_json::Value>,
    #[serde(default)]
    pub validation: Option<TaskValidationRequest>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteTaskRequest {
    #[serde(default)]
    pub work_proof: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct CreateIterationRequest {
    pub id: String,
    #[serde(default)]
    pub goal: String,
}

#[derive(Debug, Deserialize)]
pub struct SetIterationStatusRequest {
    pub status: IterationStatus,
}

#[derive(Debug, Deserialize)]
pub struct CreateDecisionRequest {
    pub id: String,
    pub title: String,
    pub decision: String,
    pub decider_id: String,
    #[serde(default)]
    pub context: Option<serde_json::Value>,
    #[serde(default)]
    pub rationale: Vec<String>,
    #[serde(default)]
    pub alternatives: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAttestationRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub kind: String,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct RoleChangeRequest {
    pub actor_id: String,
    pub role_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AttestationAuthorityRequest {
    pub kind: String,
    pub role_id: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Responses
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    pub id: String,
    pub kind: String,
    pub status: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub created_at: String,
}

impl From<Project> for ProjectResponse {
    fn from(p: Project) -> Self {
        Self {
            id: p.id,
            kind: p.kind,
            status: p.status,
            description: p.description,
            created_at: format_ts(p.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IterationResponse {
    pub id: String,
    pub project_id: String,
    pub goal: String,
    pub status: IterationStatus,
    pub created_at: String,
}

impl From<Iteration> for IterationResponse {
    fn from(it: Iteration) -> Self {
        Self {
            id: it.id,
            project_id: it.project_id,
            goal: it.goal,
            status: it.status,
            created_at: format_ts(it.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: String,
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_proof: Option<serde_json::Value>,
    pub validation_mode: ValidationMode,
    pub required_attestations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_threshold: Option<u32>,
    pub depends_on: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl From<Task> for TaskResponse {
    fn from(t: Task) -> Self {
        Self {
            id: t.id,
            project_id: t.project_id,
            iteration_id: t.iteration_id,
            parent_id: t.parent_id,
            task_type: t.task_type,
            title: t.title,
            description: t.description,
            status: t.status,
            assignee_id: t.assignee_id,
            work_proof: t.work_proof,
            validation_mode: t.validation_mode,
            required_attestations: t.required_attestations,
            required_threshold: t.required_threshold,
            depends_on: t.depends_on,
            created_at: format_ts(t.created_at),
            updated_at: format_ts(t.updated_at),
            completed_at: t.completed_at.map(format_ts),
        }
    }
}

/// A task with its children; the tree endpoint returns the root forest.
#[derive(Debug, Serialize)]
pub struct TaskTreeResponse {
    #[serde(flatten)]
    pub task: TaskResponse,
    pub children: Vec<TaskTreeResponse>,
}

impl From<TaskTreeNode> for TaskTreeResponse {
    fn from(node: TaskTreeNode) -> Self {
        Self {
            task: node.task.into(),
            children: node.children.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub decision: String,
    pub decider_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    pub rationale: Vec<String>,
    pub alternatives: Vec<String>,
    pub created_at: String,
}

impl From<Decision> for DecisionResponse {
    fn from(d: Decision) -> Self {
        Self {
            id: d.id,
            project_id: d.project_id,
            title: d.title,
            decision: d.decision,
            decider_id: d.decider_id,
            context: d.context,
            rationale: d.rationale,
            alternatives: d.alternatives,
            created_at: format_ts(d.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LeaseResponse {
    pub task_id: String,
    pub owner_id: String,
    pub acquired_at: String,
    pub expires_at: String,
}

impl From<Lease> for LeaseResponse {
    fn from(l: Lease) -> Self {
        Self {
            task_id: l.task_id,
            owner_id: l.owner_id,
            acquired_at: format_ts(l.acquired_at),
            expires_at: format_ts(l.expires_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AttestationResponse {
    pub id: String,
    pub project_id: String,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub kind: String,
    pub actor_id: String,
    pub ts: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl From<Attestation> for AttestationResponse {
    fn from(a: Attestation) -> Self {
        Self {
            id: a.id,
            project_id: a.project_id,
            entity_kind: a.entity_kind,
            entity_id: a.entity_id,
            kind: a.kind,
            actor_id: a.actor_id,
            ts: format_ts(a.ts),
            payload: a.payload,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub id: i64,
    pub ts: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub project_id: String,
    pub entity_kind: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub entity_id: String,
    pub actor_id: String,
    pub payload: serde_json::Value,
}

impl From<Event> for EventResponse {
    fn from(e: Event) -> Self {
        Self {
            id: e.id,
            ts: format_ts(e.ts),
            event_type: e.event_type,
            project_id: e.project_id,
            entity_kind: e.entity_kind,
            entity_id: e.entity_id,
            actor_id: e.actor_id,
            payload: e.payload,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn null_array_precheck_names_field() {
        let body = json!({"title": "x", "type": "technical", "depends_on": null});
        let err = reject_null_arrays(&body, &["depends_on"]).unwrap_err();
        assert_eq!(err.details().unwrap().get("field").unwrap(), "depends_on");

        // Absent is fine.
        let body = json!({"title": "x", "type": "technical"});
        reject_null_arrays(&body, &["depends_on"]).unwrap();
    }

    #[test]
    fn nested_null_precheck() {
        let body = json!({"validation": {"require": null}});
        let err = reject_null_arrays(&body, &["validation.require"]).unwrap_err();
        assert_eq!(
            err.details().unwrap().get("field").unwrap(),
            "validation.require"
        );

        let body = json!({"validation": {"mode": "all"}});
        reject_null_arrays(&body, &["validation.require"]).unwrap();
    }

    #[test]
    fn decode_missing_required_field_is_bad_request() {
        let err = decode::<CreateTaskRequest>(json!({}), &[]).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::BadRequest);
    }

    #[test]
    fn task_response_always_serializes_arrays_and_completed_at() {
        let task = Task {
            id: "t1".into(),
            project_id: "p".into(),
            iteration_id: None,
            parent_id: None,
            task_type: TaskType::Technical,
            title: "x".into(),
            description: String::new(),
            status: TaskStatus::Planned,
            assignee_id: None,
            work_proof: None,
            validation_mode: ValidationMode::None,
            required_attestations: vec![],
            required_threshold: None,
            depends_on: vec![],
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
            completed_at: None,
        };
        let json = serde_json::to_value(TaskResponse::from(task)).unwrap();
        assert!(json["depends_on"].is_array());
        assert!(json["required_attestations"].is_array());
        assert!(json["completed_at"].is_null());
        assert!(json.get("iteration_id").is_none());
        assert!(json.get("description").is_none());
        assert_eq!(json["type"], "technical");
    }

    #[test]
    fn decision_response_arrays_never_null() {
        let decision = Decision {
            id: "d1".into(),
            project_id: "p".into(),
            title: "t".into(),
            decision: "use sqlite".into(),
            decider_id: "cto".into(),
            context: None,
            rationale: vec![],
            alternatives: vec![],
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        };
        let json = serde_json::to_value(DecisionResponse::from(decision)).unwrap();
        assert!(json["rationale"].is_array());
        assert!(json["alternatives"].is_array());
        assert!(json.get("context").is_none());
    }
}
