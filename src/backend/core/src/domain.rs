//! Domain entities and status state machines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// Task
// ═══════════════════════════════════════════════════════════════════════════════

/// Classification of a task; selects the default validation preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Technical,
    Feature,
    Bug,
    Docs,
    Chore,
}

impl Default for TaskType {
    fn default() -> Self {
        Self::Technical
    }
}

impl TaskType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Technical => "technical",
            Self::Feature => "feature",
            Self::Bug => "bug",
            Self::Docs => "docs",
            Self::Chore => "chore",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "technical" => Some(Self::Technical),
            "feature" => Some(Self::Feature),
            "bug" => Some(Self::Bug),
            "docs" => Some(Self::Docs),
            "chore" => Some(Self::Chore),
            _ => None,
        }
    }
}

/// Status of a task in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Planned,
    InProgress,
    Review,
    Done,
    Rejected,
    Canceled,
}

impl TaskStatus {
    /// Check if transition to another status is allowed by the state machine.
    ///
    /// `done` carries additional validation requirements enforced by the
    /// engine; this table only answers whether the edge exists.
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, target),
            (Planned, InProgress)
                | (Planned, Canceled)
                | (Planned, Rejected)
                | (InProgress, Review)
                | (InProgress, Done)
                | (InProgress, Rejected)
                | (InProgress, Canceled)
                | (Review, Done)
                | (Review, InProgress)
                | (Review, Rejected)
                | (Rejected, Planned)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Canceled)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Done => "done",
            Self::Rejected => "rejected",
            Self::Canceled => "canceled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "planned" => Some(Self::Planned),
            "in_progress" => Some(Self::InProgress),
            "review" => Some(Self::Review),
            "done" => Some(Self::Done),
            "rejected" => Some(Self::Rejected),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }
}

/// How required attestations combine into a completion gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    #[default]
    None,
    All,
    Any,
    Threshold,
}

impl ValidationMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::All => "all",
            Self::Any => "any",
            Self::Threshold => "threshold",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "none" => Some(Self::None),
            "all" => Some(Self::All),
            "any" => Some(Self::Any),
            "threshold" => Some(Self::Threshold),
            _ => None,
        }
    }
}

/// A unit of work, gated by its validation policy before it may be `done`.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub project_id: String,
    pub iteration_id: Option<String>,
    pub parent_id: Option<String>,
    pub task_type: TaskType,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub assignee_id: Option<String>,
    pub work_proof: Option<serde_json::Value>,
    pub validation_mode: ValidationMode,
    pub required_attestations: Vec<String>,
    pub required_threshold: Option<u32>,
    pub depends_on: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Iteration
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationStatus {
    Pending,
    Running,
    Delivered,
    Validated,
    Rejected,
}

impl IterationStatus {
    /// Allowed edges: `pending -> running -> delivered -> {validated, rejected}`,
    /// plus `rejected -> running` to retry. Self edges are rejected.
    pub fn can_transition_to(&self, target: IterationStatus) -> bool {
        use IterationStatus::*;
        matches!(
            (self, target),
            (Pending, Running)
                | (Running, Delivered)
                | (Delivered, Validated)
                | (Delivered, Rejected)
                | (Rejected, Running)
        )
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Delivered => "delivered",
            Self::Validated => "validated",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "delivered" => Some(Self::Delivered),
            "validated" => Some(Self::Validated),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Iteration {
    pub id: String,
    pub project_id: String,
    pub goal: String,
    pub status: IterationStatus,
    pub created_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Project / Decision / Attestation / Lease / Event
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub id: String,
    pub kind: String,
    pub status: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// An immutable record of a decision taken for a project.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub decision: String,
    pub decider_id: String,
    pub context: Option<serde_json::Value>,
    pub rationale: Vec<String>,
    pub alternatives: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// The kinds of entity an attestation may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Project,
    Iteration,
    Task,
    Decision,
}

impl EntityKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Iteration => "iteration",
            Self::Task => "task",
            Self::Decision => "decision",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "project" => Some(Self::Project),
            "iteration" => Some(Self::Iteration),
            "task" => Some(Self::Task),
            "decision" => Some(Self::Decision),
            _ => None,
        }
    }
}

/// An actor's recorded assertion of a kind about an entity. Append-only.
#[derive(Debug, Clone, PartialEq)]
pub struct Attestation {
    pub id: String,
    pub project_id: String,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub kind: String,
    pub actor_id: String,
    pub ts: DateTime<Utc>,
    pub payload: Option<serde_json::Value>,
}

/// Exclusive short-lived ownership of a task. At most one row per task.
#[derive(Debug, Clone, PartialEq)]
pub struct Lease {
    pub task_id: String,
    pub owner_id: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    /// A lease is active while its expiry lies in the future.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// One append-only journal entry. Ids are strictly increasing within a
/// process; commit order determines id order across transactions.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: i64,
    pub ts: DateTime<Utc>,
    pub event_type: String,
    pub project_id: String,
    pub entity_kind: String,
    pub entity_id: String,
    pub actor_id: String,
    pub payload: serde_json::Value,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_transitions() {
        use TaskStatus::*;
        assert!(Planned.can_transition_to(InProgress));
        assert!(Planned.can_transition_to(Canceled));
        assert!(Planned.can_transition_to(Rejected));
        assert!(InProgress.can_transition_to(Review));
        assert!(InProgress.can_transition_to(Done));
        assert!(Review.can_transition_to(Done));
        assert!(Review.can_transition_to(InProgress));
        assert!(Rejected.can_transition_to(Planned));

        assert!(!Planned.can_transition_to(Done));
        assert!(!Planned.can_transition_to(Review));
        assert!(!Done.can_transition_to(InProgress));
        assert!(!Canceled.can_transition_to(Planned));
        assert!(!InProgress.can_transition_to(InProgress));
    }

    #[test]
    fn iteration_transitions() {
        use IterationStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Delivered));
        assert!(Delivered.can_transition_to(Validated));
        assert!(Delivered.can_transition_to(Rejected));
        assert!(Rejected.can_transition_to(Running));

        // Self edges and skips are rejected.
        assert!(!Running.can_transition_to(Running));
        assert!(!Pending.can_transition_to(Delivered));
        assert!(!Validated.can_transition_to(Running));
        assert!(!Running.can_transition_to(Validated));
    }

    #[test]
    fn status_string_round_trip() {
        for status in [
            TaskStatus::Planned,
            TaskStatus::InProgress,
            TaskStatus::Review,
            TaskStatus::Done,
            TaskStatus::Rejected,
            TaskStatus::Canceled,
        ] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::parse("unknown"), None);
    }

    #[test]
    fn serde_names_match_wire_form() {
        assert_eq!(
            serde_json::to_value(TaskStatus::InProgress).unwrap(),
            "in_progress"
        );
        assert_eq!(serde_json::to_value(TaskType::Feature).unwrap(), "feature");
        assert_eq!(
            serde_json::to_value(ValidationMode::Threshold).unwrap(),
            "threshold"
        );
        assert_eq!(serde_json::to_value(EntityKind::Task).unwrap(), "task");
    }

    #[test]
    fn lease_activity() {
        let now = Utc::now();
        let lease = Lease {
            task_id: "t1".into(),
            owner_id: "dev-1".into(),
            acquired_at: now,
            expires_at: now + chrono::Duration::minutes(15),
        };
        assert!(lease.is_active(now));
        assert!(!lease.is_active(now + chrono::Duration::minutes(15)));
        assert!(!lease.is_active(now + chrono::Duration::minutes(16)));
    }
}
