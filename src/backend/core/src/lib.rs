//! # Proofline Core
//!
//! A project-workflow control plane. Proofline records tasks,
//! iterations, decisions and attestations, and refuses to mark work done
//! until the project's attestation policy is satisfied by authorized
//! actors.
//!
//! ## Architecture
//!
//! - **Engine**: the single in-process authority composing every other
//!   component inside serialized write transactions
//! - **Store**: embedded SQLite (single-writer pool + snapshot readers)
//! - **Policy / Validation**: pure resolver and evaluator for
//!   all/any/threshold attestation gates
//! - **Leases**: exclusive per-task work ownership with TTL expiry
//! - **Dependency graph**: acyclic `depends_on` and parent trees,
//!   checked on demand inside the transaction
//! - **RBAC**: immutable role matrix, per-project grants and
//!   attestation authorities
//! - **Event journal**: append-only, one-plus events per mutation in the
//!   mutating transaction
//! - **API**: versioned axum HTTP surface over the engine

pub mod api;
pub mod clock;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod events;
pub mod graph;
pub mod lease;
pub mod pagination;
pub mod policy;
pub mod rbac;
pub mod telemetry;
pub mod validation;

pub use error::{Error, ErrorCode, Result};

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::ProjectConfig;
    pub use crate::db::Store;
    pub use crate::domain::{
        Attestation, Decision, EntityKind, Event, Iteration, IterationStatus, Lease, Project,
        Task, TaskStatus, TaskType, ValidationMode,
    };
    pub use crate::engine::{
        CreateAttestation, CreateDecision, CreateTask, Engine, EngineOptions, UpdateTask, WhoAmI,
    };
    pub use crate::error::{Error, ErrorCode, Result};
    pub use crate::pagination::Page;
    pub use crate::policy::{EffectivePolicy, ValidationSpec};
    pub use crate::validation::ValidationStatus;
}
