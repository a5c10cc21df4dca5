//! Validation evaluator.
//!
//! Given a task's effective policy and the attestation kinds currently
//! attached to the entity, compute `{present, missing, satisfied}`. The
//! output ordering is deterministic: `required` preserves configured
//! order, and `present`/`missing` preserve the order of `required`.

use serde::Serialize;

use crate::domain::ValidationMode;
use crate::policy::EffectivePolicy;

/// The evaluator's answer for one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationStatus {
    pub mode: ValidationMode,
    pub required: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u32>,
    pub present: Vec<String>,
    pub missing: Vec<String>,
    pub satisfied: bool,
}

/// Evaluate a policy against the multiset of attested kinds.
pub fn evaluate(policy: &EffectivePolicy, attested: &[String]) -> ValidationStatus {
    let present: Vec<String> = policy
        .require
        .iter()
        .filter(|kind| attested.iter().any(|a| a == *kind))
        .cloned()
        .collect();
    let missing: Vec<String> = policy
        .require
        .iter()
        .filter(|kind| !attested.iter().any(|a| a == *kind))
        .cloned()
        .collect();

    let satisfied = match policy.mode {
        ValidationMode::None => true,
        ValidationMode::All => missing.is_empty(),
        ValidationMode::Any => !present.is_empty(),
        ValidationMode::Threshold => {
            present.len() as u32 >= policy.threshold.unwrap_or(u32::MAX)
        }
    };

    ValidationStatus {
        mode: policy.mode,
        required: policy.require.clone(),
        threshold: policy.threshold,
        present,
        missing,
        satisfied,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
