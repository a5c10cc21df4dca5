//! Policy resolution.
//!
//! The effective policy of a task is a value object assembled from the
//! project config and the request: an inline validation spec wins over a
//! preset override, which wins over the task-type default. The resolver
//! is pure; it never touches the store.

use serde::{Deserialize, Serialize};

use crate::config::ProjectConfig;
use crate::domain::{TaskType, ValidationMode};
use crate::error::{Error, Result};

/// The resolved `(mode, require, threshold)` triple applied to a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EffectivePolicy {
    pub mode: ValidationMode,
    pub require: Vec<String>,
    pub threshold: Option<u32>,
}

impl EffectivePolicy {
    pub fn none() -> Self {
        Self::default()
    }
}

/// Inline validation carried by a create/update request.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ValidationSpec {
    pub mode: Option<ValidationMode>,
    pub require: Option<Vec<String>>,
    pub threshold: Option<u32>,
}

/// Outcome of a resolution, recording whether an inline spec overrode the
/// configured baseline (which the engine reports as a `policy.override`
/// event).
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub policy: EffectivePolicy,
    pub overridden: bool,
}

/// Resolve the effective policy for a new task.
///
/// Precedence: inline spec > named preset override > task-type default >
/// `none`. The result is normalized (required kinds de-duplicated in
/// order) and checked against the catalog and the threshold invariant.
pub fn resolve(
    config: &ProjectConfig,
    task_type: TaskType,
    preset_override: Option<&str>,
    inline: Option<&ValidationSpec>,
) -> Result<Resolution> {
    let baseline = match preset_override {
        Some(name) => {
            let preset = config
                .preset(name)
                .ok_or_else(|| Error::bad_request_field("policy.preset", format!("unknown preset {name}")))?;
            EffectivePolicy {
                mode: preset.mode,
                require: preset.require.clone(),
                threshold: preset.threshold,
            }
        }
        None => match config.task_default_preset(task_type).and_then(|n| config.preset(n)) {
            Some(preset) => EffectivePolicy {
                mode: preset.mode,
                require: preset.require.clone(),
                threshold: preset.threshold,
            },
            None => EffectivePolicy::none(),
        },
    };

    let (policy, overridden) = match inline {
        Some(spec) => (apply_spec(&baseline, spec), true),
        None => (baseline, false),
    };

    let policy = normalize(config, policy)?;
    Ok(Resolution { policy, overridden })
}

/// Apply a partial inline spec on top of an existing policy; used both at
/// create time (over the baseline) and at update time (over the task's
/// current policy).
pub fn apply_spec(current: &EffectivePolicy, spec: &ValidationSpec) -> EffectivePolicy {
    let require = spec.require.clone().unwrap_or_else(|| current.require.clone());
    let mode = spec.mode.unwrap_or_else(|| {
        // A bare `require` list implies `all` when the current mode has
        // no use for one.
        if spec.require.is_some() && current.mode == ValidationMode::None {
            ValidationMode::All
        } else {
            current.mode
        }
    });
    EffectivePolicy {
        mode,
        require,
        threshold: spec.threshold.or(current.threshold),
    }
}

/// Normalize and validate a policy against the config.
pub fn normalize(config: &ProjectConfig, mut policy: EffectivePolicy) -> Result<EffectivePolicy> {
    let mut seen = std::collections::HashSet::new();
    policy.require.retain(|kind| seen.insert(kind.clone()));

    for kind in &policy.require {
        if !config.has_kind(kind) {
            return Err(Error::bad_request_field(
                "validation.require",
                format!("attestation kind {kind} is not in the project catalog"),
            ));
        }
    }

    match policy.mode {
        ValidationMode::None => {
            if !policy.require.is_empty() {
                return Err(Error::bad_request_field(
                    "validation.mode",
                    "mode none admits no required attestations",
                ));
            }
            policy.threshold = None;
        }
        ValidationMode::Threshold => {
            let n = policy.require.len() as u32;
            match policy.threshold {
                Some(t) if t >= 1 && t <= n => {}
                Some(_) => {
                    return Err(Error::bad_request_field(
                        "validation.threshold",
                        format!("threshold must be within [1, {n}]"),
                    ))
                }
                None => {
                    return Err(Error::bad_request_field(
                        "validation.threshold",
                        "mode threshold requires a threshold",
                    ))
                }
            }
        }
        ValidationMode::All | ValidationMode::Any => {
            policy.threshold = None;
        }
    }
    Ok(policy)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn config() -> ProjectConfig {
        ProjectConfig::default_for("proofline")
    }

    #[test]
    fn default_comes_from_task_type() {
        let res = resolve(&config(), TaskType::Feature, None, None).unwrap();
        assert!(!res.overridden);
        assert_eq!(res.policy.mode, ValidationMode::All);
        assert_eq!(
            res.policy.require,
            vec!["ci.passed", "review.approved", "acceptance.passed"]
        );
    }

    #[test]
    fn unconfigured_type_falls_back_to_none() {
        let mut cfg = config();
        cfg.policies.defaults.task.remove("chore");
        let res = resolve(&cfg, TaskType::Chore, None, None).unwrap();
        assert_eq!(res.policy, EffectivePolicy::none());
    }

    #[test]
    fn preset_override_wins_over_default() {
        let res = resolve(&config(), TaskType::Feature, Some("lightweight"), None).unwrap();
        assert!(!res.overridden);
        assert_eq!(res.policy.mode, ValidationMode::None);
        assert!(res.policy.require.is_empty());
    }

    #[test]
    fn unknown_preset_rejected() {
        let err = resolve(&config(), TaskType::Feature, Some("nope"), None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadRequest);
    }

    #[test]
    fn inline_spec_overrides_and_flags() {
        let spec = ValidationSpec {
            mode: Some(ValidationMode::All),
            require: Some(vec!["ci.passed".into(), "review.approved".into()]),
            threshold: None,
        };
        let res = resolve(&config(), TaskType::Feature, None, Some(&spec)).unwrap();
        assert!(res.overridden);
        assert_eq!(res.policy.require, vec!["ci.passed", "review.approved"]);
    }

    #[test]
    fn bare_require_implies_all_over_none_baseline() {
        let spec = ValidationSpec {
            mode: None,
            require: Some(vec!["ci.passed".into()]),
            threshold: None,
        };
        let res = resolve(&config(), TaskType::Docs, None, Some(&spec)).unwrap();
        assert_eq!(res.policy.mode, ValidationMode::All);
    }

    #[test]
    fn threshold_without_value_rejected() {
        let spec = ValidationSpec {
            mode: Some(ValidationMode::Threshold),
            require: Some(vec!["ci.passed".into(), "review.approved".into()]),
            threshold: None,
        };
        let err = resolve(&config(), TaskType::Technical, None, Some(&spec)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadRequest);
        assert_eq!(
            err.details().unwrap().get("field").unwrap(),
            "validation.threshold"
        );
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        let spec = ValidationSpec {
            mode: Some(ValidationMode::Threshold),
            require: Some(vec!["ci.passed".into()]),
            threshold: Some(2),
        };
        assert!(resolve(&config(), TaskType::Technical, None, Some(&spec)).is_err());
    }

    #[test]
    fn unknown_kind_rejected() {
        let spec = ValidationSpec {
            mode: Some(ValidationMode::All),
            require: Some(vec!["made.up".into()]),
            threshold: None,
        };
        let err = resolve(&config(), TaskType::Technical, None, Some(&spec)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadRequest);
    }

    #[test]
    fn duplicates_removed_preserving_order() {
        let spec = ValidationSpec {
            mode: Some(ValidationMode::All),
            require: Some(vec![
                "review.approved".into(),
                "ci.passed".into(),
                "review.approved".into(),
            ]),
            threshold: None,
        };
        let res = resolve(&config(), TaskType::Technical, None, Some(&spec)).unwrap();
        assert_eq!(res.policy.require, vec!["review.approved", "ci.passed"]);
    }
}
