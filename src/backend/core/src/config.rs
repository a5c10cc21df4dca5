//! Project configuration document.
//!
//! The document seeds the in-store config at project init and is returned
//! verbatim by `GET /projects/{id}/config`. It is read from
//! `<workspace>/.proofline/proofline.yml` when present, otherwise the
//! built-in defaults apply.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::domain::{TaskType, ValidationMode};
use crate::error::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Document Shape
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub project: ProjectSection,
    #[serde(default)]
    pub attestations: AttestationsSection,
    #[serde(default)]
    pub policies: PoliciesSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSection {
    pub id: String,
    #[serde(default = "default_project_kind")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttestationsSection {
    #[serde(default)]
    pub catalog: BTreeMap<String, CatalogEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoliciesSection {
    #[serde(default)]
    pub presets: BTreeMap<String, PolicyPreset>,
    #[serde(default)]
    pub defaults: PolicyDefaults,
}

/// A named policy definition referenced by task defaults or explicit
/// overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyPreset {
    pub mode: ValidationMode,
    #[serde(default)]
    pub require: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyDefaults {
    /// Task type -> preset name.
    #[serde(default)]
    pub task: BTreeMap<String, String>,
    #[serde(default)]
    pub iteration: IterationDefaults,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationDefaults {
    #[serde(default)]
    pub validation: IterationValidation,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationValidation {
    /// Attestation kind required before an iteration may be `validated`.
    /// Empty means no requirement.
    #[serde(default)]
    pub require: String,
}

fn default_project_kind() -> String {
    "default".to_string()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Defaults, Loading, Validation
// ═══════════════════════════════════════════════════════════════════════════════

impl ProjectConfig {
    /// Built-in configuration used when the workspace carries no YAML.
    pub fn default_for(project_id: &str) -> Self {
        let mut catalog = BTreeMap::new();
        for (kind, description) in [
            ("ci.passed", "Continuous integration run succeeded"),
            ("review.approved", "Code review approved"),
            ("acceptance.passed", "Acceptance criteria verified"),
            ("security.ok", "Security review sign-off"),
            ("iteration.approved", "Iteration outcome approved"),
        ] {
            catalog.insert(
                kind.to_string(),
                CatalogEntry {
                    description: description.to_string(),
                },
            );
        }

        let mut presets = BTreeMap::new();
        presets.insert(
            "feature.default".to_string(),
            PolicyPreset {
                mode: ValidationMode::All,
                require: vec![
                    "ci.passed".to_string(),
                    "review.approved".to_string(),
                    "acceptance.passed".to_string(),
                ],
                threshold: None,
            },
        );
        presets.insert(
            "bug.default".to_string(),
            PolicyPreset {
                mode: ValidationMode::All,
                require: vec!["ci.passed".to_string(), "review.approved".to_string()],
                threshold: None,
            },
        );
        presets.insert(
            "technical.default".to_string(),
            PolicyPreset {
                mode: ValidationMode::Any,
                require: vec!["ci.passed".to_string(), "review.approved".to_string()],
                threshold: None,
            },
        );
        presets.insert(
            "lightweight".to_string(),
            PolicyPreset {
                mode: ValidationMode::None,
                require: Vec::new(),
                threshold: None,
            },
        );

        let mut task_defaults = BTreeMap::new();
        task_defaults.insert("technical".to_string(), "technical.default".to_string());
        task_defaults.insert("feature".to_string(), "feature.default".to_string());
        task_defaults.insert("bug".to_string(), "bug.default".to_string());
        task_defaults.insert("docs".to_string(), "lightweight".to_string());
        task_defaults.insert("chore".to_string(), "lightweight".to_string());

        Self {
            project: ProjectSection {
                id: project_id.to_string(),
                kind: default_project_kind(),
            },
            attestations: AttestationsSection { catalog },
            policies: PoliciesSection {
                presets,
                defaults: PolicyDefaults {
                    task: task_defaults,
                    iteration: IterationDefaults {
                        validation: IterationValidation {
                            require: "iteration.approved".to_string(),
                        },
                    },
                },
            },
        }
    }

    /// Load the document from a YAML file.
    pub fn load_yaml(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::bad_request(format!("cannot read config {}: {e}", path.display()))
        })?;
        let cfg: Self = serde_yaml::from_str(&raw)
            .map_err(|e| Error::bad_request(format!("invalid config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check internal consistency of the document.
    pub fn validate(&self) -> Result<()> {
        if self.project.id.is_empty() {
            return Err(Error::bad_request_field("project.id", "project.id is required"));
        }
        for (name, preset) in &self.policies.presets {
            match preset.mode {
                ValidationMode::None => {
                    if !preset.require.is_empty() || preset.threshold.is_some() {
                        return Err(Error::bad_request(format!(
                            "preset {name}: mode none admits no require/threshold"
                        )));
                    }
                }
                ValidationMode::Threshold => {
                    let n = preset.require.len() as u32;
                    match preset.threshold {
                        Some(t) if t >= 1 && t <= n => {}
                        _ => {
                            return Err(Error::bad_request(format!(
                                "preset {name}: threshold must be within [1, {n}]"
                            )))
                        }
                    }
                }
                ValidationMode::All | ValidationMode::Any => {
                    if preset.threshold.is_some() {
                        return Err(Error::bad_request(format!(
                            "preset {name}: threshold only applies to mode threshold"
                        )));
                    }
                }
            }
            for kind in &preset.require {
                if !self.has_kind(kind) {
                    return Err(Error::bad_request(format!(
                        "preset {name}: unknown attestation kind {kind}"
                    )));
                }
            }
        }
        for (task_type, preset) in &self.policies.defaults.task {
            if TaskType::parse(task_type).is_none() {
                return Err(Error::bad_request(format!("unknown task type {task_type}")));
            }
            if !self.policies.presets.contains_key(preset) {
                return Err(Error::bad_request(format!(
                    "task default for {task_type} references unknown preset {preset}"
                )));
            }
        }
        let iter_kind = &self.policies.defaults.iteration.validation.require;
        if !iter_kind.is_empty() && !self.has_kind(iter_kind) {
            return Err(Error::bad_request(format!(
                "iteration validation references unknown attestation kind {iter_kind}"
            )));
        }
        Ok(())
    }

    /// Whether a kind exists in the attestation catalog.
    pub fn has_kind(&self, kind: &str) -> bool {
        self.attestations.catalog.contains_key(kind)
    }

    pub fn preset(&self, name: &str) -> Option<&PolicyPreset> {
        self.policies.presets.get(name)
    }

    /// The preset name a task type defaults to, if configured.
    pub fn task_default_preset(&self, task_type: TaskType) -> Option<&str> {
        self.policies
            .defaults
            .task
            .get(task_type.as_str())
            .map(String::as_str)
    }

    /// The attestation kind required for iteration validation, if any.
    pub fn iteration_required_kind(&self) -> Option<&str> {
        let kind = self.policies.defaults.iteration.validation.require.as_str();
        if kind.is_empty() {
            None
        } else {
            Some(kind)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
