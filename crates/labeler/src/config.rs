//! # Labeler Configuration
//!
//! Loads the repository's labeler configuration file (YAML) and normalizes
//! its label declarations.
//!
//! ```yaml
//! instructions: Apply `size/large` to PRs with more than 500 changed lines.
//! include_repo_labels: false
//! labels:
//!   - documentation
//!   - bug:
//!       description: Something isn't working
//!       instructions: Only apply with clear reproduction steps
//!   - name: security
//!     description: Security-related changes
//! context_files:
//!   - CODEOWNERS
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::catalog::LabelDefinition;
use crate::errors::{LabelerError, LabelerResult};

/// Default location of the config file, relative to the repository root.
pub const DEFAULT_CONFIG_PATH: &str = ".github/ai-labeler.yml";

/// GitHub rejects label names longer than this.
pub const MAX_LABEL_NAME_LEN: usize = 50;

/// A label as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawLabelEntry")]
pub enum LabelDeclaration {
    /// Just a name; guarantees the label exists and is a candidate.
    Bare(String),
    /// Name plus optional semantics for the classifier.
    Expanded {
        name: String,
        description: Option<String>,
        instructions: Option<String>,
    },
}

impl LabelDeclaration {
    pub fn name(&self) -> &str {
        match self {
            Self::Bare(name) | Self::Expanded { name, .. } => name,
        }
    }

    /// Normalize into the single definition record used downstream.
    pub fn into_definition(self) -> LabelDefinition {
        match self {
            Self::Bare(name) => LabelDefinition::new(name),
            Self::Expanded {
                name,
                description,
                instructions,
            } => LabelDefinition {
                name,
                description,
                instructions,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LabelFields {
    description: Option<String>,
    instructions: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NamedLabel {
    name: String,
    description: Option<String>,
    instructions: Option<String>,
}

/// Accepted YAML shapes for a `labels` entry.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawLabelEntry {
    Bare(String),
    Named(NamedLabel),
    Keyed(BTreeMap<String, Option<LabelFields>>),
}

impl TryFrom<RawLabelEntry> for LabelDeclaration {
    type Error = String;

    fn try_from(raw: RawLabelEntry) -> Result<Self, Self::Error> {
        match raw {
            RawLabelEntry::Bare(name) => Ok(Self::Bare(name)),
            RawLabelEntry::Named(label) => Ok(Self::Expanded {
                name: label.name,
                description: label.description,
                instructions: label.instructions,
            }),
            RawLabelEntry::Keyed(map) => {
                if map.len() != 1 {
                    return Err(format!(
                        "label entry must have exactly one key, found {}",
                        map.len()
                    ));
                }
                let Some((name, fields)) = map.into_iter().next() else {
                    return Err("label entry is empty".to_string());
                };
                let fields = fields.unwrap_or_default();
                if fields.description.is_none() && fields.instructions.is_none() {
                    return Ok(Self::Bare(name));
                }
                Ok(Self::Expanded {
                    name,
                    description: fields.description,
                    instructions: fields.instructions,
                })
            }
        }
    }
}

/// Repository-level labeler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LabelerConfig {
    /// Global directive layered above per-label instructions
    pub instructions: Option<String>,

    /// Whether labels already defined on the repository are candidates too
    #[serde(alias = "include-repo-labels")]
    pub include_repo_labels: bool,

    /// Config-declared labels, in declaration order
    pub labels: Vec<LabelDeclaration>,

    /// Repository files handed to the classifier as extra context
    #[serde(alias = "context-files")]
    pub context_files: Vec<String>,
}

impl Default for LabelerConfig {
    fn default() -> Self {
        Self {
            instructions: None,
            include_repo_labels: true,
            labels: Vec::new(),
            context_files: Vec::new(),
        }
    }
}

impl LabelerConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(content: &str) -> LabelerResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| LabelerError::config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the config file. A missing file yields the default config.
    pub fn load(path: &Path) -> LabelerResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                debug!(path = %path.display(), bytes = content.len(), "Loaded labeler config");
                Self::from_yaml_str(&content).map_err(|e| match e {
                    LabelerError::Config { reason } => LabelerError::Config {
                        reason: format!("{}: {reason}", path.display()),
                    },
                    other => other,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No labeler config found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reject duplicate or transport-illegal label names.
    pub fn validate(&self) -> LabelerResult<()> {
        validate_declarations(&self.labels)?;

        for path in &self.context_files {
            if path.trim().is_empty() {
                return Err(LabelerError::config("context_files entries must not be empty"));
            }
        }
        Ok(())
    }

    /// Global instructions, if any non-blank text was supplied.
    pub fn global_instructions(&self) -> Option<&str> {
        self.instructions
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Check every declaration's name and uniqueness.
pub fn validate_declarations(labels: &[LabelDeclaration]) -> LabelerResult<()> {
    let mut seen = HashSet::with_capacity(labels.len());
    for label in labels {
        validate_label_name(label.name())?;
        if !seen.insert(label.name()) {
            return Err(LabelerError::DuplicateLabel {
                name: label.name().to_string(),
            });
        }
    }
    Ok(())
}

/// Check a single name against what the label transport accepts.
pub fn validate_label_name(name: &str) -> LabelerResult<()> {
    let invalid = |reason: &str| LabelerError::InvalidLabelName {
        name: name.escape_debug().to_string(),
        reason: reason.to_string(),
    };

    if name.trim().is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.chars().any(char::is_control) {
        return Err(invalid("name contains control characters"));
    }
    if name.chars().count() > MAX_LABEL_NAME_LEN {
        return Err(invalid("name is longer than 50 characters"));
    }
    Ok(())
}
