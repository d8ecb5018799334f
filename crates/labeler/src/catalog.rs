//! # Label Catalog
//!
//! The canonical set of labels considered for one run, built by merging
//! config-declared definitions with labels discovered on the repository.
//!
//! Config definitions override repository definitions field by field: a
//! config entry that omits `description` keeps the repository's description,
//! while any field the config does set wins.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{validate_declarations, LabelDeclaration};
use crate::errors::LabelerResult;

/// A label and the semantics the classifier should apply it by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelDefinition {
    /// Case-sensitive label name
    pub name: String,

    /// Short description (shown on the repository)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Detailed criteria for applying the label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl LabelDefinition {
    /// Create a definition with no description or instructions.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            instructions: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Overwrite only the fields `other` explicitly sets.
    fn overlay(&mut self, other: LabelDefinition) {
        if other.description.is_some() {
            self.description = other.description;
        }
        if other.instructions.is_some() {
            self.instructions = other.instructions;
        }
    }
}

/// Ordered mapping from label name to definition.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct LabelCatalog {
    labels: Vec<LabelDefinition>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl LabelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a definition, or overlay it onto the existing entry of the same name.
    pub fn upsert(&mut self, definition: LabelDefinition) {
        if let Some(&pos) = self.index.get(&definition.name) {
            self.labels[pos].overlay(definition);
        } else {
            self.index
                .insert(definition.name.clone(), self.labels.len());
            self.labels.push(definition);
        }
    }

    pub fn get(&self, name: &str) -> Option<&LabelDefinition> {
        self.index.get(name).map(|&pos| &self.labels[pos])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Label names in catalog order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(|l| l.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabelDefinition> {
        self.labels.iter()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Position of a name in catalog order, used to keep outputs stable.
    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }
}

impl FromIterator<LabelDefinition> for LabelCatalog {
    fn from_iter<I: IntoIterator<Item = LabelDefinition>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for definition in iter {
            catalog.upsert(definition);
        }
        catalog
    }
}

/// Build the run's catalog from config declarations and repository labels.
///
/// With `include_repo_labels`, repository labels come first (in repository
/// order) and config entries are overlaid onto them or appended. Without it,
/// the catalog is exactly the config-declared set and repository semantics
/// are not consulted at all.
///
/// # Errors
///
/// Fails with a configuration error on duplicate or illegal config names.
pub fn merge(
    config_labels: &[LabelDeclaration],
    repo_labels: &[LabelDefinition],
    include_repo_labels: bool,
) -> LabelerResult<LabelCatalog> {
    validate_declarations(config_labels)?;

    let mut catalog = if include_repo_labels {
        repo_labels.iter().cloned().collect()
    } else {
        LabelCatalog::new()
    };

    for declaration in config_labels {
        catalog.upsert(declaration.clone().into_definition());
    }

    debug!(
        config = config_labels.len(),
        repository = repo_labels.len(),
        include_repo_labels,
        total = catalog.len(),
        "Merged label catalog"
    );

    Ok(catalog)
}
