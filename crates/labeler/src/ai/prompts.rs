//! Prompt templates for labeling.
//!
//! Prompts are Handlebars templates rendered against a serializable view of
//! the classification context. HTML escaping is disabled.

use handlebars::Handlebars;
use serde::Serialize;

use crate::catalog::LabelDefinition;
use crate::context::{ClassificationContext, ContextFile};
use crate::entity::DiffSummary;
use crate::errors::{LabelerError, LabelerResult};

/// A prompt template with system and user messages.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// Template ID
    pub id: String,
    /// System prompt template
    pub system: String,
    /// User prompt template
    pub user: String,
}

impl PromptTemplate {
    pub fn new(id: impl Into<String>, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            system: system.into(),
            user: user.into(),
        }
    }

    /// Render the template with the given context into `(system, user)`.
    pub fn render<T: Serialize>(&self, context: &T) -> LabelerResult<(String, String)> {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);

        handlebars
            .register_template_string("system", &self.system)
            .map_err(|e| LabelerError::Ai(format!("Invalid system template '{}': {e}", self.id)))?;
        handlebars
            .register_template_string("user", &self.user)
            .map_err(|e| LabelerError::Ai(format!("Invalid user template '{}': {e}", self.id)))?;

        let system = handlebars
            .render("system", context)
            .map_err(|e| LabelerError::Ai(format!("Failed to render system prompt: {e}")))?;
        let user = handlebars
            .render("user", context)
            .map_err(|e| LabelerError::Ai(format!("Failed to render user prompt: {e}")))?;

        Ok((system, user))
    }
}

/// Template view of a [`ClassificationContext`].
#[derive(Debug, Serialize)]
pub struct LabelingPromptContext<'a> {
    pub kind: String,
    pub number: u64,
    pub title: &'a str,
    pub body: &'a str,
    pub author: Option<&'a str>,
    pub labels: Vec<&'a LabelDefinition>,
    pub global_instructions: Option<&'a str>,
    pub diff: Option<&'a DiffSummary>,
    pub context_files: &'a [ContextFile],
    pub contract: &'static str,
}

impl<'a> From<&'a ClassificationContext> for LabelingPromptContext<'a> {
    fn from(context: &'a ClassificationContext) -> Self {
        Self {
            kind: context.entity.kind.to_string(),
            number: context.entity.number,
            title: &context.entity.title,
            body: &context.entity.body,
            author: context.entity.author.as_deref(),
            labels: context.catalog.iter().collect(),
            global_instructions: context.global_instructions.as_deref(),
            diff: context.diff.as_ref(),
            context_files: &context.context_files,
            contract: context.contract(),
        }
    }
}

/// Get the labeling template.
pub fn labeling_template() -> PromptTemplate {
    PromptTemplate::new("label-entity", SYSTEM_PROMPT, USER_PROMPT)
}

const SYSTEM_PROMPT: &str = r#"You are an expert at categorizing GitHub issues and pull requests for repository maintainers.

Be conservative: only assign a label when you are confident it applies. Assigning no labels is a valid answer.

You are given the issue or pull request, every available label with its description and any label-specific instructions, and possibly other repository files that are relevant to the task. Ground each decision in the label descriptions and instructions, not in the label name alone.
{{#if global_instructions}}

Repository instructions (these take precedence over label-specific instructions):

{{global_instructions}}
{{/if}}

{{contract}} Only names from the available label list are valid. Respond with a JSON object of the form {"labels": ["name", ...]}."#;

const USER_PROMPT: &str = r"# {{kind}} #{{number}}: {{title}}
{{#if author}}
Author: {{author}}
{{/if}}

## Description

{{#if body}}{{body}}{{else}}(no description provided){{/if}}

## Available labels
{{#each labels}}
- `{{name}}`{{#if description}}: {{description}}{{/if}}
{{#if instructions}}
  Instructions: {{instructions}}
{{/if}}
{{/each}}
{{#if diff}}

## Changed files ({{diff.total_files}} files, +{{diff.total_additions}} / -{{diff.total_deletions}} lines)
{{#if diff.partial}}
NOTE: this diff summary is partial. {{diff.omitted_files}} file(s) and some patch content were left out to bound its size; the totals above cover the whole change.
{{/if}}
{{#each diff.files}}
- {{path}} ({{status}}, +{{additions}} / -{{deletions}})
{{#if patch}}
```diff
{{patch}}
```
{{/if}}
{{/each}}
{{/if}}
{{#each context_files}}

## Repository file: {{path}}{{#if truncated}} (truncated){{/if}}

{{content}}
{{/each}}";
