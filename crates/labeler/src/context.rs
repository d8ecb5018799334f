//! # Context Assembler
//!
//! Builds the bounded, immutable input handed to the classifier: the entity,
//! the label catalog, global instructions, a size-capped diff summary and any
//! configured context files.
//!
//! Context files are best-effort. A file that cannot be fetched is skipped and
//! recorded as a [`ContextWarning`]; it never fails the run.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::LabelCatalog;
use crate::entity::{DiffSummary, FileChange, FileDiffSummary, TargetEntity};
use crate::errors::{LabelerError, LabelerResult};

/// Instruction given to the classifier on every call.
pub const DECISION_CONTRACT: &str =
    "Return the subset of catalog label names that apply to this item. The subset may be empty.";

/// Default cap on the serialized diff summary, in characters.
pub const DEFAULT_MAX_DIFF_CHARS: usize = 20_000;

/// Default cap on each context file, in characters.
pub const DEFAULT_MAX_CONTEXT_FILE_CHARS: usize = 10_000;

/// Rough per-file cost of the summary line, on top of the path.
const FILE_ENTRY_OVERHEAD: usize = 32;

/// Source of repository file contents.
#[async_trait]
pub trait ContextSource: Send + Sync {
    /// Fetch a file by repository-relative path. `Ok(None)` means it does not exist.
    async fn fetch(&self, path: &str) -> LabelerResult<Option<String>>;
}

/// Reads context files from a checked-out repository.
#[derive(Debug, Clone)]
pub struct FsContextSource {
    root: PathBuf,
}

impl FsContextSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ContextSource for FsContextSource {
    async fn fetch(&self, path: &str) -> LabelerResult<Option<String>> {
        if !is_repo_relative(path) {
            return Err(LabelerError::config(format!(
                "context file '{path}' must be relative to the repository root"
            )));
        }

        match tokio::fs::read_to_string(self.root.join(path)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Whether a path stays inside the directory it is joined onto.
fn is_repo_relative(path: &str) -> bool {
    Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Size bounds applied while assembling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyLimits {
    /// Cap on the diff summary, in characters
    pub max_diff_chars: usize,
    /// Cap on each context file, in characters
    pub max_context_file_chars: usize,
    /// Whether patch hunks are included in the diff summary
    pub include_patches: bool,
}

impl Default for AssemblyLimits {
    fn default() -> Self {
        Self {
            max_diff_chars: DEFAULT_MAX_DIFF_CHARS,
            max_context_file_chars: DEFAULT_MAX_CONTEXT_FILE_CHARS,
            include_patches: true,
        }
    }
}

/// A repository file included as context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextFile {
    pub path: String,
    pub content: String,
    pub truncated: bool,
}

/// A context file that could not be included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextWarning {
    pub path: String,
    pub reason: String,
}

impl std::fmt::Display for ContextWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "context file '{}' skipped: {}", self.path, self.reason)
    }
}

/// Immutable snapshot passed to the classifier.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationContext {
    pub entity: TargetEntity,
    pub catalog: LabelCatalog,
    pub global_instructions: Option<String>,
    /// Present for pull requests only
    pub diff: Option<DiffSummary>,
    /// In configured order
    pub context_files: Vec<ContextFile>,
    pub warnings: Vec<ContextWarning>,
}

impl ClassificationContext {
    pub fn contract(&self) -> &'static str {
        DECISION_CONTRACT
    }
}

/// Assembles [`ClassificationContext`] values.
pub struct ContextAssembler<S> {
    source: S,
    limits: AssemblyLimits,
}

impl<S: ContextSource> ContextAssembler<S> {
    pub fn new(source: S, limits: AssemblyLimits) -> Self {
        Self { source, limits }
    }

    /// Build the context for one entity.
    pub async fn assemble(
        &self,
        entity: TargetEntity,
        catalog: LabelCatalog,
        context_file_specs: &[String],
        global_instructions: Option<&str>,
    ) -> ClassificationContext {
        let diff = entity
            .is_pull_request()
            .then(|| summarize_diff(&entity.files, &self.limits));

        if let Some(diff) = &diff {
            debug!(
                files = diff.total_files,
                included = diff.files.len(),
                partial = diff.partial,
                "Summarized pull request diff"
            );
        }

        let mut context_files = Vec::with_capacity(context_file_specs.len());
        let mut warnings = Vec::new();

        for path in context_file_specs {
            match self.source.fetch(path).await {
                Ok(Some(content)) => {
                    let (content, truncated) =
                        truncate_str(&content, self.limits.max_context_file_chars);
                    context_files.push(ContextFile {
                        path: path.clone(),
                        content,
                        truncated,
                    });
                }
                Ok(None) => {
                    warn!(path = %path, "Context file not found");
                    warnings.push(ContextWarning {
                        path: path.clone(),
                        reason: "not found".to_string(),
                    });
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "Failed to read context file");
                    warnings.push(ContextWarning {
                        path: path.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        ClassificationContext {
            entity,
            catalog,
            global_instructions: global_instructions.map(str::to_string),
            diff,
            context_files,
            warnings,
        }
    }
}

/// Compress changed files into a summary capped at `max_diff_chars`.
///
/// Files are kept in source order. Once the cap is hit the remaining files
/// are counted in `omitted_files` and the summary is marked partial.
pub fn summarize_diff(files: &[FileChange], limits: &AssemblyLimits) -> DiffSummary {
    let mut summary = DiffSummary {
        total_files: files.len(),
        total_additions: files.iter().map(|f| u64::from(f.additions)).sum(),
        total_deletions: files.iter().map(|f| u64::from(f.deletions)).sum(),
        ..DiffSummary::default()
    };

    let mut remaining = limits.max_diff_chars;

    for (i, file) in files.iter().enumerate() {
        let entry_cost = file.path.chars().count() + FILE_ENTRY_OVERHEAD;
        if entry_cost > remaining {
            summary.omitted_files = files.len() - i;
            summary.partial = true;
            break;
        }
        remaining -= entry_cost;

        let patch = match (&file.patch, limits.include_patches) {
            (Some(patch), true) => {
                let cut = char_prefix(patch, remaining);
                if cut.len() < patch.len() {
                    summary.partial = true;
                }
                remaining -= cut.chars().count();
                (!cut.is_empty()).then(|| cut.to_string())
            }
            _ => None,
        };

        summary.files.push(FileDiffSummary {
            path: file.path.clone(),
            status: file.status.clone(),
            additions: file.additions,
            deletions: file.deletions,
            patch,
        });
    }

    summary
}

/// Longest prefix of `text` holding at most `max_chars` characters.
pub(crate) fn char_prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Cut `text` to at most `max_chars` characters.
fn truncate_str(text: &str, max_chars: usize) -> (String, bool) {
    let cut = char_prefix(text, max_chars);
    (cut.to_string(), cut.len() < text.len())
}
