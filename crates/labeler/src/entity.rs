//! Issue and pull request snapshots handed to the labeler.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// What kind of item is being labeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Issue,
    PullRequest,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Issue => write!(f, "issue"),
            Self::PullRequest => write!(f, "pull request"),
        }
    }
}

/// A changed file in a pull request, as reported by the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    /// `added`, `modified`, `removed`, `renamed`, ...
    #[serde(default)]
    pub status: String,
    pub additions: u32,
    pub deletions: u32,
    /// Unified diff hunk, absent for binary or very large files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
}

/// The issue or pull request being classified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetEntity {
    pub number: u64,
    pub kind: EntityKind,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub author: Option<String>,
    /// Labels currently on the entity
    #[serde(default)]
    pub current_labels: BTreeSet<String>,
    /// Changed files, in source order (pull requests only)
    #[serde(default)]
    pub files: Vec<FileChange>,
}

impl TargetEntity {
    pub fn issue(number: u64, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            number,
            kind: EntityKind::Issue,
            title: title.into(),
            body: body.into(),
            author: None,
            current_labels: BTreeSet::new(),
            files: Vec::new(),
        }
    }

    pub fn pull_request(
        number: u64,
        title: impl Into<String>,
        body: impl Into<String>,
        files: Vec<FileChange>,
    ) -> Self {
        Self {
            kind: EntityKind::PullRequest,
            files,
            ..Self::issue(number, title, body)
        }
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.current_labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn is_pull_request(&self) -> bool {
        self.kind == EntityKind::PullRequest
    }
}

/// Per-file entry of a compressed diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiffSummary {
    pub path: String,
    pub status: String,
    pub additions: u32,
    pub deletions: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
}

/// Size-bounded view of a pull request's changes.
///
/// Totals always describe the whole change set, even when `files` was cut
/// short, so size-based instructions stay accurate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub files: Vec<FileDiffSummary>,
    pub total_files: usize,
    pub total_additions: u64,
    pub total_deletions: u64,
    /// Files left out because the size cap was reached
    pub omitted_files: usize,
    /// True when any file or patch was dropped or cut
    pub partial: bool,
}

impl DiffSummary {
    pub fn total_changes(&self) -> u64 {
        self.total_additions + self.total_deletions
    }
}
