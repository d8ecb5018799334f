#![warn(clippy::pedantic)]
// Allow common pedantic lints that don't affect correctness
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]

//! # Labeler
//!
//! Model-driven labeling for GitHub issues and pull requests.
//!
//! This crate provides:
//! - A label catalog merged from repository labels and a YAML config
//! - Context assembly (entity text, bounded diff summary, repository files)
//! - A decision engine constrained to catalog names
//! - An idempotent reconciler that only touches catalog-managed labels
//! - GitHub and model-provider transports
//!
//! ## Example
//!
//! ```rust,ignore
//! use labeler::{run_label_workflow, ContextAssembler, DecisionEngine, FsContextSource};
//!
//! let report = run_label_workflow(
//!     &config,
//!     &options,
//!     &github,
//!     &github,
//!     &ContextAssembler::new(FsContextSource::new(workspace), limits),
//!     &DecisionEngine::new(classifier),
//! )
//! .await?;
//! println!("{report}");
//! ```

// Error types
pub mod errors;

// Configuration and catalog
pub mod catalog;
pub mod config;

// Entity snapshots and context
pub mod context;
pub mod entity;

// Model integration and decisions
pub mod ai;
pub mod decision;

// Label mutations
pub mod reconcile;

// Transports and orchestration
pub mod event;
pub mod github;
pub mod workflow;

// Re-export key types for convenience
pub use catalog::{merge, LabelCatalog, LabelDefinition};
pub use config::{LabelDeclaration, LabelerConfig, DEFAULT_CONFIG_PATH};
pub use context::{
    AssemblyLimits, ClassificationContext, ContextAssembler, ContextSource, ContextWarning,
    FsContextSource,
};
pub use decision::{Classifier, ClassificationRequest, Decision, DecisionEngine, LlmClassifier};
pub use entity::{DiffSummary, EntityKind, FileChange, TargetEntity};
pub use errors::{LabelerError, LabelerResult};
pub use event::{EventTarget, Repository};
pub use github::GitHubClient;
pub use reconcile::{
    apply, plan, ApplyResult, LabelMutator, MutationKind, MutationOutcome, MutationPlan,
    MutationStatus,
};
pub use workflow::{run_label_workflow, RepositorySource, RunOptions, RunReport};
