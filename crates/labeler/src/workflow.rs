//! # Label Workflow
//!
//! One run labels one issue or pull request:
//!
//! 1. validate configuration (before any network call)
//! 2. list repository labels and merge them with the configured ones
//! 3. fetch the entity and assemble its classification context
//! 4. ask the decision engine which labels apply
//! 5. plan and apply the label mutations
//!
//! Steps 1 to 4 fail the run. Mutation failures in step 5 do not: they are
//! recorded per label on the [`RunReport`].

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::catalog::{self, LabelDefinition};
use crate::config::LabelerConfig;
use crate::context::{ContextAssembler, ContextSource};
use crate::decision::{Classifier, DecisionEngine};
use crate::entity::{EntityKind, TargetEntity};
use crate::errors::LabelerResult;
use crate::reconcile::{self, LabelMutator, MutationOutcome, MutationPlan, MutationStatus};

/// Exit code for a run whose mutations all succeeded (or were skipped).
pub const EXIT_SUCCESS: u8 = 0;
/// Exit code for a run that failed before planning.
pub const EXIT_RUN_FAILURE: u8 = 1;
/// Exit code for a run with at least one failed mutation.
pub const EXIT_MUTATION_FAILURE: u8 = 2;

/// Read side of the repository.
#[async_trait]
pub trait RepositorySource: Send + Sync {
    /// Labels defined on the repository.
    async fn list_labels(&self) -> LabelerResult<Vec<LabelDefinition>>;

    /// Snapshot of an issue or pull request.
    async fn fetch_entity(&self, number: u64) -> LabelerResult<TargetEntity>;
}

/// Per-run inputs that are not part of the config file.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// `owner/repo`, for reporting
    pub repository: String,
    pub number: u64,
    pub dry_run: bool,
}

/// Everything a run decided and did.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub repository: String,
    pub number: u64,
    pub kind: EntityKind,
    /// Labels the entity should carry
    pub decision: Vec<String>,
    /// Names the classifier returned that are not in the catalog
    pub rejected: Vec<String>,
    pub plan: MutationPlan,
    pub outcomes: Vec<MutationOutcome>,
    pub dry_run: bool,
    pub warnings: Vec<String>,
}

impl RunReport {
    pub fn has_mutation_failures(&self) -> bool {
        self.outcomes.iter().any(MutationOutcome::is_failure)
    }

    pub fn exit_code(&self) -> u8 {
        if self.has_mutation_failures() {
            EXIT_MUTATION_FAILURE
        } else {
            EXIT_SUCCESS
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.dry_run { " (dry run)" } else { "" };
        writeln!(f, "{} {}#{}{mode}", self.kind, self.repository, self.number)?;

        if self.decision.is_empty() {
            writeln!(f, "  decision: (no labels)")?;
        } else {
            writeln!(f, "  decision: {}", self.decision.join(", "))?;
        }

        if self.outcomes.is_empty() {
            writeln!(f, "  labels already up to date")?;
        }
        for outcome in &self.outcomes {
            match &outcome.status {
                MutationStatus::Applied => {
                    writeln!(f, "  {} {}: applied", outcome.kind, outcome.label)?;
                }
                MutationStatus::Skipped => {
                    writeln!(f, "  {} {}: skipped", outcome.kind, outcome.label)?;
                }
                MutationStatus::Failed { error } => {
                    writeln!(f, "  {} {}: FAILED ({error})", outcome.kind, outcome.label)?;
                }
            }
        }

        for warning in &self.warnings {
            writeln!(f, "  warning: {warning}")?;
        }
        Ok(())
    }
}

/// Run the full labeling pass for one entity.
///
/// # Errors
///
/// Configuration, repository read, context and decision failures end the run.
/// Mutation failures are reported on the returned [`RunReport`] instead.
pub async fn run_label_workflow<R, M, S, C>(
    config: &LabelerConfig,
    options: &RunOptions,
    source: &R,
    mutator: &M,
    assembler: &ContextAssembler<S>,
    engine: &DecisionEngine<C>,
) -> LabelerResult<RunReport>
where
    R: RepositorySource + ?Sized,
    M: LabelMutator + ?Sized,
    S: ContextSource,
    C: Classifier,
{
    config.validate()?;

    let repo_labels = source.list_labels().await?;
    let catalog = catalog::merge(&config.labels, &repo_labels, config.include_repo_labels)?;
    info!(
        repository = %options.repository,
        number = options.number,
        labels = catalog.len(),
        "Label catalog ready"
    );

    let entity = source.fetch_entity(options.number).await?;
    let kind = entity.kind;
    let current_labels = entity.current_labels.clone();

    let context = assembler
        .assemble(
            entity,
            catalog,
            &config.context_files,
            config.global_instructions(),
        )
        .await;
    let decision = engine.decide(&context).await?;

    let existing_labels: BTreeSet<String> = repo_labels.into_iter().map(|l| l.name).collect();
    let plan = reconcile::plan(&decision, &context.catalog, &current_labels, &existing_labels);
    info!(
        create = plan.labels_to_create.len(),
        add = plan.labels_to_add.len(),
        remove = plan.labels_to_remove.len(),
        "Planned label mutations"
    );

    let applied = reconcile::apply(mutator, options.number, &plan, options.dry_run).await;

    let mut warnings: Vec<String> = context.warnings.iter().map(ToString::to_string).collect();
    warnings.extend(
        decision
            .rejected
            .iter()
            .map(|name| format!("classifier returned unknown label '{name}', ignored")),
    );

    Ok(RunReport {
        repository: options.repository.clone(),
        number: options.number,
        kind,
        decision: decision.labels,
        rejected: decision.rejected,
        plan,
        outcomes: applied.outcomes,
        dry_run: applied.dry_run,
        warnings,
    })
}
