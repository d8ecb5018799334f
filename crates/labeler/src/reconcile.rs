//! # Reconciler
//!
//! Turns a [`Decision`] into the minimal set of label mutations and applies
//! them.
//!
//! Planning is a pure function of the decision, the catalog, the entity's
//! current labels and the repository's existing label names. Only
//! catalog-managed labels are ever added or removed; anything else on the
//! entity is left alone.
//!
//! Applying never aborts on the first failure. Labels are created first,
//! then add/remove calls are issued concurrently, and every call's outcome is
//! recorded. An add whose label could not be created is not attempted.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::{LabelCatalog, LabelDefinition};
use crate::decision::Decision;
use crate::errors::LabelerResult;

/// Label mutations needed to bring an entity in line with a decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MutationPlan {
    /// Decided labels that do not exist on the repository yet
    pub labels_to_create: Vec<LabelDefinition>,
    /// Decided labels not currently on the entity
    pub labels_to_add: Vec<String>,
    /// Catalog-managed labels on the entity that were not decided
    pub labels_to_remove: Vec<String>,
}

impl MutationPlan {
    pub fn is_empty(&self) -> bool {
        self.labels_to_create.is_empty()
            && self.labels_to_add.is_empty()
            && self.labels_to_remove.is_empty()
    }

    pub fn len(&self) -> usize {
        self.labels_to_create.len() + self.labels_to_add.len() + self.labels_to_remove.len()
    }
}

/// Compute the mutation plan.
///
/// `existing_labels` is the set of label names defined on the repository,
/// which is distinct from the labels currently on the entity.
pub fn plan(
    decision: &Decision,
    catalog: &LabelCatalog,
    current_labels: &BTreeSet<String>,
    existing_labels: &BTreeSet<String>,
) -> MutationPlan {
    let decided: Vec<&LabelDefinition> = decision
        .iter()
        .filter_map(|name| catalog.get(name))
        .collect();

    let labels_to_create = decided
        .iter()
        .filter(|def| !existing_labels.contains(&def.name))
        .map(|def| (*def).clone())
        .collect();

    let labels_to_add = decided
        .iter()
        .filter(|def| !current_labels.contains(&def.name))
        .map(|def| def.name.clone())
        .collect();

    let labels_to_remove = catalog
        .iter()
        .filter(|def| current_labels.contains(&def.name) && !decision.contains(&def.name))
        .map(|def| def.name.clone())
        .collect();

    MutationPlan {
        labels_to_create,
        labels_to_add,
        labels_to_remove,
    }
}

/// Label-mutation transport.
#[async_trait]
pub trait LabelMutator: Send + Sync {
    /// Define a new label on the repository.
    async fn create_label(&self, label: &LabelDefinition) -> LabelerResult<()>;

    /// Put a label on an issue or pull request.
    async fn add_label(&self, number: u64, label: &str) -> LabelerResult<()>;

    /// Take a label off an issue or pull request.
    async fn remove_label(&self, number: u64, label: &str) -> LabelerResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Create,
    Add,
    Remove,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Add => write!(f, "add"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MutationStatus {
    Applied,
    /// Planned but not issued (dry run)
    Skipped,
    Failed { error: String },
}

/// Result of one planned mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationOutcome {
    pub kind: MutationKind,
    pub label: String,
    #[serde(flatten)]
    pub status: MutationStatus,
}

impl MutationOutcome {
    fn new(kind: MutationKind, label: impl Into<String>, result: LabelerResult<()>) -> Self {
        let status = match result {
            Ok(()) => MutationStatus::Applied,
            Err(e) => MutationStatus::Failed {
                error: e.to_string(),
            },
        };
        Self {
            kind,
            label: label.into(),
            status,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, MutationStatus::Failed { .. })
    }
}

/// Per-label outcomes of applying a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyResult {
    pub dry_run: bool,
    pub outcomes: Vec<MutationOutcome>,
}

impl ApplyResult {
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(MutationOutcome::is_failure)
    }

    pub fn failures(&self) -> impl Iterator<Item = &MutationOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }
}

/// Apply a plan to entity `number`. Under `dry_run` nothing is issued.
pub async fn apply<M>(mutator: &M, number: u64, plan: &MutationPlan, dry_run: bool) -> ApplyResult
where
    M: LabelMutator + ?Sized,
{
    if dry_run {
        let create: Vec<&str> = plan.labels_to_create.iter().map(|l| l.name.as_str()).collect();
        info!(
            number,
            create = ?create,
            add = ?plan.labels_to_add,
            remove = ?plan.labels_to_remove,
            "Dry run: no label changes issued"
        );
        return ApplyResult {
            dry_run: true,
            outcomes: skipped_outcomes(plan),
        };
    }

    let created = join_all(plan.labels_to_create.iter().map(|label| async move {
        MutationOutcome::new(
            MutationKind::Create,
            label.name.as_str(),
            mutator.create_label(label).await,
        )
    }))
    .await;

    let creation_errors: HashMap<&str, &str> = created
        .iter()
        .filter_map(|o| match &o.status {
            MutationStatus::Failed { error } => Some((o.label.as_str(), error.as_str())),
            _ => None,
        })
        .collect();

    let additions = plan.labels_to_add.iter().map(|label| {
        let blocked = creation_errors.get(label.as_str()).copied();
        async move {
            if let Some(error) = blocked {
                return MutationOutcome {
                    kind: MutationKind::Add,
                    label: label.clone(),
                    status: MutationStatus::Failed {
                        error: format!("label could not be created: {error}"),
                    },
                };
            }
            MutationOutcome::new(
                MutationKind::Add,
                label.as_str(),
                mutator.add_label(number, label).await,
            )
        }
    });
    let removals = plan.labels_to_remove.iter().map(|label| async move {
        MutationOutcome::new(
            MutationKind::Remove,
            label.as_str(),
            mutator.remove_label(number, label).await,
        )
    });

    let (added, removed) = futures::join!(join_all(additions), join_all(removals));

    let mut outcomes = created;
    outcomes.extend(added);
    outcomes.extend(removed);

    for failure in outcomes.iter().filter(|o| o.is_failure()) {
        if let MutationStatus::Failed { error } = &failure.status {
            warn!(kind = %failure.kind, label = %failure.label, error = %error, "Label mutation failed");
        }
    }

    let result = ApplyResult {
        dry_run: false,
        outcomes,
    };
    info!(
        number,
        applied = result.outcomes.len() - result.failures().count(),
        failed = result.failures().count(),
        "Applied label plan"
    );
    result
}

fn skipped_outcomes(plan: &MutationPlan) -> Vec<MutationOutcome> {
    let skipped = |kind, label: &str| MutationOutcome {
        kind,
        label: label.to_string(),
        status: MutationStatus::Skipped,
    };

    plan.labels_to_create
        .iter()
        .map(|l| skipped(MutationKind::Create, &l.name))
        .chain(plan.labels_to_add.iter().map(|l| skipped(MutationKind::Add, l)))
        .chain(plan.labels_to_remove.iter().map(|l| skipped(MutationKind::Remove, l)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LabelerError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingMutator {
        calls: Mutex<Vec<(MutationKind, String)>>,
        fail_create: Vec<String>,
        fail_remove: Vec<String>,
    }

    impl RecordingMutator {
        fn calls(&self) -> Vec<(MutationKind, String)> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, kind: MutationKind, label: &str, fail: &[String]) -> LabelerResult<()> {
            self.calls.lock().unwrap().push((kind, label.to_string()));
            if fail.iter().any(|f| f == label) {
                return Err(LabelerError::GitHub {
                    status: 422,
                    message: "Validation Failed".to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl LabelMutator for RecordingMutator {
        async fn create_label(&self, label: &LabelDefinition) -> LabelerResult<()> {
            self.record(MutationKind::Create, &label.name, &self.fail_create)
        }

        async fn add_label(&self, _number: u64, label: &str) -> LabelerResult<()> {
            self.record(MutationKind::Add, label, &[])
        }

        async fn remove_label(&self, _number: u64, label: &str) -> LabelerResult<()> {
            self.record(MutationKind::Remove, label, &self.fail_remove)
        }
    }

    fn catalog(names: &[&str]) -> LabelCatalog {
        names.iter().map(|n| LabelDefinition::new(*n)).collect()
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    fn decision(names: &[&str]) -> Decision {
        Decision {
            labels: names.iter().map(|n| (*n).to_string()).collect(),
            rejected: vec![],
        }
    }

    #[test]
    fn test_bug_docs_scenario() {
        let plan = plan(
            &decision(&["bug"]),
            &catalog(&["bug", "docs"]),
            &set(&["docs", "wontfix"]),
            &set(&["docs", "wontfix"]),
        );

        let created: Vec<&str> = plan.labels_to_create.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(created, vec!["bug"]);
        assert_eq!(plan.labels_to_add, vec!["bug"]);
        assert_eq!(plan.labels_to_remove, vec!["docs"]);
    }

    #[test]
    fn test_existing_repo_label_is_not_created() {
        let plan = plan(
            &decision(&["bug"]),
            &catalog(&["bug", "docs"]),
            &set(&[]),
            &set(&["bug", "docs"]),
        );
        assert!(plan.labels_to_create.is_empty());
        assert_eq!(plan.labels_to_add, vec!["bug"]);
    }

    #[test]
    fn test_unmanaged_labels_are_never_removed() {
        let plan = plan(
            &decision(&[]),
            &catalog(&["bug"]),
            &set(&["bug", "wontfix", "priority/high"]),
            &set(&["bug", "wontfix", "priority/high"]),
        );
        assert_eq!(plan.labels_to_remove, vec!["bug"]);
    }

    #[test]
    fn test_decision_already_applied_is_empty_plan() {
        let plan = plan(
            &decision(&["bug"]),
            &catalog(&["bug", "docs"]),
            &set(&["bug", "external"]),
            &set(&["bug", "docs", "external"]),
        );
        assert!(plan.is_empty());
        assert_eq!(plan.len(), 0);
    }

    #[tokio::test]
    async fn test_reapplying_same_decision_is_noop() {
        let catalog = catalog(&["bug", "docs", "question"]);
        let decision = decision(&["bug", "question"]);
        let mut current = set(&["docs", "wontfix"]);
        let mut existing = set(&["docs", "wontfix"]);
        let mutator = RecordingMutator::default();

        let first = plan(&decision, &catalog, &current, &existing);
        let result = apply(&mutator, 1, &first, false).await;
        assert!(!result.has_failures());

        // Mirror the applied mutations into the label state
        for label in &first.labels_to_create {
            existing.insert(label.name.clone());
        }
        for label in &first.labels_to_add {
            current.insert(label.clone());
        }
        for label in &first.labels_to_remove {
            current.remove(label);
        }

        let second = plan(&decision, &catalog, &current, &existing);
        assert!(second.is_empty());
        assert!(current.contains("wontfix"));
    }

    #[tokio::test]
    async fn test_dry_run_issues_no_calls() {
        let mutator = RecordingMutator::default();
        let plan = plan(
            &decision(&["bug"]),
            &catalog(&["bug", "docs"]),
            &set(&["docs"]),
            &set(&["docs"]),
        );

        let result = apply(&mutator, 1, &plan, true).await;

        assert!(mutator.calls().is_empty());
        assert!(result.dry_run);
        assert_eq!(result.outcomes.len(), 3);
        assert!(result
            .outcomes
            .iter()
            .all(|o| o.status == MutationStatus::Skipped));
    }

    #[tokio::test]
    async fn test_creates_precede_assignments() {
        let mutator = RecordingMutator::default();
        let plan = plan(
            &decision(&["bug", "docs"]),
            &catalog(&["bug", "docs", "old"]),
            &set(&["old"]),
            &set(&["old"]),
        );

        let result = apply(&mutator, 1, &plan, false).await;

        let calls = mutator.calls();
        let last_create = calls
            .iter()
            .rposition(|(kind, _)| *kind == MutationKind::Create)
            .unwrap();
        let first_assign = calls
            .iter()
            .position(|(kind, _)| *kind != MutationKind::Create)
            .unwrap();
        assert!(last_create < first_assign);
        assert_eq!(calls.len(), 5);
        assert!(!result.has_failures());
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_going() {
        let mutator = RecordingMutator {
            fail_create: vec!["bug".to_string()],
            fail_remove: vec!["old".to_string()],
            ..RecordingMutator::default()
        };
        let plan = plan(
            &decision(&["bug", "docs"]),
            &catalog(&["bug", "docs", "old", "stale"]),
            &set(&["old", "stale"]),
            &set(&["docs", "old", "stale"]),
        );

        let result = apply(&mutator, 1, &plan, false).await;

        let failed: Vec<(MutationKind, &str)> = result
            .failures()
            .map(|o| (o.kind, o.label.as_str()))
            .collect();
        assert_eq!(
            failed,
            vec![
                (MutationKind::Create, "bug"),
                (MutationKind::Add, "bug"),
                (MutationKind::Remove, "old"),
            ]
        );

        // The blocked add is never issued, independent mutations still are
        let calls = mutator.calls();
        assert!(!calls.contains(&(MutationKind::Add, "bug".to_string())));
        assert!(calls.contains(&(MutationKind::Add, "docs".to_string())));
        assert!(calls.contains(&(MutationKind::Remove, "stale".to_string())));
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = MutationOutcome {
            kind: MutationKind::Add,
            label: "bug".to_string(),
            status: MutationStatus::Failed {
                error: "boom".to_string(),
            },
        };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({"kind": "add", "label": "bug", "status": "failed", "error": "boom"})
        );
    }
}
