//! End-to-end runs of the label workflow against in-memory collaborators.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use labeler::workflow::{EXIT_MUTATION_FAILURE, EXIT_SUCCESS};
use labeler::{
    run_label_workflow, AssemblyLimits, ClassificationRequest, Classifier, ContextAssembler,
    ContextSource, DecisionEngine, LabelDefinition, LabelMutator, LabelerConfig, LabelerError,
    LabelerResult, MutationKind, MutationStatus, RepositorySource, RunOptions, TargetEntity,
};
use serde_json::{json, Value};

struct FakeRepository {
    labels: Vec<LabelDefinition>,
    entity: TargetEntity,
    calls: Mutex<usize>,
}

impl FakeRepository {
    fn new(labels: Vec<LabelDefinition>, entity: TargetEntity) -> Self {
        Self {
            labels,
            entity,
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl RepositorySource for FakeRepository {
    async fn list_labels(&self) -> LabelerResult<Vec<LabelDefinition>> {
        *self.calls.lock().unwrap() += 1;
        Ok(self.labels.clone())
    }

    async fn fetch_entity(&self, _number: u64) -> LabelerResult<TargetEntity> {
        *self.calls.lock().unwrap() += 1;
        Ok(self.entity.clone())
    }
}

#[derive(Default)]
struct RecordingMutator {
    calls: Mutex<Vec<String>>,
    fail_on: BTreeSet<String>,
}

impl RecordingMutator {
    fn failing_on(label: &str) -> Self {
        Self {
            fail_on: BTreeSet::from([label.to_string()]),
            ..Self::default()
        }
    }

    fn record(&self, call: String, label: &str) -> LabelerResult<()> {
        self.calls.lock().unwrap().push(call);
        if self.fail_on.contains(label) {
            return Err(LabelerError::GitHub {
                status: 500,
                message: "server error".to_string(),
            });
        }
        Ok(())
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LabelMutator for RecordingMutator {
    async fn create_label(&self, label: &LabelDefinition) -> LabelerResult<()> {
        self.record(format!("create {}", label.name), &label.name)
    }

    async fn add_label(&self, _number: u64, label: &str) -> LabelerResult<()> {
        self.record(format!("add {label}"), label)
    }

    async fn remove_label(&self, _number: u64, label: &str) -> LabelerResult<()> {
        self.record(format!("remove {label}"), label)
    }
}

struct FixedClassifier {
    output: Value,
}

impl FixedClassifier {
    fn new(output: Value) -> Self {
        Self { output }
    }
}

#[async_trait]
impl Classifier for FixedClassifier {
    async fn classify(&self, request: &ClassificationRequest) -> LabelerResult<Value> {
        assert!(!request.allowed.is_empty());
        Ok(self.output.clone())
    }
}

#[derive(Default)]
struct MemorySource {
    files: HashMap<String, String>,
}

#[async_trait]
impl ContextSource for MemorySource {
    async fn fetch(&self, path: &str) -> LabelerResult<Option<String>> {
        Ok(self.files.get(path).cloned())
    }
}

fn options(dry_run: bool) -> RunOptions {
    RunOptions {
        repository: "octo-org/app".to_string(),
        number: 12,
        dry_run,
    }
}

fn assembler() -> ContextAssembler<MemorySource> {
    ContextAssembler::new(MemorySource::default(), AssemblyLimits::default())
}

/// catalog {bug, docs}; entity carries {docs, wontfix}; model picks {bug}.
fn scenario() -> (LabelerConfig, FakeRepository) {
    let config = LabelerConfig::from_yaml_str(
        r"
include_repo_labels: false
labels:
  - bug
  - name: docs
    description: Documentation changes
",
    )
    .unwrap();
    let repo = FakeRepository::new(
        vec![LabelDefinition::new("docs"), LabelDefinition::new("wontfix")],
        TargetEntity::issue(12, "Crash on start", "Stack trace attached")
            .with_labels(["docs", "wontfix"]),
    );
    (config, repo)
}

#[tokio::test]
async fn test_reconciles_managed_labels_only() {
    let (config, repo) = scenario();
    let mutator = RecordingMutator::default();
    let engine = DecisionEngine::new(FixedClassifier::new(json!({"labels": ["bug"]})));

    let report = run_label_workflow(&config, &options(false), &repo, &mutator, &assembler(), &engine)
        .await
        .unwrap();

    assert_eq!(report.decision, vec!["bug"]);
    let created: Vec<&str> = report
        .plan
        .labels_to_create
        .iter()
        .map(|l| l.name.as_str())
        .collect();
    assert_eq!(created, vec!["bug"]);
    assert_eq!(report.plan.labels_to_add, vec!["bug"]);
    assert_eq!(report.plan.labels_to_remove, vec!["docs"]);

    let calls = mutator.calls();
    assert_eq!(calls[0], "create bug");
    assert!(calls.contains(&"add bug".to_string()));
    assert!(calls.contains(&"remove docs".to_string()));
    assert!(!calls.iter().any(|c| c.contains("wontfix")));
    assert_eq!(report.exit_code(), EXIT_SUCCESS);
}

#[tokio::test]
async fn test_dry_run_issues_no_mutations() {
    let (config, repo) = scenario();
    let mutator = RecordingMutator::default();
    let engine = DecisionEngine::new(FixedClassifier::new(json!({"labels": ["bug"]})));

    let report = run_label_workflow(&config, &options(true), &repo, &mutator, &assembler(), &engine)
        .await
        .unwrap();

    assert!(report.dry_run);
    assert!(mutator.calls().is_empty());
    assert_eq!(report.outcomes.len(), 3);
    assert!(report
        .outcomes
        .iter()
        .all(|o| o.status == MutationStatus::Skipped));
}

#[tokio::test]
async fn test_mutation_failure_is_reported_not_raised() {
    let (config, repo) = scenario();
    let mutator = RecordingMutator::failing_on("docs");
    let engine = DecisionEngine::new(FixedClassifier::new(json!({"labels": ["bug"]})));

    let report = run_label_workflow(&config, &options(false), &repo, &mutator, &assembler(), &engine)
        .await
        .unwrap();

    assert_eq!(report.exit_code(), EXIT_MUTATION_FAILURE);
    let failed: Vec<_> = report.outcomes.iter().filter(|o| o.is_failure()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].kind, MutationKind::Remove);
    assert!(report
        .outcomes
        .iter()
        .any(|o| o.kind == MutationKind::Add && o.status == MutationStatus::Applied));
}

#[tokio::test]
async fn test_second_run_is_a_noop() {
    let (config, _) = scenario();
    let repo = FakeRepository::new(
        vec![
            LabelDefinition::new("bug"),
            LabelDefinition::new("docs"),
            LabelDefinition::new("wontfix"),
        ],
        TargetEntity::issue(12, "Crash on start", "").with_labels(["bug", "wontfix"]),
    );
    let mutator = RecordingMutator::default();
    let engine = DecisionEngine::new(FixedClassifier::new(json!({"labels": ["bug"]})));

    let report = run_label_workflow(&config, &options(false), &repo, &mutator, &assembler(), &engine)
        .await
        .unwrap();

    assert!(report.plan.is_empty());
    assert!(mutator.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_labels_become_warnings() {
    let (config, repo) = scenario();
    let mutator = RecordingMutator::default();
    let engine = DecisionEngine::new(FixedClassifier::new(json!({"labels": ["bug", "wontfix"]})));

    let report = run_label_workflow(&config, &options(false), &repo, &mutator, &assembler(), &engine)
        .await
        .unwrap();

    // wontfix exists on the repository but is not in this run's catalog
    assert_eq!(report.decision, vec!["bug"]);
    assert_eq!(report.rejected, vec!["wontfix"]);
    assert!(report.warnings.iter().any(|w| w.contains("'wontfix'")));
    assert!(!mutator.calls().iter().any(|c| c.contains("wontfix")));
}

#[tokio::test]
async fn test_invalid_config_fails_before_any_call() {
    let config = LabelerConfig {
        labels: vec![
            labeler::LabelDeclaration::Bare("bug".to_string()),
            labeler::LabelDeclaration::Bare("bug".to_string()),
        ],
        ..LabelerConfig::default()
    };
    let (_, repo) = scenario();
    let mutator = RecordingMutator::default();
    let engine = DecisionEngine::new(FixedClassifier::new(json!({"labels": []})));

    let err = run_label_workflow(&config, &options(false), &repo, &mutator, &assembler(), &engine)
        .await
        .unwrap_err();

    assert!(err.is_config_error());
    assert_eq!(repo.calls(), 0);
    assert!(mutator.calls().is_empty());
}

#[tokio::test]
async fn test_malformed_decision_fails_run_without_mutations() {
    let (config, repo) = scenario();
    let mutator = RecordingMutator::default();
    let engine = DecisionEngine::new(FixedClassifier::new(json!({"unexpected": true})));

    let err = run_label_workflow(&config, &options(false), &repo, &mutator, &assembler(), &engine)
        .await
        .unwrap_err();

    assert!(matches!(err, LabelerError::Decision { .. }));
    assert!(err.is_retryable());
    assert!(mutator.calls().is_empty());
}

#[tokio::test]
async fn test_repo_labels_included_and_context_files_reported() {
    let config = LabelerConfig::from_yaml_str(
        r"
instructions: Prefer documentation for README-only changes.
labels:
  - bug:
      instructions: Only with reproduction steps
context-files:
  - CONTRIBUTING.md
  - missing.md
",
    )
    .unwrap();
    let repo = FakeRepository::new(
        vec![
            LabelDefinition::new("bug").with_description("Something isn't working"),
            LabelDefinition::new("documentation").with_description("Docs update"),
        ],
        TargetEntity::issue(12, "README typo", "").with_labels(["question"]),
    );
    let source = MemorySource {
        files: HashMap::from([(
            "CONTRIBUTING.md".to_string(),
            "Label triage rules".to_string(),
        )]),
    };
    let assembler = ContextAssembler::new(source, AssemblyLimits::default());
    let mutator = RecordingMutator::default();
    let classifier = FixedClassifier::new(json!({"labels": ["documentation"]}));
    let engine = DecisionEngine::new(classifier);

    let report = run_label_workflow(&config, &options(false), &repo, &mutator, &assembler, &engine)
        .await
        .unwrap();

    assert_eq!(report.decision, vec!["documentation"]);
    assert!(report.plan.labels_to_create.is_empty());
    assert_eq!(mutator.calls(), vec!["add documentation".to_string()]);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("missing.md"));

    let text = report.to_string();
    assert!(text.contains("add documentation: applied"));
}
