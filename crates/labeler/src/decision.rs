//! # Decision Engine
//!
//! Asks the classifier which catalog labels apply and validates the answer.
//!
//! The request's output schema enumerates the exact catalog names, so a
//! well-behaved model cannot invent labels. The result is still checked:
//! names outside the catalog are rejected (never applied), duplicates are
//! collapsed, and output of the wrong shape fails with a retryable
//! [`LabelerError::Decision`] instead of yielding a guessed set.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::ai::{
    labeling_template, parse_ai_response, AIMessage, AIProvider, GenerateOptions,
    LabelingPromptContext, PromptTemplate, StructuredOutput,
};
use crate::catalog::LabelCatalog;
use crate::context::ClassificationContext;
use crate::errors::{LabelerError, LabelerResult};

/// Name of the structured output the classifier must produce.
pub const OUTPUT_SCHEMA_NAME: &str = "label_selection";

/// A fully rendered classification request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationRequest {
    pub system: String,
    pub user: String,
    pub output: StructuredOutput,
    /// The only label names the classifier may return
    pub allowed: Vec<String>,
}

/// Something that turns a classification request into raw structured output.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, request: &ClassificationRequest) -> LabelerResult<Value>;
}

/// Classifier backed by a language model provider.
pub struct LlmClassifier {
    provider: Arc<dyn AIProvider>,
    model: String,
    options: GenerateOptions,
}

impl LlmClassifier {
    pub fn new(provider: Arc<dyn AIProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            options: GenerateOptions {
                temperature: Some(0.0),
                ..GenerateOptions::default()
            },
        }
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, request: &ClassificationRequest) -> LabelerResult<Value> {
        let messages = [
            AIMessage::system(request.system.as_str()),
            AIMessage::user(request.user.as_str()),
        ];
        let options = GenerateOptions {
            structured_output: Some(request.output.clone()),
            ..self.options.clone()
        };

        let response = self
            .provider
            .generate_text(&self.model, &messages, &options)
            .await?;

        debug!(
            provider = %response.provider,
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Classifier responded"
        );

        parse_ai_response(&response)
    }
}

/// The validated set of labels chosen for one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Chosen names, in catalog order
    pub labels: Vec<String>,
    /// Names the classifier returned that are not in the catalog
    pub rejected: Vec<String>,
}

impl Decision {
    pub fn contains(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l == name)
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

/// Builds classification requests and validates their results.
pub struct DecisionEngine<C> {
    classifier: C,
    template: PromptTemplate,
}

impl<C: Classifier> DecisionEngine<C> {
    pub fn new(classifier: C) -> Self {
        Self {
            classifier,
            template: labeling_template(),
        }
    }

    /// Decide which catalog labels apply to the context's entity.
    pub async fn decide(&self, context: &ClassificationContext) -> LabelerResult<Decision> {
        if context.catalog.is_empty() {
            info!("Label catalog is empty, nothing to decide");
            return Ok(Decision::default());
        }

        let request = self.build_request(context)?;
        debug!(
            labels = request.allowed.len(),
            prompt_chars = request.system.len() + request.user.len(),
            "Requesting classification"
        );

        let raw = self.classifier.classify(&request).await?;
        let names = extract_label_names(&raw)?;
        let decision = validate(names, &context.catalog);

        info!(
            labels = ?decision.labels,
            rejected = decision.rejected.len(),
            "Classification complete"
        );
        Ok(decision)
    }

    /// Render the prompt and the enumerated output schema.
    pub fn build_request(&self, context: &ClassificationContext) -> LabelerResult<ClassificationRequest> {
        let (system, user) = self
            .template
            .render(&LabelingPromptContext::from(context))?;
        let allowed: Vec<String> = context.catalog.names().map(str::to_string).collect();

        Ok(ClassificationRequest {
            system,
            user,
            output: StructuredOutput {
                name: OUTPUT_SCHEMA_NAME.to_string(),
                description: "The labels that apply to the issue or pull request".to_string(),
                schema: label_selection_schema(&allowed),
            },
            allowed,
        })
    }
}

/// JSON schema restricting output to a subset of `allowed`.
pub fn label_selection_schema(allowed: &[String]) -> Value {
    json!({
        "type": "object",
        "properties": {
            "labels": {
                "type": "array",
                "description": "Names of the labels that apply; may be empty",
                "items": {
                    "type": "string",
                    "enum": allowed,
                },
            },
        },
        "required": ["labels"],
        "additionalProperties": false,
    })
}

/// Read label names out of `{"labels": [..]}` (or a bare array).
fn extract_label_names(raw: &Value) -> LabelerResult<Vec<String>> {
    let items = match raw {
        Value::Object(map) => map
            .get("labels")
            .and_then(Value::as_array)
            .ok_or_else(|| LabelerError::decision("expected an object with a 'labels' array"))?,
        Value::Array(items) => items,
        other => {
            return Err(LabelerError::decision(format!(
                "expected a list of label names, got {other}"
            )));
        }
    };

    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| LabelerError::decision(format!("label entry {item} is not a string")))
        })
        .collect()
}

/// Deduplicate, drop names outside the catalog, and order by catalog position.
fn validate(names: Vec<String>, catalog: &LabelCatalog) -> Decision {
    let mut seen = HashSet::new();
    let mut labels = Vec::new();
    let mut rejected = Vec::new();

    for name in names {
        if !seen.insert(name.clone()) {
            continue;
        }
        if catalog.contains(&name) {
            labels.push(name);
        } else {
            warn!(label = %name, "Classifier returned a label outside the catalog, rejecting");
            rejected.push(name);
        }
    }

    labels.sort_by_key(|name| catalog.position(name));
    Decision { labels, rejected }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::LabelDefinition;
    use crate::entity::TargetEntity;
    use std::sync::Mutex;

    /// Returns a fixed value and records the request it saw.
    struct FixedClassifier {
        output: Value,
        seen: Mutex<Option<ClassificationRequest>>,
    }

    impl FixedClassifier {
        fn new(output: Value) -> Self {
            Self {
                output,
                seen: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn classify(&self, request: &ClassificationRequest) -> LabelerResult<Value> {
            *self.seen.lock().unwrap() = Some(request.clone());
            Ok(self.output.clone())
        }
    }

    fn context(labels: &[&str]) -> ClassificationContext {
        ClassificationContext {
            entity: TargetEntity::issue(1, "Docs typo", "The README has a typo"),
            catalog: labels.iter().map(|l| LabelDefinition::new(*l)).collect(),
            global_instructions: None,
            diff: None,
            context_files: vec![],
            warnings: vec![],
        }
    }

    #[tokio::test]
    async fn test_decision_in_catalog_order_without_duplicates() {
        let engine = DecisionEngine::new(FixedClassifier::new(
            json!({"labels": ["docs", "bug", "docs"]}),
        ));

        let decision = engine.decide(&context(&["bug", "docs", "question"])).await.unwrap();

        assert_eq!(decision.labels, vec!["bug", "docs"]);
        assert!(decision.rejected.is_empty());
        assert!(decision.contains("docs"));
    }

    #[tokio::test]
    async fn test_unknown_names_are_rejected() {
        let engine = DecisionEngine::new(FixedClassifier::new(json!({"labels": ["bug", "urgent"]})));

        let decision = engine.decide(&context(&["bug"])).await.unwrap();

        assert_eq!(decision.labels, vec!["bug"]);
        assert_eq!(decision.rejected, vec!["urgent"]);
    }

    #[tokio::test]
    async fn test_bare_array_is_accepted() {
        let engine = DecisionEngine::new(FixedClassifier::new(json!(["bug"])));
        let decision = engine.decide(&context(&["bug"])).await.unwrap();
        assert_eq!(decision.labels, vec!["bug"]);
    }

    #[tokio::test]
    async fn test_malformed_output_is_decision_error() {
        for output in [
            json!({"label": ["bug"]}),
            json!({"labels": "bug"}),
            json!({"labels": [1, 2]}),
            json!("bug"),
        ] {
            let engine = DecisionEngine::new(FixedClassifier::new(output.clone()));
            let err = engine.decide(&context(&["bug"])).await.unwrap_err();
            assert!(
                matches!(err, LabelerError::Decision { .. }),
                "expected decision error for {output}"
            );
        }
    }

    #[tokio::test]
    async fn test_empty_catalog_skips_classifier() {
        let classifier = FixedClassifier::new(json!({"labels": ["bug"]}));
        let engine = DecisionEngine::new(classifier);

        let decision = engine.decide(&context(&[])).await.unwrap();

        assert!(decision.is_empty());
        assert!(engine.classifier.seen.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_request_enumerates_catalog_names() {
        let engine = DecisionEngine::new(FixedClassifier::new(json!({"labels": []})));
        engine.decide(&context(&["bug", "docs"])).await.unwrap();

        let request = engine.classifier.seen.lock().unwrap().clone().unwrap();
        assert_eq!(request.allowed, vec!["bug", "docs"]);
        assert_eq!(request.output.name, OUTPUT_SCHEMA_NAME);
        assert_eq!(
            request.output.schema["properties"]["labels"]["items"]["enum"],
            json!(["bug", "docs"])
        );
        assert!(request.user.contains("Docs typo"));
    }

    #[test]
    fn test_schema_disallows_extra_fields() {
        let schema = label_selection_schema(&["bug".to_string()]);
        assert_eq!(schema["additionalProperties"], json!(false));
        assert_eq!(schema["required"], json!(["labels"]));
    }
}
