//! AI Provider trait and common types.
//!
//! Defines the interface that all model providers must implement.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{LabelerError, LabelerResult};

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AIRole {
    /// System message (sets context/behavior)
    System,
    /// User message (input)
    User,
}

/// A message in a conversation with an AI model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIMessage {
    pub role: AIRole,
    pub content: String,
}

impl AIMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: AIRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: AIRole::User,
            content: content.into(),
        }
    }
}

/// Token usage information from an AI response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

/// Response from an AI model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIResponse {
    /// Generated text, or the JSON arguments of a forced structured output
    pub text: String,
    pub usage: TokenUsage,
    /// Model that generated the response
    pub model: String,
    /// Provider that generated the response
    pub provider: String,
}

/// JSON schema the response must conform to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredOutput {
    /// Schema (or tool) name, `[a-zA-Z0-9_-]+`
    pub name: String,
    pub description: String,
    pub schema: serde_json::Value,
}

/// Options for text generation.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Temperature for sampling (0.0 to 1.0)
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Constrain the output to this schema
    pub structured_output: Option<StructuredOutput>,
}

/// Trait for AI providers.
///
/// All model providers (OpenAI, Anthropic, ...) must implement this trait.
#[async_trait]
pub trait AIProvider: Send + Sync {
    /// Get the provider name (e.g., "anthropic", "openai").
    fn name(&self) -> &'static str;

    /// Get the environment variable name for the API key.
    fn api_key_env_var(&self) -> &'static str;

    /// Check if the provider is configured (has API key).
    fn is_configured(&self) -> bool;

    /// Check if a model belongs to this provider.
    fn supports_model(&self, model: &str) -> bool;

    /// Generate text from messages.
    async fn generate_text(
        &self,
        model: &str,
        messages: &[AIMessage],
        options: &GenerateOptions,
    ) -> LabelerResult<AIResponse>;
}

/// Parse a JSON value out of a model response.
///
/// Models sometimes wrap JSON in markdown code fences even when asked not
/// to; those are stripped first. Failure is a (retryable) decision error.
pub fn parse_ai_response<T: for<'de> Deserialize<'de>>(response: &AIResponse) -> LabelerResult<T> {
    let text = response.text.trim();

    let json_text = if text.starts_with("```json") {
        text.strip_prefix("```json")
            .and_then(|s| s.strip_suffix("```"))
            .unwrap_or(text)
            .trim()
    } else if text.starts_with("```") {
        text.strip_prefix("```")
            .and_then(|s| s.strip_suffix("```"))
            .unwrap_or(text)
            .trim()
    } else {
        text
    };

    serde_json::from_str(json_text).map_err(|e| {
        LabelerError::decision(format!(
            "failed to parse {} response as JSON: {e}. Response: {text}",
            response.provider
        ))
    })
}
