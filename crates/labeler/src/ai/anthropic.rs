//! Anthropic Claude provider implementation.
//!
//! Structured output is requested by offering a single tool whose input
//! schema is the target schema and forcing the model to call it. The tool
//! input is returned as the response text.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{LabelerError, LabelerResult};

use super::provider::{
    AIMessage, AIProvider, AIResponse, AIRole, GenerateOptions, StructuredOutput, TokenUsage,
};

/// Anthropic API endpoint
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic API version
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Labeling responses are short
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Map short names to API model identifiers.
fn normalize_model(model: &str) -> &str {
    match model {
        "haiku" => "claude-3-5-haiku-20241022",
        "sonnet" => "claude-sonnet-4-20250514",
        _ => model,
    }
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ToolChoice<'a> {
    Tool { name: &'a str },
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice<'a>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    model: String,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorResponse {
    error: AnthropicError,
}

/// Anthropic Claude provider.
pub struct AnthropicProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with an API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: Some(api_key.into()),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    /// Create from `ANTHROPIC_API_KEY` (and optional `ANTHROPIC_BASE_URL`).
    pub fn from_env() -> Self {
        Self {
            client: Client::new(),
            api_key: std::env::var("ANTHROPIC_API_KEY").ok().filter(|k| !k.is_empty()),
            base_url: std::env::var("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|_| ANTHROPIC_API_URL.to_string()),
        }
    }

    /// Convert messages to Anthropic format, extracting system messages.
    fn convert_messages(messages: &[AIMessage]) -> (Option<String>, Vec<AnthropicMessage>) {
        let mut system: Vec<&str> = Vec::new();
        let mut converted = Vec::new();

        for msg in messages {
            match msg.role {
                AIRole::System => system.push(&msg.content),
                AIRole::User => converted.push(AnthropicMessage {
                    role: "user",
                    content: msg.content.clone(),
                }),
            }
        }

        let system = (!system.is_empty()).then(|| system.join("\n\n"));
        (system, converted)
    }

    fn forced_tool(output: &StructuredOutput) -> (AnthropicTool<'_>, ToolChoice<'_>) {
        (
            AnthropicTool {
                name: &output.name,
                description: &output.description,
                input_schema: &output.schema,
            },
            ToolChoice::Tool { name: &output.name },
        )
    }

    /// Pull the response text out of the content blocks.
    fn extract_text(
        content: Vec<ContentBlock>,
        structured: Option<&StructuredOutput>,
    ) -> LabelerResult<String> {
        if let Some(output) = structured {
            return content
                .into_iter()
                .find_map(|block| match block {
                    ContentBlock::ToolUse { name, input } if name == output.name => Some(input),
                    _ => None,
                })
                .map(|input| input.to_string())
                .ok_or_else(|| {
                    LabelerError::decision(format!(
                        "Anthropic response did not call the '{}' tool",
                        output.name
                    ))
                });
        }

        Ok(content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                _ => None,
            })
            .collect())
    }
}

#[async_trait]
impl AIProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn api_key_env_var(&self) -> &'static str {
        "ANTHROPIC_API_KEY"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn supports_model(&self, model: &str) -> bool {
        model.starts_with("claude-") || matches!(model, "haiku" | "sonnet")
    }

    async fn generate_text(
        &self,
        model: &str,
        messages: &[AIMessage],
        options: &GenerateOptions,
    ) -> LabelerResult<AIResponse> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| LabelerError::ProviderNotConfigured {
                provider: "anthropic (ANTHROPIC_API_KEY not set)".to_string(),
            })?;

        let model = normalize_model(model);
        let (system, converted_messages) = Self::convert_messages(messages);
        let (tools, tool_choice) = match options.structured_output.as_ref().map(Self::forced_tool)
        {
            Some((tool, choice)) => (vec![tool], Some(choice)),
            None => (Vec::new(), None),
        };

        let request = AnthropicRequest {
            model,
            messages: converted_messages,
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            temperature: options.temperature,
            tools,
            tool_choice,
        };

        debug!(model, messages = messages.len(), "Calling Anthropic API");

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| LabelerError::Ai(format!("Anthropic API request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LabelerError::Ai(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            if let Ok(error_response) = serde_json::from_str::<AnthropicErrorResponse>(&body) {
                return Err(LabelerError::Ai(format!(
                    "Anthropic API error: {} - {}",
                    error_response.error.error_type, error_response.error.message
                )));
            }
            return Err(LabelerError::Ai(format!(
                "Anthropic API error ({status}): {body}"
            )));
        }

        let api_response: AnthropicResponse = serde_json::from_str(&body)
            .map_err(|e| LabelerError::Ai(format!("Failed to parse response: {e}")))?;

        let text = Self::extract_text(api_response.content, options.structured_output.as_ref())?;
        let usage = api_response.usage;

        Ok(AIResponse {
            text,
            usage: TokenUsage {
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
                total_tokens: usage.input_tokens + usage.output_tokens,
            },
            model: api_response.model,
            provider: "anthropic".to_string(),
        })
    }
}

impl Default for AnthropicProvider {
    fn default() -> Self {
        Self::from_env()
    }
}
