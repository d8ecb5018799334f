//! Model integration for labeling.
//!
//! This module provides:
//! - AI provider abstraction (OpenAI, Anthropic)
//! - Prompt template system with Handlebars
//! - Provider registry resolving `provider/model` specs

pub mod prompts;
pub mod provider;
pub mod registry;

// Provider implementations
pub mod anthropic;
pub mod openai;

// Re-exports
pub use prompts::{labeling_template, LabelingPromptContext, PromptTemplate};
pub use provider::{
    parse_ai_response, AIMessage, AIProvider, AIResponse, AIRole, GenerateOptions,
    StructuredOutput, TokenUsage,
};
pub use registry::{ProviderRegistry, DEFAULT_MODEL_SPEC};
