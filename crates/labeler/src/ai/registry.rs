//! Provider Registry - resolves model specs to provider instances.
//!
//! Model specs are either `provider/model` (e.g. `openai/gpt-4o-mini`) or a
//! bare model name, which is matched to the provider that serves it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{LabelerError, LabelerResult};

use super::anthropic::AnthropicProvider;
use super::openai::OpenAIProvider;
use super::provider::AIProvider;

/// Default model spec when none is configured.
pub const DEFAULT_MODEL_SPEC: &str = "openai/gpt-4o-mini";

/// Registry of available model providers.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn AIProvider>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in providers, configured from the environment.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(OpenAIProvider::from_env()));
        registry.register(Arc::new(AnthropicProvider::from_env()));
        registry
    }

    /// Register a provider under its own name.
    pub fn register(&mut self, provider: Arc<dyn AIProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    /// Get a provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn AIProvider>> {
        self.providers.get(name).cloned()
    }

    /// Get a provider that supports a specific model.
    pub fn get_for_model(&self, model: &str) -> Option<Arc<dyn AIProvider>> {
        let mut names: Vec<&String> = self.providers.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| &self.providers[name])
            .find(|p| p.supports_model(model))
            .cloned()
    }

    /// All registered provider names, sorted.
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve a model spec to a configured provider and the model name to send.
    pub fn resolve(&self, spec: &str) -> LabelerResult<(Arc<dyn AIProvider>, String)> {
        let spec = spec.trim();
        let (provider, model) = match spec.split_once('/') {
            Some((provider_name, model)) if !provider_name.is_empty() && !model.is_empty() => {
                let provider = self.get(provider_name).ok_or_else(|| {
                    LabelerError::config(format!(
                        "unknown model provider '{provider_name}' (available: {})",
                        self.provider_names().join(", ")
                    ))
                })?;
                (provider, model)
            }
            Some(_) => {
                return Err(LabelerError::config(format!("invalid model spec '{spec}'")));
            }
            None => {
                let provider = self.get_for_model(spec).ok_or_else(|| {
                    LabelerError::config(format!(
                        "no provider serves model '{spec}'; use the provider/model form"
                    ))
                })?;
                (provider, spec)
            }
        };

        if !provider.is_configured() {
            return Err(LabelerError::ProviderNotConfigured {
                provider: format!("{} ({} not set)", provider.name(), provider.api_key_env_var()),
            });
        }

        Ok((provider, model.to_string()))
    }
}
