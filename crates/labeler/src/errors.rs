//! Error types for the labeler crate.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while deciding and reconciling labels.
#[derive(Error, Debug)]
pub enum LabelerError {
    // Configuration errors
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    #[error("Invalid label name '{name}': {reason}")]
    InvalidLabelName { name: String, reason: String },

    #[error("Duplicate label '{name}' in configuration")]
    DuplicateLabel { name: String },

    // Trigger/event errors
    #[error("Could not resolve event target: {reason}")]
    Event { reason: String },

    // Decision errors
    #[error("Classifier output rejected: {reason}")]
    Decision { reason: String },

    // Transport errors
    #[error("GitHub API error: {status} - {message}")]
    GitHub { status: u16, message: String },

    #[error("Rate limit exceeded, reset in {reset_in:?}")]
    RateLimited { reset_in: Duration },

    #[error("AI error: {0}")]
    Ai(String),

    #[error("AI provider not configured: {provider}")]
    ProviderNotConfigured { provider: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LabelerError {
    /// Whether re-running the same step may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Decision { .. } | Self::RateLimited { .. } | Self::Http(_) => true,
            Self::GitHub { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether this error was caused by bad configuration.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::InvalidLabelName { .. } | Self::DuplicateLabel { .. }
        )
    }

    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    pub(crate) fn decision(reason: impl Into<String>) -> Self {
        Self::Decision {
            reason: reason.into(),
        }
    }
}

/// Result alias used across the crate.
pub type LabelerResult<T> = Result<T, LabelerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(LabelerError::decision("not json").is_retryable());
        assert!(LabelerError::GitHub {
            status: 502,
            message: "bad gateway".to_string()
        }
        .is_retryable());
        assert!(!LabelerError::GitHub {
            status: 422,
            message: "validation failed".to_string()
        }
        .is_retryable());
        assert!(!LabelerError::config("bad").is_retryable());
    }

    #[test]
    fn test_config_error_classification() {
        assert!(LabelerError::DuplicateLabel {
            name: "bug".to_string()
        }
        .is_config_error());
        assert!(!LabelerError::decision("x").is_config_error());
    }
}
