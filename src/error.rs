use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Database unavailable: {0}")]
    ConnectionUnavailable(String),

    #[error("Query execution failed: {reason} (query: {query}...)")]
    QueryExecutionFailed { reason: String, query: String },

    #[error("SQL synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("{stage} did not finish within {after:?}")]
    Timeout { stage: &'static str, after: Duration },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, ChatError>;

/// Failure reported by a [`crate::llm::TextGenerator`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    #[error("API key not configured")]
    CredentialsMissing,

    #[error("model name not specified")]
    ModelUnspecified,

    #[error("model returned no content ({})", .reason.as_deref().unwrap_or("no reason given"))]
    EmptyResponse { reason: Option<String> },

    #[error("completion request failed: {0}")]
    Failed(String),
}

impl CompletionError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::CredentialsMissing | Self::ModelUnspecified)
    }
}

/// Failure caught at the data access boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayError {
    #[error("Database unavailable: {0}")]
    ConnectionUnavailable(String),

    #[error("SQLite query error: {reason} (query: {query}...)")]
    QueryExecutionFailed { reason: String, query: String },
}

impl GatewayError {
    /// Max characters of the statement kept for diagnostics.
    pub const QUERY_EXCERPT_CHARS: usize = 100;

    pub fn query_failed(reason: impl ToString, query: &str) -> Self {
        Self::QueryExecutionFailed {
            reason: reason.to_string(),
            query: query.chars().take(Self::QUERY_EXCERPT_CHARS).collect(),
        }
    }
}

impl From<GatewayError> for ChatError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::ConnectionUnavailable(msg) => ChatError::ConnectionUnavailable(msg),
            GatewayError::QueryExecutionFailed { reason, query } => {
                ChatError::QueryExecutionFailed { reason, query }
            }
        }
    }
}

impl From<CompletionError> for ChatError {
    fn from(err: CompletionError) -> Self {
        if err.is_configuration() {
            ChatError::ConfigurationMissing(err.to_string())
        } else {
            ChatError::SynthesisFailed(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_excerpt_is_truncated() {
        let long = "SELECT ".repeat(40);
        match GatewayError::query_failed("no such table: bills", &long) {
            GatewayError::QueryExecutionFailed { query, .. } => {
                assert_eq!(query.chars().count(), GatewayError::QUERY_EXCERPT_CHARS);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_completion_errors_map_to_taxonomy() {
        let err: ChatError = CompletionError::CredentialsMissing.into();
        assert!(matches!(err, ChatError::ConfigurationMissing(_)));

        let err: ChatError = CompletionError::EmptyResponse { reason: Some("SAFETY".into()) }.into();
        match err {
            ChatError::SynthesisFailed(msg) => assert!(msg.contains("SAFETY")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
