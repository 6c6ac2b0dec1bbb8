use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during LLM operations
#[derive(Debug, Error)]
pub enum LLMError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Rate limit exceeded, retry after {0}s")]
    RateLimitExceeded(u64),

    #[error("Request timeout")]
    Timeout,

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Text-generation backend: text in, text out, or an error.
///
/// Used twice per successful pipeline run (command generation and
/// summarization). Implementations must not retry on their own.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Complete a single exchange given a system instruction and user text
    async fn complete(&self, system: &str, user: &str) -> Result<String, LLMError>;
}
