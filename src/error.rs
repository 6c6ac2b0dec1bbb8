use std::io;
use thiserror::Error;

// Import module-level errors for AppError
use crate::config::settings::ConfigError;
use crate::llm::client::LLMError;
use crate::llm::generator::GenerationError;
use crate::llm::summarizer::SummarizationError;
use crate::policy::PolicyLoadError;

/// Top-level application error that wraps all module-specific errors
///
/// Used by the binary and by callers that drive several components at once.
/// Per-request pipeline faults never surface here; they become responses.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Policy error: {0}")]
    Policy(#[from] PolicyLoadError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LLMError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Summarization error: {0}")]
    Summarization(#[from] SummarizationError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for application-level operations
pub type AppResult<T> = std::result::Result<T, AppError>;
