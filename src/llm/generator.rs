use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

use crate::llm::client::{LLMClient, LLMError};
use crate::security::CandidateCommand;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("LLM error: {0}")]
    Backend(#[from] LLMError),

    #[error("Command generation timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("LLM returned no command")]
    EmptyOutput,
}

/// Turns an operator request into one candidate command.
///
/// The instruction asks for a single line naming the cluster binary, but
/// nothing here relies on the model having complied; that is the critic's job.
pub struct CommandGenerator {
    client: Arc<dyn LLMClient>,
    binary: String,
    timeout: Duration,
}

impl CommandGenerator {
    pub fn new(client: Arc<dyn LLMClient>, binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            binary: binary.into(),
            timeout,
        }
    }

    pub async fn generate(&self, prompt: &str) -> Result<CandidateCommand, GenerationError> {
        let system = self.system_instruction();
        let user = format!("Request: {}", prompt);

        let response = timeout(self.timeout, self.client.complete(&system, &user))
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout))??;

        let command = clean_response(&response);
        if command.is_empty() {
            return Err(GenerationError::EmptyOutput);
        }

        tracing::debug!(command = %command.escape_debug(), "generated candidate");
        Ok(CandidateCommand::new(command))
    }

    fn system_instruction(&self) -> String {
        format!(
            "You are an experienced Kubernetes administrator. Translate the operator's request \
             into exactly one read-only `{binary}` command.

RULES:
- Respond with ONLY the command, on a single line
- The command MUST start with `{binary}`
- For verbs that support structured output (like get and describe), add `-o json`
- For verbs that do not (like logs), do NOT add `-o json`
- No explanations, no preamble, no markdown, no code fences
- Never chain commands or use shell operators

Example good response: {binary} get pods -n default -o json",
            binary = self.binary
        )
    }
}

/// Strip surrounding whitespace and a markdown code fence.
///
/// Additional lines are kept on purpose: a multi-line answer must reach the
/// critic intact and be rejected there.
pub fn clean_response(response: &str) -> String {
    let mut cleaned = response.trim();

    if let Some(rest) = cleaned.strip_prefix("```") {
        // Drop the language tag line (```bash) if there is one
        cleaned = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest,
        };
        if let Some(closing) = cleaned.rfind("```") {
            cleaned = &cleaned[..closing];
        }
        cleaned = cleaned.trim();
    } else if cleaned.len() >= 2 && cleaned.starts_with('`') && cleaned.ends_with('`') {
        // Inline code span
        cleaned = cleaned[1..cleaned.len() - 1].trim();
    }

    cleaned.to_string()
}
