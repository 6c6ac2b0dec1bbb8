use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

use crate::cluster::{ExecutionFault, ExecutionResult};
use crate::error_translation::ErrorTranslator;
use crate::llm::client::{LLMClient, LLMError};
use crate::security::CriticRejection;

const SYSTEM_INSTRUCTION: &str = "You are a helpful assistant summarizing the output of a \
Kubernetes command for an operator. Give a clear, concise, human-readable summary. If the output \
is a log, present its key information. If the command failed, explain the failure in plain words. \
Do not suggest or include any commands.";

#[derive(Debug, Error)]
pub enum SummarizationError {
    #[error("LLM error: {0}")]
    Backend(#[from] LLMError),

    #[error("Summarization timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("LLM returned an empty summary")]
    EmptySummary,
}

/// What the summarizer is asked to describe
#[derive(Debug, Clone, Copy)]
pub enum SummaryInput<'a> {
    Execution(&'a ExecutionResult),
    Rejection(&'a CriticRejection),
}

/// Turns command output (or a rejection) into text for the operator
pub struct Summarizer {
    client: Arc<dyn LLMClient>,
    timeout: Duration,
}

impl Summarizer {
    pub fn new(client: Arc<dyn LLMClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Summarize an execution result or a rejection.
    ///
    /// Only results that carry real command output go to the backend;
    /// rejections and launch/timeout faults are described locally.
    pub async fn summarize(&self, input: SummaryInput<'_>) -> Result<String, SummarizationError> {
        match input {
            SummaryInput::Rejection(rejection) => Ok(rejection_summary(rejection)),
            SummaryInput::Execution(result) => match &result.fault {
                Some(fault) => Ok(fault_summary(result, fault)),
                None => self.summarize_output(result).await,
            },
        }
    }

    async fn summarize_output(&self, result: &ExecutionResult) -> Result<String, SummarizationError> {
        let user = format!(
            "Command: {}\nExit code: {}\n{}\nstdout:\n{}\nstderr:\n{}",
            result.command,
            result.exit_code,
            if result.truncated {
                "Note: output was truncated.\n"
            } else {
                ""
            },
            result.stdout,
            result.stderr
        );

        let response = timeout(self.timeout, self.client.complete(SYSTEM_INSTRUCTION, &user))
            .await
            .map_err(|_| SummarizationError::Timeout(self.timeout))??;

        let summary = sanitize(response.trim());
        if summary.trim().is_empty() {
            return Err(SummarizationError::EmptySummary);
        }

        Ok(with_truncation_notice(summary, result))
    }
}

/// Deterministic text for a rejected candidate
pub fn rejection_summary(rejection: &CriticRejection) -> String {
    format!("Execution was halted for safety.\nReason: {}", rejection)
}

/// Deterministic text for a run that never produced regular output
pub fn fault_summary(result: &ExecutionResult, fault: &ExecutionFault) -> String {
    format!(
        "The command failed to execute.\nCommand: {}\nDetails: {}",
        sanitize(&result.command),
        fault
    )
}

/// Bounded raw output, used when the backend cannot produce a summary
pub fn raw_fallback(result: &ExecutionResult) -> String {
    if let Some(fault) = &result.fault {
        return fault_summary(result, fault);
    }

    let mut text = format!("Command: {}\nExit code: {}\n", result.command, result.exit_code);
    if !result.stdout.is_empty() {
        text.push_str(&result.stdout);
        if !result.stdout.ends_with('\n') {
            text.push('\n');
        }
    }
    if !result.stderr.is_empty() {
        text.push_str("stderr:\n");
        text.push_str(&result.stderr);
        if !result.stderr.ends_with('\n') {
            text.push('\n');
        }
    }
    if !result.success() && !result.stderr.is_empty() {
        let friendly = ErrorTranslator::translate_cli_error(&result.stderr);
        if let Some(suggestion) = friendly.suggestion {
            text.push_str(&format!("Hint: {} {}\n", friendly.simple_message, suggestion));
        }
    }

    with_truncation_notice(sanitize(text.trim_end()), result)
}

fn with_truncation_notice(mut text: String, result: &ExecutionResult) -> String {
    if result.truncated {
        text.push_str(&format!(
            "\n\n[output truncated at {} bytes]",
            result.output_limit
        ));
    }
    text
}

/// Remove control characters other than newline and tab
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct MockLLMClient {
        response: Result<String, ()>,
    }

    #[async_trait]
    impl LLMClient for MockLLMClient {
        async fn complete(&self, _system: &str, user: &str) -> Result<String, LLMError> {
            assert!(user.contains("Command: kubectl get pods"));
            self.response
                .clone()
                .map_err(|_| LLMError::ApiError("unavailable".to_string()))
        }
    }

    fn summarizer(response: Result<&str, ()>) -> Summarizer {
        Summarizer::new(
            Arc::new(MockLLMClient {
                response: response.map(str::to_string),
            }),
            Duration::from_secs(1),
        )
    }

    fn result(stdout: &str, truncated: bool) -> ExecutionResult {
        ExecutionResult {
            command: "kubectl get pods".to_string(),
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: 0,
            truncated,
            output_limit: 4096,
            fault: None,
            elapsed: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_summarize_output() {
        let s = summarizer(Ok("There are 3 running pods."));
        let r = result("{\"items\": []}", false);
        let summary = s.summarize(SummaryInput::Execution(&r)).await.unwrap();
        assert_eq!(summary, "There are 3 running pods.");
    }

    #[tokio::test]
    async fn test_summary_signals_truncation() {
        let s = summarizer(Ok("Lots of pods."));
        let r = result("...", true);
        let summary = s.summarize(SummaryInput::Execution(&r)).await.unwrap();
        assert!(summary.starts_with("Lots of pods."));
        assert!(summary.contains("[output truncated at 4096 bytes]"));
    }

    #[tokio::test]
    async fn test_summary_strips_control_characters() {
        let s = summarizer(Ok("All \x1b[31mgood\x1b[0m\x07 here"));
        let r = result("{}", false);
        let summary = s.summarize(SummaryInput::Execution(&r)).await.unwrap();
        assert!(!summary.chars().any(|c| c.is_control()));
        assert!(summary.contains("good"));
    }

    #[tokio::test]
    async fn test_backend_failure_is_an_error() {
        let s = summarizer(Err(()));
        let r = result("{}", false);
        let err = s.summarize(SummaryInput::Execution(&r)).await.unwrap_err();
        assert!(matches!(err, SummarizationError::Backend(_)));
    }

    #[tokio::test]
    async fn test_empty_summary_is_an_error() {
        let s = summarizer(Ok("  \n"));
        let r = result("{}", false);
        let err = s.summarize(SummaryInput::Execution(&r)).await.unwrap_err();
        assert!(matches!(err, SummarizationError::EmptySummary));
    }

    #[tokio::test]
    async fn test_rejection_does_not_call_backend() {
        let s = summarizer(Err(()));
        let rejection = CriticRejection::ForbiddenVerb("delete".to_string());
        let summary = s.summarize(SummaryInput::Rejection(&rejection)).await.unwrap();
        assert_eq!(
            summary,
            "Execution was halted for safety.\nReason: forbidden verb 'delete'"
        );
    }

    #[tokio::test]
    async fn test_fault_does_not_call_backend() {
        let s = summarizer(Err(()));
        let mut r = result("", false);
        r.exit_code = crate::cluster::TIMEOUT_EXIT_CODE;
        r.fault = Some(ExecutionFault::Timeout {
            limit: Duration::from_secs(30),
        });
        let summary = s.summarize(SummaryInput::Execution(&r)).await.unwrap();
        assert!(summary.starts_with("The command failed to execute."));
        assert!(summary.contains("time limit of 30s"));
    }

    #[test]
    fn test_raw_fallback() {
        let mut r = result("pod-a Running\npod-b Running", true);
        r.stderr = "warning: \x1b[1mdeprecated\x1b[0m".to_string();
        let text = raw_fallback(&r);

        assert!(text.starts_with("Command: kubectl get pods\nExit code: 0\n"));
        assert!(text.contains("pod-a Running\npod-b Running\n"));
        assert!(text.contains("stderr:\nwarning: [1mdeprecated[0m"));
        assert!(text.ends_with("[output truncated at 4096 bytes]"));
    }

    #[test]
    fn test_raw_fallback_explains_known_failure() {
        let mut r = result("", false);
        r.exit_code = 1;
        r.stderr = "Error from server (NotFound): pods \"web\" not found".to_string();
        let text = raw_fallback(&r);

        assert!(text.contains("Exit code: 1"));
        assert!(text.contains("Hint: The requested resource does not exist."));
    }

    #[test]
    fn test_sanitize_keeps_newlines_and_tabs() {
        assert_eq!(sanitize("a\tb\nc\rd\x00e"), "a\tb\ncde");
    }
}
