use std::fmt;

use crate::error::AppError;
use crate::llm::{GenerationError, LLMError};

#[derive(Debug, Clone)]
pub struct UserFriendlyError {
    pub simple_message: String,
    pub suggestion: Option<String>,
    pub raw_error: String,
}

impl fmt::Display for UserFriendlyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.simple_message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, "\nSuggestion: {}", suggestion)?;
        }
        write!(f, "\nDetails: {}", self.raw_error)
    }
}

pub struct ErrorTranslator;

impl ErrorTranslator {
    /// Translate an AppError into a user-friendly error message
    pub fn translate_app_error(error: &AppError) -> UserFriendlyError {
        match error {
            AppError::Policy(policy_err) => UserFriendlyError {
                simple_message: "The safety policy could not be loaded; no requests will be served."
                    .to_string(),
                suggestion: Some(
                    "Fix the policy file, or create the reference one with --init-policy".to_string(),
                ),
                raw_error: policy_err.to_string(),
            },
            AppError::Config(config_err) => UserFriendlyError {
                simple_message: "Configuration error occurred.".to_string(),
                suggestion: Some("Check your config file at ~/.config/kubetalk/config.toml".to_string()),
                raw_error: config_err.to_string(),
            },
            AppError::Llm(llm_err) => Self::translate_llm_error(llm_err),
            AppError::Generation(gen_err) => Self::translate_generation_error(gen_err),
            AppError::Summarization(sum_err) => UserFriendlyError {
                simple_message: "The command output could not be summarized.".to_string(),
                suggestion: None,
                raw_error: sum_err.to_string(),
            },
            AppError::Io(io_err) => UserFriendlyError {
                simple_message: "I/O error occurred.".to_string(),
                suggestion: Some("Check file permissions and disk space".to_string()),
                raw_error: io_err.to_string(),
            },
        }
    }

    /// Translate a command generation failure
    pub fn translate_generation_error(error: &GenerationError) -> UserFriendlyError {
        match error {
            GenerationError::Backend(llm_err) => {
                let mut friendly = Self::translate_llm_error(llm_err);
                friendly.raw_error = error.to_string();
                friendly
            }
            GenerationError::Timeout(_) => UserFriendlyError {
                simple_message: "The language model did not answer in time.".to_string(),
                suggestion: Some("Try the request again".to_string()),
                raw_error: error.to_string(),
            },
            GenerationError::EmptyOutput => UserFriendlyError {
                simple_message: "Your request could not be translated into a command.".to_string(),
                suggestion: Some("Try rephrasing it as an inspection request, e.g. 'list pods in default'".to_string()),
                raw_error: error.to_string(),
            },
        }
    }

    fn translate_llm_error(error: &LLMError) -> UserFriendlyError {
        let raw_error = error.to_string();
        let (simple_message, suggestion) = match error {
            LLMError::RateLimitExceeded(secs) => (
                "Too many requests to the language model.".to_string(),
                Some(format!("Wait {}s and try again", secs)),
            ),
            LLMError::Timeout => (
                "The language model did not answer in time.".to_string(),
                Some("Try the request again".to_string()),
            ),
            LLMError::ApiError(text) if text.contains("401") || text.contains("403") => (
                "The language model rejected the API key.".to_string(),
                Some("Check the ANTHROPIC_API_KEY environment variable".to_string()),
            ),
            _ => (
                "Error communicating with the language model.".to_string(),
                Some("Check your API key and network connection".to_string()),
            ),
        };

        UserFriendlyError {
            simple_message,
            suggestion,
            raw_error,
        }
    }

    /// Explain common cluster CLI failures found in stderr
    pub fn translate_cli_error(stderr: &str) -> UserFriendlyError {
        let (simple_message, suggestion) = Self::match_error_patterns(stderr);

        UserFriendlyError {
            simple_message,
            suggestion,
            raw_error: stderr.to_string(),
        }
    }

    fn match_error_patterns(error_text: &str) -> (String, Option<String>) {
        let lower = error_text.to_lowercase();

        // Resource missing
        if lower.contains("notfound") || lower.contains("not found") {
            return (
                "The requested resource does not exist.".to_string(),
                Some("Check the resource name and namespace (-n <namespace>)".to_string()),
            );
        }

        // RBAC
        if lower.contains("forbidden") && lower.contains("cannot") {
            return (
                "The cluster credentials do not allow this request.".to_string(),
                Some("Ask for read access to this resource type".to_string()),
            );
        }

        // Cluster unreachable
        if lower.contains("connection refused")
            || lower.contains("unable to connect")
            || lower.contains("no such host")
        {
            return (
                "The cluster API server could not be reached.".to_string(),
                Some("Check the current kubeconfig context and network access".to_string()),
            );
        }

        // Credentials
        if lower.contains("unauthorized") || lower.contains("must be logged in") {
            return (
                "The cluster rejected the credentials.".to_string(),
                Some("Refresh your cluster login".to_string()),
            );
        }

        // Unknown resource type
        if lower.contains("the server doesn't have a resource type") {
            return (
                "The cluster does not know this resource type.".to_string(),
                Some("List available types with: kubectl api-resources".to_string()),
            );
        }

        // Output format unsupported
        if lower.contains("unknown shorthand flag") || lower.contains("unknown flag") {
            return (
                "The command used a flag this verb does not support.".to_string(),
                None,
            );
        }

        // Default: return the error as-is with no suggestion
        (error_text.trim().to_string(), None)
    }
}
