use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::audit::AuditLogger;
use crate::cluster::{ClusterExecutor, ExecutionResult};
use crate::config::Config;
use crate::error_translation::ErrorTranslator;
use crate::llm::summarizer::{self, SummaryInput};
use crate::llm::{CommandGenerator, LLMClient, Summarizer};
use crate::pipeline::state::{FailureKind, PipelineState, StateTrace};
use crate::policy::Policy;
use crate::security::{CandidateCommand, Critic, Verdict};

/// Inbound request: one operator prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub user_prompt: String,
}

/// Outbound response for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResponse {
    pub summary: String,
    pub approved: bool,
    pub rejection_reason: Option<String>,
}

/// Everything one run produced, for callers that need more than the response
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub response: PipelineResponse,
    pub trace: StateTrace,
    pub candidate: Option<CandidateCommand>,
    pub verdict: Option<Verdict>,
    pub execution: Option<ExecutionResult>,
    /// Set when the summarizer failed and the raw output was returned instead
    pub used_raw_fallback: bool,
}

impl PipelineRun {
    pub fn final_state(&self) -> PipelineState {
        self.trace.current()
    }
}

/// Generate -> validate -> execute -> summarize.
///
/// Holds no per-request state, so one instance serves concurrent runs; the
/// only shared data is the immutable policy.
pub struct Pipeline {
    generator: CommandGenerator,
    critic: Critic,
    executor: ClusterExecutor,
    summarizer: Summarizer,
    audit: Option<AuditLogger>,
}

impl Pipeline {
    pub fn new(
        policy: Arc<Policy>,
        client: Arc<dyn LLMClient>,
        executor: ClusterExecutor,
        llm_timeout: Duration,
    ) -> Self {
        Self {
            generator: CommandGenerator::new(client.clone(), policy.binary(), llm_timeout),
            critic: Critic::new(policy),
            executor,
            summarizer: Summarizer::new(client, llm_timeout),
            audit: None,
        }
    }

    pub fn from_config(policy: Arc<Policy>, client: Arc<dyn LLMClient>, config: &Config) -> Self {
        Self::new(
            policy,
            client,
            ClusterExecutor::from_config(&config.executor),
            Duration::from_secs(config.llm.timeout_seconds),
        )
    }

    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Serve one request
    pub async fn handle(&self, request: &PipelineRequest) -> PipelineResponse {
        self.run(&request.user_prompt).await.response
    }

    /// Run the full pipeline for one prompt
    pub async fn run(&self, prompt: &str) -> PipelineRun {
        let mut trace = StateTrace::start();

        let candidate = match self.generator.generate(prompt).await {
            Ok(candidate) => candidate,
            Err(e) => {
                tracing::warn!(error = %e, "command generation failed");
                trace.advance(PipelineState::Failed(FailureKind::from(&e)));
                let friendly = ErrorTranslator::translate_generation_error(&e);
                return PipelineRun {
                    response: PipelineResponse {
                        summary: friendly.to_string(),
                        approved: false,
                        rejection_reason: None,
                    },
                    trace,
                    candidate: None,
                    verdict: None,
                    execution: None,
                    used_raw_fallback: false,
                };
            }
        };

        trace.advance(PipelineState::Validating);
        let verdict = self.critic.evaluate(&candidate);

        let approved = match verdict.clone() {
            Verdict::Approved(approved) => approved,
            Verdict::Rejected(rejection) => {
                trace.advance(PipelineState::Rejected);
                self.audit_rejection(prompt, &candidate, rejection.rule(), &verdict.reason());

                let summary = summarizer::rejection_summary(&rejection);
                return PipelineRun {
                    response: PipelineResponse {
                        summary,
                        approved: false,
                        rejection_reason: Some(verdict.reason()),
                    },
                    trace,
                    candidate: Some(candidate),
                    verdict: Some(verdict),
                    execution: None,
                    used_raw_fallback: false,
                };
            }
        };

        trace.advance(PipelineState::Executing);
        let execution = self.executor.execute(&approved).await;
        self.audit_execution(&execution);

        trace.advance(PipelineState::Summarizing);
        let (summary, used_raw_fallback) =
            match self.summarizer.summarize(SummaryInput::Execution(&execution)).await {
                Ok(summary) => (summary, false),
                Err(e) => {
                    tracing::warn!(error = %e, "summarization failed, returning raw output");
                    (summarizer::raw_fallback(&execution), true)
                }
            };

        PipelineRun {
            response: PipelineResponse {
                summary,
                approved: true,
                rejection_reason: None,
            },
            trace,
            candidate: Some(candidate),
            verdict: Some(verdict),
            execution: Some(execution),
            used_raw_fallback,
        }
    }

    fn audit_rejection(
        &self,
        prompt: &str,
        candidate: &CandidateCommand,
        rule: &str,
        reason: &str,
    ) {
        if let Some(audit) = &self.audit
            && let Err(e) = audit.log_rejection(prompt, candidate.as_str(), rule, reason)
        {
            tracing::warn!(error = %e, "failed to write audit log");
        }
    }

    fn audit_execution(&self, execution: &ExecutionResult) {
        if let Some(audit) = &self.audit
            && let Err(e) = audit.log_execution(execution)
        {
            tracing::warn!(error = %e, "failed to write audit log");
        }
    }
}
