use crate::config::LLMConfig;
use crate::llm::client::{LLMClient, LLMError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// Rate limiting: 10 requests per minute
const RATE_LIMIT_REQUESTS: usize = 10;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

pub struct AnthropicClient {
    api_key: String,
    api_url: String,
    model: String,
    max_tokens: u32,
    http_client: Client,
    // Rate limiting: track request timestamps
    request_times: Mutex<Vec<Instant>>,
}

impl AnthropicClient {
    pub fn new(api_key: String) -> Result<Self, LLMError> {
        Self::build(
            api_key,
            ANTHROPIC_API_URL.to_string(),
            DEFAULT_MODEL.to_string(),
            DEFAULT_MAX_TOKENS,
            DEFAULT_TIMEOUT,
        )
    }

    pub fn from_config(config: &LLMConfig, api_key: String) -> Result<Self, LLMError> {
        Self::build(
            api_key,
            config.api_url.clone(),
            config.model.clone(),
            config.max_tokens,
            Duration::from_secs(config.timeout_seconds),
        )
    }

    fn build(
        api_key: String,
        api_url: String,
        model: String,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, LLMError> {
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            api_key,
            api_url,
            model,
            max_tokens,
            http_client,
            request_times: Mutex::new(Vec::new()),
        })
    }

    /// Check and enforce rate limiting
    /// Returns Ok(()) if request is allowed, Err with wait time if rate limited
    fn check_rate_limit(&self) -> Result<(), LLMError> {
        let now = Instant::now();
        let mut times = self
            .request_times
            .lock()
            .map_err(|_| LLMError::ApiError("rate limiter state poisoned".to_string()))?;

        // Remove requests older than the rate limit window
        times.retain(|&time| now.duration_since(time) < RATE_LIMIT_WINDOW);

        if times.len() >= RATE_LIMIT_REQUESTS {
            let oldest = times[0];
            let wait_time = RATE_LIMIT_WINDOW.saturating_sub(now.duration_since(oldest));
            return Err(LLMError::RateLimitExceeded(wait_time.as_secs()));
        }

        times.push(now);
        Ok(())
    }

    fn request_body(&self, system: &str, user: &str) -> AnthropicRequest {
        AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: 0.1,
            system: system.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: user.to_string(),
            }],
        }
    }
}

#[async_trait]
impl LLMClient for AnthropicClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LLMError> {
        self.check_rate_limit()?;

        let request_body = self.request_body(system, user);

        let response = self
            .http_client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LLMError::Timeout
                } else {
                    LLMError::NetworkError(e)
                }
            })?;

        let status = response.status();

        if status.is_success() {
            let api_response: AnthropicResponse = response.json().await?;

            api_response
                .content
                .into_iter()
                .map(|block| block.text)
                .find(|text| !text.is_empty())
                .ok_or_else(|| LLMError::InvalidResponse("No content in response".to_string()))
        } else if status.as_u16() == 429 {
            // No retry here; the caller decides what to do
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            Err(LLMError::RateLimitExceeded(retry_after))
        } else {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            Err(LLMError::ApiError(format!(
                "API returned status {}: {}",
                status, error_text
            )))
        }
    }
}
