use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{ChatRequest, ChatResponse, CompletionOptions, ModelInfo};
use super::LanguageModel;
use crate::config::{LlmConfig, RequestConfig};
use crate::error::{LlmError, LlmResult};

/// Client for OpenAI-compatible chat-completion APIs (DeepSeek, OpenAI)
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    provider: String,
    request_config: RequestConfig,
}

impl ChatClient {
    /// Create a new chat client
    pub fn new(config: &LlmConfig, request_config: RequestConfig) -> LlmResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(LlmError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            provider: config.provider.to_string(),
            request_config,
        })
    }

    /// Send a chat request, retrying with exponential backoff
    pub async fn chat(&self, request: ChatRequest) -> LlmResult<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    model = %self.model,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying chat completion request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, &request).await {
                Ok(response) => {
                    info!(
                        model = %self.model,
                        latency_ms = start.elapsed().as_millis(),
                        "Chat completion succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    error!(
                        model = %self.model,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Chat completion failed"
                    );
                    let retryable = is_retryable(&e);
                    last_error = Some(e);
                    retries += 1;
                    if !retryable {
                        break;
                    }
                }
            }
        }

        match last_error {
            Some(e) if !is_retryable(&e) => Err(e),
            other => Err(LlmError::Unavailable {
                message: other
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "Unknown error".to_string()),
                retries: retries.saturating_sub(1),
            }),
        }
    }

    /// Execute a single request (internal)
    async fn execute_request(&self, url: &str, request: &ChatRequest) -> LlmResult<ChatResponse> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Calling chat completion endpoint"
        );

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    LlmError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| LlmError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Client errors other than rate limiting will not succeed on retry.
fn is_retryable(err: &LlmError) -> bool {
    match err {
        LlmError::Api { status, .. } => *status == 429 || *status >= 500,
        LlmError::InvalidResponse { .. } => false,
        _ => true,
    }
}

#[async_trait]
impl LanguageModel for ChatClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &CompletionOptions,
    ) -> LlmResult<String> {
        let request = ChatRequest::new(&self.model, system_prompt, user_prompt, options);
        let response = self.chat(request).await?;

        match response.first_content() {
            Some(content) if !content.trim().is_empty() => Ok(content.to_string()),
            _ => Err(LlmError::EmptyResponse),
        }
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: self.provider.clone(),
            model: self.model.clone(),
            base_url: self.base_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmProvider;

    fn test_config() -> LlmConfig {
        LlmConfig {
            provider: LlmProvider::DeepSeek,
            api_key: "test_key".to_string(),
            base_url: "https://api.deepseek.com/".to_string(),
            model: "deepseek-chat".to_string(),
            temperature: 0.7,
            max_tokens: 4000,
        }
    }

    #[test]
    fn test_client_creation() {
        let client = ChatClient::new(&test_config(), RequestConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ChatClient::new(&test_config(), RequestConfig::default()).unwrap();
        assert_eq!(client.base_url(), "https://api.deepseek.com");
    }

    #[test]
    fn test_model_info() {
        let client = ChatClient::new(&test_config(), RequestConfig::default()).unwrap();
        let info = client.model_info();
        assert_eq!(info.provider, "deepseek");
        assert_eq!(info.model, "deepseek-chat");
        assert_eq!(info.base_url, "https://api.deepseek.com");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable(&LlmError::Api {
            status: 503,
            message: String::new()
        }));
        assert!(is_retryable(&LlmError::Api {
            status: 429,
            message: String::new()
        }));
        assert!(!is_retryable(&LlmError::Api {
            status: 401,
            message: String::new()
        }));
        assert!(is_retryable(&LlmError::Timeout { timeout_ms: 10 }));
    }
}
