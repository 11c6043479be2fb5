//! Anthropic Messages API client with automatic retry for transient errors.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::error::{LlmError, RetryConfig};
use super::{GenerateRequest, GenerateResponse, StopReason, TextBackend, TokenUsage};

pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Messages API client with automatic retry for transient errors.
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
    default_max_tokens: u32,
    retry_config: RetryConfig,
}

impl AnthropicClient {
    /// Create a new client with default retry configuration.
    pub fn new(api_key: String, model: String, default_max_tokens: u32) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_url: ANTHROPIC_API_URL.to_string(),
            model,
            default_max_tokens,
            retry_config: RetryConfig::default(),
        }
    }

    /// Override the endpoint (proxies, test servers).
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Override the retry configuration.
    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Model identifier sent with every request.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Parse Retry-After header if present (seconds form only).
    fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
        headers
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    /// Translate a generic request into the Messages API wire format.
    fn build_body(&self, request: &GenerateRequest) -> MessagesRequest {
        let content = request
            .segments
            .iter()
            .map(|segment| RequestBlock {
                block_type: "text",
                text: segment.text.clone(),
                cache_control: segment.cacheable.then(CacheControl::ephemeral),
            })
            .collect();

        let (tools, tool_choice) = match &request.response_schema {
            Some(schema) => (
                Some(vec![ToolSpec {
                    name: schema.name.clone(),
                    description: schema.description.clone(),
                    input_schema: schema.schema.clone(),
                }]),
                Some(ToolChoice {
                    choice_type: "tool",
                    name: schema.name.clone(),
                }),
            ),
            None => (None, None),
        };

        MessagesRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens.unwrap_or(self.default_max_tokens),
            system: request.system_prompt.clone(),
            messages: vec![RequestMessage {
                role: "user",
                content,
            }],
            tools,
            tool_choice,
        }
    }

    /// Extract text, structured payload and stop reason from a response body.
    fn parse_response(parsed: MessagesResponse) -> GenerateResponse {
        let mut text = String::new();
        let mut structured = None;

        for block in parsed.content {
            match block {
                ResponseBlock::Text { text: part } => text.push_str(&part),
                ResponseBlock::ToolUse { input, .. } => {
                    if structured.is_none() {
                        structured = Some(input);
                    }
                }
                ResponseBlock::Other => {}
            }
        }

        GenerateResponse {
            text,
            structured,
            stop_reason: parsed.stop_reason,
            usage: parsed.usage,
        }
    }

    /// Pull the human-readable message out of an error body, if it has one.
    fn error_message(body: &str) -> String {
        serde_json::from_str::<ErrorEnvelope>(body)
            .map(|e| format!("{}: {}", e.error.error_type, e.error.message))
            .unwrap_or_else(|_| body.to_string())
    }

    /// Execute a single request without retry.
    async fn execute_request(&self, body: &MessagesRequest) -> Result<GenerateResponse, LlmError> {
        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::network_error(format!("Request timeout: {}", e))
                } else if e.is_connect() {
                    LlmError::network_error(format!("Connection failed: {}", e))
                } else {
                    LlmError::network_error(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        let retry_after = Self::parse_retry_after(response.headers());
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::network_error(format!("Failed to read body: {}", e)))?;

        if !status.is_success() {
            return Err(LlmError::from_status(
                status.as_u16(),
                Self::error_message(&text),
                retry_after,
            ));
        }

        let parsed: MessagesResponse = serde_json::from_str(&text).map_err(|e| {
            LlmError::parse_error(format!("Failed to parse response: {}, body: {}", e, text))
        })?;

        let response = Self::parse_response(parsed);
        if let Some(usage) = &response.usage {
            tracing::debug!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                cache_read_input_tokens = usage.cache_read_input_tokens,
                "Messages API usage"
            );
        }
        Ok(response)
    }

    /// Execute a request with automatic retry for transient errors.
    async fn execute_with_retry(
        &self,
        body: &MessagesRequest,
    ) -> Result<GenerateResponse, LlmError> {
        let start = Instant::now();
        let mut attempt = 0;

        loop {
            let error = match self.execute_request(body).await {
                Ok(response) => {
                    if attempt > 0 {
                        tracing::info!(
                            "Request succeeded after {} retries (total time: {:?})",
                            attempt,
                            start.elapsed()
                        );
                    }
                    return Ok(response);
                }
                Err(error) => error,
            };

            if !self.retry_config.should_retry(&error) || attempt >= self.retry_config.max_retries {
                if attempt > 0 {
                    tracing::error!(
                        "Request failed after {} retries (total time: {:?}): {}",
                        attempt,
                        start.elapsed(),
                        error
                    );
                } else {
                    tracing::error!("Request failed (non-retryable): {}", error);
                }
                return Err(error);
            }

            let remaining = self
                .retry_config
                .max_retry_duration
                .saturating_sub(start.elapsed());
            let delay = error.suggested_delay(attempt).min(remaining);
            if delay.is_zero() {
                tracing::warn!(
                    "Retry attempt {} failed, no time remaining: {}",
                    attempt + 1,
                    error
                );
                return Err(error);
            }

            tracing::warn!(
                "Retry attempt {} failed with {}, retrying in {:?}: {}",
                attempt + 1,
                error.kind,
                delay,
                error.message
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl TextBackend for AnthropicClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, LlmError> {
        let body = self.build_body(request);
        tracing::debug!(
            model = %self.model,
            segments = request.segments.len(),
            structured = request.response_schema.is_some(),
            "Sending request to Messages API"
        );
        self.execute_with_retry(&body).await
    }
}

/// Messages API request format.
#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<RequestMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Serialize)]
struct RequestMessage {
    role: &'static str,
    content: Vec<RequestBlock>,
}

#[derive(Debug, Serialize)]
struct RequestBlock {
    #[serde(rename = "type")]
    block_type: &'static str,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<CacheControl>,
}

#[derive(Debug, Serialize)]
struct CacheControl {
    #[serde(rename = "type")]
    control_type: &'static str,
}

impl CacheControl {
    fn ephemeral() -> Self {
        Self {
            control_type: "ephemeral",
        }
    }
}

#[derive(Debug, Serialize)]
struct ToolSpec {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ToolChoice {
    #[serde(rename = "type")]
    choice_type: &'static str,
    name: String,
}

/// Messages API response format.
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<StopReason>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        #[allow(dead_code)]
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{InputSegment, ResponseSchema};
    use serde_json::json;

    fn client() -> AnthropicClient {
        AnthropicClient::new("key".into(), "claude-haiku-4-5".into(), 1024)
    }

    #[test]
    fn cacheable_segments_carry_cache_control() {
        let request = GenerateRequest::new(
            "be brief",
            vec![InputSegment::cacheable("doc"), InputSegment::text("task")],
        );
        let body = serde_json::to_value(client().build_body(&request)).unwrap();

        assert_eq!(body["system"], "be brief");
        assert_eq!(body["max_tokens"], 1024);
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["cache_control"]["type"], "ephemeral");
        assert!(content[1].get("cache_control").is_none());
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn response_schema_forces_tool_call() {
        let request = GenerateRequest::new("s", vec![InputSegment::text("t")]).with_schema(
            ResponseSchema {
                name: "task_plan".into(),
                description: "plan".into(),
                schema: json!({"type": "object"}),
            },
        );
        let body = serde_json::to_value(client().build_body(&request)).unwrap();

        assert_eq!(body["tools"][0]["name"], "task_plan");
        assert_eq!(body["tool_choice"], json!({"type": "tool", "name": "task_plan"}));
    }

    #[test]
    fn parses_text_tool_use_and_stop_reason() {
        let parsed: MessagesResponse = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "Hello "},
                {"type": "thinking", "thinking": "..."},
                {"type": "text", "text": "world"},
                {"type": "tool_use", "id": "t1", "name": "task_plan", "input": {"tasks": []}}
            ],
            "stop_reason": "max_tokens",
            "usage": {"input_tokens": 10, "output_tokens": 20}
        }))
        .unwrap();

        let response = AnthropicClient::parse_response(parsed);
        assert_eq!(response.text, "Hello world");
        assert_eq!(response.structured, Some(json!({"tasks": []})));
        assert!(response.is_truncated());
        assert_eq!(response.usage.map(|u| u.output_tokens), Some(20));
    }

    #[test]
    fn error_message_prefers_envelope() {
        let body = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert_eq!(
            AnthropicClient::error_message(body),
            "overloaded_error: Overloaded"
        );
        assert_eq!(AnthropicClient::error_message("plain"), "plain");
    }
}
