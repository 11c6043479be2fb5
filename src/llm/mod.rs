//! Text-generation backend module.
//!
//! This module provides a trait-based abstraction over the hosted model,
//! with the Anthropic Messages API as the primary implementation.
//!
//! A request is a system prompt plus an ordered list of input segments. The
//! first segments are typically large and stable (a document preview, a task
//! transcript) and may be marked cacheable so the provider can reuse them
//! across repeated calls.

mod anthropic;
mod error;
#[cfg(test)]
pub(crate) mod mock;

pub use anthropic::{AnthropicClient, ANTHROPIC_API_URL};
pub use error::{classify_http_status, LlmError, LlmErrorKind, RetryConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One block of user input sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSegment {
    pub text: String,
    /// Hint that this block is safe to reuse across repeated calls.
    #[serde(default)]
    pub cacheable: bool,
}

impl InputSegment {
    /// Create a plain text segment.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cacheable: false,
        }
    }

    /// Create a segment the provider may cache.
    pub fn cacheable(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cacheable: true,
        }
    }
}

/// JSON schema the response must conform to (schema-constrained generation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseSchema {
    /// Short identifier for the structured payload (e.g. `task_plan`).
    pub name: String,
    pub description: String,
    pub schema: serde_json::Value,
}

/// A single generation request.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub system_prompt: String,
    pub segments: Vec<InputSegment>,
    /// Maximum output tokens; `None` uses the client default.
    pub max_tokens: Option<u32>,
    /// Ask the backend for structured output matching this schema.
    pub response_schema: Option<ResponseSchema>,
}

impl GenerateRequest {
    /// Create a request from a system prompt and its input segments.
    pub fn new(system_prompt: impl Into<String>, segments: Vec<InputSegment>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            segments,
            max_tokens: None,
            response_schema: None,
        }
    }

    /// Request structured output.
    pub fn with_schema(mut self, schema: ResponseSchema) -> Self {
        self.response_schema = Some(schema);
        self
    }

    /// All segment text joined, mostly useful for logging and tests.
    pub fn joined_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Why the backend stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of the answer
    EndTurn,
    /// Output was cut at the token limit
    MaxTokens,
    /// A stop sequence matched
    StopSequence,
    /// The model emitted a structured (tool) payload
    ToolUse,
    #[serde(other)]
    Other,
}

/// Token usage information (if provided by the provider).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

/// Response from a generation request.
#[derive(Debug, Clone, Default)]
pub struct GenerateResponse {
    /// Concatenated text output.
    pub text: String,
    /// Structured payload, when a response schema was requested and honored.
    pub structured: Option<serde_json::Value>,
    pub stop_reason: Option<StopReason>,
    pub usage: Option<TokenUsage>,
}

impl GenerateResponse {
    /// A plain text response that ended naturally.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            stop_reason: Some(StopReason::EndTurn),
            ..Self::default()
        }
    }

    /// Whether the output was cut off by the token limit.
    pub fn is_truncated(&self) -> bool {
        self.stop_reason == Some(StopReason::MaxTokens)
    }
}

/// Trait for text-generation backends.
#[async_trait]
pub trait TextBackend: Send + Sync {
    /// Generate a response for `request`.
    ///
    /// Backends that cannot honor `response_schema` ignore it and return
    /// `structured: None`; callers must fall back to parsing `text`.
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_reason_parses_unknown_values() {
        let reason: StopReason = serde_json::from_str("\"max_tokens\"").unwrap();
        assert_eq!(reason, StopReason::MaxTokens);
        let reason: StopReason = serde_json::from_str("\"pause_turn\"").unwrap();
        assert_eq!(reason, StopReason::Other);
    }

    #[test]
    fn truncation_follows_stop_reason() {
        let mut response = GenerateResponse::text("partial");
        assert!(!response.is_truncated());
        response.stop_reason = Some(StopReason::MaxTokens);
        assert!(response.is_truncated());
    }

    #[test]
    fn joined_text_keeps_segment_order() {
        let request = GenerateRequest::new(
            "system",
            vec![InputSegment::cacheable("first"), InputSegment::text("second")],
        );
        assert_eq!(request.joined_text(), "first\nsecond");
        assert!(request.segments[0].cacheable);
        assert!(!request.segments[1].cacheable);
    }
}
