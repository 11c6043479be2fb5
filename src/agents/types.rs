//! Core types for the agent team.

use serde::{Deserialize, Serialize};

use crate::llm::LlmError;
use crate::task::UnknownRole;

/// Errors that can occur in team operations.
///
/// `DecompositionParse` and `UnknownRole` are recovered inside the
/// orchestrator and never reach callers of the team controller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AgentError {
    #[error("Backend error: {0}")]
    Backend(#[from] LlmError),

    #[error("Could not parse task decomposition: {0}")]
    DecompositionParse(String),

    #[error(transparent)]
    UnknownRole(#[from] UnknownRole),

    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl AgentError {
    /// Errors the orchestrator absorbs by falling back to a single task.
    pub fn is_decomposition_error(&self) -> bool {
        matches!(self, Self::DecompositionParse(_) | Self::UnknownRole(_))
    }
}

/// Who said a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One entry in the team's conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    /// Which agent produced the entry (assistant messages only)
    pub origin: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            origin: None,
        }
    }

    pub fn assistant(content: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            origin: Some(origin.into()),
        }
    }
}

/// Phase of the team pipeline.
///
/// ```text
/// Idle -> Analyzing -> Delegating -> ClarificationPending -> Compiling -> Idle
///                                \-> Compiling -> Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    Idle,
    Analyzing,
    Delegating,
    ClarificationPending,
    Compiling,
}

impl std::fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelinePhase::Idle => "idle",
            PipelinePhase::Analyzing => "analyzing",
            PipelinePhase::Delegating => "delegating",
            PipelinePhase::ClarificationPending => "clarification_pending",
            PipelinePhase::Compiling => "compiling",
        };
        f.write_str(name)
    }
}

/// Output of a compile or continuation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compiled {
    pub text: String,
    /// Backend stopped at its output token limit
    pub truncated: bool,
}
