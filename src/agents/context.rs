//! Agent execution context - the backend handle shared by the team.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::agents::AgentError;
use crate::llm::{GenerateRequest, GenerateResponse, TextBackend};

/// Shared context passed to the orchestrator and workers.
///
/// # Thread Safety
/// Cheap to clone; the backend is behind an `Arc` and the cancellation token
/// is shared with every context derived from it.
#[derive(Clone)]
pub struct AgentContext {
    /// Text-generation backend for all model calls
    pub backend: Arc<dyn TextBackend>,

    /// Deadline for a single backend call
    pub call_timeout: Duration,

    /// Cooperative cancellation for in-flight calls.
    pub cancel_token: CancellationToken,
}

impl AgentContext {
    /// Create a new agent context.
    pub fn new(backend: Arc<dyn TextBackend>, call_timeout: Duration) -> Self {
        Self {
            backend,
            call_timeout,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Create a child context whose token is cancelled with the parent's,
    /// but can also be cancelled on its own.
    pub fn child_context(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            call_timeout: self.call_timeout,
            cancel_token: self.cancel_token.child_token(),
        }
    }

    /// Cancel every call running under this context (and its children).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if cooperative cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Issue one backend call under the per-call deadline.
    ///
    /// # Errors
    /// - `Cancelled` if the context is cancelled before or during the call
    /// - `DeadlineExceeded` if the call outlives `call_timeout`
    /// - `Backend` for any backend failure
    pub async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, AgentError> {
        if self.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => Err(AgentError::Cancelled),
            result = tokio::time::timeout(self.call_timeout, self.backend.generate(&request)) => {
                match result {
                    Ok(response) => Ok(response?),
                    Err(_) => Err(AgentError::DeadlineExceeded(format!(
                        "backend call exceeded {:?}",
                        self.call_timeout
                    ))),
                }
            }
        }
    }
}
