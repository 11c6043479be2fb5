//! Scripted backend for unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{GenerateRequest, GenerateResponse, LlmError, TextBackend};

type Responder = dyn Fn(&GenerateRequest) -> Result<GenerateResponse, LlmError> + Send + Sync;
type Delay = dyn Fn(&GenerateRequest) -> Duration + Send + Sync;

/// Backend answering every request through a closure and recording the calls.
#[derive(Clone)]
pub struct ScriptedBackend {
    responder: Arc<Responder>,
    delay: Option<Arc<Delay>>,
    calls: Arc<Mutex<Vec<GenerateRequest>>>,
}

impl ScriptedBackend {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&GenerateRequest) -> Result<GenerateResponse, LlmError> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sleep before answering, per request.
    pub fn with_delay<D>(mut self, delay: D) -> Self
    where
        D: Fn(&GenerateRequest) -> Duration + Send + Sync + 'static,
    {
        self.delay = Some(Arc::new(delay));
        self
    }

    pub fn calls(&self) -> Vec<GenerateRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextBackend for ScriptedBackend {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, LlmError> {
        self.calls.lock().unwrap().push(request.clone());
        if let Some(delay) = &self.delay {
            tokio::time::sleep(delay(request)).await;
        }
        (self.responder)(request)
    }
}
