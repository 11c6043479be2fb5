//! Team controller - drives the fixed orchestrator/worker pipeline.
//!
//! # Pipeline
//! ```text
//! request + document
//!     -> Orchestrator::analyze      (Analyzing)
//!     -> workers, concurrently      (Delegating)
//!     -> clarification gate
//!          any flagged  -> listing   (ClarificationPending)
//!          none flagged -> compile   (Compiling -> Idle)
//! ```
//!
//! # State
//! Tasks, conversation state and history are committed only after an entry
//! point succeeds. A failed or timed-out call leaves them as they were.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::Instrument;
use uuid::Uuid;

use crate::agents::{
    AgentContext, AgentError, Compiled, Message, Orchestrator, PipelinePhase, WorkerPool,
};
use crate::config::Config;
use crate::llm::TextBackend;
use crate::task::{Task, TaskOutcome};

/// Reply to a clarification answer when nothing is waiting for one.
pub const NO_PENDING_CLARIFICATIONS: &str = "No pending clarifications. Ready for new tasks.";

/// Reply to `continue` when the last answer was complete.
pub const NO_PENDING_CONTINUATION: &str =
    "No pending continuation. Please provide a new document processing request.";

/// Appended to an answer that was cut at the output token limit.
pub const CONTINUATION_PROMPT: &str =
    "Due to length constraints, please reply 'continue' to see the rest.";

const ORCHESTRATOR_ORIGIN: &str = "orchestrator";

/// Tuning knobs for the controller.
#[derive(Debug, Clone)]
pub struct TeamSettings {
    pub preview_chars: usize,
    pub max_concurrent_tasks: usize,
    pub call_timeout: Duration,
    pub request_budget: Duration,
    pub structured_output: bool,
}

impl Default for TeamSettings {
    fn default() -> Self {
        Self::from(&Config::new(String::new()))
    }
}

impl From<&Config> for TeamSettings {
    fn from(config: &Config) -> Self {
        Self {
            preview_chars: config.preview_chars,
            max_concurrent_tasks: config.max_concurrent_tasks,
            call_timeout: config.call_timeout,
            request_budget: config.request_budget,
            structured_output: config.structured_output,
        }
    }
}

/// Per-conversation state carried between entry points.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ConversationState {
    original_request: Option<String>,
    /// Indices into the task list, in decomposition order
    pending_clarifications: Vec<usize>,
    awaiting_continuation: bool,
    /// Compiled answer for the current request, every part emitted so far
    compiled_so_far: String,
}

/// The document-processing team: one orchestrator and three specialists.
pub struct LibrarianTeam {
    ctx: AgentContext,
    settings: TeamSettings,
    orchestrator: Orchestrator,
    workers: WorkerPool,
    tasks: Vec<Task>,
    state: ConversationState,
    history: Vec<Message>,
    phase: PipelinePhase,
}

impl LibrarianTeam {
    pub fn new(backend: Arc<dyn TextBackend>, settings: TeamSettings) -> Self {
        Self {
            ctx: AgentContext::new(backend, settings.call_timeout),
            orchestrator: Orchestrator::new(settings.preview_chars, settings.structured_output),
            workers: WorkerPool::new(),
            settings,
            tasks: Vec::new(),
            state: ConversationState::default(),
            history: Vec::new(),
            phase: PipelinePhase::Idle,
        }
    }

    /// Replace the specialists.
    pub fn with_workers(mut self, workers: WorkerPool) -> Self {
        self.workers = workers;
        self
    }

    /// Tasks from the most recent request.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn phase(&self) -> PipelinePhase {
        self.phase
    }

    /// Tasks still waiting for a clarification answer.
    pub fn pending_clarifications(&self) -> Vec<&Task> {
        self.state
            .pending_clarifications
            .iter()
            .filter_map(|&idx| self.tasks.get(idx))
            .collect()
    }

    pub fn awaiting_continuation(&self) -> bool {
        self.state.awaiting_continuation
    }

    /// The compiled answer for the current request, all parts joined.
    ///
    /// `None` before the first compile and while clarifications are pending.
    pub fn compiled_answer(&self) -> Option<&str> {
        Some(self.state.compiled_so_far.as_str()).filter(|answer| !answer.is_empty())
    }

    /// Run a new request over `document`.
    ///
    /// Returns either the compiled answer or, when any specialist asked a
    /// question, the clarification listing.
    ///
    /// # Errors
    /// Backend failures, `DeadlineExceeded` when the request budget or a
    /// call timeout expires.
    pub async fn process_document(
        &mut self,
        request: &str,
        document: &str,
    ) -> Result<String, AgentError> {
        let span = tracing::info_span!("process_document", run_id = %Uuid::new_v4());
        let previous = self.phase;
        let budget = self.settings.request_budget;

        let result = within_budget(budget, self.run_request(request, document))
            .instrument(span)
            .await;
        self.settle(previous, result)
    }

    /// Answer the pending clarification questions and compile the result.
    pub async fn answer_clarification(&mut self, answer: &str) -> Result<String, AgentError> {
        if self.state.pending_clarifications.is_empty() {
            return Ok(NO_PENDING_CLARIFICATIONS.to_string());
        }

        let span = tracing::info_span!("answer_clarification", run_id = %Uuid::new_v4());
        let previous = self.phase;
        let budget = self.settings.request_budget;

        let result = within_budget(budget, self.run_clarification(answer))
            .instrument(span)
            .await;
        self.settle(previous, result)
    }

    /// Emit the next part of an answer that was cut off.
    pub async fn continue_processing(&mut self) -> Result<String, AgentError> {
        if !self.state.awaiting_continuation {
            return Ok(NO_PENDING_CONTINUATION.to_string());
        }

        let span = tracing::info_span!("continue_processing", run_id = %Uuid::new_v4());
        let previous = self.phase;
        let budget = self.settings.request_budget;

        let result = within_budget(budget, self.run_continuation())
            .instrument(span)
            .await;
        self.settle(previous, result)
    }

    async fn run_request(&mut self, request: &str, document: &str) -> Result<String, AgentError> {
        tracing::info!(
            request_chars = request.chars().count(),
            document_chars = document.chars().count(),
            "Processing document request"
        );

        self.phase = PipelinePhase::Analyzing;
        let mut tasks = self.orchestrator.analyze(request, document, &self.ctx).await?;
        tracing::info!(task_count = tasks.len(), "Request decomposed");

        self.phase = PipelinePhase::Delegating;
        let indices: Vec<usize> = (0..tasks.len()).collect();
        let outcomes = self.dispatch(&tasks, &indices, &BTreeMap::new()).await?;
        record_outcomes(&mut tasks, outcomes);

        let pending: Vec<usize> = tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| task.needs_clarification())
            .map(|(idx, _)| idx)
            .collect();

        if !pending.is_empty() {
            tracing::info!(pending = pending.len(), "Specialists asked for clarification");
            let listing = self.clarification_listing(&tasks, &pending);

            self.phase = PipelinePhase::ClarificationPending;
            self.tasks = tasks;
            self.state = ConversationState {
                original_request: Some(request.to_string()),
                pending_clarifications: pending,
                ..ConversationState::default()
            };
            self.history.push(Message::user(request));
            self.history
                .push(Message::assistant(listing.clone(), ORCHESTRATOR_ORIGIN));
            return Ok(listing);
        }

        self.phase = PipelinePhase::Compiling;
        let compiled = self.orchestrator.compile(&tasks, request, &self.ctx).await?;

        self.tasks = tasks;
        self.state = ConversationState {
            original_request: Some(request.to_string()),
            ..ConversationState::default()
        };
        self.history.push(Message::user(request));
        Ok(self.finish_output(compiled, String::new()))
    }

    async fn run_clarification(&mut self, answer: &str) -> Result<String, AgentError> {
        let pending = self.state.pending_clarifications.clone();
        let request = self.state.original_request.clone().unwrap_or_default();
        tracing::info!(pending = pending.len(), "Re-processing tasks with clarification");

        self.phase = PipelinePhase::Delegating;
        let mut tasks = self.tasks.clone();
        let context = BTreeMap::from([("clarification".to_string(), answer.to_string())]);
        let outcomes = self.dispatch(&tasks, &pending, &context).await?;
        record_outcomes(&mut tasks, outcomes);

        let still_flagged = pending
            .iter()
            .filter(|&&idx| tasks[idx].needs_clarification())
            .count();
        if still_flagged > 0 {
            tracing::warn!(
                still_flagged,
                "Tasks still ask for clarification after one round, compiling anyway"
            );
        }

        self.phase = PipelinePhase::Compiling;
        let compiled = self.orchestrator.compile(&tasks, &request, &self.ctx).await?;

        self.tasks = tasks;
        self.state = ConversationState {
            original_request: Some(request),
            ..ConversationState::default()
        };
        self.history.push(Message::user(answer));
        Ok(self.finish_output(compiled, String::new()))
    }

    async fn run_continuation(&mut self) -> Result<String, AgentError> {
        let request = self.state.original_request.clone().unwrap_or_default();
        let emitted = self.state.compiled_so_far.clone();
        tracing::info!(emitted_chars = emitted.chars().count(), "Continuing truncated answer");

        self.phase = PipelinePhase::Compiling;
        let compiled = self
            .orchestrator
            .continue_output(&self.tasks, &request, &emitted, &self.ctx)
            .await?;

        self.history.push(Message::user("continue"));
        Ok(self.finish_output(compiled, emitted))
    }

    /// Run the tasks at `indices` concurrently, bounded by the semaphore.
    ///
    /// Outcomes come back sorted by index. The first error cancels the
    /// calls still in flight and is returned.
    async fn dispatch(
        &self,
        tasks: &[Task],
        indices: &[usize],
        context: &BTreeMap<String, String>,
    ) -> Result<Vec<(usize, TaskOutcome)>, AgentError> {
        let round = self.ctx.child_context();
        let semaphore = Semaphore::new(self.settings.max_concurrent_tasks.max(1));

        let mut in_flight: FuturesUnordered<_> = indices
            .iter()
            .map(|&idx| {
                let task = &tasks[idx];
                let worker = self.workers.get(task.assigned_role());
                let semaphore = &semaphore;
                let round = &round;
                async move {
                    let _permit = semaphore.acquire().await.map_err(|_| AgentError::Cancelled)?;
                    worker
                        .process(task, context, round)
                        .await
                        .map(|outcome| (idx, outcome))
                }
            })
            .collect();

        let mut outcomes = Vec::with_capacity(indices.len());
        while let Some(result) = in_flight.next().await {
            match result {
                Ok(pair) => outcomes.push(pair),
                Err(e) => {
                    tracing::error!("Task failed, cancelling remaining work: {}", e);
                    round.cancel();
                    return Err(e);
                }
            }
        }

        outcomes.sort_by_key(|(idx, _)| *idx);
        Ok(outcomes)
    }

    fn clarification_listing(&self, tasks: &[Task], pending: &[usize]) -> String {
        pending
            .iter()
            .map(|&idx| {
                let task = &tasks[idx];
                format!(
                    "**{}** needs clarification for:\nTask: {}\nQuestion: {}",
                    self.workers.get(task.assigned_role()).name(),
                    task.description(),
                    task.clarification_question().unwrap_or_default()
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Record a compiled part and decide whether a continuation is pending.
    fn finish_output(&mut self, compiled: Compiled, mut emitted: String) -> String {
        emitted.push_str(&compiled.text);
        self.phase = PipelinePhase::Idle;
        self.state.awaiting_continuation = compiled.truncated;
        self.state.compiled_so_far = emitted;

        let output = if compiled.truncated {
            tracing::info!("Answer truncated at the token limit, continuation pending");
            format!("{}\n\n{}", compiled.text, CONTINUATION_PROMPT)
        } else {
            compiled.text
        };

        self.history
            .push(Message::assistant(output.clone(), ORCHESTRATOR_ORIGIN));
        output
    }

    /// Restore the phase after a failed entry point.
    fn settle(
        &mut self,
        previous: PipelinePhase,
        result: Result<String, AgentError>,
    ) -> Result<String, AgentError> {
        if let Err(e) = &result {
            tracing::error!(phase = %self.phase, "Request failed: {}", e);
            self.phase = previous;
        }
        result
    }
}

fn record_outcomes(tasks: &mut [Task], outcomes: Vec<(usize, TaskOutcome)>) {
    for (idx, outcome) in outcomes {
        tasks[idx].record_outcome(outcome);
    }
}

async fn within_budget<T>(
    budget: Duration,
    work: impl Future<Output = Result<T, AgentError>>,
) -> Result<T, AgentError> {
    tokio::time::timeout(budget, work).await.map_err(|_| {
        AgentError::DeadlineExceeded(format!("request exceeded its budget of {:?}", budget))
    })?
}
