//! Specialist workers - the agents that do the actual document work.
//!
//! All three specialists run the same state machine; they differ only in the
//! `Specialization` they are configured with.

use std::collections::BTreeMap;

use crate::agents::{AgentContext, AgentError};
use crate::llm::{GenerateRequest, InputSegment};
use crate::task::{Task, TaskOutcome, WorkerRole};

/// Phrases that mark a worker result as a question for the user.
///
/// Matched case-insensitively as substrings, so a result that merely
/// discusses one of these phrases is flagged too.
pub const DEFAULT_TRIGGER_PHRASES: [&str; 4] = [
    "need clarification",
    "could you clarify",
    "unclear about",
    "could you specify",
];

/// Descriptor that turns the generic worker into a specialist.
#[derive(Debug, Clone)]
pub struct Specialization {
    pub role: WorkerRole,
    /// Display name used in logs and clarification listings
    pub name: String,
    pub system_prompt: String,
    /// Closing instruction appended after the task description
    pub instruction: String,
    /// Trigger phrases for clarification detection, matched case-insensitively
    pub trigger_phrases: Vec<String>,
}

impl Specialization {
    fn new(role: WorkerRole, name: &str, system_prompt: &str, instruction: &str) -> Self {
        Self {
            role,
            name: name.to_string(),
            system_prompt: system_prompt.to_string(),
            instruction: instruction.to_string(),
            trigger_phrases: DEFAULT_TRIGGER_PHRASES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }

    /// Summarization, analysis and extraction.
    pub fn text_analysis() -> Self {
        Self::new(
            WorkerRole::TextAnalysis,
            "Text Analyst",
            TEXT_ANALYSIS_PROMPT,
            TEXT_INSTRUCTION,
        )
    }

    /// Transformation, formatting and rewriting.
    pub fn text_transformation() -> Self {
        Self::new(
            WorkerRole::TextTransformation,
            "Text Editor",
            TEXT_TRANSFORMATION_PROMPT,
            TEXT_INSTRUCTION,
        )
    }

    /// Tables and structured data.
    pub fn table_generation() -> Self {
        Self::new(
            WorkerRole::TableGeneration,
            "Table Specialist",
            TABLE_GENERATION_PROMPT,
            TABLE_INSTRUCTION,
        )
    }

    /// Built-in specialization for `role`.
    pub fn for_role(role: WorkerRole) -> Self {
        match role {
            WorkerRole::TextAnalysis => Self::text_analysis(),
            WorkerRole::TextTransformation => Self::text_transformation(),
            WorkerRole::TableGeneration => Self::table_generation(),
        }
    }
}

/// Check worker output for a clarification request.
pub fn needs_clarification<S: AsRef<str>>(text: &str, trigger_phrases: &[S]) -> bool {
    let lowered = text.to_lowercase();
    trigger_phrases
        .iter()
        .any(|phrase| lowered.contains(&phrase.as_ref().to_lowercase()))
}

/// A stateless executor turning one task into text output.
#[derive(Debug, Clone)]
pub struct Worker {
    specialization: Specialization,
}

impl Worker {
    pub fn new(specialization: Specialization) -> Self {
        Self { specialization }
    }

    pub fn name(&self) -> &str {
        &self.specialization.name
    }

    pub fn role(&self) -> WorkerRole {
        self.specialization.role
    }

    pub fn specialization(&self) -> &Specialization {
        &self.specialization
    }

    /// Build the backend request for `task`.
    fn build_request(&self, task: &Task, context: &BTreeMap<String, String>) -> GenerateRequest {
        let context_json =
            serde_json::to_string_pretty(context).unwrap_or_else(|_| "{}".to_string());

        GenerateRequest::new(
            self.specialization.system_prompt.clone(),
            vec![
                InputSegment::cacheable(format!("Content to process:\n{}", task.content())),
                InputSegment::text(format!(
                    "Task: {}\n\nAdditional context: {}\n\n{}",
                    task.description(),
                    context_json,
                    self.specialization.instruction
                )),
            ],
        )
    }

    /// Process one task.
    ///
    /// # Postconditions
    /// - Exactly one backend call was issued
    /// - `outcome.needs_clarification` reflects the trigger-phrase check
    ///
    /// # Errors
    /// Backend, deadline and cancellation errors propagate unchanged.
    pub async fn process(
        &self,
        task: &Task,
        context: &BTreeMap<String, String>,
        ctx: &AgentContext,
    ) -> Result<TaskOutcome, AgentError> {
        tracing::debug!(
            worker = %self.name(),
            task_id = %task.id(),
            content_chars = task.content().chars().count(),
            "Worker processing task"
        );

        let response = ctx.generate(self.build_request(task, context)).await?;
        let flagged = needs_clarification(&response.text, &self.specialization.trigger_phrases[..]);

        if flagged {
            tracing::info!(
                worker = %self.name(),
                task_id = %task.id(),
                "Worker asked for clarification"
            );
        }

        Ok(TaskOutcome::new(response.text, flagged))
    }
}

/// The three specialists, one per role.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    text_analysis: Worker,
    text_transformation: Worker,
    table_generation: Worker,
}

impl WorkerPool {
    /// Pool with the built-in specializations.
    pub fn new() -> Self {
        Self {
            text_analysis: Worker::new(Specialization::text_analysis()),
            text_transformation: Worker::new(Specialization::text_transformation()),
            table_generation: Worker::new(Specialization::table_generation()),
        }
    }

    /// Worker responsible for `role`.
    pub fn get(&self, role: WorkerRole) -> &Worker {
        match role {
            WorkerRole::TextAnalysis => &self.text_analysis,
            WorkerRole::TextTransformation => &self.text_transformation,
            WorkerRole::TableGeneration => &self.table_generation,
        }
    }

    /// Replace the worker for its role.
    pub fn with_worker(mut self, worker: Worker) -> Self {
        match worker.role() {
            WorkerRole::TextAnalysis => self.text_analysis = worker,
            WorkerRole::TextTransformation => self.text_transformation = worker,
            WorkerRole::TableGeneration => self.table_generation = worker,
        }
        self
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

const TEXT_INSTRUCTION: &str = "Return the processed output directly. \
If the task is ambiguous, state your question plainly instead of guessing.";

const TABLE_INSTRUCTION: &str = "Return the requested table directly. \
If the table structure, column names or format is ambiguous, state your question plainly.";

const TEXT_ANALYSIS_PROMPT: &str = r#"You are a text analysis specialist on a document-processing team.

Your strengths:
- Summarizing and condensing long passages
- Extracting facts, entities and key points
- Analyzing arguments, themes and structure

Rules:
- Preserve the original meaning when condensing
- Be thorough but concise
- Ask a clarifying question when the requirement is ambiguous

You take direction from the lead orchestrator."#;

const TEXT_TRANSFORMATION_PROMPT: &str = r#"You are a text transformation specialist on a document-processing team.

Your strengths:
- Rewriting, editing and restyling text
- Converting between formats (prose, lists, markdown, HTML)
- Restructuring documents while keeping their integrity

Rules:
- Follow the requested format precisely
- Keep the document's structure intact unless told otherwise
- Ask a clarifying question when the requirement is ambiguous

You take direction from the lead orchestrator."#;

const TABLE_GENERATION_PROMPT: &str = r#"You are a table generation specialist on a document-processing team.

Your strengths:
- Building tables in Markdown, HTML or CSV
- Complex layouts with merged cells
- Extracting data from prose into rows and columns

Rules:
- Use Markdown for simple tables and HTML when cells must be merged
- Label every row and column clearly
- Never invent data that is not in the content
- Ask a clarifying question about structure when it is ambiguous

You take direction from the lead orchestrator."#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::ScriptedBackend;
    use crate::llm::{GenerateResponse, LlmError};
    use crate::task::TaskStatus;
    use std::sync::Arc;
    use std::time::Duration;

    fn ctx(backend: ScriptedBackend) -> AgentContext {
        AgentContext::new(Arc::new(backend), Duration::from_secs(5))
    }

    #[test]
    fn detects_trigger_phrase_case_insensitively() {
        assert!(needs_clarification(
            "Could you clarify the date range?",
            &DEFAULT_TRIGGER_PHRASES
        ));
        assert!(needs_clarification(
            "I NEED CLARIFICATION on the audience.",
            &DEFAULT_TRIGGER_PHRASES
        ));
    }

    #[test]
    fn plain_output_is_not_flagged() {
        assert!(!needs_clarification(
            "Here is the summary of section A.",
            &DEFAULT_TRIGGER_PHRASES
        ));
    }

    #[test]
    fn topical_mention_is_a_known_false_positive() {
        // The report talks about readers being "unclear about" terms; no
        // question is asked, yet the substring heuristic still fires.
        let text = "Section 3 notes that many readers were unclear about the new tax rules.";
        assert!(needs_clarification(text, &DEFAULT_TRIGGER_PHRASES));
    }

    #[test]
    fn specializations_cover_every_role() {
        for role in WorkerRole::ALL {
            let specialization = Specialization::for_role(role);
            assert_eq!(specialization.role, role);
            assert_eq!(specialization.trigger_phrases.len(), 4);
        }
        let pool = WorkerPool::new();
        assert_eq!(pool.get(WorkerRole::TableGeneration).name(), "Table Specialist");
    }

    #[tokio::test]
    async fn process_issues_one_call_with_cacheable_content() {
        let backend = ScriptedBackend::new(|_| Ok(GenerateResponse::text("Summary: X")));
        let worker = Worker::new(Specialization::text_analysis());
        let task = Task::new("t1", "Summarize section A", "Alpha text", WorkerRole::TextAnalysis);
        let context = BTreeMap::from([("clarification".to_string(), "Q3 only".to_string())]);

        let outcome = worker.process(&task, &context, &ctx(backend.clone())).await.unwrap();

        assert_eq!(outcome, TaskOutcome::new("Summary: X", false));
        assert_eq!(outcome.status, TaskStatus::Completed);

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].segments[0].cacheable);
        assert_eq!(calls[0].segments[0].text, "Content to process:\nAlpha text");
        assert!(calls[0].segments[1].text.contains("Task: Summarize section A"));
        assert!(calls[0].segments[1].text.contains("\"clarification\": \"Q3 only\""));
    }

    #[tokio::test]
    async fn process_flags_clarification() {
        let backend = ScriptedBackend::new(|_| {
            Ok(GenerateResponse::text("Could you clarify the date range?"))
        });
        let worker = Worker::new(Specialization::table_generation());
        let task = Task::new("t2", "Tabulate", "", WorkerRole::TableGeneration);

        let outcome = worker
            .process(&task, &BTreeMap::new(), &ctx(backend))
            .await
            .unwrap();
        assert!(outcome.needs_clarification);
        assert_eq!(outcome.status, TaskStatus::AwaitingClarification);
    }

    #[tokio::test]
    async fn backend_failure_propagates() {
        let backend = ScriptedBackend::new(|_| Err(LlmError::server_error(503, "down".into())));
        let worker = Worker::new(Specialization::text_transformation());
        let task = Task::new("t3", "Rewrite", "text", WorkerRole::TextTransformation);

        let result = worker.process(&task, &BTreeMap::new(), &ctx(backend)).await;
        tokio_test::assert_err!(result);
    }
}
