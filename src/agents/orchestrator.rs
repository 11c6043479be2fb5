//! Lead orchestrator - decomposes requests and compiles worker output.
//!
//! # Responsibilities
//! 1. Turn a request plus document into an ordered task list
//! 2. Compile the worker results into one answer
//! 3. Resume a compiled answer the backend cut off at its token limit

use std::collections::HashSet;

use serde::{Deserialize, Deserializer};
use serde_json::json;

use crate::agents::{AgentContext, AgentError, Compiled};
use crate::llm::{GenerateRequest, GenerateResponse, InputSegment, ResponseSchema};
use crate::task::{Task, WorkerRole};
use crate::util::{char_prefix, char_slice};

/// Id of the task produced when decomposition fails.
pub const FALLBACK_TASK_ID: &str = "task_1";

/// Default number of document characters shown to the planner.
pub const DEFAULT_PREVIEW_CHARS: usize = 5_000;

/// The orchestrator role.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    preview_chars: usize,
    structured_output: bool,
}

/// Task plan as emitted by the backend.
#[derive(Debug, Deserialize)]
struct TaskPlan {
    #[serde(default)]
    tasks: Vec<PlannedTask>,
    #[serde(default)]
    coordination_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlannedTask {
    #[serde(deserialize_with = "string_or_number")]
    task_id: String,
    description: String,
    assigned_to: String,
    #[serde(default)]
    content_section: Option<String>,
    #[serde(default)]
    char_range: Option<[usize; 2]>,
}

/// Task ids arrive as strings or bare numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TaskId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match TaskId::deserialize(deserializer)? {
        TaskId::Text(id) => id,
        TaskId::Number(id) => id.to_string(),
    })
}

impl Orchestrator {
    pub fn new(preview_chars: usize, structured_output: bool) -> Self {
        Self {
            preview_chars,
            structured_output,
        }
    }

    /// Decompose `request` over `document` into tasks.
    ///
    /// # Postconditions
    /// - The result is never empty
    /// - Task ids are unique
    ///
    /// # Errors
    /// Only backend/deadline/cancellation errors. An unusable plan degrades to
    /// a single task covering the whole document.
    pub async fn analyze(
        &self,
        request: &str,
        document: &str,
        ctx: &AgentContext,
    ) -> Result<Vec<Task>, AgentError> {
        let response = ctx.generate(self.analyze_request(request, document)).await?;

        match self.parse_plan(&response, document) {
            Ok(tasks) => Ok(tasks),
            Err(e) if e.is_decomposition_error() => {
                tracing::warn!(
                    "Unusable task plan, processing the whole document as one task: {}",
                    e
                );
                Ok(vec![fallback_task(request, document)])
            }
            Err(e) => Err(e),
        }
    }

    fn analyze_request(&self, request: &str, document: &str) -> GenerateRequest {
        let preview = char_prefix(document, self.preview_chars);
        let total_chars = document.chars().count();

        let request = GenerateRequest::new(
            ORCHESTRATOR_PROMPT,
            vec![
                InputSegment::cacheable(format!(
                    "Document preview (first {} characters):\n{}",
                    self.preview_chars, preview
                )),
                InputSegment::text(format!(
                    "User request: {request}\n\n\
                     Total document length: {total_chars} characters\n\n\
                     {PLAN_INSTRUCTIONS}"
                )),
            ],
        );

        if self.structured_output {
            request.with_schema(task_plan_schema())
        } else {
            request
        }
    }

    /// Turn a planning response into tasks, preferring the structured payload.
    fn parse_plan(
        &self,
        response: &GenerateResponse,
        document: &str,
    ) -> Result<Vec<Task>, AgentError> {
        if let Some(value) = &response.structured {
            match tasks_from_value(value.clone(), document) {
                Ok(tasks) => return Ok(tasks),
                Err(e) => tracing::debug!("Structured plan rejected, scanning text: {}", e),
            }
        }

        let json = extract_json_object(&response.text)?;
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| AgentError::DecompositionParse(e.to_string()))?;
        tasks_from_value(value, document)
    }

    /// Compile worker results into one answer for `request`.
    pub async fn compile(
        &self,
        tasks: &[Task],
        request: &str,
        ctx: &AgentContext,
    ) -> Result<Compiled, AgentError> {
        let generate = GenerateRequest::new(
            ORCHESTRATOR_PROMPT,
            vec![
                InputSegment::cacheable(format!(
                    "Specialist results:\n{}",
                    build_transcript(tasks)
                )),
                InputSegment::text(format!(
                    "Original user request: {request}\n\n{COMPILE_INSTRUCTIONS}"
                )),
            ],
        );

        let response = ctx.generate(generate).await?;
        Ok(Compiled {
            truncated: response.is_truncated(),
            text: response.text,
        })
    }

    /// Continue a compiled answer that stopped at the token limit.
    pub async fn continue_output(
        &self,
        tasks: &[Task],
        request: &str,
        emitted: &str,
        ctx: &AgentContext,
    ) -> Result<Compiled, AgentError> {
        let generate = GenerateRequest::new(
            ORCHESTRATOR_PROMPT,
            vec![
                InputSegment::cacheable(format!(
                    "Specialist results:\n{}",
                    build_transcript(tasks)
                )),
                InputSegment::text(format!("Original user request: {request}")),
                InputSegment::text(format!("Answer emitted so far:\n{emitted}")),
                InputSegment::text(CONTINUE_INSTRUCTIONS),
            ],
        );

        let response = ctx.generate(generate).await?;
        Ok(Compiled {
            truncated: response.is_truncated(),
            text: response.text,
        })
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(DEFAULT_PREVIEW_CHARS, true)
    }
}

/// The single task used when decomposition fails.
pub fn fallback_task(request: &str, document: &str) -> Task {
    Task::new(FALLBACK_TASK_ID, request, document, WorkerRole::default())
}

/// Locate the JSON object in free-form text: first `{` through last `}`.
pub fn extract_json_object(text: &str) -> Result<&str, AgentError> {
    let start = text
        .find('{')
        .ok_or_else(|| AgentError::DecompositionParse("no '{' in response".to_string()))?;
    let end = text
        .rfind('}')
        .filter(|&end| end > start)
        .ok_or_else(|| AgentError::DecompositionParse("no closing '}' in response".to_string()))?;
    Ok(&text[start..=end])
}

/// Validate a task plan and build tasks from it.
fn tasks_from_value(value: serde_json::Value, document: &str) -> Result<Vec<Task>, AgentError> {
    let plan: TaskPlan =
        serde_json::from_value(value).map_err(|e| AgentError::DecompositionParse(e.to_string()))?;

    if plan.tasks.is_empty() {
        return Err(AgentError::DecompositionParse("plan contains no tasks".to_string()));
    }
    if let Some(notes) = plan.coordination_notes.as_deref().filter(|n| !n.is_empty()) {
        tracing::debug!("Coordination notes: {}", notes);
    }

    let mut seen = HashSet::new();
    plan.tasks
        .into_iter()
        .map(|planned| {
            if !seen.insert(planned.task_id.clone()) {
                return Err(AgentError::DecompositionParse(format!(
                    "duplicate task id {:?}",
                    planned.task_id
                )));
            }
            let role: WorkerRole = planned.assigned_to.parse()?;
            let content = resolve_content(&planned, document);
            Ok(Task::new(planned.task_id, planned.description, content, role))
        })
        .collect()
}

/// A valid character range yields that slice of the document; otherwise the
/// section label stands in for the content.
fn resolve_content(planned: &PlannedTask, document: &str) -> String {
    planned
        .char_range
        .and_then(|[start, end]| char_slice(document, start, end))
        .map(str::to_string)
        .or_else(|| planned.content_section.clone())
        .unwrap_or_default()
}

/// Render tasks with results as `=== id: description ===` sections, in order.
pub fn build_transcript(tasks: &[Task]) -> String {
    tasks
        .iter()
        .filter_map(|task| {
            task.result()
                .map(|result| format!("=== {}: {} ===\n{}", task.id(), task.description(), result))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn task_plan_schema() -> ResponseSchema {
    ResponseSchema {
        name: "task_plan".to_string(),
        description: "Submit the task breakdown for the document request".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "tasks": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "task_id": {"type": ["string", "integer"]},
                            "description": {"type": "string"},
                            "assigned_to": {
                                "type": "string",
                                "enum": WorkerRole::ALL.map(|r| r.token()),
                            },
                            "content_section": {"type": "string"},
                            "char_range": {
                                "type": "array",
                                "items": {"type": "integer", "minimum": 0},
                                "minItems": 2,
                                "maxItems": 2
                            }
                        },
                        "required": ["task_id", "description", "assigned_to"]
                    }
                },
                "coordination_notes": {"type": "string"}
            },
            "required": ["tasks"]
        }),
    }
}

const ORCHESTRATOR_PROMPT: &str = r#"You are the lead orchestrator of a document-processing team.

You coordinate three specialists:
- subagent_1: text analysis (summaries, extraction, key points)
- subagent_2: text transformation (rewriting, formatting, restructuring)
- subagent_3: tables and structured data

You break requests into focused subtasks, assign each to one specialist,
and compile their results into a single finished answer.

Present only finished content. Do not describe your process or mention the
specialists unless the user asks."#;

const PLAN_INSTRUCTIONS: &str = r#"Produce a task breakdown as one JSON object:
{
  "tasks": [
    {
      "task_id": "unique id",
      "description": "what to do",
      "assigned_to": "subagent_1|subagent_2|subagent_3",
      "content_section": "which part of the document",
      "char_range": [start, end]
    }
  ],
  "coordination_notes": "optional notes"
}

- Send text work to subagent_1 or subagent_2 and table work to subagent_3
- Split large documents into manageable sections along their structure
- char_range is optional: character offsets into the full document"#;

const COMPILE_INSTRUCTIONS: &str = "Compile the specialist results above into one unified, \
well-structured document that answers the request. Keep a logical flow between sections. \
Do not mention the specialists or the process. Present only the final content.";

const CONTINUE_INSTRUCTIONS: &str = "The answer above was cut off. Continue it exactly where it \
stopped, without repeating anything already written and without any preamble.";
