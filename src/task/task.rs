//! Core Task type produced by decomposition and consumed by workers.
//!
//! # Invariants
//! - `result.is_some()` iff `status` is `Completed` or `AwaitingClarification`
//! - `clarification_question.is_some()` iff `status == AwaitingClarification`
//! - `id` is unique within one decomposition run

use serde::{Deserialize, Serialize};

use super::WorkerRole;

/// Status of a task in its lifecycle.
///
/// # State Machine
/// ```text
/// Pending -> Completed
///        \-> AwaitingClarification -> Completed
///                                 \-> AwaitingClarification
/// ```
/// Every processing attempt overwrites the previous outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task has not been processed yet
    Pending,
    /// Worker produced a final result
    Completed,
    /// Worker produced a result that asks the user a question
    AwaitingClarification,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::AwaitingClarification => write!(f, "awaiting_clarification"),
        }
    }
}

/// What a worker returns for one processing attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub result: String,
    pub needs_clarification: bool,
    pub status: TaskStatus,
}

impl TaskOutcome {
    /// Build an outcome; `status` follows from `needs_clarification`.
    pub fn new(result: impl Into<String>, needs_clarification: bool) -> Self {
        Self {
            result: result.into(),
            needs_clarification,
            status: if needs_clarification {
                TaskStatus::AwaitingClarification
            } else {
                TaskStatus::Completed
            },
        }
    }
}

/// One unit of work assigned to exactly one specialist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    id: String,
    description: String,
    /// Slice of the document (or a section label) the task covers
    content: String,
    assigned_role: WorkerRole,
    status: TaskStatus,
    result: Option<String>,
    clarification_question: Option<String>,
}

impl Task {
    /// Create a pending task.
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        content: impl Into<String>,
        assigned_role: WorkerRole,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            content: content.into(),
            assigned_role,
            status: TaskStatus::Pending,
            result: None,
            clarification_question: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn assigned_role(&self) -> WorkerRole {
        self.assigned_role
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    pub fn clarification_question(&self) -> Option<&str> {
        self.clarification_question.as_deref()
    }

    pub fn needs_clarification(&self) -> bool {
        self.status == TaskStatus::AwaitingClarification
    }

    /// Record the outcome of a processing attempt, replacing any previous one.
    ///
    /// # Postconditions
    /// - `result == Some(outcome.result)`
    /// - `clarification_question` is the result text iff clarification is needed
    pub fn record_outcome(&mut self, outcome: TaskOutcome) {
        let TaskOutcome {
            result,
            needs_clarification,
            ..
        } = outcome;

        if needs_clarification {
            self.status = TaskStatus::AwaitingClarification;
            self.clarification_question = Some(result.clone());
        } else {
            self.status = TaskStatus::Completed;
            self.clarification_question = None;
        }
        self.result = Some(result);
    }
}
