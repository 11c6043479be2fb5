//! Agents module - the document-processing team.
//!
//! # Agent Types
//! - **Orchestrator**: Decomposes requests into tasks and compiles results
//! - **Worker**: Specialist executing one task (analysis, transformation, tables)
//! - **LibrarianTeam**: Controller running the fixed pipeline and holding conversation state
//!
//! # Design Principles
//! - One orchestrator, three specialists, one clarification round-trip
//! - Workers are stateless; all state lives in the controller
//! - Unusable task plans degrade to a single whole-document task

mod context;
mod orchestrator;
mod team;
mod types;
mod worker;

pub use context::AgentContext;
pub use orchestrator::{build_transcript, fallback_task, Orchestrator, FALLBACK_TASK_ID};
pub use team::{
    LibrarianTeam, TeamSettings, CONTINUATION_PROMPT, NO_PENDING_CLARIFICATIONS,
    NO_PENDING_CONTINUATION,
};
pub use types::{AgentError, Compiled, Message, MessageRole, PipelinePhase};
pub use worker::{needs_clarification, Specialization, Worker, WorkerPool, DEFAULT_TRIGGER_PHRASES};
