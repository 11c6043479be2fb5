//! # Librarian Team
//!
//! A small hierarchical team of model-backed agents that processes text
//! documents: one orchestrator decomposes a request, three specialists work
//! on the pieces, and the orchestrator compiles their output.
//!
//! This library provides:
//! - The team controller with a single clarification round-trip
//! - Bounded concurrent dispatch to the specialists
//! - Continuation of answers cut off at the output token limit
//! - An Anthropic Messages API backend behind the `TextBackend` trait
//!
//! ## Architecture
//!
//! ```text
//!        ┌──────────────────────────────────┐
//!        │          LibrarianTeam           │
//!        │  (pipeline + conversation state) │
//!        └────────────────┬─────────────────┘
//!                         │
//!                         ▼
//!                ┌─────────────────┐
//!                │  Orchestrator   │
//!                │ analyze/compile │
//!                └────────┬────────┘
//!          ┌──────────────┼──────────────┐
//!          ▼              ▼              ▼
//!   ┌────────────┐ ┌────────────┐ ┌────────────┐
//!   │  Analyst   │ │   Editor   │ │   Tables   │
//!   │ subagent_1 │ │ subagent_2 │ │ subagent_3 │
//!   └────────────┘ └────────────┘ └────────────┘
//! ```
//!
//! ## Task Flow
//! 1. Decompose the request into tasks (or one whole-document task)
//! 2. Dispatch every task to its specialist, at most N at a time
//! 3. Ask the user if any specialist needs clarification
//! 4. Otherwise compile the results into the final answer
//!
//! ## Modules
//! - `agents`: Orchestrator, workers and the team controller
//! - `task`: Task, roles and outcomes
//! - `llm`: Text-generation backend trait and Anthropic client
//! - `document`: Document source and sink

pub mod agents;
pub mod config;
pub mod document;
pub mod llm;
pub mod task;
pub mod util;

pub use agents::{LibrarianTeam, TeamSettings};
pub use config::Config;
