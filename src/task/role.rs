//! Specialist roles a task can be assigned to.

use serde::{Deserialize, Serialize};

/// The fixed set of worker specializations.
///
/// Decomposition output names roles by wire token (`subagent_1` ..
/// `subagent_3`); anything else is rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorkerRole {
    /// Summarization, analysis, extraction
    #[default]
    #[serde(rename = "subagent_1")]
    TextAnalysis,
    /// Transformation, formatting, rewriting
    #[serde(rename = "subagent_2")]
    TextTransformation,
    /// Tables and structured data formatting
    #[serde(rename = "subagent_3")]
    TableGeneration,
}

impl WorkerRole {
    pub const ALL: [WorkerRole; 3] = [
        WorkerRole::TextAnalysis,
        WorkerRole::TextTransformation,
        WorkerRole::TableGeneration,
    ];

    /// Wire token used in decomposition output.
    pub fn token(&self) -> &'static str {
        match self {
            WorkerRole::TextAnalysis => "subagent_1",
            WorkerRole::TextTransformation => "subagent_2",
            WorkerRole::TableGeneration => "subagent_3",
        }
    }
}

impl std::fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

/// A role token outside the fixed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown worker role: {0:?}")]
pub struct UnknownRole(pub String);

impl std::str::FromStr for WorkerRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkerRole::ALL
            .into_iter()
            .find(|role| role.token() == s.trim())
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}
