//! Configuration management for the librarian team.
//!
//! Configuration can be set via environment variables:
//! - `ANTHROPIC_API_KEY` - Required. API key for the Messages API.
//! - `ANTHROPIC_API_URL` - Optional. Endpoint override. Defaults to the public Messages API.
//! - `LIBRARIAN_MODEL` - Optional. Model identifier. Defaults to `claude-haiku-4-5-20251001`.
//! - `LIBRARIAN_MAX_TOKENS` - Optional. Output token limit per call. Defaults to `32000`.
//! - `LIBRARIAN_PREVIEW_CHARS` - Optional. Decomposition preview size.
//!   Defaults to `5000`.
//! - `LIBRARIAN_MAX_CONCURRENT_TASKS` - Optional. Worker calls in flight at once. Defaults to `3`.
//! - `LIBRARIAN_CALL_TIMEOUT_SECS` - Optional. Deadline per backend call. Defaults to `300`.
//! - `LIBRARIAN_REQUEST_BUDGET_SECS` - Optional. Deadline per top-level request.
//!   Defaults to `1800`.
//! - `LIBRARIAN_STRUCTURED_OUTPUT` - Optional. Ask for schema-constrained plans.
//!   Defaults to `true`.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::llm::ANTHROPIC_API_URL;
use crate::util::env_var_bool;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Team configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Messages API key
    pub api_key: String,

    /// Messages API endpoint
    pub api_url: String,

    /// Model identifier
    pub model: String,

    /// Output token limit per backend call
    pub max_tokens: u32,

    /// Characters of the document shown to the orchestrator when decomposing
    pub preview_chars: usize,

    /// Maximum worker calls in flight during delegation
    pub max_concurrent_tasks: usize,

    /// Deadline for a single backend call
    pub call_timeout: Duration,

    /// Deadline for one top-level request (analyze + delegate + compile)
    pub request_budget: Duration,

    /// Request schema-constrained decomposition output
    pub structured_output: bool,
}

fn env_parse<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `ANTHROPIC_API_KEY` is not set,
    /// `ConfigError::InvalidValue` if a numeric variable does not parse or is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("ANTHROPIC_API_KEY".to_string()))?;

        let defaults = Self::new(api_key);

        let config = Self {
            api_url: std::env::var("ANTHROPIC_API_URL").unwrap_or(defaults.api_url.clone()),
            model: std::env::var("LIBRARIAN_MODEL").unwrap_or(defaults.model.clone()),
            max_tokens: env_parse("LIBRARIAN_MAX_TOKENS", defaults.max_tokens)?,
            preview_chars: env_parse("LIBRARIAN_PREVIEW_CHARS", defaults.preview_chars)?,
            max_concurrent_tasks: env_parse(
                "LIBRARIAN_MAX_CONCURRENT_TASKS",
                defaults.max_concurrent_tasks,
            )?,
            call_timeout: Duration::from_secs(env_parse(
                "LIBRARIAN_CALL_TIMEOUT_SECS",
                defaults.call_timeout.as_secs(),
            )?),
            request_budget: Duration::from_secs(env_parse(
                "LIBRARIAN_REQUEST_BUDGET_SECS",
                defaults.request_budget.as_secs(),
            )?),
            structured_output: env_var_bool(
                "LIBRARIAN_STRUCTURED_OUTPUT",
                defaults.structured_output,
            ),
            ..defaults
        };

        config.validate()?;
        Ok(config)
    }

    /// Create a config with default values (useful for testing).
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            api_url: ANTHROPIC_API_URL.to_string(),
            model: "claude-haiku-4-5-20251001".to_string(),
            max_tokens: 32_000,
            preview_chars: 5_000,
            max_concurrent_tasks: 3,
            call_timeout: Duration::from_secs(300),
            request_budget: Duration::from_secs(1_800),
            structured_output: true,
        }
    }

    /// Reject values that would stall the pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = |name: &str| {
            Err(ConfigError::InvalidValue(
                name.to_string(),
                "must be greater than zero".to_string(),
            ))
        };
        if self.max_tokens == 0 {
            return zero("LIBRARIAN_MAX_TOKENS");
        }
        if self.max_concurrent_tasks == 0 {
            return zero("LIBRARIAN_MAX_CONCURRENT_TASKS");
        }
        if self.call_timeout.is_zero() {
            return zero("LIBRARIAN_CALL_TIMEOUT_SECS");
        }
        if self.request_budget.is_zero() {
            return zero("LIBRARIAN_REQUEST_BUDGET_SECS");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::new("key".into());
        assert!(config.validate().is_ok());
        assert_eq!(config.preview_chars, 5_000);
        assert_eq!(config.max_concurrent_tasks, 3);
        assert!(config.structured_output);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = Config {
            max_concurrent_tasks: 0,
            ..Config::new("key".into())
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("LIBRARIAN_MAX_CONCURRENT_TASKS"));
    }

    #[test]
    fn env_parse_reports_bad_values() {
        std::env::set_var("LIBRARIAN_TEST_BAD_NUMBER", "lots");
        let err = env_parse::<usize>("LIBRARIAN_TEST_BAD_NUMBER", 1).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue(name, _) if name == "LIBRARIAN_TEST_BAD_NUMBER"
        ));
        assert_eq!(env_parse::<usize>("LIBRARIAN_TEST_UNSET_NUMBER", 4).unwrap(), 4);
    }
}
