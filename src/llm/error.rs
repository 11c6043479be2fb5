//! Backend error types with retry classification.
//!
//! Every failure of the text-generation service surfaces as one `LlmError`.
//! The kind decides whether the client retries it.

use std::time::Duration;

/// Error from a text-generation backend call.
#[derive(Debug, Clone)]
pub struct LlmError {
    /// The kind of error
    pub kind: LlmErrorKind,
    /// HTTP status code, if applicable
    pub status_code: Option<u16>,
    /// Error message
    pub message: String,
    /// Suggested retry delay (from Retry-After header)
    pub retry_after: Option<Duration>,
}

impl LlmError {
    fn new(kind: LlmErrorKind, status_code: Option<u16>, message: String) -> Self {
        Self {
            kind,
            status_code,
            message,
            retry_after: None,
        }
    }

    /// Create a rate limit error.
    pub fn rate_limited(message: String, retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::new(LlmErrorKind::RateLimited, Some(429), message)
        }
    }

    /// Create a server error (5xx, or the provider reported itself overloaded).
    pub fn server_error(status_code: u16, message: String) -> Self {
        Self::new(LlmErrorKind::ServerError, Some(status_code), message)
    }

    /// Create an authentication error (bad or missing API key).
    pub fn authentication(status_code: u16, message: String) -> Self {
        Self::new(LlmErrorKind::Authentication, Some(status_code), message)
    }

    /// Create a client error (malformed request, unknown model, ...).
    pub fn client_error(status_code: u16, message: String) -> Self {
        Self::new(LlmErrorKind::ClientError, Some(status_code), message)
    }

    /// Create a network error.
    pub fn network_error(message: String) -> Self {
        Self::new(LlmErrorKind::NetworkError, None, message)
    }

    /// Create a parse error.
    pub fn parse_error(message: String) -> Self {
        Self::new(LlmErrorKind::ParseError, None, message)
    }

    /// Build the error matching an HTTP failure status.
    pub fn from_status(status_code: u16, body: String, retry_after: Option<Duration>) -> Self {
        match classify_http_status(status_code) {
            LlmErrorKind::RateLimited => Self::rate_limited(body, retry_after),
            LlmErrorKind::Authentication => Self::authentication(status_code, body),
            LlmErrorKind::ClientError => Self::client_error(status_code, body),
            _ => Self::server_error(status_code, body),
        }
    }

    /// Check if this error is transient and should be retried.
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    /// Get the suggested delay before retry number `attempt` (0-based).
    ///
    /// Returns `retry_after` if the provider sent one, otherwise exponential
    /// backoff from a per-kind base, capped at 60 seconds.
    pub fn suggested_delay(&self, attempt: u32) -> Duration {
        if let Some(retry_after) = self.retry_after {
            return retry_after;
        }

        let base_delay = match self.kind {
            LlmErrorKind::RateLimited => Duration::from_secs(5),
            LlmErrorKind::ServerError => Duration::from_secs(2),
            _ => Duration::from_secs(1),
        };

        let multiplier = 2u64.saturating_pow(attempt);
        let delay_secs = base_delay.as_secs().saturating_mul(multiplier);

        // Deterministic jitter, up to 25% of the delay
        let jitter_range = delay_secs / 4;
        let jitter = if jitter_range > 0 {
            (attempt as u64 * 7) % jitter_range
        } else {
            0
        };

        Duration::from_secs((delay_secs + jitter).min(60))
    }
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "{} (HTTP {}): {}", self.kind, code, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for LlmError {}

/// Classification of backend errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Rate limited (429) - transient, retry with backoff
    RateLimited,
    /// Server error or overload (5xx, 529) - transient
    ServerError,
    /// Authentication failure (401, 403) - permanent
    Authentication,
    /// Other client error (400, 404, 413, ...) - permanent
    ClientError,
    /// Connection failed or timed out - transient
    NetworkError,
    /// Response body could not be understood - permanent
    ParseError,
}

impl LlmErrorKind {
    /// Check if this error kind is transient.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmErrorKind::RateLimited | LlmErrorKind::ServerError | LlmErrorKind::NetworkError
        )
    }
}

impl std::fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmErrorKind::RateLimited => write!(f, "Rate limited"),
            LlmErrorKind::ServerError => write!(f, "Server error"),
            LlmErrorKind::Authentication => write!(f, "Authentication failed"),
            LlmErrorKind::ClientError => write!(f, "Client error"),
            LlmErrorKind::NetworkError => write!(f, "Network error"),
            LlmErrorKind::ParseError => write!(f, "Parse error"),
        }
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Maximum total time to spend retrying
    pub max_retry_duration: Duration,
    /// Whether to retry on rate limit errors
    pub retry_rate_limits: bool,
    /// Whether to retry on server errors
    pub retry_server_errors: bool,
    /// Whether to retry on network errors
    pub retry_network_errors: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_retry_duration: Duration::from_secs(120),
            retry_rate_limits: true,
            retry_server_errors: true,
            retry_network_errors: true,
        }
    }
}

impl RetryConfig {
    /// No retries at all.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Check if the given error should be retried based on this config.
    pub fn should_retry(&self, error: &LlmError) -> bool {
        match error.kind {
            LlmErrorKind::RateLimited => self.retry_rate_limits,
            LlmErrorKind::ServerError => self.retry_server_errors,
            LlmErrorKind::NetworkError => self.retry_network_errors,
            LlmErrorKind::Authentication | LlmErrorKind::ClientError | LlmErrorKind::ParseError => {
                false
            }
        }
    }
}

/// Parse HTTP status code into error kind.
///
/// 529 is the Messages API's "overloaded" status.
pub fn classify_http_status(status: u16) -> LlmErrorKind {
    match status {
        429 => LlmErrorKind::RateLimited,
        401 | 403 => LlmErrorKind::Authentication,
        400..=499 => LlmErrorKind::ClientError,
        _ => LlmErrorKind::ServerError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(LlmErrorKind::RateLimited.is_transient());
        assert!(LlmErrorKind::ServerError.is_transient());
        assert!(LlmErrorKind::NetworkError.is_transient());
        assert!(!LlmErrorKind::Authentication.is_transient());
        assert!(!LlmErrorKind::ClientError.is_transient());
        assert!(!LlmErrorKind::ParseError.is_transient());
    }

    #[test]
    fn test_http_status_classification() {
        assert_eq!(classify_http_status(429), LlmErrorKind::RateLimited);
        assert_eq!(classify_http_status(500), LlmErrorKind::ServerError);
        assert_eq!(classify_http_status(529), LlmErrorKind::ServerError);
        assert_eq!(classify_http_status(401), LlmErrorKind::Authentication);
        assert_eq!(classify_http_status(403), LlmErrorKind::Authentication);
        assert_eq!(classify_http_status(400), LlmErrorKind::ClientError);
        assert_eq!(classify_http_status(404), LlmErrorKind::ClientError);
    }

    #[test]
    fn test_from_status_keeps_retry_after() {
        let err = LlmError::from_status(429, "slow down".into(), Some(Duration::from_secs(9)));
        assert_eq!(err.kind, LlmErrorKind::RateLimited);
        assert_eq!(err.suggested_delay(3), Duration::from_secs(9));

        let err = LlmError::from_status(401, "bad key".into(), None);
        assert!(!RetryConfig::default().should_retry(&err));
    }

    #[test]
    fn test_exponential_backoff() {
        let error = LlmError::server_error(503, "test".to_string());

        let delay_0 = error.suggested_delay(0);
        let delay_1 = error.suggested_delay(1);
        let delay_2 = error.suggested_delay(2);
        assert!(delay_1 > delay_0);
        assert!(delay_2 > delay_1);

        assert!(error.suggested_delay(10).as_secs() <= 60);
    }

    #[test]
    fn test_disabled_retry_config() {
        let config = RetryConfig::disabled();
        assert_eq!(config.max_retries, 0);
        assert!(config.should_retry(&LlmError::network_error("x".into())));
    }

    #[test]
    fn test_display_includes_status() {
        let err = LlmError::client_error(400, "bad".into());
        assert_eq!(err.to_string(), "Client error (HTTP 400): bad");
        let err = LlmError::network_error("refused".into());
        assert_eq!(err.to_string(), "Network error: refused");
    }
}
