//! Error types for the mr-conflict-checker core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them for callers that want a single
//! error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    GitLab(#[from] GitLabError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Report(#[from] ReportError),
}

// ---------------------------------------------------------------------------
// GitLab API errors
// ---------------------------------------------------------------------------

/// Errors from GitLab REST API interactions.
#[derive(Debug, Error)]
pub enum GitLabError {
    /// Token is missing, expired, or rejected (HTTP 401).
    #[error("GitLab authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Upstream throttling (HTTP 429). Not retried.
    #[error("GitLab rate limit exceeded (retry after: {})", retry_after.as_deref().unwrap_or("unknown"))]
    RateLimited { retry_after: Option<String> },

    /// The API returned any other non-success status code.
    #[error("GitLab API error (HTTP {status}): {body}")]
    ApiError { status: u16, body: String },

    /// Network-level failure (DNS, connect, TLS, timeout).
    #[error("GitLab transport error: {0}")]
    TransportError(#[from] reqwest::Error),

    /// The response body could not be decoded.
    #[error("GitLab response parse error: {0}")]
    ParseError(String),

    /// The caller's cancellation signal fired.
    #[error("request cancelled")]
    Cancelled,

    /// The client was closed and its rate limiter stopped.
    #[error("GitLab client is closed")]
    ClientClosed,
}

impl GitLabError {
    /// Whether this error comes from the caller aborting the run rather than
    /// from the upstream API.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML / YAML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is missing or invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Report errors
// ---------------------------------------------------------------------------

/// Errors from writing the markdown report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Creating the output directory or writing the file failed.
    #[error("report I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Every candidate filename up to the suffix limit already exists.
    #[error("no free report filename in '{0}'")]
    NoFreeFilename(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = GitLabError::AuthenticationFailed("invalid token".into());
        assert_eq!(
            err.to_string(),
            "GitLab authentication failed: invalid token"
        );

        let err = GitLabError::RateLimited { retry_after: None };
        assert!(err.to_string().contains("rate limit"));
        assert!(err.to_string().contains("unknown"));

        let err = GitLabError::ApiError {
            status: 404,
            body: "404 Project Not Found".into(),
        };
        assert_eq!(
            err.to_string(),
            "GitLab API error (HTTP 404): 404 Project Not Found"
        );

        let err = ConfigError::InvalidValue {
            field: "gitlab.token".into(),
            detail: "token must not be empty".into(),
        };
        assert!(err.to_string().contains("gitlab.token"));
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let core_err: CoreError = GitLabError::Cancelled.into();
        assert!(matches!(core_err, CoreError::GitLab(GitLabError::Cancelled)));

        let core_err: CoreError = ReportError::NoFreeFilename("/tmp".into()).into();
        assert!(matches!(core_err, CoreError::Report(_)));
    }

    #[test]
    fn test_is_cancelled() {
        assert!(GitLabError::Cancelled.is_cancelled());
        assert!(!GitLabError::ClientClosed.is_cancelled());
    }
}
