//! Configuration for mr-conflict-checker.
//!
//! Files ending in `.toml` are parsed as TOML; anything else is parsed as
//! YAML. The access token may be given inline or through an environment
//! variable named by `gitlab.token_env`, resolved at runtime via
//! [`AppConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// GitLab instance and access settings.
    pub gitlab: GitLabConfig,

    /// Report output settings.
    #[serde(default)]
    pub output: OutputConfig,
}

// ---------------------------------------------------------------------------
// GitLab
// ---------------------------------------------------------------------------

/// GitLab connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabConfig {
    /// Instance URL, e.g. `https://gitlab.example.com`. A trailing `/api/v4`
    /// is accepted and stripped by the client.
    #[serde(default)]
    pub url: String,

    /// Personal / project access token.
    #[serde(default)]
    pub token: String,

    /// Environment variable to read the token from when `token` is empty.
    #[serde(default)]
    pub token_env: Option<String>,

    /// Namespace (group) ids to scan. Empty = all.
    #[serde(default)]
    pub include_groups: Vec<u64>,

    /// Minimum milliseconds between API requests (default 100).
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,

    /// Per-request timeout in seconds (default 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_request_interval_ms() -> u64 {
    100
}
fn default_timeout_secs() -> u64 {
    30
}

impl GitLabConfig {
    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Report output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for generated reports. Unset means the CLI default.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML or YAML file.
    ///
    /// This does **not** resolve environment variables or validate. Call
    /// [`load_and_resolve`](Self::load_and_resolve) for that.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let config = if is_toml {
            Self::from_toml_str(&contents)?
        } else {
            Self::from_yaml_str(&contents)?
        };

        debug!("configuration parsed successfully");
        Ok(config)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Fill `gitlab.token` from `gitlab.token_env` when no inline token is
    /// set. A missing variable only logs a warning; [`validate`](Self::validate)
    /// reports the empty token.
    pub fn resolve_env_vars(&mut self) {
        if !self.gitlab.token.is_empty() {
            return;
        }
        if let Some(ref env_name) = self.gitlab.token_env {
            if let Some(token) = resolve_optional_env(env_name, "gitlab.token_env") {
                self.gitlab.token = token;
            }
        }
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gitlab.token.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "gitlab.token".into(),
                detail: "gitlab.token is required (inline or via gitlab.token_env)".into(),
            });
        }
        let url = self.gitlab.url.trim();
        if url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "gitlab.url".into(),
                detail: "gitlab.url is required".into(),
            });
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "gitlab.url".into(),
                detail: "gitlab.url must start with http:// or https://".into(),
            });
        }
        if self.gitlab.request_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "gitlab.request_interval_ms".into(),
                detail: "request interval must be > 0".into(),
            });
        }
        if self.gitlab.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "gitlab.timeout_secs".into(),
                detail: "timeout must be > 0".into(),
            });
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars();
        config.validate()?;
        Ok(config)
    }
}

/// Returns `Some(value)` for a set, non-empty variable; logs a warning and
/// returns `None` otherwise.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}

/// Sample configuration written by `mr-conflict-checker init`.
pub const SAMPLE_CONFIG: &str = r#"# mr-conflict-checker configuration

gitlab:
  # GitLab instance URL (a trailing /api/v4 is fine).
  url: "https://gitlab.example.com"

  # Access token with read_api scope. Either set it inline...
  token: ""
  # ...or name an environment variable to read it from.
  token_env: "GITLAB_TOKEN"

  # Only scan projects in these group (namespace) ids. Empty = all groups.
  include_groups: []

  # Minimum delay between API requests, in milliseconds.
  request_interval_ms: 100

  # Per-request timeout, in seconds.
  timeout_secs: 30

output:
  # Directory where MR-conflict-<timestamp>.md reports are written.
  directory: "."
"#;
