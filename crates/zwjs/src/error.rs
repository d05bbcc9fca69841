//! CLI error types with miette diagnostics.
//!
//! Maps `zwjs_api::Error` and `ConfigError` variants into user-facing
//! errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use zwjs_api::Error as ApiError;
use zwjs_config::ConfigError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const REJECTED: i32 = 3;
    pub const DISABLED: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to Z-Wave JS Server at {url}")]
    #[diagnostic(
        code(zwjs::connection_failed),
        help(
            "Check that the server is running and reachable.\n\
             URL: {url}\n\
             Try: zwjs --server <host:port> listen"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Connection to the server was lost")]
    #[diagnostic(code(zwjs::disconnected))]
    Disconnected,

    #[error("Connection is not open (state: {state})")]
    #[diagnostic(code(zwjs::not_connected))]
    NotConnected { state: String },

    // ── Commands ─────────────────────────────────────────────────────

    #[error("The controller rejected '{command}'")]
    #[diagnostic(
        code(zwjs::rejected),
        help("Run with -v to see the server's reply, or watch events with: zwjs listen")
    )]
    Rejected { command: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(zwjs::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(zwjs::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: zwjs config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Profile '{profile}' is disabled")]
    #[diagnostic(
        code(zwjs::profile_disabled),
        help("Set `disabled = false` for the profile, or pick another with --profile.")
    )]
    ProfileDisabled { profile: String },

    #[error("Profile '{profile}' already exists")]
    #[diagnostic(
        code(zwjs::profile_exists),
        help("Use --force to overwrite it.")
    )]
    ProfileExists { profile: String },

    #[error("{0}")]
    #[diagnostic(code(zwjs::config))]
    Config(String),

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("Request timed out after {millis}ms")]
    #[diagnostic(
        code(zwjs::timeout),
        help("Increase timeout with --timeout or check server responsiveness.")
    )]
    Timeout { millis: u64 },

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(zwjs::json))]
    Json(#[from] serde_json::Error),

    #[error("Could not render YAML: {0}")]
    #[diagnostic(code(zwjs::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Disconnected | Self::NotConnected { .. } => {
                exit_code::CONNECTION
            }
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::ProfileDisabled { .. } => exit_code::DISABLED,
            Self::Validation { .. } | Self::ProfileExists { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── Library error mapping ────────────────────────────────────────────

impl From<ApiError> for CliError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::WebSocketConnect(reason) => CliError::ConnectionFailed {
                url: "(unknown)".into(),
                reason,
            },
            ApiError::ConnectionClosed => CliError::Disconnected,
            ApiError::NotConnected { state } | ApiError::AlreadyStarted { state } => {
                CliError::NotConnected {
                    state: state.to_string(),
                }
            }
            ApiError::Timeout { timeout_ms } => CliError::Timeout { millis: timeout_ms },
            ApiError::InvalidUrl(e) => CliError::Validation {
                field: "server".into(),
                reason: e.to_string(),
            },
            ApiError::Serialization(e) => CliError::Json(e),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::ProfileNotFound { name, available } => CliError::ProfileNotFound {
                name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
            },
            ConfigError::Disabled { profile } => CliError::ProfileDisabled { profile },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config(other.to_string()),
        }
    }
}
