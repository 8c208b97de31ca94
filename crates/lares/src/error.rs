//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use lares_config::ConfigError;
use lares_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const REJECTED: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to the panel at {host}")]
    #[diagnostic(
        code(lares::connection_failed),
        help(
            "Check that the panel is reachable and the port is right.\n\
             Panels with only TLS enabled need --secure."
        )
    )]
    ConnectionFailed {
        host: String,
        #[source]
        source: CoreError,
    },

    #[error("The panel rejected the login")]
    #[diagnostic(
        code(lares::auth_failed),
        help("Check the PIN. Store it with: lares config set-pin")
    )]
    AuthFailed,

    #[error("Initial panel data not received within {seconds}s")]
    #[diagnostic(
        code(lares::timeout),
        help("Raise initial_data_timeout_secs or check the panel load.")
    )]
    Timeout { seconds: u64 },

    // ── Commands ─────────────────────────────────────────────────────

    #[error("The panel did not confirm: {action}")]
    #[diagnostic(
        code(lares::rejected),
        help("Run with -v to see the panel reply. Security commands may need --pin.")
    )]
    Rejected { action: String },

    #[error(transparent)]
    #[diagnostic(code(lares::core))]
    Core(CoreError),

    // ── Configuration ────────────────────────────────────────────────

    #[error("No panel host configured")]
    #[diagnostic(
        code(lares::no_host),
        help(
            "Pass --host, set KSENIA_HOST, or add `host = \"...\"` to\n\
             {path}"
        )
    )]
    NoHost { path: String },

    #[error("No PIN configured for panel '{host}'")]
    #[diagnostic(
        code(lares::no_pin),
        help("Set KSENIA_PIN, add `pin` to the config file, or run: lares config set-pin")
    )]
    NoPin { host: String },

    #[error(transparent)]
    #[diagnostic(code(lares::config))]
    Config(ConfigError),

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(lares::validation))]
    Validation { field: String, reason: String },

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    #[diagnostic(code(lares::json))]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    #[diagnostic(code(lares::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed => exit_code::AUTH,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::Validation { .. } | Self::NoHost { .. } | Self::NoPin { .. } => exit_code::USAGE,
            Self::Core(e) if e.is_connection_lost() => exit_code::CONNECTION,
            _ => exit_code::GENERAL,
        }
    }

    /// A connect failure for `host`, sorted by cause.
    pub fn connect(host: &str, err: CoreError) -> Self {
        match err {
            CoreError::LoginRejected { .. } => Self::AuthFailed,
            CoreError::ConnectionFailed { .. }
            | CoreError::RetriesExhausted { .. }
            | CoreError::Api(_) => Self::ConnectionFailed {
                host: host.to_owned(),
                source: err,
            },
            other => Self::Core(other),
        }
    }
}

// ── Conversions ──────────────────────────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::MissingHost => Self::NoHost {
                path: lares_config::config_path().display().to_string(),
            },
            ConfigError::MissingPin { host } => Self::NoPin { host },
            other => Self::Config(other),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::LoginRejected { .. } => Self::AuthFailed,
            other => Self::Core(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_errors_map_to_connection_exit_code() {
        let err = CliError::connect("panel", CoreError::RetriesExhausted { attempts: 3 });
        assert_eq!(err.exit_code(), exit_code::CONNECTION);

        let err = CliError::connect("panel", CoreError::LoginRejected { login_id: -1 });
        assert_eq!(err.exit_code(), exit_code::AUTH);
    }

    #[test]
    fn missing_settings_are_usage_errors() {
        assert_eq!(CliError::from(ConfigError::MissingHost).exit_code(), exit_code::USAGE);
        let err = CliError::from(ConfigError::MissingPin { host: "p".into() });
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }
}
