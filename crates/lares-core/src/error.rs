// ── Core error types ──
//
// Errors surfaced by lares-core. Wire-level failures are translated by
// the `From<lares_api::Error>` impl; command callers never see these,
// they only get a boolean outcome.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to panel: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Panel rejected the login (identity {login_id})")]
    LoginRejected { login_id: i64 },

    #[error("Gave up connecting to the panel after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Not connected to panel")]
    NotConnected,

    #[error("Panel request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Unexpected panel data: {0}")]
    Protocol(String),

    // ── API errors (wrapped) ─────────────────────────────────────────
    #[error(transparent)]
    Api(lares_api::Error),
}

impl CoreError {
    /// Returns `true` if the session has to be rebuilt after this error.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            Self::NotConnected => true,
            Self::Api(e) => e.is_connection_lost(),
            _ => false,
        }
    }

    /// Close code of a peer close, if that is what ended the connection.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Self::Api(e) => e.close_code(),
            _ => None,
        }
    }
}

// ── Conversion from wire-layer errors ────────────────────────────────

impl From<lares_api::Error> for CoreError {
    fn from(err: lares_api::Error) -> Self {
        match err {
            lares_api::Error::Timeout { timeout_secs } => Self::Timeout { timeout_secs },
            lares_api::Error::WebSocketConnect(reason) => Self::ConnectionFailed { reason },
            lares_api::Error::Tls(msg) => Self::ConnectionFailed {
                reason: format!("TLS error: {msg}"),
            },
            lares_api::Error::NotConnected => Self::NotConnected,
            other => Self::Api(other),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_errors_map_to_core_variants() {
        let e: CoreError = lares_api::Error::Timeout { timeout_secs: 10 }.into();
        assert!(matches!(e, CoreError::Timeout { timeout_secs: 10 }));

        let e: CoreError = lares_api::Error::WebSocketConnect("refused".into()).into();
        assert!(matches!(e, CoreError::ConnectionFailed { .. }));

        let e: CoreError = lares_api::Error::WebSocketClosed {
            code: 1006,
            reason: String::new(),
        }
        .into();
        assert!(e.is_connection_lost());
        assert_eq!(e.close_code(), Some(1006));
    }
}
