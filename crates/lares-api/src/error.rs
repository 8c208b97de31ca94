use thiserror::Error;

/// Top-level error type for the `lares-api` crate.
///
/// Covers every failure mode of the panel wire protocol: socket setup,
/// TLS, framing, and request/response exchanges. `lares-core` decides
/// which of these tear the session down.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// Socket or handshake failure while opening the connection.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// The peer closed the connection.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// Send or receive failed on an open connection.
    #[error("WebSocket I/O error: {0}")]
    WebSocketIo(String),

    /// URL building error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS configuration error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// No connection is open.
    #[error("Not connected to panel")]
    NotConnected,

    // ── Protocol ────────────────────────────────────────────────────
    /// JSON decoding failed, with the raw frame for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// A frame decoded but did not have the expected shape.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Returns `true` if the connection is unusable after this error and
    /// the session has to be rebuilt.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            Self::WebSocketClosed { .. } | Self::WebSocketIo(_) | Self::NotConnected
        )
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::WebSocketConnect(_)
                | Self::WebSocketClosed { .. }
                | Self::WebSocketIo(_)
                | Self::Timeout { .. }
        )
    }

    /// Close code carried by a peer close, if any.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Self::WebSocketClosed { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_is_transient_and_lost() {
        let err = Error::WebSocketClosed {
            code: 1000,
            reason: "Bye".into(),
        };
        assert!(err.is_transient());
        assert!(err.is_connection_lost());
        assert_eq!(err.close_code(), Some(1000));
    }

    #[test]
    fn protocol_errors_keep_connection() {
        let err = Error::Protocol("missing PAYLOAD".into());
        assert!(!err.is_connection_lost());
        assert!(!err.is_transient());
        assert_eq!(err.close_code(), None);
    }
}
