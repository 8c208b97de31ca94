// Socket layer for the panel connection.
//
// `Transport` is the narrow byte-pipe the session layer talks to, and
// `Connector` opens one. The tungstenite implementation lives here; tests
// in other crates substitute scripted in-memory pairs.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_tungstenite::{Connector as TlsConnector, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::Error;

/// Path of the panel's WebSocket endpoint.
pub const ENDPOINT_PATH: &str = "/KseniaWsock";

/// Sub-protocol the panel requires on the upgrade request.
pub const SUB_PROTOCOL: &str = "KS_WSOCK";

/// Close code reported when the stream ends without a close frame.
const ABNORMAL_CLOSE: u16 = 1006;

// ── Security mode ────────────────────────────────────────────────────

/// Plain `ws://` or encrypted `wss://`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityMode {
    #[default]
    Plain,
    /// TLS without certificate verification; panels ship self-signed certs.
    Secure,
}

impl SecurityMode {
    fn scheme(self) -> &'static str {
        match self {
            Self::Plain => "ws",
            Self::Secure => "wss",
        }
    }
}

// ── Traits ───────────────────────────────────────────────────────────

/// An open, framed text connection to the panel.
pub trait Transport: Send {
    fn send_text(&mut self, text: String) -> BoxFuture<'_, Result<(), Error>>;

    /// Next text frame. Control frames are handled internally; a peer
    /// close surfaces as [`Error::WebSocketClosed`].
    fn recv_text(&mut self) -> BoxFuture<'_, Result<String, Error>>;

    /// Send a ping and wait for its pong. Text frames that arrive in the
    /// meantime are kept for the next [`recv_text`](Self::recv_text).
    fn ping(&mut self) -> BoxFuture<'_, Result<(), Error>>;

    fn close(&mut self) -> BoxFuture<'_, Result<(), Error>>;
}

/// Opens transports to one panel.
pub trait Connector: Send + Sync {
    fn connect(&self, mode: SecurityMode) -> BoxFuture<'_, Result<Box<dyn Transport>, Error>>;
}

// ── Tungstenite implementation ───────────────────────────────────────

/// Connects to `host:port` over tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct WsConnector {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Endpoint URL for the given mode.
    pub fn endpoint(&self, mode: SecurityMode) -> Result<Url, Error> {
        let raw = format!(
            "{}://{}:{}{ENDPOINT_PATH}",
            mode.scheme(),
            self.host,
            self.port
        );
        Ok(Url::parse(&raw)?)
    }

    async fn open(&self, mode: SecurityMode) -> Result<Box<dyn Transport>, Error> {
        let url = self.endpoint(mode)?;
        tracing::info!(url = %url, "Connecting to panel");

        let uri: tungstenite::http::Uri = url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;
        let request = ClientRequestBuilder::new(uri).with_sub_protocol(SUB_PROTOCOL);

        let tls = match mode {
            SecurityMode::Plain => None,
            SecurityMode::Secure => Some(TlsConnector::Rustls(Arc::new(insecure_tls_config()?))),
        };

        let connecting =
            tokio_tungstenite::connect_async_tls_with_config(request, None, false, tls);
        let (stream, _response) = tokio::time::timeout(self.connect_timeout, connecting)
            .await
            .map_err(|_| Error::Timeout {
                timeout_secs: self.connect_timeout.as_secs(),
            })?
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        tracing::info!("Panel socket open");
        Ok(Box::new(WsTransport::new(stream)))
    }
}

impl Connector for WsConnector {
    fn connect(&self, mode: SecurityMode) -> BoxFuture<'_, Result<Box<dyn Transport>, Error>> {
        Box::pin(self.open(mode))
    }
}

/// A tungstenite stream plus text frames buffered while awaiting a pong.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    buffered: VecDeque<String>,
}

impl WsTransport {
    fn new(stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        Self {
            stream,
            buffered: VecDeque::new(),
        }
    }

    /// Read until a data frame or a pong. `Ok(None)` means a pong arrived.
    async fn next_data(&mut self) -> Result<Option<String>, Error> {
        loop {
            match self.stream.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    return Ok(Some(text.as_str().to_owned()));
                }
                Some(Ok(tungstenite::Message::Binary(bytes))) => {
                    return Ok(Some(String::from_utf8_lossy(&bytes).into_owned()));
                }
                Some(Ok(tungstenite::Message::Pong(_))) => return Ok(None),
                Some(Ok(tungstenite::Message::Ping(_) | tungstenite::Message::Frame(_))) => {
                    // tungstenite queues the pong reply itself
                    tracing::trace!("panel ping");
                }
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    let (code, reason) = frame.map_or((ABNORMAL_CLOSE, String::new()), |cf| {
                        (u16::from(cf.code), cf.reason.as_str().to_owned())
                    });
                    return Err(Error::WebSocketClosed { code, reason });
                }
                Some(Err(
                    tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed,
                ))
                | None => {
                    return Err(Error::WebSocketClosed {
                        code: ABNORMAL_CLOSE,
                        reason: "stream ended".into(),
                    });
                }
                Some(Err(e)) => return Err(Error::WebSocketIo(e.to_string())),
            }
        }
    }
}

impl Transport for WsTransport {
    fn send_text(&mut self, text: String) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async move {
            self.stream
                .send(tungstenite::Message::Text(text.into()))
                .await
                .map_err(|e| Error::WebSocketIo(e.to_string()))
        })
    }

    fn recv_text(&mut self) -> BoxFuture<'_, Result<String, Error>> {
        Box::pin(async move {
            if let Some(text) = self.buffered.pop_front() {
                return Ok(text);
            }
            loop {
                if let Some(text) = self.next_data().await? {
                    return Ok(text);
                }
            }
        })
    }

    fn ping(&mut self) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async move {
            self.stream
                .send(tungstenite::Message::Ping(Vec::new().into()))
                .await
                .map_err(|e| Error::WebSocketIo(e.to_string()))?;
            loop {
                match self.next_data().await? {
                    None => return Ok(()),
                    Some(text) => self.buffered.push_back(text),
                }
            }
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async move {
            self.stream
                .close(None)
                .await
                .map_err(|e| Error::WebSocketIo(e.to_string()))
        })
    }
}

// ── TLS ──────────────────────────────────────────────────────────────

fn insecure_tls_config() -> Result<rustls::ClientConfig, Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert { provider }))
        .with_no_client_auth();
    Ok(config)
}

/// Certificate verifier that accepts whatever the panel presents while
/// still checking handshake signatures.
#[derive(Debug)]
struct AcceptAnyCert {
    provider: Arc<rustls::crypto::CryptoProvider>,
}

impl rustls::client::danger::ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls_pki_types::CertificateDer<'_>,
        _intermediates: &[rustls_pki_types::CertificateDer<'_>],
        _server_name: &rustls_pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls_pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &rustls_pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &rustls_pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_per_mode() {
        let connector = WsConnector::new("192.168.1.50", 8443);
        assert_eq!(
            connector.endpoint(SecurityMode::Plain).unwrap().as_str(),
            "ws://192.168.1.50:8443/KseniaWsock"
        );
        assert_eq!(
            connector.endpoint(SecurityMode::Secure).unwrap().as_str(),
            "wss://192.168.1.50:8443/KseniaWsock"
        );
    }

    #[test]
    fn default_port_is_elided_but_kept_as_target() {
        let connector = WsConnector::new("192.168.1.50", 443);
        let secure = connector.endpoint(SecurityMode::Secure).unwrap();
        assert_eq!(secure.as_str(), "wss://192.168.1.50/KseniaWsock");
        assert_eq!(secure.port_or_known_default(), Some(443));

        let plain = connector.endpoint(SecurityMode::Plain).unwrap();
        assert_eq!(plain.as_str(), "ws://192.168.1.50:443/KseniaWsock");
    }

    #[test]
    fn endpoint_rejects_bad_host() {
        let connector = WsConnector::new("bad host", 80);
        assert!(matches!(
            connector.endpoint(SecurityMode::Plain),
            Err(Error::InvalidUrl(_))
        ));
    }

    #[test]
    fn insecure_tls_config_builds() {
        assert!(insecure_tls_config().is_ok());
    }
}
