//! WebSocket delta feed
//!
//! This crate implements [`FeedConnector`] over a WebSocket connection to the
//! authority's feed endpoint.
//!
//! ## Handshake
//!
//! The `X-Identity` header carries the project identifier on every upgrade
//! request. Connecting happens once per call; reconnect timing belongs to the
//! engine.
//!
//! ## Message Mapping
//!
//! | WebSocket message   | [`FeedRead`]                              |
//! |---------------------|-------------------------------------------|
//! | Text / Binary       | `Fragment { end_of_message: true }`       |
//! | Raw frame           | `Fragment { end_of_message: header.fin }` |
//! | Close               | `Close { reason }`                        |
//! | Ping / Pong         | consumed here, never surfaced             |
//! | End of stream       | `Close { reason: None }`                  |
//!
//! tungstenite reassembles continuation frames itself, so reads normally
//! surface whole messages. The engine still owns the frame size limit.
//!
//! ## TLS
//!
//! `wss://` handshakes go through rustls, which needs a process-level
//! crypto provider. [`WebSocketConnector::new`] installs the aws-lc-rs
//! provider unless the host application already picked one.

use futures_util::{SinkExt, StreamExt};
use phishgate_core::SourceRegistry;
use phishgate_core::config::{FeedConfig, IDENTITY_HEADER, IdentityConfig};
use phishgate_core::traits::{FeedConnection, FeedConnector, FeedConnectorFactory, FeedRead};
use phishgate_core::{Error, Result};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector opening WebSocket connections to the delta feed
pub struct WebSocketConnector {
    /// Feed URL (`ws://` or `wss://`)
    url: String,

    /// Value of the identity header
    identity: HeaderValue,
}

impl WebSocketConnector {
    /// Create a new connector
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the identifier is not a valid header value.
    pub fn new(url: impl Into<String>, identity: &IdentityConfig) -> Result<Self> {
        identity.validate()?;
        install_crypto_provider();

        let identity = HeaderValue::from_str(&identity.project_identifier).map_err(|e| {
            Error::config(format!("Project identifier is not a valid header value: {}", e))
        })?;

        Ok(Self {
            url: url.into(),
            identity,
        })
    }

    /// URL this connector opens
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Install the default rustls crypto provider for this process
///
/// Fails only when a provider is already installed, which is fine.
fn install_crypto_provider() {
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_ok()
    {
        tracing::debug!("Installed aws-lc-rs as the rustls crypto provider");
    }
}

#[async_trait::async_trait]
impl FeedConnector for WebSocketConnector {
    async fn connect(&self) -> Result<Box<dyn FeedConnection>> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::transport(format!("Invalid feed request: {}", e)))?;

        request
            .headers_mut()
            .insert(IDENTITY_HEADER, self.identity.clone());

        let (stream, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| Error::transport(format!("WebSocket connect failed: {}", e)))?;

        tracing::debug!(
            "WebSocket handshake with {} completed ({})",
            self.url,
            response.status()
        );

        Ok(Box::new(WebSocketConnection { stream }))
    }

    fn transport_name(&self) -> &'static str {
        "websocket"
    }
}

/// An open WebSocket connection to the feed
pub struct WebSocketConnection {
    stream: WsStream,
}

#[async_trait::async_trait]
impl FeedConnection for WebSocketConnection {
    async fn read(&mut self) -> Result<FeedRead> {
        loop {
            let message = match self.stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(
                    tokio_tungstenite::tungstenite::Error::ConnectionClosed
                    | tokio_tungstenite::tungstenite::Error::AlreadyClosed,
                ))
                | None => return Ok(FeedRead::Close { reason: None }),
                Some(Err(e)) => return Err(Error::transport(format!("WebSocket read failed: {}", e))),
            };

            match message {
                WsMessage::Text(text) => return Ok(FeedRead::frame(text.as_str().as_bytes())),
                WsMessage::Binary(data) => return Ok(FeedRead::frame(data.to_vec())),
                WsMessage::Frame(frame) => {
                    let end_of_message = frame.header().is_final;
                    let data = frame.payload().to_vec();
                    return Ok(FeedRead::Fragment {
                        data,
                        end_of_message,
                    });
                }
                WsMessage::Close(frame) => {
                    let reason = frame
                        .map(|frame| frame.reason.as_str().to_string())
                        .filter(|reason| !reason.is_empty());
                    return Ok(FeedRead::Close { reason });
                }
                // Pongs to pings are queued by tungstenite and flushed on the next read
                WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            }
        }
    }

    async fn close(&mut self, reason: &str) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: reason.to_string().into(),
        };

        self.stream
            .close(Some(frame))
            .await
            .map_err(|e| Error::transport(format!("WebSocket close failed: {}", e)))
    }
}

/// Factory for creating WebSocket feed connectors
pub struct WebSocketFactory;

impl FeedConnectorFactory for WebSocketFactory {
    fn create(
        &self,
        config: &FeedConfig,
        identity: &IdentityConfig,
    ) -> Result<Box<dyn FeedConnector>> {
        match config {
            FeedConfig::WebSocket { url } => {
                Ok(Box::new(WebSocketConnector::new(url.clone(), identity)?))
            }
            _ => Err(Error::config("Invalid config for WebSocket feed")),
        }
    }
}

/// Register the WebSocket feed with a registry
pub fn register(registry: &SourceRegistry) {
    registry.register_feed("websocket", Box::new(WebSocketFactory));
}
