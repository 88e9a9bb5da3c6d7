//! WebSocket transport using `tokio-tungstenite`.
//!
//! The chat server speaks its text-command protocol over WebSocket text
//! frames, one command per frame. Both `ws://` and `wss://` URLs work; TLS is
//! handled by [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! # Feature gate
//!
//! Only available with the `transport-websocket` feature (on by default).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), fchat_session::FChatError> {
//! use fchat_session::transport::Connector;
//! use fchat_session::transports::WebSocketConnector;
//!
//! let connector = WebSocketConnector::new();
//! let transport = connector.open("wss://chat.f-list.net/chat2").await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use crate::error::FChatError;
use crate::transport::{Connector, Transport};

/// Default bound on establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// The underlying WebSocket stream.
///
/// Public so callers can wrap a stream they built themselves with
/// [`WebSocketTransport::from_stream`].
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] over one WebSocket connection.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe: dropping the future before it
/// completes loses no frames.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Open a WebSocket connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`FChatError::Connect`] if the URL is invalid or the handshake
    /// fails.
    pub async fn connect(url: &str) -> Result<Self, FChatError> {
        debug!(url = %url, "opening websocket");

        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| FChatError::Connect(e.to_string()))?;

        info!(url = %url, "websocket connected");
        Ok(Self::from_stream(stream))
    }

    /// Open a connection, failing with [`FChatError::Timeout`] if it takes
    /// longer than `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`FChatError::Timeout`] on deadline, otherwise whatever
    /// [`connect`](Self::connect) returns.
    pub async fn connect_with_timeout(url: &str, timeout: Duration) -> Result<Self, FChatError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| FChatError::Timeout)?
    }

    /// Wrap an already-established stream (custom TLS, proxies, headers).
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, frame: String) -> Result<(), FChatError> {
        if self.closed {
            return Err(FChatError::TransportClosed);
        }
        self.stream
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| FChatError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, FChatError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => return Some(Err(FChatError::TransportReceive(e.to_string()))),
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    debug!(?frame, "server sent close frame");
                    return None;
                }
                // tungstenite queues the pong itself.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Binary(_) => warn!("skipping binary websocket frame"),
                Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<(), FChatError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| FChatError::TransportSend(e.to_string()))
    }
}

/// [`Connector`] producing [`WebSocketTransport`]s with a bounded connect time.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    connect_timeout: Duration,
}

impl WebSocketConnector {
    /// Connector with the default 10 second connect timeout.
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn open(&self, url: &str) -> Result<WebSocketTransport, FChatError> {
        WebSocketTransport::connect_with_timeout(url, self.connect_timeout).await
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    type ServerStream = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    /// Accept one WebSocket connection, hand it to `handler`, return its URL.
    async fn serve_once<F, Fut>(handler: F) -> String
    where
        F: FnOnce(ServerStream) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    #[test]
    fn transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn invalid_url_is_connect_error() {
        let err = WebSocketTransport::connect("not-a-url").await.unwrap_err();
        assert!(matches!(err, FChatError::Connect(_)));
    }

    #[tokio::test]
    async fn unreachable_host_is_connect_error() {
        let err = WebSocketConnector::new()
            .open("ws://127.0.0.1:1")
            .await
            .unwrap_err();
        assert!(matches!(err, FChatError::Connect(_)));
    }

    #[tokio::test]
    async fn connector_enforces_timeout() {
        // TEST-NET-1 is never routable.
        let err = WebSocketConnector::new()
            .with_connect_timeout(Duration::from_millis(50))
            .open("ws://192.0.2.1:1")
            .await
            .unwrap_err();
        assert!(matches!(err, FChatError::Timeout));
    }

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let url = serve_once(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                assert!(text.starts_with("IDN "));
                ws.send(Message::Text(r#"IDN {"character":"Me"}"#.into()))
                    .await
                    .unwrap();
            }
            ws.send(Message::Text("PIN".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketConnector::new().open(&url).await.unwrap();
        transport
            .send(r#"IDN {"method":"ticket"}"#.to_string())
            .await
            .unwrap();

        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            r#"IDN {"character":"Me"}"#
        );
        assert_eq!(transport.recv().await.unwrap().unwrap(), "PIN");
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn binary_frames_are_skipped() {
        let url = serve_once(|mut ws| async move {
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text("PIN".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "PIN");
    }

    #[tokio::test]
    async fn send_after_close_fails_and_close_is_idempotent() {
        let url = serve_once(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} }).await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("PIN".to_string()).await.unwrap_err();
        assert!(matches!(err, FChatError::TransportClosed));
    }
}
