//! Transport abstraction for the F-Chat protocol.
//!
//! The [`Transport`] trait defines a bidirectional text frame channel between
//! the session and the chat server. Each frame is a command code optionally
//! followed by a JSON object, so implementations only have to move whole
//! text messages (WebSocket frames in the reference server).
//!
//! Opening a connection is the job of a [`Connector`]. The session calls
//! [`Connector::open`] on every connection attempt, so one connector can be
//! reused across reconnects while each attempt gets a fresh transport.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use fchat_session::error::FChatError;
//! use fchat_session::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, frame: String) -> Result<(), FChatError> {
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, FChatError>> {
//!         // Return None when the connection is closed cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), FChatError> {
//!         todo!()
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     type Transport = MyTransport;
//!
//!     async fn open(&self, url: &str) -> Result<MyTransport, FChatError> {
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::FChatError;

/// A bidirectional text frame transport.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because the session loop
/// polls it inside `tokio::select!`. Channel-based implementations (e.g.
/// wrapping `mpsc::Receiver`) are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one complete frame to the server.
    ///
    /// # Errors
    ///
    /// Returns [`FChatError::TransportSend`] if the frame could not be sent.
    async fn send(&mut self, frame: String) -> Result<(), FChatError>;

    /// Receive the next frame from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))` — a complete frame was received
    /// - `Some(Err(e))` — a transport error occurred
    /// - `None` — the connection was closed by the server
    async fn recv(&mut self) -> Option<Result<String, FChatError>>;

    /// Close the connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Implementations should
    /// still release resources in that case.
    async fn close(&mut self) -> Result<(), FChatError>;
}

/// Opens transports to a chat server endpoint.
///
/// A bounded connect timeout is the connector's responsibility; `open` must
/// report failure rather than hang.
#[async_trait]
pub trait Connector: Send + Sync {
    /// The transport produced by a successful open.
    type Transport: Transport;

    /// Open a new connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`FChatError::Connect`] (or [`FChatError::Timeout`]) when the
    /// connection cannot be established.
    async fn open(&self, url: &str) -> Result<Self::Transport, FChatError>;
}
