//! Error types for the F-Chat session engine.

use thiserror::Error;

/// Errors that can occur when using the F-Chat session engine.
#[derive(Debug, Error)]
pub enum FChatError {
    /// The account service refused to issue a ticket.
    #[error("ticket request failed: {0}")]
    Auth(String),

    /// An account API endpoint returned an error body.
    #[error("account api error: {0}")]
    Api(String),

    /// The HTTP request to the account service failed.
    #[error("http error: {0}")]
    Http(String),

    /// Failed to open the transport to the chat server.
    #[error("connect error: {0}")]
    Connect(String),

    /// Failed to send a frame through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a payload.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an active session.
    #[error("not connected to server")]
    NotConnected,

    /// A required command argument was empty.
    #[error("missing required argument: {0}")]
    InvalidArgument(&'static str),

    /// No keepalive arrived within the watchdog threshold.
    #[error("connection went stale")]
    StaleConnection,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,
}

/// A specialized [`Result`] type for session operations.
pub type Result<T> = std::result::Result<T, FChatError>;

/// An inbound event referenced state the local mirror does not have.
///
/// Produced by [`WorldState`](crate::world::WorldState) mutations and logged
/// by the dispatcher; never surfaced to the caller as a failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Inconsistency {
    /// The named channel is not known.
    #[error("unknown channel {0:?}")]
    UnknownChannel(String),

    /// The named user is not known.
    #[error("unknown user {0:?}")]
    UnknownUser(String),
}
