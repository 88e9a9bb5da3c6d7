//! # fchat-session
//!
//! Async session engine for the F-Chat text-command protocol.
//!
//! One [`FChatSession`] logs one character into a chat server, mirrors the
//! server's view of users and channels in a [`WorldState`], and delivers
//! typed [`ChatEvent`]s over a channel. Outbound commands go through a paced
//! FIFO queue that honors the server's flood delay.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement [`Transport`] and [`Connector`] for any
//!   framed text backend
//! - **WebSocket built-in**: the default `transport-websocket` feature
//!   provides [`WebSocketConnector`]
//! - **Account service**: the default `http-account` feature provides
//!   [`HttpAccountService`] for tickets and the JSON API
//! - **Keepalive watchdog**: a silent connection closes itself as
//!   [`DisconnectReason::Stale`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(all(feature = "transport-websocket", feature = "http-account"))]
//! # async fn example() -> Result<(), fchat_session::FChatError> {
//! use std::sync::Arc;
//!
//! use fchat_session::{
//!     ChatEvent, FChatSession, HttpAccountService, SessionConfig, TicketManager,
//!     WebSocketConnector,
//! };
//!
//! let service = Arc::new(HttpAccountService::new()?);
//! let tickets = TicketManager::new(service, "account", "password");
//! let config = SessionConfig::new("account", "My Character");
//!
//! let (mut session, mut events) =
//!     FChatSession::connect(&WebSocketConnector::new(), &tickets, config).await?;
//! session.join_channel("Frontpage")?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ChatEvent::ChannelMessage { channel, character, message } => {
//!             println!("[{channel}] {character}: {message}");
//!         }
//!         ChatEvent::Disconnected { reason } => {
//!             println!("disconnected: {reason}");
//!             break;
//!         }
//!         _ => {}
//!     }
//! }
//! session.close().await;
//! # Ok(())
//! # }
//! ```

pub mod account;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod protocol;
pub mod queue;
pub mod reconnect;
pub mod session;
pub mod ticket;
pub mod transport;
pub mod transports;
pub mod watchdog;
pub mod world;

// Re-export primary types for ergonomic imports.
pub use config::SessionConfig;
pub use error::{FChatError, Inconsistency, Result};
pub use event::{ChatEvent, DisconnectReason};
pub use protocol::{ChannelMode, ClientCommand, Status, TypingStatus};
pub use reconnect::ReconnectPolicy;
pub use session::{FChatSession, SessionState};
pub use ticket::{AccountApi, AccountService, TicketManager};
pub use transport::{Connector, Transport};
pub use world::WorldState;

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};

#[cfg(feature = "http-account")]
pub use account::http::HttpAccountService;
