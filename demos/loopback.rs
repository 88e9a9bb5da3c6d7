//! # Loopback Example
//!
//! Runs a full session against an in-process fake server, no network needed.
//! Shows how to implement [`Transport`] and [`Connector`] for a custom
//! backend, and how the world state follows the frames the server sends.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example loopback
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use fchat_session::{
    AccountService, ChatEvent, Connector, FChatError, FChatSession, SessionConfig, TicketManager,
    Transport,
};
use serde_json::Value;
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// Step 1: A channel-based transport and its server half
// ─────────────────────────────────────────────────────────────────────

pub struct LoopbackTransport {
    /// Frames the client sends go here.
    tx: mpsc::UnboundedSender<String>,
    /// Frames the server sends arrive here.
    rx: mpsc::UnboundedReceiver<String>,
}

pub struct LoopbackServer {
    pub rx: mpsc::UnboundedReceiver<String>,
    pub tx: mpsc::UnboundedSender<String>,
}

fn loopback_pair() -> (LoopbackTransport, LoopbackServer) {
    let (client_tx, server_rx) = mpsc::unbounded_channel();
    let (server_tx, client_rx) = mpsc::unbounded_channel();
    (
        LoopbackTransport {
            tx: client_tx,
            rx: client_rx,
        },
        LoopbackServer {
            rx: server_rx,
            tx: server_tx,
        },
    )
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, frame: String) -> Result<(), FChatError> {
        self.tx
            .send(frame)
            .map_err(|e| FChatError::TransportSend(e.to_string()))
    }

    /// `None` once the server half is dropped.
    async fn recv(&mut self) -> Option<Result<String, FChatError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), FChatError> {
        self.rx.close();
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: A connector that hands out the prepared transport once
// ─────────────────────────────────────────────────────────────────────

struct LoopbackConnector {
    transport: Mutex<Option<LoopbackTransport>>,
}

#[async_trait]
impl Connector for LoopbackConnector {
    type Transport = LoopbackTransport;

    async fn open(&self, _url: &str) -> Result<LoopbackTransport, FChatError> {
        self.transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| FChatError::Connect("loopback already used".into()))
    }
}

/// Accepts any credentials.
struct OpenDoor;

#[async_trait]
impl AccountService for OpenDoor {
    async fn request_ticket(&self, account: &str, _password: &str) -> Result<String, FChatError> {
        Ok(format!("ticket-for-{account}"))
    }

    async fn call(&self, _endpoint: &str, _fields: &[(&str, &str)]) -> Result<Value, FChatError> {
        Ok(serde_json::json!({ "error": "" }))
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: A tiny scripted server
// ─────────────────────────────────────────────────────────────────────

async fn fake_server(mut server: LoopbackServer) {
    while let Some(frame) = server.rx.recv().await {
        println!("[server] got: {frame}");
        let replies: &[&str] = if frame.starts_with("IDN ") {
            &[
                r#"IDN {"character":"Loopback Bot"}"#,
                r#"VAR {"variable":"msg_flood","value":0.2}"#,
                r#"LIS {"characters":[["Loopback Bot","None","online",""],["Alice","Female","looking","Say hi!"]]}"#,
            ]
        } else if frame.starts_with("JCH ") {
            &[
                r#"JCH {"character":{"identity":"Loopback Bot"},"channel":"Frontpage","title":"Frontpage"}"#,
                r#"JCH {"character":{"identity":"Alice"},"channel":"Frontpage","title":"Frontpage"}"#,
                r#"PRI {"character":"Alice","message":"hello there"}"#,
            ]
        } else if frame.starts_with("PRI ") {
            &["PIN"]
        } else {
            &[]
        };
        for reply in replies {
            let _ = server.tx.send((*reply).to_string());
        }
        if frame == "PIN" {
            // Keepalive answered; end the conversation.
            break;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 4: Drive the session
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), FChatError> {
    let (transport, server) = loopback_pair();
    tokio::spawn(fake_server(server));

    let connector = LoopbackConnector {
        transport: Mutex::new(Some(transport)),
    };
    let tickets = TicketManager::new(Arc::new(OpenDoor), "demo", "demo");
    let config = SessionConfig::new("demo", "Loopback Bot")
        .with_url("loopback://")
        .with_settle_delay(Duration::from_millis(100));

    let (mut session, mut events) = FChatSession::connect(&connector, &tickets, config).await?;
    println!("[client] active, pacing at {:?}", session.outgoing_delay());
    session.join_channel("Frontpage")?;

    while let Some(event) = events.recv().await {
        match event {
            ChatEvent::ChannelJoined {
                channel, character, ..
            } => println!("[client] {character} joined {channel}"),
            ChatEvent::PrivateMessage { character, message } => {
                println!("[client] {character}: {message}");
                session.send_private_message(&character, &format!("you said: {message}"))?;
            }
            ChatEvent::Ping => {
                println!("[client] keepalive");
                break;
            }
            ChatEvent::Disconnected { reason } => {
                println!("[client] disconnected: {reason}");
                break;
            }
            _ => {}
        }
    }

    {
        let world = session.world().await;
        if let Some(channel) = world.channel("Frontpage") {
            println!(
                "[client] Frontpage has {} members: {:?}",
                channel.member_count,
                channel.members()
            );
        }
        if let Some(alice) = world.user("Alice") {
            println!("[client] Alice is {}: {}", alice.status.as_str(), alice.status_message);
        }
    }

    // Give the PIN reply time to leave the queue.
    tokio::time::sleep(Duration::from_millis(300)).await;
    session.close().await;
    println!("[client] closed: {}", session.closed().await);
    Ok(())
}
