//! # Echo Bot Example
//!
//! Logs a character into chat, joins a channel, and echoes private messages
//! back to their sender. Reconnects with exponential backoff whenever the
//! session ends for any reason other than Ctrl+C.
//!
//! ## Running
//!
//! ```sh
//! FCHAT_ACCOUNT=myaccount FCHAT_PASSWORD=secret FCHAT_CHARACTER="My Bot" \
//!     cargo run --example echo_bot
//!
//! # Join a different channel:
//! FCHAT_CHANNEL=Frontpage cargo run --example echo_bot
//! ```

use std::sync::Arc;

use fchat_session::{
    ChatEvent, DisconnectReason, FChatSession, HttpAccountService, ReconnectPolicy,
    SessionConfig, TicketManager, WebSocketConnector,
};
use tokio::sync::mpsc;

/// Channel joined when `FCHAT_CHANNEL` is not set.
const DEFAULT_CHANNEL: &str = "Development";

fn env(name: &str) -> Result<String, Box<dyn std::error::Error>> {
    std::env::var(name).map_err(|_| format!("{name} must be set").into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=fchat_session=debug` to see every frame.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let account = env("FCHAT_ACCOUNT")?;
    let password = env("FCHAT_PASSWORD")?;
    let character = env("FCHAT_CHARACTER")?;
    let channel = std::env::var("FCHAT_CHANNEL").unwrap_or_else(|_| DEFAULT_CHANNEL.to_string());

    let service = Arc::new(HttpAccountService::new()?);
    let tickets = TicketManager::new(service, account.clone(), password);
    let connector = WebSocketConnector::new();
    let mut policy = ReconnectPolicy::new();

    // ── Supervisor ──────────────────────────────────────────────────
    loop {
        let config = SessionConfig::new(account.clone(), character.clone())
            .with_log_filter(["NLN", "FLN", "STA", "LIS"]);

        let (mut session, events) = match FChatSession::connect(&connector, &tickets, config).await
        {
            Ok(pair) => pair,
            Err(e) => {
                let delay = policy.next_delay();
                tracing::warn!("connect failed: {e}; retrying in {delay:?}");
                policy.on_failure();
                tokio::select! {
                    () = tokio::time::sleep(delay) => continue,
                    _ = tokio::signal::ctrl_c() => return Ok(()),
                }
            }
        };
        policy.on_success();
        session.join_channel(&channel)?;

        let ended = tokio::select! {
            reason = run(&session, events) => Some(reason),
            _ = tokio::signal::ctrl_c() => None,
        };
        match ended {
            Some(DisconnectReason::ClientClosed) => return Ok(()),
            Some(reason) => {
                tracing::warn!("session ended: {reason}");
                // A rejected ticket is the usual reason a live session is
                // dropped at once, so fetch a fresh one.
                tickets.invalidate().await;
            }
            None => {
                tracing::info!("Ctrl+C received, shutting down");
                session.close().await;
                return Ok(());
            }
        }

        let delay = policy.next_delay();
        policy.on_failure();
        tokio::time::sleep(delay).await;
    }
}

/// Handle events until the session ends.
async fn run(session: &FChatSession, mut events: mpsc::Receiver<ChatEvent>) -> DisconnectReason {
    while let Some(event) = events.recv().await {
        match event {
            ChatEvent::PrivateMessage { character, message } => {
                tracing::info!("{character} says: {message}");
                if let Err(e) = session.send_private_message(&character, &message) {
                    tracing::warn!("could not echo: {e}");
                }
            }
            ChatEvent::ChannelJoined {
                channel, character, ..
            } if character == session.character() => {
                let world = session.world().await;
                let members = world.channel(&channel).map_or(0, |c| c.member_count);
                tracing::info!("joined {channel} ({members} members)");
            }
            ChatEvent::Error { number, message } => {
                tracing::warn!("server error {number}: {message}");
            }
            ChatEvent::Disconnected { reason } => return reason,
            _ => {}
        }
    }
    session.closed().await
}
