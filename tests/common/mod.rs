#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for fchat-session integration tests.
//!
//! Provides a channel-based [`MockTransport`] driven from a [`ServerHandle`],
//! a [`MockConnector`] that hands it out, and a [`FakeAccountService`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use fchat_session::{
    AccountService, ChatEvent, Connector, FChatError, FChatSession, SessionConfig, TicketManager,
    Transport,
};

// ── MockTransport ───────────────────────────────────────────────────

/// A transport whose server side is a [`ServerHandle`].
///
/// `recv` yields whatever the handle pushes. Once the handle is dropped it
/// hangs forever so the session loop stays alive until closed.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Option<Result<String, FChatError>>>,
    sent: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
    stall: Arc<StdMutex<Option<Duration>>>,
}

/// Server side of a [`MockTransport`].
pub struct ServerHandle {
    to_client: mpsc::UnboundedSender<Option<Result<String, FChatError>>>,
    from_client: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
    stall: Arc<StdMutex<Option<Duration>>>,
}

impl MockTransport {
    pub fn pair() -> (Self, ServerHandle) {
        let (to_client, incoming) = mpsc::unbounded_channel();
        let (sent, from_client) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let stall = Arc::new(StdMutex::new(None));
        let transport = Self {
            incoming,
            sent,
            closed: Arc::clone(&closed),
            stall: Arc::clone(&stall),
        };
        let handle = ServerHandle {
            to_client,
            from_client,
            closed,
            stall,
        };
        (transport, handle)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: String) -> Result<(), FChatError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(FChatError::TransportClosed);
        }
        let stall = self.stall.lock().unwrap().take();
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
        }
        let _ = self.sent.send(frame);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, FChatError>> {
        match self.incoming.recv().await {
            Some(item) => item,
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), FChatError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

impl ServerHandle {
    /// Push one raw frame to the client.
    pub fn push(&self, raw: impl Into<String>) {
        self.to_client.send(Some(Ok(raw.into()))).unwrap();
    }

    /// Push a transport error.
    pub fn fail(&self, message: &str) {
        self.to_client
            .send(Some(Err(FChatError::TransportReceive(message.into()))))
            .unwrap();
    }

    /// Close the connection from the server side.
    pub fn hang_up(&self) {
        self.to_client.send(None).unwrap();
    }

    /// Make the client's next write take `duration` before it completes.
    pub fn stall_next_send(&self, duration: Duration) {
        *self.stall.lock().unwrap() = Some(duration);
    }

    /// Next frame the client sent, waiting up to 10 seconds.
    pub async fn next_sent(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(10), self.from_client.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("transport dropped")
    }

    /// Next client frame that is not a keepalive reply.
    pub async fn next_non_ping(&mut self) -> String {
        loop {
            let frame = self.next_sent().await;
            if frame != "PIN" {
                return frame;
            }
        }
    }

    /// Frames sent so far, without waiting.
    pub fn drain_sent(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            frames.push(frame);
        }
        frames
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// Hands out prepared transports in order; fails when none are left.
pub struct MockConnector {
    transports: StdMutex<VecDeque<MockTransport>>,
    opened: AtomicUsize,
    last_url: StdMutex<Option<String>>,
}

impl MockConnector {
    /// Connector with one transport ready.
    pub fn single() -> (Self, ServerHandle) {
        let (transport, handle) = MockTransport::pair();
        (Self::with_transports(vec![transport]), handle)
    }

    /// Connector whose every open fails.
    pub fn failing() -> Self {
        Self::with_transports(Vec::new())
    }

    pub fn with_transports(transports: Vec<MockTransport>) -> Self {
        Self {
            transports: StdMutex::new(VecDeque::from(transports)),
            opened: AtomicUsize::new(0),
            last_url: StdMutex::new(None),
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn last_url(&self) -> Option<String> {
        self.last_url.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn open(&self, url: &str) -> Result<MockTransport, FChatError> {
        *self.last_url.lock().unwrap() = Some(url.to_string());
        let next = self.transports.lock().unwrap().pop_front();
        match next {
            Some(transport) => {
                self.opened.fetch_add(1, Ordering::SeqCst);
                Ok(transport)
            }
            None => Err(FChatError::Connect("connection refused".into())),
        }
    }
}

// ── FakeAccountService ──────────────────────────────────────────────

/// Issues `ticket-<n>` for the password `hunter2` and records API calls.
#[derive(Default)]
pub struct FakeAccountService {
    pub ticket_calls: AtomicUsize,
    pub refuse: bool,
    pub calls: StdMutex<Vec<(String, Vec<(String, String)>)>>,
}

impl FakeAccountService {
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl AccountService for FakeAccountService {
    async fn request_ticket(&self, _account: &str, password: &str) -> Result<String, FChatError> {
        let n = self.ticket_calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse || password != "hunter2" {
            return Err(FChatError::Auth("Login failed.".into()));
        }
        Ok(format!("ticket-{n}"))
    }

    async fn call(&self, endpoint: &str, fields: &[(&str, &str)]) -> Result<Value, FChatError> {
        self.calls.lock().unwrap().push((
            endpoint.to_string(),
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ));
        Ok(serde_json::json!({ "error": "" }))
    }
}

pub fn tickets() -> TicketManager {
    TicketManager::new(Arc::new(FakeAccountService::default()), "acct", "hunter2")
}

// ── Session helpers ─────────────────────────────────────────────────

/// Config with no settle delay and a short pacing delay.
pub fn test_config() -> SessionConfig {
    SessionConfig::new("acct", "Me")
        .with_url("ws://mock")
        .with_settle_delay(Duration::ZERO)
        .with_outgoing_delay(Duration::from_millis(100))
}

/// Server confirmation of identification for the test character.
pub fn idn_frame() -> String {
    r#"IDN {"character":"Me"}"#.to_string()
}

/// Connect a session whose server immediately confirms identification.
///
/// The IDN frame the client sent is consumed from the handle.
pub async fn connected(
    config: SessionConfig,
) -> (FChatSession, mpsc::Receiver<ChatEvent>, ServerHandle) {
    let (connector, mut handle) = MockConnector::single();
    handle.push(idn_frame());
    let (session, events) = FChatSession::connect(&connector, &tickets(), config)
        .await
        .expect("connect");
    let identify = handle.next_sent().await;
    assert!(identify.starts_with("IDN "), "{identify}");
    (session, events, handle)
}

/// Next event, waiting up to 10 seconds.
pub async fn next_event(events: &mut mpsc::Receiver<ChatEvent>) -> ChatEvent {
    tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Skip events until one matches `pred`.
pub async fn wait_for_event<F>(events: &mut mpsc::Receiver<ChatEvent>, mut pred: F) -> ChatEvent
where
    F: FnMut(&ChatEvent) -> bool,
{
    loop {
        let event = next_event(events).await;
        if pred(&event) {
            return event;
        }
    }
}
