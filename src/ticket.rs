//! Ticket authentication and the account JSON API.
//!
//! Connecting to chat requires a short-lived ticket issued by the account
//! service for an account/password pair. [`TicketManager`] caches it for
//! [`TICKET_LIFETIME`] so reconnects and API calls within that window do not
//! hit the account service again.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{FChatError, Result};

/// How long an issued ticket stays valid.
pub const TICKET_LIFETIME: Duration = Duration::from_secs(30 * 60);

/// The account service that issues tickets and serves the JSON API.
///
/// An HTTP implementation is provided by
/// [`HttpAccountService`](crate::account::http::HttpAccountService) with the
/// `http-account` feature.
#[async_trait]
pub trait AccountService: Send + Sync + 'static {
    /// Exchange credentials for a ticket.
    ///
    /// # Errors
    ///
    /// Returns [`FChatError::Auth`] when the service refuses, or a transport
    /// level error (e.g. [`FChatError::Http`]) when it cannot be reached.
    async fn request_ticket(&self, account: &str, password: &str) -> Result<String>;

    /// Call a JSON API endpoint (e.g. `"character-data"`) with form fields.
    ///
    /// # Errors
    ///
    /// Returns [`FChatError::Http`] when the request fails.
    async fn call(&self, endpoint: &str, fields: &[(&str, &str)]) -> Result<Value>;
}

#[derive(Debug, Clone)]
struct CachedTicket {
    ticket: String,
    issued_at: Instant,
}

/// Acquires and caches API tickets.
pub struct TicketManager {
    service: Arc<dyn AccountService>,
    account: String,
    password: String,
    cached: Mutex<Option<CachedTicket>>,
}

impl TicketManager {
    pub fn new(
        service: Arc<dyn AccountService>,
        account: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            service,
            account: account.into(),
            password: password.into(),
            cached: Mutex::new(None),
        }
    }

    /// The account this manager authenticates.
    pub fn account(&self) -> &str {
        &self.account
    }

    /// The underlying account service.
    pub fn service(&self) -> &Arc<dyn AccountService> {
        &self.service
    }

    /// Return a valid ticket, fetching a new one only when the cached ticket
    /// is missing or expired.
    ///
    /// The issue instant is taken when the request starts, so the cached
    /// ticket never outlives the service's own validity window.
    ///
    /// # Errors
    ///
    /// Returns [`FChatError::Auth`] if no ticket could be obtained. Nothing is
    /// cached in that case.
    pub async fn get_ticket(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref() {
            if entry.issued_at.elapsed() < TICKET_LIFETIME {
                debug!("using cached ticket");
                return Ok(entry.ticket.clone());
            }
        }

        info!(account = %self.account, "fetching ticket");
        let issued_at = Instant::now();
        match self
            .service
            .request_ticket(&self.account, &self.password)
            .await
        {
            Ok(ticket) => {
                *cached = Some(CachedTicket {
                    ticket: ticket.clone(),
                    issued_at,
                });
                Ok(ticket)
            }
            Err(e) => {
                warn!("ticket request failed: {e}");
                *cached = None;
                Err(match e {
                    FChatError::Auth(msg) => FChatError::Auth(msg),
                    other => FChatError::Auth(other.to_string()),
                })
            }
        }
    }

    /// Forget the cached ticket so the next call fetches a fresh one.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

impl fmt::Debug for TicketManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TicketManager")
            .field("account", &self.account)
            .field("password", &"<redacted>")
            .finish_non_exhaustive()
    }
}

// ── Account API ─────────────────────────────────────────────────────

/// Which lists [`AccountApi::friend_list`] should return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FriendListQuery {
    pub bookmarks: bool,
    pub friends: bool,
    pub requests: bool,
    pub pending: bool,
}

/// Ticketed calls to the account JSON API.
///
/// Every call fetches a ticket through the shared [`TicketManager`] and
/// turns a non-empty `error` field in the response into [`FChatError::Api`].
#[derive(Debug, Clone)]
pub struct AccountApi {
    tickets: Arc<TicketManager>,
}

impl AccountApi {
    pub fn new(tickets: Arc<TicketManager>) -> Self {
        Self { tickets }
    }

    /// Profile data for a character.
    ///
    /// # Errors
    ///
    /// Fails on ticket, HTTP, or API errors.
    pub async fn character_data(&self, name: &str) -> Result<Value> {
        self.call("character-data", &[("name", name)]).await
    }

    /// Friends of a character.
    ///
    /// # Errors
    ///
    /// Fails on ticket, HTTP, or API errors.
    pub async fn character_friends(&self, name: &str) -> Result<Value> {
        self.call("character-friends", &[("name", name)]).await
    }

    /// Image list for a character.
    ///
    /// # Errors
    ///
    /// Fails on ticket, HTTP, or API errors.
    pub async fn character_images(&self, name: &str) -> Result<Value> {
        self.call("character-images", &[("name", name)]).await
    }

    /// The account's private memo about `target`.
    ///
    /// # Errors
    ///
    /// Fails on ticket, HTTP, or API errors.
    pub async fn character_memo(&self, target: &str) -> Result<Value> {
        self.call("character-memo-get2", &[("target", target)]).await
    }

    /// Replace the private memo about `target`.
    ///
    /// # Errors
    ///
    /// Fails on ticket, HTTP, or API errors.
    pub async fn save_character_memo(&self, target: &str, note: &str) -> Result<Value> {
        self.call("character-memo-save", &[("target_name", target), ("note", note)])
            .await
    }

    /// Bookmark, friend, and request lists.
    ///
    /// # Errors
    ///
    /// Fails on ticket, HTTP, or API errors.
    pub async fn friend_list(&self, query: FriendListQuery) -> Result<Value> {
        let flags = [
            ("bookmarklist", query.bookmarks),
            ("friendlist", query.friends),
            ("requestlist", query.requests),
            ("requestpending", query.pending),
        ];
        let fields: Vec<(&str, &str)> = flags
            .iter()
            .filter(|(_, on)| *on)
            .map(|(key, _)| (*key, "true"))
            .collect();
        self.call("friend-list", &fields).await
    }

    /// # Errors
    ///
    /// Fails on ticket, HTTP, or API errors.
    pub async fn add_bookmark(&self, name: &str) -> Result<Value> {
        self.call("bookmark-add", &[("name", name)]).await
    }

    /// # Errors
    ///
    /// Fails on ticket, HTTP, or API errors.
    pub async fn remove_bookmark(&self, name: &str) -> Result<Value> {
        self.call("bookmark-remove", &[("name", name)]).await
    }

    /// End the friendship between one of our characters and another.
    ///
    /// # Errors
    ///
    /// Fails on ticket, HTTP, or API errors.
    pub async fn remove_friend(&self, source: &str, dest: &str) -> Result<Value> {
        self.call(
            "friend-remove",
            &[("source_name", source), ("dest_name", dest)],
        )
        .await
    }

    /// # Errors
    ///
    /// Fails on ticket, HTTP, or API errors.
    pub async fn accept_friend_request(&self, request_id: u64) -> Result<Value> {
        let id = request_id.to_string();
        self.call("request-accept", &[("request_id", &id)]).await
    }

    /// # Errors
    ///
    /// Fails on ticket, HTTP, or API errors.
    pub async fn deny_friend_request(&self, request_id: u64) -> Result<Value> {
        let id = request_id.to_string();
        self.call("request-deny", &[("request_id", &id)]).await
    }

    /// # Errors
    ///
    /// Fails on ticket, HTTP, or API errors.
    pub async fn cancel_friend_request(&self, request_id: u64) -> Result<Value> {
        let id = request_id.to_string();
        self.call("request-cancel", &[("request_id", &id)]).await
    }

    /// Ask `target` to befriend our character `source`.
    ///
    /// # Errors
    ///
    /// Fails on ticket, HTTP, or API errors.
    pub async fn send_friend_request(&self, source: &str, target: &str) -> Result<Value> {
        self.call("request-send2", &[("source", source), ("target", target)])
            .await
    }

    async fn call(&self, endpoint: &str, extra: &[(&str, &str)]) -> Result<Value> {
        let ticket = self.tickets.get_ticket().await?;
        let mut fields = Vec::with_capacity(extra.len() + 2);
        fields.push(("account", self.tickets.account()));
        fields.push(("ticket", ticket.as_str()));
        fields.extend_from_slice(extra);

        debug!(endpoint, "account api call");
        let response = self.tickets.service().call(endpoint, &fields).await?;
        match response.get("error").and_then(Value::as_str) {
            Some(err) if !err.is_empty() => Err(FChatError::Api(err.to_string())),
            _ => Ok(response),
        }
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
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeService {
        ticket_calls: AtomicUsize,
        refuse: bool,
        calls: StdMutex<Vec<(String, Vec<(String, String)>)>>,
        response: Value,
    }

    #[async_trait]
    impl AccountService for FakeService {
        async fn request_ticket(&self, _account: &str, password: &str) -> Result<String> {
            let n = self.ticket_calls.fetch_add(1, Ordering::SeqCst);
            if self.refuse || password != "hunter2" {
                return Err(FChatError::Auth("Login failed.".into()));
            }
            Ok(format!("ticket-{n}"))
        }

        async fn call(&self, endpoint: &str, fields: &[(&str, &str)]) -> Result<Value> {
            self.calls.lock().unwrap().push((
                endpoint.to_string(),
                fields
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ));
            Ok(self.response.clone())
        }
    }

    fn manager(service: &Arc<FakeService>, password: &str) -> TicketManager {
        let service: Arc<dyn AccountService> = Arc::clone(service) as Arc<dyn AccountService>;
        TicketManager::new(service, "acct", password)
    }

    #[tokio::test(start_paused = true)]
    async fn ticket_is_cached_within_lifetime() {
        let service = Arc::new(FakeService::default());
        let tickets = manager(&service, "hunter2");

        assert_eq!(tickets.get_ticket().await.unwrap(), "ticket-0");
        tokio::time::advance(Duration::from_secs(29 * 60 + 59)).await;
        assert_eq!(tickets.get_ticket().await.unwrap(), "ticket-0");
        assert_eq!(service.ticket_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_ticket_is_refetched() {
        let service = Arc::new(FakeService::default());
        let tickets = manager(&service, "hunter2");

        tickets.get_ticket().await.unwrap();
        tokio::time::advance(Duration::from_secs(30 * 60 + 1)).await;
        assert_eq!(tickets.get_ticket().await.unwrap(), "ticket-1");
        assert_eq!(service.ticket_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn refusal_is_auth_error_and_not_cached() {
        let service = Arc::new(FakeService::default());
        let tickets = manager(&service, "wrong");

        let err = tickets.get_ticket().await.unwrap_err();
        assert!(matches!(err, FChatError::Auth(ref msg) if msg == "Login failed."));
        assert!(tickets.get_ticket().await.is_err());
        assert_eq!(service.ticket_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_forces_refetch() {
        let service = Arc::new(FakeService::default());
        let tickets = manager(&service, "hunter2");
        tickets.get_ticket().await.unwrap();
        tickets.invalidate().await;
        assert_eq!(tickets.get_ticket().await.unwrap(), "ticket-1");
    }

    #[tokio::test]
    async fn api_calls_carry_account_and_ticket() {
        let service = Arc::new(FakeService {
            response: serde_json::json!({ "error": "", "friends": [] }),
            ..FakeService::default()
        });
        let api = AccountApi::new(Arc::new(manager(&service, "hunter2")));

        api.remove_friend("Me", "Them").await.unwrap();
        api.friend_list(FriendListQuery {
            friends: true,
            pending: true,
            ..FriendListQuery::default()
        })
        .await
        .unwrap();

        let calls = service.calls.lock().unwrap();
        let (endpoint, fields) = &calls[0];
        assert_eq!(endpoint, "friend-remove");
        assert_eq!(fields[0], ("account".into(), "acct".into()));
        assert_eq!(fields[1], ("ticket".into(), "ticket-0".into()));
        assert!(fields.contains(&("dest_name".into(), "Them".into())));

        let (endpoint, fields) = &calls[1];
        assert_eq!(endpoint, "friend-list");
        assert_eq!(
            fields[2..],
            [
                ("friendlist".to_string(), "true".to_string()),
                ("requestpending".to_string(), "true".to_string())
            ]
        );
        assert_eq!(service.ticket_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn api_error_body_becomes_error() {
        let service = Arc::new(FakeService {
            response: serde_json::json!({ "error": "Character not found." }),
            ..FakeService::default()
        });
        let api = AccountApi::new(Arc::new(manager(&service, "hunter2")));

        let err = api.character_data("Nobody").await.unwrap_err();
        assert!(matches!(err, FChatError::Api(ref msg) if msg == "Character not found."));
    }
}
