//! HTTP account service backed by [`reqwest`].
//!
//! Posts form-encoded fields to the ticket endpoint and to
//! `<api_base>/<endpoint>.php`, decoding JSON responses.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), fchat_session::FChatError> {
//! use fchat_session::account::http::HttpAccountService;
//! use fchat_session::ticket::AccountService;
//!
//! let service = HttpAccountService::new()?;
//! let ticket = service.request_ticket("myaccount", "secret").await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{FChatError, Result};
use crate::ticket::AccountService;

/// Ticket endpoint of the production account service.
pub const DEFAULT_TICKET_URL: &str = "https://www.f-list.net/json/getApiTicket.php";

/// Base URL of the production JSON API.
pub const DEFAULT_API_BASE: &str = "https://www.f-list.net/json/api";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Response body of the ticket endpoint: `{"ticket": ...}` or `{"error": ...}`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TicketResponse {
    ticket: Option<String>,
    error: String,
}

/// [`AccountService`] talking to the account web service over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpAccountService {
    client: reqwest::Client,
    ticket_url: String,
    api_base: String,
}

impl HttpAccountService {
    /// Service pointed at the production endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`FChatError::Http`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("fchat-session/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FChatError::Http(e.to_string()))?;
        Ok(Self::with_client(client))
    }

    /// Service using a preconfigured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            ticket_url: DEFAULT_TICKET_URL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Point at different endpoints, e.g. a staging server.
    #[must_use]
    pub fn with_endpoints(
        mut self,
        ticket_url: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        self.ticket_url = ticket_url.into();
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}.php", self.api_base)
    }

    async fn post_form(&self, url: &str, fields: &[(&str, &str)]) -> Result<Value> {
        debug!(url, "posting account request");
        let response = self
            .client
            .post(url)
            .form(fields)
            .send()
            .await
            .map_err(|e| FChatError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| FChatError::Http(e.to_string()))?;
        response
            .json::<Value>()
            .await
            .map_err(|e| FChatError::Http(e.to_string()))
    }
}

#[async_trait]
impl AccountService for HttpAccountService {
    async fn request_ticket(&self, account: &str, password: &str) -> Result<String> {
        let body = self
            .post_form(
                &self.ticket_url,
                &[("account", account), ("password", password)],
            )
            .await?;
        let parsed: TicketResponse = serde_json::from_value(body)?;
        match parsed.ticket {
            Some(ticket) if !ticket.is_empty() => Ok(ticket),
            _ if !parsed.error.is_empty() => Err(FChatError::Auth(parsed.error)),
            _ => Err(FChatError::Auth("response carried no ticket".into())),
        }
    }

    async fn call(&self, endpoint: &str, fields: &[(&str, &str)]) -> Result<Value> {
        self.post_form(&self.endpoint_url(endpoint), fields).await
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

    #[test]
    fn endpoint_urls() {
        let service = HttpAccountService::with_client(reqwest::Client::new());
        assert_eq!(
            service.endpoint_url("character-data"),
            "https://www.f-list.net/json/api/character-data.php"
        );

        let service = service.with_endpoints("http://localhost/ticket", "http://localhost/api/");
        assert_eq!(
            service.endpoint_url("bookmark-add"),
            "http://localhost/api/bookmark-add.php"
        );
    }

    #[test]
    fn ticket_response_shapes() {
        let ok: TicketResponse = serde_json::from_str(r#"{"ticket":"abc","error":""}"#).unwrap();
        assert_eq!(ok.ticket.as_deref(), Some("abc"));

        let err: TicketResponse = serde_json::from_str(r#"{"error":"Login failed."}"#).unwrap();
        assert_eq!(err.ticket, None);
        assert_eq!(err.error, "Login failed.");
    }
}
