//! Session configuration.

use std::collections::HashSet;
use std::time::Duration;

/// Default chat server endpoint.
pub const DEFAULT_URL: &str = "wss://chat.f-list.net/chat2";

/// Default client name reported during identification.
pub const DEFAULT_CLIENT_NAME: &str = "fchat-session";

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

const DEFAULT_OUTGOING_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(3);
const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(90);
const DEFAULT_WATCHDOG_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_IDLE_POLL: Duration = Duration::from_millis(10);
const DEFAULT_IDENTIFY_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for an [`FChatSession`](crate::session::FChatSession).
///
/// Only the account and character are required; everything else has a
/// default matching the production server's expectations.
///
/// # Example
///
/// ```
/// use fchat_session::config::SessionConfig;
/// use std::time::Duration;
///
/// let config = SessionConfig::new("myaccount", "My Character")
///     .with_settle_delay(Duration::ZERO)
///     .with_log_filter(["PRD", "KID"]);
/// assert_eq!(config.url, "wss://chat.f-list.net/chat2");
/// assert_eq!(config.outgoing_delay, Duration::from_secs(1));
/// assert!(config.is_filtered("PRD"));
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Account name used for ticket requests and identification.
    pub account: String,
    /// Character to log in as.
    pub character: String,
    /// Chat server URL handed to the connector.
    pub url: String,
    /// Client name (`cname`) sent in the identify frame.
    pub client_name: String,
    /// Client version (`cversion`). Defaults to the crate version.
    pub client_version: String,
    /// Initial pause after each outbound frame. The server may retune this
    /// with `VAR msg_flood`.
    ///
    /// Defaults to **1 second**.
    pub outgoing_delay: Duration,
    /// Pause after identification before `connect()` returns.
    ///
    /// Defaults to **3 seconds**.
    pub settle_delay: Duration,
    /// Keepalive silence after which the connection counts as stale.
    ///
    /// Defaults to **90 seconds**.
    pub stale_after: Duration,
    /// How often the watchdog checks keepalive recency.
    pub watchdog_interval: Duration,
    /// How often the drain task polls an empty queue.
    pub idle_poll: Duration,
    /// Longest wait for the server's identify confirmation.
    ///
    /// Defaults to **30 seconds**.
    pub identify_timeout: Duration,
    /// Longest wait for background tasks during [`close`](crate::session::FChatSession::close)
    /// before they are aborted.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// Capacity of the bounded event channel.
    ///
    /// Events are dropped with a warning when the consumer falls behind. The
    /// final `Disconnected` event is always delivered.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Log keepalive traffic at debug instead of trace.
    pub log_pings: bool,
    /// Inbound command codes that are not logged.
    pub log_filter: HashSet<String>,
}

impl SessionConfig {
    /// Create a configuration for `character` on `account` with default values.
    pub fn new(account: impl Into<String>, character: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            character: character.into(),
            url: DEFAULT_URL.to_string(),
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            outgoing_delay: DEFAULT_OUTGOING_DELAY,
            settle_delay: DEFAULT_SETTLE_DELAY,
            stale_after: DEFAULT_STALE_AFTER,
            watchdog_interval: DEFAULT_WATCHDOG_INTERVAL,
            idle_poll: DEFAULT_IDLE_POLL,
            identify_timeout: DEFAULT_IDENTIFY_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            log_pings: false,
            log_filter: HashSet::new(),
        }
    }

    /// Set the chat server URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the client name and version reported to the server.
    #[must_use]
    pub fn with_client(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.client_name = name.into();
        self.client_version = version.into();
        self
    }

    /// Set the initial outbound pacing delay.
    #[must_use]
    pub fn with_outgoing_delay(mut self, delay: Duration) -> Self {
        self.outgoing_delay = delay;
        self
    }

    /// Set the post-identify settle delay. Zero returns as soon as identified.
    #[must_use]
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the keepalive staleness threshold.
    #[must_use]
    pub fn with_stale_after(mut self, threshold: Duration) -> Self {
        self.stale_after = threshold;
        self
    }

    /// Set the watchdog check interval.
    #[must_use]
    pub fn with_watchdog_interval(mut self, interval: Duration) -> Self {
        self.watchdog_interval = interval;
        self
    }

    /// Set the empty-queue poll interval.
    #[must_use]
    pub fn with_idle_poll(mut self, interval: Duration) -> Self {
        self.idle_poll = interval;
        self
    }

    /// Set the identify confirmation timeout.
    #[must_use]
    pub fn with_identify_timeout(mut self, timeout: Duration) -> Self {
        self.identify_timeout = timeout;
        self
    }

    /// Set the graceful shutdown timeout.
    ///
    /// A zero timeout aborts the background tasks immediately.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the capacity of the bounded event channel.
    ///
    /// Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Log keepalive traffic at debug level.
    #[must_use]
    pub fn with_log_pings(mut self, enabled: bool) -> Self {
        self.log_pings = enabled;
        self
    }

    /// Suppress inbound logging for the given command codes.
    #[must_use]
    pub fn with_log_filter<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.log_filter = codes.into_iter().map(Into::into).collect();
        self
    }

    /// Whether inbound frames with `code` are kept out of the log.
    pub fn is_filtered(&self, code: &str) -> bool {
        self.log_filter.contains(code)
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
    fn defaults() {
        let config = SessionConfig::new("acct", "Char");
        assert_eq!(config.account, "acct");
        assert_eq!(config.character, "Char");
        assert_eq!(config.client_version, env!("CARGO_PKG_VERSION"));
        assert_eq!(config.settle_delay, Duration::from_secs(3));
        assert_eq!(config.stale_after, Duration::from_secs(90));
        assert_eq!(config.watchdog_interval, Duration::from_secs(1));
        assert_eq!(config.idle_poll, Duration::from_millis(10));
        assert_eq!(config.identify_timeout, Duration::from_secs(30));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.event_channel_capacity, 256);
        assert!(!config.log_pings);
        assert!(config.log_filter.is_empty());
    }

    #[test]
    fn capacity_is_clamped() {
        let config = SessionConfig::new("acct", "Char").with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[test]
    fn client_override() {
        let config = SessionConfig::new("acct", "Char").with_client("bot", "9.9");
        assert_eq!(config.client_name, "bot");
        assert_eq!(config.client_version, "9.9");
    }
}
